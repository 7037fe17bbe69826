//! # Lynx Catalog - Exchange Specification Loading
//!
//! Loads the declarative per-exchange specification data from TOML or JSON
//! files into an in-memory registry. The catalog is read-only after load;
//! validation happens here, at startup, so the request path never has to
//! re-check the data it consumes.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use types::{ExchangeSpec, SigningConfig};

/// Errors raised while loading or validating catalog data.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem failure while reading catalog files
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        /// File being read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("failed to parse catalog file {path}: {message}")]
    Parse {
        /// File being parsed
        path: String,
        /// Parser diagnostic
        message: String,
    },

    /// Spec failed semantic validation
    #[error("invalid exchange spec '{exchange}': {message}")]
    Invalid {
        /// Exchange the spec belongs to
        exchange: String,
        /// What is wrong with it
        message: String,
    },

    /// Two files declare the same exchange id
    #[error("duplicate exchange id '{0}' in catalog")]
    Duplicate(String),

    /// Lookup for an exchange the catalog does not carry
    #[error("exchange '{0}' not found in catalog")]
    Unknown(String),
}

/// Read-only registry of exchange specifications.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    specs: HashMap<String, Arc<ExchangeSpec>>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` and `*.json` file in a directory.
    pub fn load_dir(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let mut catalog = Catalog::new();

        let entries = std::fs::read_dir(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let file = entry.path();
            let ext = file.extension().and_then(|e| e.to_str());
            if !matches!(ext, Some("toml") | Some("json")) {
                continue;
            }
            catalog.load_file(&file)?;
        }

        info!(exchanges = catalog.specs.len(), dir = %path.display(), "catalog loaded");
        Ok(catalog)
    }

    /// Load one catalog file (TOML or JSON by extension).
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let spec: ExchangeSpec = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&text).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        } else {
            toml::from_str(&text).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        };

        debug!(exchange = %spec.id, file = %path.display(), "loaded exchange spec");
        self.insert(spec)
    }

    /// Parse a TOML spec from a string and add it.
    pub fn load_toml_str(&mut self, text: &str) -> Result<(), CatalogError> {
        let spec: ExchangeSpec = toml::from_str(text).map_err(|e| CatalogError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        self.insert(spec)
    }

    /// Validate and register a spec.
    pub fn insert(&mut self, spec: ExchangeSpec) -> Result<(), CatalogError> {
        validate_spec(&spec)?;
        if self.specs.contains_key(&spec.id) {
            return Err(CatalogError::Duplicate(spec.id));
        }
        self.specs.insert(spec.id.clone(), Arc::new(spec));
        Ok(())
    }

    /// Look up a spec by exchange id.
    pub fn get(&self, id: &str) -> Result<Arc<ExchangeSpec>, CatalogError> {
        self.specs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::Unknown(id.to_string()))
    }

    /// All registered exchange ids, sorted.
    pub fn exchange_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.specs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered exchanges.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// True when no exchange is registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn validate_spec(spec: &ExchangeSpec) -> Result<(), CatalogError> {
    let invalid = |message: String| CatalogError::Invalid {
        exchange: spec.id.clone(),
        message,
    };

    if spec.id.is_empty() {
        return Err(invalid("empty exchange id".to_string()));
    }
    if spec.urls.api.is_empty() {
        return Err(invalid("empty REST base URL".to_string()));
    }
    if !spec.urls.api.starts_with("http://") && !spec.urls.api.starts_with("https://") {
        return Err(invalid(format!("REST base URL must be http(s): {}", spec.urls.api)));
    }
    if let Some(ws) = spec.urls.ws.as_deref() {
        if !ws.starts_with("ws://") && !ws.starts_with("wss://") {
            return Err(invalid(format!("WebSocket URL must be ws(s): {}", ws)));
        }
    }

    if let Some(policy) = spec.rate_limits {
        if policy.requests <= 0.0 {
            return Err(invalid("rate limit budget must be positive".to_string()));
        }
        if policy.period_ms == 0 {
            return Err(invalid("rate limit period must be positive".to_string()));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for endpoint in &spec.endpoints {
        if endpoint.name.is_empty() {
            return Err(invalid("endpoint with empty name".to_string()));
        }
        if !endpoint.path.starts_with('/') {
            return Err(invalid(format!(
                "endpoint '{}' path must start with '/': {}",
                endpoint.name, endpoint.path
            )));
        }
        if let Some(cost) = endpoint.cost {
            if cost <= 0.0 {
                return Err(invalid(format!(
                    "endpoint '{}' cost must be positive",
                    endpoint.name
                )));
            }
        }
        if !seen.insert(endpoint.name.as_str()) {
            return Err(invalid(format!("duplicate endpoint name '{}'", endpoint.name)));
        }
    }

    if let SigningConfig::Custom(custom) = &spec.signing {
        if custom.module.is_empty() {
            return Err(invalid("custom signing pattern with empty module".to_string()));
        }
    }

    if let Some(ws) = &spec.ws {
        for (name, template) in &ws.channels {
            if let types::ChannelTemplate::Routed(routed) = template {
                if routed.url_patterns.is_empty() {
                    return Err(invalid(format!(
                        "routed channel '{}' has no URL patterns",
                        name
                    )));
                }
                if routed.topics.is_empty() {
                    return Err(invalid(format!("routed channel '{}' has no topics", name)));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPEC_TOML: &str = r#"
id = "testex"

[urls]
api = "https://api.testex.com"
ws = "wss://stream.testex.com"

[signing]
pattern = "query-hmac-sha256"
key_header = "X-TEST-APIKEY"

[rate_limits]
requests = 20.0
period_ms = 1000

[[endpoints]]
name = "fetch_ticker"
method = "GET"
path = "/api/v3/ticker"

[[endpoints]]
name = "create_order"
method = "POST"
path = "/api/v3/order"
auth = true
cost = 2.0

[error_codes]
"-2010" = "insufficient_balance"
"#;

    #[test]
    fn loads_toml_spec() {
        let mut catalog = Catalog::new();
        catalog.load_toml_str(SPEC_TOML).unwrap();
        let spec = catalog.get("testex").unwrap();
        assert_eq!(spec.endpoints.len(), 2);
        assert_eq!(spec.rate_limits.unwrap().period_ms, 1000);
        assert_eq!(catalog.exchange_ids(), vec!["testex".to_string()]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut catalog = Catalog::new();
        catalog.load_toml_str(SPEC_TOML).unwrap();
        let err = catalog.load_toml_str(SPEC_TOML).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(_)));
    }

    #[test]
    fn rejects_bad_urls_and_costs() {
        let mut catalog = Catalog::new();
        let err = catalog
            .load_toml_str(
                r#"
id = "badex"
[urls]
api = "ftp://api.badex.com"
[signing]
pattern = "deribit-hmac-sha256"
"#,
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));

        let err = catalog
            .load_toml_str(
                r#"
id = "badex"
[urls]
api = "https://api.badex.com"
[signing]
pattern = "deribit-hmac-sha256"
[[endpoints]]
name = "fetch_ticker"
method = "GET"
path = "/ticker"
cost = -1.0
"#,
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));
    }

    #[test]
    fn unknown_exchange_lookup_fails() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.get("nowhere"),
            Err(CatalogError::Unknown(_))
        ));
    }

    #[test]
    fn loads_bundled_specs() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs");
        let catalog = Catalog::load_dir(&dir).unwrap();
        assert!(catalog.len() >= 6);

        let binance = catalog.get("binance").unwrap();
        assert_eq!(binance.signing.pattern_name(), "query-hmac-sha256");
        assert!(binance.ws.is_some());
        assert!(binance.endpoint("create_order").unwrap().auth);

        let bybit = catalog.get("bybit").unwrap();
        assert!(matches!(
            bybit.ws.as_ref().unwrap().channels.get("kline"),
            Some(types::ChannelTemplate::Routed(_))
        ));
    }

    #[test]
    fn loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testex.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SPEC_TOML.as_bytes()).unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("testex").is_ok());
    }
}
