//! Error classification
//!
//! Maps raw request outcomes (transport failures, HTTP statuses, venue error
//! codes in response bodies) onto the structured taxonomy. Classification
//! order: transport, 429, 401/403, 5xx, remaining 4xx against the catalog's
//! `error_codes` table, then 2xx bodies that embed an error code. Hints are
//! deterministic from the error kind and the exchange spec.

use serde_json::Value;
use types::{ErrorKind, ExchangeSpec};

use crate::error::{ConnectorError, ErrorVariant};
use crate::transport::{HttpResponse, TransportFailure};

const CODE_FIELDS: [&str; 5] = ["code", "retCode", "err_code", "error_code", "error"];
const MESSAGE_FIELDS: [&str; 5] = ["msg", "message", "retMsg", "error_message", "description"];

/// Classify a transport failure.
pub fn classify_transport(
    spec: &ExchangeSpec,
    endpoint: Option<&str>,
    failure: &TransportFailure,
) -> ConnectorError {
    let mut error = ConnectorError::new(
        spec.id.clone(),
        ErrorVariant::NetworkError {
            kind: failure.kind,
            detail: failure.detail.clone(),
        },
    )
    .with_hints(hints_for(ErrorKind::NetworkError, spec, endpoint));
    if let Some(endpoint) = endpoint {
        error = error.with_endpoint(endpoint);
    }
    error
}

fn extract_code(body: &Value) -> Option<String> {
    for field in CODE_FIELDS {
        match body.get(field) {
            Some(Value::Number(n)) => return Some(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            _ => {}
        }
    }
    None
}

fn extract_message(body: &Value) -> Option<String> {
    for field in MESSAGE_FIELDS {
        if let Some(Value::String(s)) = body.get(field) {
            if !s.is_empty() {
                return Some(s.clone());
            }
        }
    }
    None
}

fn retry_after_ms(response: &HttpResponse) -> Option<u64> {
    // Retry-After is in seconds; some venues send a millisecond variant.
    if let Some(ms) = response
        .header("Retry-After-Ms")
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(ms);
    }
    response
        .header("Retry-After")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

fn variant_for_kind(
    kind: ErrorKind,
    code: Option<String>,
    message: String,
    http_status: Option<u16>,
) -> ErrorVariant {
    match kind {
        ErrorKind::RateLimited => ErrorVariant::RateLimited {
            retry_after_ms: None,
        },
        ErrorKind::NetworkError => ErrorVariant::NetworkError {
            kind: crate::error::TransportErrorKind::Other,
            detail: message,
        },
        ErrorKind::MarketClosed => ErrorVariant::MarketClosed,
        ErrorKind::CircuitOpen => ErrorVariant::CircuitOpen,
        ErrorKind::InsufficientBalance => ErrorVariant::InsufficientBalance,
        ErrorKind::InvalidCredentials => ErrorVariant::InvalidCredentials,
        ErrorKind::InvalidParameters => ErrorVariant::InvalidParameters { detail: message },
        ErrorKind::InvalidOrder => ErrorVariant::InvalidOrder,
        ErrorKind::OrderNotFound => ErrorVariant::OrderNotFound,
        ErrorKind::AccessRestricted => ErrorVariant::AccessRestricted,
        ErrorKind::NotSupported => ErrorVariant::NotSupported { detail: message },
        ErrorKind::ExchangeError => ErrorVariant::ExchangeError {
            code,
            message,
            http_status,
        },
    }
}

fn build(
    spec: &ExchangeSpec,
    endpoint: Option<&str>,
    variant: ErrorVariant,
) -> ConnectorError {
    let kind = variant.kind();
    let mut error =
        ConnectorError::new(spec.id.clone(), variant).with_hints(hints_for(kind, spec, endpoint));
    if let Some(endpoint) = endpoint {
        error = error.with_endpoint(endpoint);
    }
    error
}

/// Classify an HTTP response. `None` means the response is a success and
/// carries no embedded venue error.
pub fn classify_response(
    spec: &ExchangeSpec,
    endpoint: Option<&str>,
    response: &HttpResponse,
) -> Option<ConnectorError> {
    let status = response.status;

    if status == 429 {
        return Some(build(
            spec,
            endpoint,
            ErrorVariant::RateLimited {
                retry_after_ms: retry_after_ms(response),
            },
        ));
    }

    let body = response.json();
    let code = body.as_ref().and_then(extract_code);
    let message = body
        .as_ref()
        .and_then(extract_message)
        .unwrap_or_else(|| truncate(&response.text(), 256));
    let mapped = code.as_deref().and_then(|c| spec.classify_code(c));

    if status == 401 || status == 403 {
        let variant = match mapped {
            Some(kind) => variant_for_kind(kind, code, message, Some(status)),
            None if status == 401 => ErrorVariant::InvalidCredentials,
            None => ErrorVariant::AccessRestricted,
        };
        return Some(build(spec, endpoint, variant));
    }

    if status >= 500 {
        return Some(build(
            spec,
            endpoint,
            ErrorVariant::ExchangeError {
                code,
                message,
                http_status: Some(status),
            },
        ));
    }

    if (400..500).contains(&status) {
        let variant = match mapped {
            Some(kind) => variant_for_kind(kind, code, message, Some(status)),
            None => ErrorVariant::ExchangeError {
                code,
                message,
                http_status: Some(status),
            },
        };
        return Some(build(spec, endpoint, variant));
    }

    if response.is_success() {
        // Venues that answer 200 with an embedded error code.
        if let Some(kind) = mapped {
            return Some(build(
                spec,
                endpoint,
                variant_for_kind(kind, code, message, Some(status)),
            ));
        }
    }

    None
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

/// Deterministic hints for an error kind, enriched from the exchange spec's
/// option table (`required_params`, `param_renames`).
pub fn hints_for(kind: ErrorKind, spec: &ExchangeSpec, endpoint: Option<&str>) -> Vec<String> {
    let mut hints = Vec::new();

    match kind {
        ErrorKind::RateLimited => {
            hints.push("lower the request rate or spread calls across API keys".to_string());
        }
        ErrorKind::InvalidCredentials => {
            hints.push(
                "verify the API key and secret, and that the key targets the right environment"
                    .to_string(),
            );
        }
        ErrorKind::AccessRestricted => {
            hints.push("check API key permissions and any IP allowlist for this venue".to_string());
        }
        ErrorKind::MarketClosed => {
            hints.push("the market is suspended or outside trading hours".to_string());
        }
        _ => {}
    }

    if kind == ErrorKind::InvalidParameters {
        if let Some(endpoint) = endpoint {
            if let Some(required) = spec
                .options
                .get("required_params")
                .and_then(|v| v.get(endpoint))
                .and_then(|v| v.as_array())
            {
                let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
                if !names.is_empty() {
                    hints.push(format!(
                        "endpoint '{}' requires parameters: {}",
                        endpoint,
                        names.join(", ")
                    ));
                }
            }
        }
        if let Some(renames) = spec
            .options
            .get("param_renames")
            .and_then(|v| v.as_object())
        {
            for (from, to) in renames {
                if let Some(to) = to.as_str() {
                    hints.push(format!("parameter '{}' is named '{}' on this venue", from, to));
                }
            }
        }
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use serde_json::json;

    fn spec() -> ExchangeSpec {
        serde_json::from_value(json!({
            "id": "testex",
            "urls": { "api": "https://api.testex.com" },
            "signing": { "pattern": "query-hmac-sha256" },
            "error_codes": {
                "-2010": "insufficient_balance",
                "-2011": "order_not_found",
                "-1121": "invalid_parameters",
                "10003": "invalid_credentials"
            },
            "options": {
                "required_params": { "create_order": ["category", "accountType"] },
                "param_renames": { "clientOrderId": "newClientOrderId" }
            }
        }))
        .unwrap()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn transport_failures_become_network_errors() {
        let failure = TransportFailure::new(TransportErrorKind::Timeout, "deadline elapsed");
        let err = classify_transport(&spec(), Some("fetch_ticker"), &failure);
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(err.endpoint.as_deref(), Some("fetch_ticker"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn http_429_with_retry_after() {
        let mut response = response(429, "slow down");
        response.headers.push(("Retry-After".into(), "3".into()));
        let err = classify_response(&spec(), None, &response).unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after_ms(), Some(3000));
    }

    #[test]
    fn http_401_and_403_defaults() {
        let err = classify_response(&spec(), None, &response(401, "{}")).unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);

        let err = classify_response(&spec(), None, &response(403, "{}")).unwrap();
        assert_eq!(err.kind(), ErrorKind::AccessRestricted);
    }

    #[test]
    fn http_401_body_code_takes_precedence() {
        let err = classify_response(
            &spec(),
            None,
            &response(401, r#"{"code":"10003","msg":"key expired"}"#),
        )
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn http_5xx_is_exchange_error() {
        let err = classify_response(&spec(), None, &response(502, "bad gateway")).unwrap();
        match &err.variant {
            ErrorVariant::ExchangeError { http_status, .. } => {
                assert_eq!(*http_status, Some(502));
            }
            other => panic!("expected exchange error, got {:?}", other),
        }
        assert_eq!(err.recoverability(), crate::error::Recoverability::Unknown);
    }

    #[test]
    fn http_4xx_consults_error_code_table() {
        let err = classify_response(
            &spec(),
            Some("create_order"),
            &response(400, r#"{"code":-2010,"msg":"Account has insufficient balance"}"#),
        )
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert!(!err.is_recoverable());

        let err = classify_response(
            &spec(),
            None,
            &response(400, r#"{"code":-9999,"msg":"unknown"}"#),
        )
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::ExchangeError);
    }

    #[test]
    fn embedded_code_in_2xx_body() {
        let err = classify_response(
            &spec(),
            None,
            &response(200, r#"{"code":"-2011","msg":"Unknown order sent."}"#),
        )
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::OrderNotFound);

        assert!(classify_response(
            &spec(),
            None,
            &response(200, r#"{"result":"ok"}"#)
        )
        .is_none());
    }

    #[test]
    fn plain_2xx_is_success() {
        assert!(classify_response(&spec(), None, &response(200, "[]")).is_none());
        assert!(classify_response(&spec(), None, &response(201, "created")).is_none());
    }

    #[test]
    fn invalid_parameter_hints_from_spec_options() {
        let err = classify_response(
            &spec(),
            Some("create_order"),
            &response(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#),
        )
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert!(err
            .hints
            .iter()
            .any(|h| h.contains("category, accountType")));
        assert!(err
            .hints
            .iter()
            .any(|h| h.contains("newClientOrderId")));
    }
}
