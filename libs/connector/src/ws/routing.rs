//! Channel topic resolution
//!
//! Venues that serve different topic namespaces on different URLs declare
//! URL substring patterns in their channel templates; resolution picks the
//! first matching pattern (a missing pattern acts as the default), maps it
//! to an account-type tag, and looks the topic up in the per-type table.

use std::collections::BTreeMap;

use thiserror::Error;
use types::{ChannelTemplate, RoutedChannel};

/// Topic resolution failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RoutingError {
    /// No URL pattern matched the connection URL
    #[error("no URL pattern matches '{url}'")]
    NoMatchingUrlPattern {
        /// The connection URL that failed to match
        url: String,
    },

    /// The matched account type has no topic in the table
    #[error("no topic for account type '{0}'")]
    NoTopicForAccountType(String),
}

fn resolve_routed(routed: &RoutedChannel, url: &str) -> Result<String, RoutingError> {
    let account_type = routed
        .url_patterns
        .iter()
        .find(|p| match &p.pattern {
            Some(needle) => url.contains(needle.as_str()),
            None => true,
        })
        .map(|p| p.account_type.as_str())
        .ok_or_else(|| RoutingError::NoMatchingUrlPattern {
            url: url.to_string(),
        })?;

    routed
        .topics
        .get(account_type)
        .cloned()
        .ok_or_else(|| RoutingError::NoTopicForAccountType(account_type.to_string()))
}

/// Resolve a channel template against the connection URL.
pub fn resolve_topic(template: &ChannelTemplate, url: &str) -> Result<String, RoutingError> {
    match template {
        ChannelTemplate::Plain(topic) => Ok(topic.clone()),
        ChannelTemplate::Routed(routed) => resolve_routed(routed, url),
    }
}

/// Substitute `{name}` placeholders in a topic template with parameters.
/// Unmatched placeholders are left intact.
pub fn render_topic(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ws::UrlPattern;

    fn routed() -> ChannelTemplate {
        ChannelTemplate::Routed(RoutedChannel {
            url_patterns: vec![
                UrlPattern {
                    pattern: Some("/spot".into()),
                    account_type: "spot".into(),
                },
                UrlPattern {
                    pattern: Some("/usdc".into()),
                    account_type: "usdc".into(),
                },
                UrlPattern {
                    pattern: None,
                    account_type: "unified".into(),
                },
            ],
            topics: [
                ("spot".to_string(), "tickers.{symbol}".to_string()),
                ("unified".to_string(), "instrument_info.100ms.{symbol}".to_string()),
            ]
            .into_iter()
            .collect(),
        })
    }

    #[test]
    fn plain_templates_pass_through() {
        let template = ChannelTemplate::Plain("trade.{symbol}".into());
        assert_eq!(
            resolve_topic(&template, "wss://anywhere").unwrap(),
            "trade.{symbol}"
        );
    }

    #[test]
    fn first_matching_pattern_wins() {
        let template = routed();
        assert_eq!(
            resolve_topic(&template, "wss://stream.x.com/spot/public").unwrap(),
            "tickers.{symbol}"
        );
        // Nothing matches /spot or /usdc, so the nil pattern is the default.
        assert_eq!(
            resolve_topic(&template, "wss://stream.x.com/linear").unwrap(),
            "instrument_info.100ms.{symbol}"
        );
    }

    #[test]
    fn matched_type_without_topic_errors() {
        let template = routed();
        let err = resolve_topic(&template, "wss://stream.x.com/usdc/private").unwrap_err();
        assert_eq!(err, RoutingError::NoTopicForAccountType("usdc".into()));
    }

    #[test]
    fn no_pattern_match_errors() {
        let template = ChannelTemplate::Routed(RoutedChannel {
            url_patterns: vec![UrlPattern {
                pattern: Some("/spot".into()),
                account_type: "spot".into(),
            }],
            topics: [("spot".to_string(), "t".to_string())].into_iter().collect(),
        });
        assert!(matches!(
            resolve_topic(&template, "wss://stream.x.com/linear"),
            Err(RoutingError::NoMatchingUrlPattern { .. })
        ));
    }

    #[test]
    fn placeholder_rendering() {
        let params: BTreeMap<String, String> = [
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("timeframe".to_string(), "1m".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            render_topic("kline.{timeframe}.{symbol}", &params),
            "kline.1m.BTCUSDT"
        );
        assert_eq!(render_topic("depth.{level}", &params), "depth.{level}");
    }
}
