//! Canonical OHLCV bar

use serde::{Deserialize, Serialize};

/// A validated, numerically coerced OHLCV bar.
///
/// The timestamp is integer milliseconds and strictly positive; price and
/// volume fields are optional because some venues publish partial bars.
/// A valid sequence is sorted ascending by timestamp, with duplicates
/// preserving input order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time in milliseconds since epoch
    pub timestamp_ms: i64,
    /// Opening price
    pub open: Option<f64>,
    /// Highest traded price
    pub high: Option<f64>,
    /// Lowest traded price
    pub low: Option<f64>,
    /// Closing price
    pub close: Option<f64>,
    /// Traded base volume
    pub volume: Option<f64>,
}

impl Candle {
    /// Construct a fully populated bar.
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp_ms,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// True when a sequence of bars is sorted ascending by timestamp.
    pub fn is_sorted(bars: &[Candle]) -> bool {
        bars.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_detection() {
        let a = Candle::new(1, 1.0, 2.0, 0.5, 1.5, 10.0);
        let b = Candle::new(2, 1.5, 2.5, 1.0, 2.0, 12.0);
        assert!(Candle::is_sorted(&[a, b]));
        assert!(!Candle::is_sorted(&[b, a]));
        assert!(Candle::is_sorted(&[a, a]));
        assert!(Candle::is_sorted(&[]));
    }
}
