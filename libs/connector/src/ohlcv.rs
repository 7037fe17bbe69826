//! OHLCV normalization
//!
//! Coerces heterogeneous candle payloads into the canonical [`Candle`]
//! sequence: integer millisecond timestamps, float fields, stable ascending
//! order. Accepts row-oriented input (sequences of at-least-6-tuples) and
//! column-oriented input (named equal-length columns).

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use types::Candle;

/// Required column names for the column-oriented form, in canonical order.
pub const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Errors raised during normalization.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    /// An element could not be coerced
    #[error("invalid {field} at index {index}: {value}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Bar index in input order
        index: usize,
        /// Offending element, rendered
        value: String,
    },

    /// A row carried fewer than six fields
    #[error("row {index} has {len} fields, need 6")]
    ShortRow {
        /// Row index
        index: usize,
        /// Field count found
        len: usize,
    },

    /// The column form is missing a required column
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// Columns disagree on length
    #[error("column '{column}' has {actual} entries, expected {expected}")]
    ColumnLength {
        /// Offending column
        column: String,
        /// Length of the timestamp column
        expected: usize,
        /// Length found
        actual: usize,
    },

    /// Input is neither row- nor column-oriented
    #[error("input is neither a row sequence nor a column mapping")]
    UnsupportedShape,
}

fn invalid(field: &str, index: usize, value: &Value) -> NormalizeError {
    NormalizeError::InvalidValue {
        field: field.to_string(),
        index,
        value: value.to_string(),
    }
}

/// Coerce a timestamp element: integer milliseconds, floats truncated,
/// numeric strings parsed, null rejected. Must be strictly positive.
fn coerce_timestamp(value: &Value, index: usize) -> Result<i64, NormalizeError> {
    let ts = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(f) = n.as_f64() {
                f.trunc() as i64
            } else {
                return Err(invalid("timestamp", index, value));
            }
        }
        Value::String(s) => {
            if let Ok(i) = s.parse::<i64>() {
                i
            } else if let Ok(f) = s.parse::<f64>() {
                f.trunc() as i64
            } else {
                return Err(invalid("timestamp", index, value));
            }
        }
        _ => return Err(invalid("timestamp", index, value)),
    };
    if ts <= 0 {
        return Err(invalid("timestamp", index, value));
    }
    Ok(ts)
}

/// Coerce a price/volume element: floats, integers promoted, numeric strings
/// parsed, null preserved.
fn coerce_field(value: &Value, field: &str, index: usize) -> Result<Option<f64>, NormalizeError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(field, index, value)),
        Value::String(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(field, index, value)),
        _ => Err(invalid(field, index, value)),
    }
}

fn bar_from_row(row: &[Value], index: usize) -> Result<Candle, NormalizeError> {
    if row.len() < 6 {
        return Err(NormalizeError::ShortRow {
            index,
            len: row.len(),
        });
    }
    // Trailing fields (turnover, trade count, ...) are ignored.
    Ok(Candle {
        timestamp_ms: coerce_timestamp(&row[0], index)?,
        open: coerce_field(&row[1], "open", index)?,
        high: coerce_field(&row[2], "high", index)?,
        low: coerce_field(&row[3], "low", index)?,
        close: coerce_field(&row[4], "close", index)?,
        volume: coerce_field(&row[5], "volume", index)?,
    })
}

fn normalize_rows(rows: &[Value]) -> Result<Vec<Candle>, NormalizeError> {
    let mut bars = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let row = row.as_array().ok_or(NormalizeError::UnsupportedShape)?;
        bars.push(bar_from_row(row, index)?);
    }
    Ok(bars)
}

fn normalize_columns(map: &serde_json::Map<String, Value>) -> Result<Vec<Candle>, NormalizeError> {
    let mut columns = Vec::with_capacity(6);
    for name in COLUMNS {
        let column = map
            .get(name)
            .ok_or_else(|| NormalizeError::MissingColumn(name.to_string()))?
            .as_array()
            .ok_or(NormalizeError::UnsupportedShape)?;
        columns.push(column);
    }

    let expected = columns[0].len();
    for (name, column) in COLUMNS.iter().zip(&columns) {
        if column.len() != expected {
            return Err(NormalizeError::ColumnLength {
                column: name.to_string(),
                expected,
                actual: column.len(),
            });
        }
    }

    let mut bars = Vec::with_capacity(expected);
    for index in 0..expected {
        bars.push(Candle {
            timestamp_ms: coerce_timestamp(&columns[0][index], index)?,
            open: coerce_field(&columns[1][index], "open", index)?,
            high: coerce_field(&columns[2][index], "high", index)?,
            low: coerce_field(&columns[3][index], "low", index)?,
            close: coerce_field(&columns[4][index], "close", index)?,
            volume: coerce_field(&columns[5][index], "volume", index)?,
        });
    }
    Ok(bars)
}

/// Normalize row- or column-oriented candle data into a canonical sequence:
/// coerced fields, stably sorted ascending by timestamp.
pub fn normalize(input: &Value) -> Result<Vec<Candle>, NormalizeError> {
    let mut bars = match input {
        Value::Array(rows) => normalize_rows(rows)?,
        Value::Object(map) => normalize_columns(map)?,
        _ => return Err(NormalizeError::UnsupportedShape),
    };
    // Stable: duplicate timestamps keep input order.
    bars.sort_by_key(|bar| bar.timestamp_ms);
    Ok(bars)
}

/// Bar shape consumed by TradingView's Lightweight Charts: second-resolution
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightweightBar {
    /// Bar time in seconds since epoch
    pub time: i64,
    /// Opening price
    pub open: Option<f64>,
    /// Highest price
    pub high: Option<f64>,
    /// Lowest price
    pub low: Option<f64>,
    /// Closing price
    pub close: Option<f64>,
    /// Volume
    pub volume: Option<f64>,
}

/// Convert canonical bars to the Lightweight-Charts shape.
pub fn to_lightweight_charts(bars: &[Candle]) -> Vec<LightweightBar> {
    bars.iter()
        .map(|bar| LightweightBar {
            time: bar.timestamp_ms / 1000,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })
        .collect()
}

/// Apply a per-bar mapping, preserving order.
pub fn map_bars<T>(bars: &[Candle], f: impl FnMut(&Candle) -> T) -> Vec<T> {
    bars.iter().map(f).collect()
}
