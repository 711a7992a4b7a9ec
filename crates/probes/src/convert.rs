//! Loose JSON value coercions
//!
//! Backends deliver numeric columns inconsistently: the warehouse API
//! encodes 64-bit integers as JSON strings, the analytical client as
//! numbers. These helpers accept either.

use serde_json::Value;

/// Coerce a cell to i64, accepting numbers, numeric strings, and floats
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            if let Ok(i) = s.parse::<i64>() {
                Some(i)
            } else {
                s.parse::<f64>().ok().map(|f| f.trunc() as i64)
            }
        }
        _ => None,
    }
}

/// Coerce a cell to u32 (hour columns)
pub(crate) fn as_u32(value: &Value) -> Option<u32> {
    as_i64(value).and_then(|i| u32::try_from(i).ok())
}

/// Coerce a cell to a string slice
pub(crate) fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}
