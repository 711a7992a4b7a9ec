//! SQL fragment helpers for the analytical backend
//!
//! Identifiers are double-quoted with inner quotes doubled; string
//! values single-quoted likewise. Only equality filters are supported.

use std::fmt;

/// Quote an identifier: `d` -> `"d"`, `we"ird` -> `"we""ird"`
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string value: `x` -> `'x'`, `o'clock` -> `'o''clock'`
pub fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A filter value from a resource URI
///
/// A value that looks like an integer is an integer; a value wrapped in
/// single or double quotes is the unwrapped string; anything else is a
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Int(i64),
    Str(String),
}

impl FilterValue {
    /// Interpret a raw URI value
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        let unwrapped = if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
            || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
        {
            &raw[1..raw.len() - 1]
        } else {
            raw
        };
        Self::Str(unwrapped.to_string())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(&quote_str(s)),
        }
    }
}

/// Render equality filters as an AND-joined WHERE fragment
pub fn where_fragment(filters: &[(String, FilterValue)]) -> String {
    filters
        .iter()
        .map(|(col, val)| format!("{} = {}", quote_ident(col), val))
        .collect::<Vec<_>>()
        .join(" AND ")
}
