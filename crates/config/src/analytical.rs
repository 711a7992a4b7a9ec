//! Analytical-db backend configuration

use serde::Deserialize;

/// Analytical backend settings
///
/// Column names apply when a resource URI does not override them with
/// `?date=` / `?timestamp=` query parameters.
///
/// # Example
///
/// ```toml
/// [analytical]
/// resource_uri_prefix = "adb://"
/// date_column = "d"
/// timestamp_column = "t"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticalConfig {
    /// URI prefix that selects this backend's resources
    pub resource_uri_prefix: String,

    /// Default date column for periodic queries
    pub date_column: String,

    /// Default timestamp column for hourly bucketing
    pub timestamp_column: String,
}

impl Default for AnalyticalConfig {
    fn default() -> Self {
        Self {
            resource_uri_prefix: "adb://".to_string(),
            date_column: "d".to_string(),
            timestamp_column: "t".to_string(),
        }
    }
}
