//! Cross-field configuration validation

use crate::error::{ConfigError, Result};
use crate::Config;

/// Validate the full configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let w = &config.warehouse;
    if w.poll_interval_secs == 0 {
        return Err(ConfigError::invalid_value(
            "warehouse",
            "poll_interval_secs",
            "must be greater than 0",
        ));
    }
    if w.poll_timeout_secs < w.poll_interval_secs {
        return Err(ConfigError::invalid_value(
            "warehouse",
            "poll_timeout_secs",
            format!(
                "must be at least poll_interval_secs ({})",
                w.poll_interval_secs
            ),
        ));
    }
    if w.api_url.is_empty() {
        return Err(ConfigError::invalid_value(
            "warehouse",
            "api_url",
            "must not be empty",
        ));
    }

    let m = &config.monitor;
    if m.max_concurrent_cycles == 0 {
        return Err(ConfigError::invalid_value(
            "monitor",
            "max_concurrent_cycles",
            "must be greater than 0",
        ));
    }
    if m.bucket_fanout == 0 {
        return Err(ConfigError::invalid_value(
            "monitor",
            "bucket_fanout",
            "must be greater than 0",
        ));
    }

    let a = &config.analytical;
    if a.date_column.is_empty() || a.timestamp_column.is_empty() {
        return Err(ConfigError::invalid_value(
            "analytical",
            "date_column",
            "column names must not be empty",
        ));
    }

    Ok(())
}
