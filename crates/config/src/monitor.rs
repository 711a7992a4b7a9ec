//! Detection-cycle orchestration configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Default bound on concurrently running resource cycles
pub const DEFAULT_MAX_CONCURRENT_CYCLES: usize = 4;

/// Default bound on concurrent bucket probes within one cycle
pub const DEFAULT_BUCKET_FANOUT: usize = 4;

/// Monitor orchestration settings
///
/// # Example
///
/// ```toml
/// [monitor]
/// status_file = "var/status.json"
/// max_concurrent_cycles = 8
/// bucket_fanout = 4
/// bootstrap_from_zero = false
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Path of the persisted marker store
    pub status_file: PathBuf,

    /// Bound on concurrently running resource cycles
    pub max_concurrent_cycles: usize,

    /// Bound on concurrent bucket probes within one warehouse cycle
    pub bucket_fanout: usize,

    /// Bootstrap first-run floors to 0 instead of "now", replaying all
    /// history on a fresh deployment (debug runs)
    pub bootstrap_from_zero: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_file: PathBuf::from("var/status.json"),
            max_concurrent_cycles: DEFAULT_MAX_CONCURRENT_CYCLES,
            bucket_fanout: DEFAULT_BUCKET_FANOUT,
            bootstrap_from_zero: false,
        }
    }
}
