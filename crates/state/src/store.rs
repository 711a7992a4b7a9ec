//! JSON-file-backed marker store

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StateError;

/// Synthetic state key holding the maximum marker ever observed for a
/// resource
pub const MAX_KEY: &str = "max";

/// Markers persisted for one resource: bucket key -> last observed marker
pub type ResourceState = HashMap<String, i64>;

/// Persisted per-resource marker store
///
/// Backing format is one JSON object keyed by resource URI:
///
/// ```json
/// {
///   "https://warehouse.example.com/table/p:d.t_%Y%m%d": {
///     "t_20170306": 1488726000000,
///     "max": 1488812400000
///   }
/// }
/// ```
///
/// Every mutation holds the store lock across the read-modify-write and
/// the file replace, so concurrent cycles for different resources never
/// observe a partial update.
pub struct StateStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, ResourceState>>,
}

impl StateStore {
    /// Open a store, loading existing state from disk
    ///
    /// A missing file is an empty store; the parent directory is created
    /// so the first write can land.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StateError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| StateError::Malformed {
                    path: path.display().to_string(),
                    source: e,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(StateError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// All markers persisted for a resource (empty if unknown)
    pub fn get(&self, resource_uri: &str) -> ResourceState {
        self.entries
            .lock()
            .get(resource_uri)
            .cloned()
            .unwrap_or_default()
    }

    /// Read one key, initializing it atomically if absent
    ///
    /// The first caller's `default` wins and is persisted; later callers
    /// see the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the initialized value fails.
    pub fn get_or_init(
        &self,
        resource_uri: &str,
        key: &str,
        default: i64,
    ) -> Result<i64, StateError> {
        let mut entries = self.entries.lock();
        let resource = entries.entry(resource_uri.to_string()).or_default();
        if let Some(value) = resource.get(key) {
            return Ok(*value);
        }
        resource.insert(key.to_string(), default);
        debug!(resource = %resource_uri, key, value = default, "initialized state key");
        self.persist(&entries)?;
        Ok(default)
    }

    /// Merge updates into a resource's markers
    ///
    /// Existing keys not named in `updates` are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn merge(&self, resource_uri: &str, updates: &ResourceState) -> Result<(), StateError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock();
        entries
            .entry(resource_uri.to_string())
            .or_default()
            .extend(updates.iter().map(|(k, v)| (k.clone(), *v)));
        debug!(resource = %resource_uri, keys = updates.len(), "merged state");
        self.persist(&entries)
    }

    /// Replace a resource's markers wholesale
    ///
    /// This is the commit path for cycles that prune bucket keys fallen
    /// out of the lookback window: the stored entry becomes exactly
    /// `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn replace(&self, resource_uri: &str, state: ResourceState) -> Result<(), StateError> {
        let mut entries = self.entries.lock();
        let keys = state.len();
        entries.insert(resource_uri.to_string(), state);
        debug!(resource = %resource_uri, keys, "replaced state");
        self.persist(&entries)
    }

    /// Write the whole store to disk via temp file + rename
    fn persist(&self, entries: &HashMap<String, ResourceState>) -> Result<(), StateError> {
        let io_err = |e: std::io::Error| StateError::Io {
            path: self.path.display().to_string(),
            source: e,
        };

        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(entries).map_err(|e| StateError::Malformed {
            path: self.path.display().to_string(),
            source: e,
        })?;
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}
