//! Marker diffing
//!
//! Pure selection of buckets whose marker advanced. Strict greater-than:
//! an unchanged marker is not an update, so re-running a cycle against
//! the state it just persisted selects nothing.

use std::collections::HashMap;

/// Select the buckets where `fresh` advanced past `prior`
///
/// A bucket missing from `prior` compares against 0.
pub fn select_updated(
    fresh: &HashMap<String, i64>,
    prior: &HashMap<String, i64>,
) -> HashMap<String, i64> {
    fresh
        .iter()
        .filter(|(key, marker)| **marker > prior.get(*key).copied().unwrap_or(0))
        .map(|(key, marker)| (key.clone(), *marker))
        .collect()
}
