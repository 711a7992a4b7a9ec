//! Tablewatch - State
//!
//! Persists, per resource URI, a mapping from bucket key to the last
//! observed modification marker, plus a synthetic `max` entry. The store
//! is the agent's only retained history: losing it replays events
//! (at-least-once delivery), corrupting it is not an option - writes are
//! atomic temp-file-and-rename.
//!
//! Access is a single process-wide mutex. Cycles for different resources
//! touch disjoint entries; a write is one read-modify-write with no
//! partial update visible to a racing reader.

mod error;
mod store;

pub use error::StateError;
pub use store::{ResourceState, StateStore, MAX_KEY};
