//! Tablewatch - Protocol
//!
//! Core domain types shared by every tablewatch crate:
//!
//! - [`Resource`] - an abstract description of one table (or table family)
//!   to monitor for freshness, consumed from the upstream registry.
//! - [`BucketKey`] / [`Bucket`] - one concrete, probeable unit derived
//!   from a resource (a table name, a partition, or a date/hour pair).
//! - [`Event`] / [`EventBuilder`] - the "table updated" records handed to
//!   the downstream notification bus.
//!
//! Modification markers are plain `i64` values: milliseconds since epoch
//! for the warehouse backend, a monotonic epoch counter for the
//! analytical backend. Markers from different backends are never compared
//! with each other.

mod bucket;
mod event;
mod resource;

pub use bucket::{Bucket, BucketKey};
pub use event::{Event, EventBuilder, date_hour_to_unix};
pub use resource::{Resource, ResourceError, Unit, UnitSet};
