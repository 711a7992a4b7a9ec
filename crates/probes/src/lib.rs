//! Tablewatch - Probes
//!
//! Backend probes that fetch modification markers for buckets:
//!
//! - [`warehouse`] - columnar warehouse over an HTTP/JSON API: per-table
//!   metadata probes, a partitions-summary query path, and the async
//!   submit/poll/paginate job protocol.
//! - [`analytical`] - analytical database over a wire-protocol client
//!   (supplied by the embedder as a trait object): one aggregate query
//!   per unit, filtered server-side to markers above the persisted floor.
//!
//! Both backends expose their external dependency as an `async_trait`
//! object (`WarehouseApi`, `AnalyticalDbClient`) so tests drive the
//! probes with scripted stubs.

pub mod analytical;
mod convert;
mod error;
mod retry;
pub mod warehouse;

pub use error::ProbeError;
pub use retry::{RetryPolicy, execute_with_retry};

/// One result row: loosely typed column values as returned by a backend
pub type Row = Vec<serde_json::Value>;
