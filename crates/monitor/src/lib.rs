//! Tablewatch - Monitor
//!
//! Orchestrates one detection cycle per resource:
//!
//! ```text
//! VALIDATING -> EXPANDING -> PROBING -> DIFFING -> BUILDING
//!            -> EMITTING -> PERSISTING -> DONE
//! ```
//!
//! A resource that fails validation aborts its cycle (logged, no state
//! touched). Individual bucket probe failures are swallowed per bucket
//! and surface as a partial outcome. Zero selected buckets short-circuit
//! before emission so a transient empty result never erases history.
//! State persists only after the sender accepted the batch - a failed
//! delivery re-detects and re-emits next cycle (at-least-once).
//!
//! [`WarehouseMonitor`] and [`AnalyticalMonitor`] implement the cycle
//! for their backend; [`runner::run_cycles`] fans independent resources
//! out under a bounded permit count.

mod analytical;
mod cycle;
pub mod diff;
mod error;
pub mod expand;
pub mod runner;
mod sender;
pub mod validate;
mod warehouse;

pub use analytical::AnalyticalMonitor;
pub use cycle::{CycleOutcome, CycleState};
pub use error::MonitorError;
pub use expand::{DAY_BACKSTEP_SECS, ExpandError, TablePath, expand_tables, probe_dates};
pub use runner::{CycleReport, Monitor, run_cycles};
pub use sender::{EventSender, SendError};
pub use validate::{ValidationError, validate_analytical, validate_warehouse};
pub use warehouse::WarehouseMonitor;
