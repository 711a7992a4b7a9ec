//! Monitor error types

use thiserror::Error;

use tablewatch_probes::ProbeError;
use tablewatch_protocol::ResourceError;
use tablewatch_state::StateError;

use crate::sender::SendError;

/// Errors that abort a resource's detection cycle
///
/// Validation failures are not here: an invalid resource aborts its
/// cycle with [`crate::CycleOutcome::Aborted`] rather than an error.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Downstream delivery failed; state was not persisted
    #[error(transparent)]
    Send(#[from] SendError),

    /// State store read or write failed
    #[error(transparent)]
    State(#[from] StateError),

    /// A probe failure fatal to the whole cycle (job timeout/failure)
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Resource fields failed to parse mid-cycle
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
