//! Outbound event delivery seam
//!
//! The bus client is an external collaborator. The monitor only needs
//! one guarantee from it: a returned error means the batch may not have
//! arrived, so cycle state must not be persisted.

use thiserror::Error;

use tablewatch_protocol::Event;

/// Delivery failure reported by the downstream bus client
#[derive(Debug, Error)]
#[error("event delivery failed: {0}")]
pub struct SendError(pub String);

/// Accepts a batch of events for delivery
#[async_trait::async_trait]
pub trait EventSender: Send + Sync {
    /// Deliver a batch
    ///
    /// # Errors
    ///
    /// Any error makes the calling cycle skip persistence, so the same
    /// changes are re-detected and re-emitted next cycle.
    async fn send(&self, events: &[Event]) -> Result<(), SendError>;
}
