//! Bounded fan-out over independent resources
//!
//! Cycles for different resources share nothing but the state store
//! (which is keyed per resource), so they run concurrently under a
//! permit bound. One resource's failure never touches another's cycle.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analytical::AnalyticalMonitor;
use crate::cycle::CycleOutcome;
use crate::error::MonitorError;
use crate::warehouse::WarehouseMonitor;

/// A resource's detection cycle, backend-agnostic
#[async_trait::async_trait]
pub trait Monitor: Send + Sync {
    /// URI of the monitored resource
    fn resource_uri(&self) -> &str;

    /// Run one detection cycle
    async fn run_cycle(&self, cancel: &CancellationToken)
    -> Result<CycleOutcome, MonitorError>;
}

#[async_trait::async_trait]
impl Monitor for WarehouseMonitor {
    fn resource_uri(&self) -> &str {
        &self.resource().uri
    }

    async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, MonitorError> {
        WarehouseMonitor::run_cycle(self, cancel).await
    }
}

#[async_trait::async_trait]
impl Monitor for AnalyticalMonitor {
    fn resource_uri(&self) -> &str {
        &self.resource().uri
    }

    async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, MonitorError> {
        AnalyticalMonitor::run_cycle(self, cancel).await
    }
}

/// What one resource's cycle came to
#[derive(Debug)]
pub struct CycleReport {
    pub resource_uri: String,
    pub outcome: Result<CycleOutcome, MonitorError>,
}

/// Run one cycle per monitor, at most `max_concurrent` at a time
///
/// Every monitor gets a report; errors are contained per resource.
pub async fn run_cycles(
    monitors: Vec<Arc<dyn Monitor>>,
    max_concurrent: usize,
    cancel: &CancellationToken,
) -> Vec<CycleReport> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut join_set = JoinSet::new();

    info!(
        resources = monitors.len(),
        max_concurrent,
        "starting detection cycles"
    );

    for monitor in monitors {
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let resource_uri = monitor.resource_uri().to_string();
            let outcome = monitor.run_cycle(&cancel).await;
            match &outcome {
                Ok(outcome) => {
                    info!(resource = %resource_uri, outcome = ?outcome, "cycle finished");
                }
                Err(e) => {
                    warn!(resource = %resource_uri, error = %e, "cycle failed");
                }
            }
            CycleReport {
                resource_uri,
                outcome,
            }
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => warn!(error = %e, "cycle task panicked"),
        }
    }
    reports
}
