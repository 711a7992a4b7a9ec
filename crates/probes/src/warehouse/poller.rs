//! Async job polling
//!
//! Drives the warehouse's submit/poll/paginate protocol:
//!
//! ```text
//! SUBMITTED -> (POLLING)* -> COMPLETE | TIMEOUT | FAILED
//! ```
//!
//! The poll loop waits a fixed backoff between checks and honors a hard
//! ceiling measured from job submission. Completion hands over to
//! pagination, which appends pages at explicit start offsets until the
//! reported total is reached.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use tablewatch_config::WarehouseConfig;

use super::{JobSpec, WarehouseApi};
use crate::Row;
use crate::error::ProbeError;

/// Cost estimate from a dry-run submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunStats {
    pub total_bytes_processed: i64,
    pub cache_hit: bool,
}

/// Poll-loop position, tracked for logging and transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Submitted,
    Polling,
    Complete,
}

/// Runs warehouse queries through the async job protocol
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn WarehouseApi>,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl JobPoller {
    pub fn new(api: Arc<dyn WarehouseApi>, config: &WarehouseConfig) -> Self {
        Self {
            api,
            poll_interval: config.poll_interval(),
            poll_timeout: config.poll_timeout(),
        }
    }

    /// Override the poll cadence (tests)
    pub fn with_timing(mut self, poll_interval: Duration, poll_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.poll_timeout = poll_timeout;
        self
    }

    /// Execute a query and return all result rows, in order
    ///
    /// # Errors
    ///
    /// `Timeout` when the hard ceiling passes before the job completes;
    /// `JobFailed` when the backend rejects the submission or a fetch.
    pub async fn run_query(&self, project: &str, sql: &str) -> Result<Vec<Row>, ProbeError> {
        let job_id = Uuid::new_v4().to_string();
        let spec = JobSpec {
            job_id: job_id.clone(),
            sql: sql.to_string(),
            dry_run: false,
        };

        let submitted_at = Instant::now();
        self.api
            .submit_query(project, &spec)
            .await
            .map_err(|e| job_failed(&job_id, "submit", e))?;

        let mut state = JobState::Submitted;

        // Poll until the first completed page arrives
        let first_page = loop {
            debug!(project, job_id = %job_id, state = ?state, "checking job results");
            let page = self
                .api
                .poll_job(project, &job_id, None)
                .await
                .map_err(|e| job_failed(&job_id, "poll", e))?;

            if page.complete {
                break page;
            }

            state = JobState::Polling;
            tokio::time::sleep(self.poll_interval).await;

            let waited = submitted_at.elapsed();
            if waited >= self.poll_timeout {
                warn!(
                    project,
                    job_id = %job_id,
                    waited_secs = waited.as_secs(),
                    "gave up waiting for job"
                );
                return Err(ProbeError::Timeout {
                    job_id,
                    waited_secs: waited.as_secs(),
                });
            }
        };
        debug!(project, job_id = %job_id, state = ?JobState::Complete, "first page received");

        // Paginate: fetch at explicit offsets until the total is reached
        let total_rows = first_page.total_rows.unwrap_or(first_page.rows.len() as u64);
        let mut rows = first_page.rows;
        while (rows.len() as u64) < total_rows {
            let page = self
                .api
                .poll_job(project, &job_id, Some(rows.len() as u64))
                .await
                .map_err(|e| job_failed(&job_id, "paginate", e))?;

            if page.rows.is_empty() {
                // A short page here would loop forever
                return Err(ProbeError::JobFailed {
                    job_id,
                    message: format!(
                        "results ended at {} of {} rows",
                        rows.len(),
                        total_rows
                    ),
                });
            }
            rows.extend(page.rows);
        }

        debug!(project, job_id = %job_id, rows = rows.len(), "job complete");
        Ok(rows)
    }

    /// Submit a dry run and return its cost estimate
    ///
    /// Dry runs never enter the poll loop: the estimate arrives on the
    /// submission acknowledgement.
    pub async fn dry_run(&self, project: &str, sql: &str) -> Result<DryRunStats, ProbeError> {
        let job_id = Uuid::new_v4().to_string();
        let spec = JobSpec {
            job_id: job_id.clone(),
            sql: sql.to_string(),
            dry_run: true,
        };

        let ack = self
            .api
            .submit_query(project, &spec)
            .await
            .map_err(|e| job_failed(&job_id, "dry-run submit", e))?;

        match ack.total_bytes_processed {
            Some(total_bytes_processed) => Ok(DryRunStats {
                total_bytes_processed,
                cache_hit: ack.cache_hit.unwrap_or(false),
            }),
            None => Err(ProbeError::JobFailed {
                job_id,
                message: "dry run returned no statistics".to_string(),
            }),
        }
    }
}

fn job_failed(job_id: &str, phase: &str, source: ProbeError) -> ProbeError {
    // Keep Timeout distinct; everything else folds into FAILED
    match source {
        ProbeError::Timeout { .. } => source,
        other => ProbeError::JobFailed {
            job_id: job_id.to_string(),
            message: format!("{phase}: {other}"),
        },
    }
}
