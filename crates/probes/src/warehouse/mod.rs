//! Warehouse probe
//!
//! The columnar warehouse exposes table metadata over a REST endpoint
//! and query execution over an async job API. `WarehouseApi` is the
//! external dependency surface; [`WarehouseProbe`] turns it into the two
//! operations the monitor needs: a per-table modification marker and a
//! partitions summary.

mod http;
mod poller;

use std::sync::Arc;

use tracing::debug;

use crate::Row;
use crate::convert::{as_i64, as_str};
use crate::error::ProbeError;

pub use http::HttpWarehouseClient;
pub use poller::{DryRunStats, JobPoller};

/// Table metadata returned by the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// Fully qualified table id
    pub id: String,
    /// Creation time, milliseconds since epoch
    pub creation_time: i64,
    /// Last modification time, milliseconds since epoch
    pub last_modified_time: i64,
    /// Storage location label
    pub location: Option<String>,
    pub num_bytes: i64,
    pub num_rows: i64,
}

/// A query job to submit
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Caller-generated random job id
    pub job_id: String,
    pub sql: String,
    /// Estimate cost without running
    pub dry_run: bool,
}

/// Acknowledgement of a submitted job
///
/// Dry-run submissions carry their statistics here; regular submissions
/// leave both fields empty and are followed up via `poll_job`.
#[derive(Debug, Clone, Default)]
pub struct SubmitAck {
    pub total_bytes_processed: Option<i64>,
    pub cache_hit: Option<bool>,
}

/// One page of job results
#[derive(Debug, Clone, Default)]
pub struct ResultsPage {
    /// False while the job is still running
    pub complete: bool,
    /// Rows on this page (order-preserving across pages)
    pub rows: Vec<Row>,
    /// Total rows the job produced, once known
    pub total_rows: Option<u64>,
}

/// External dependency surface of the warehouse API
///
/// Implemented over HTTP by [`HttpWarehouseClient`]; tests substitute
/// scripted stubs.
#[async_trait::async_trait]
pub trait WarehouseApi: Send + Sync {
    /// Fetch table metadata
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing table; `Auth`/`Backend` otherwise.
    async fn get_table(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
    ) -> Result<TableMeta, ProbeError>;

    /// Submit a query job
    async fn submit_query(&self, project: &str, job: &JobSpec) -> Result<SubmitAck, ProbeError>;

    /// Fetch (a page of) results for a submitted job
    ///
    /// `start_index` selects the pagination offset; `None` asks for the
    /// first page and doubles as the completion check.
    async fn poll_job(
        &self,
        project: &str,
        job_id: &str,
        start_index: Option<u64>,
    ) -> Result<ResultsPage, ProbeError>;
}

/// One partition row from the partitions summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub partition_id: String,
    /// Milliseconds since epoch
    pub creation_time: i64,
    /// Milliseconds since epoch
    pub last_modified_time: i64,
}

/// Probes warehouse tables for modification markers
pub struct WarehouseProbe {
    api: Arc<dyn WarehouseApi>,
    poller: JobPoller,
}

impl WarehouseProbe {
    pub fn new(api: Arc<dyn WarehouseApi>, poller: JobPoller) -> Self {
        Self { api, poller }
    }

    /// Last-modified marker (ms since epoch) for one table
    ///
    /// # Errors
    ///
    /// `NotFound` when the table does not exist; any other error is a
    /// transient backend failure the caller should log and skip.
    pub async fn probe_one(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
    ) -> Result<i64, ProbeError> {
        let meta = self.api.get_table(project, dataset, table).await?;
        debug!(
            project,
            dataset,
            table,
            last_modified_time = meta.last_modified_time,
            "probed table"
        );
        Ok(meta.last_modified_time)
    }

    /// Partition markers for a partitioned table
    ///
    /// Issues one partitions-summary query instead of per-partition
    /// metadata calls. `limit` bounds the rows to the lookback window.
    pub async fn probe_partitions(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
        limit: u32,
    ) -> Result<Vec<PartitionInfo>, ProbeError> {
        let sql = partitions_summary_sql(project, dataset, table, limit);
        let rows = self.poller.run_query(project, &sql).await?;

        let mut partitions = Vec::with_capacity(rows.len());
        for row in &rows {
            partitions.push(parse_partition_row(row).ok_or_else(|| ProbeError::Backend {
                context: format!("{project}:{dataset}.{table}"),
                status: None,
                message: format!("unexpected partitions-summary row: {row:?}"),
            })?);
        }
        debug!(
            project,
            dataset,
            table,
            partitions = partitions.len(),
            "probed partitions summary"
        );
        Ok(partitions)
    }

    /// Estimate the cost of a query without running it
    pub async fn estimate_query(
        &self,
        project: &str,
        sql: &str,
    ) -> Result<DryRunStats, ProbeError> {
        self.poller.dry_run(project, sql).await
    }
}

/// SQL against the table's partitions-summary pseudo-table
fn partitions_summary_sql(project: &str, dataset: &str, table: &str, limit: u32) -> String {
    format!(
        "SELECT partition_id, creation_time, last_modified_time \
         FROM [{project}:{dataset}.{table}$__PARTITIONS_SUMMARY__] \
         LIMIT {limit}"
    )
}

fn parse_partition_row(row: &Row) -> Option<PartitionInfo> {
    if row.len() < 3 {
        return None;
    }
    Some(PartitionInfo {
        partition_id: as_str(&row[0])?.to_string(),
        creation_time: as_i64(&row[1])?,
        last_modified_time: as_i64(&row[2])?,
    })
}

#[cfg(test)]
#[path = "warehouse_test.rs"]
mod warehouse_test;
