//! Tests for the warehouse probe and job poller

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use super::*;
use crate::error::ProbeError;

/// Scripted stand-in for the warehouse API
#[derive(Default)]
struct ScriptedApi {
    /// table name -> last_modified_time
    tables: HashMap<String, i64>,
    /// tables that answer with a 500-class failure
    failing_tables: HashSet<String>,
    /// poll_job responses, consumed front to back; empty = still running
    pages: Mutex<VecDeque<ResultsPage>>,
    /// recorded poll offsets
    poll_offsets: Mutex<Vec<Option<u64>>>,
    /// recorded submissions
    submits: Mutex<Vec<JobSpec>>,
    /// dry-run statistics to acknowledge with
    ack: SubmitAck,
}

impl ScriptedApi {
    fn with_table(mut self, table: &str, last_modified: i64) -> Self {
        self.tables.insert(table.to_string(), last_modified);
        self
    }

    fn with_failing_table(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.to_string());
        self
    }

    fn with_pages(self, pages: Vec<ResultsPage>) -> Self {
        *self.pages.lock() = pages.into();
        self
    }
}

#[async_trait::async_trait]
impl WarehouseApi for ScriptedApi {
    async fn get_table(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
    ) -> Result<TableMeta, ProbeError> {
        let context = format!("{project}:{dataset}.{table}");
        if self.failing_tables.contains(table) {
            return Err(ProbeError::Backend {
                context,
                status: Some(500),
                message: "internal".into(),
            });
        }
        match self.tables.get(table) {
            Some(&last_modified_time) => Ok(TableMeta {
                id: context,
                creation_time: 1,
                last_modified_time,
                location: Some("US".into()),
                num_bytes: 10,
                num_rows: 5,
            }),
            None => Err(ProbeError::NotFound(context)),
        }
    }

    async fn submit_query(&self, _project: &str, job: &JobSpec) -> Result<SubmitAck, ProbeError> {
        self.submits.lock().push(job.clone());
        Ok(self.ack.clone())
    }

    async fn poll_job(
        &self,
        _project: &str,
        _job_id: &str,
        start_index: Option<u64>,
    ) -> Result<ResultsPage, ProbeError> {
        self.poll_offsets.lock().push(start_index);
        match self.pages.lock().pop_front() {
            Some(page) => Ok(page),
            None => Ok(ResultsPage {
                complete: false,
                ..Default::default()
            }),
        }
    }
}

fn poller(api: Arc<ScriptedApi>) -> JobPoller {
    let config = tablewatch_config::WarehouseConfig::default();
    JobPoller::new(api, &config).with_timing(Duration::from_secs(3), Duration::from_secs(10))
}

fn row(n: u64) -> crate::Row {
    vec![json!(n)]
}

fn page(complete: bool, total: Option<u64>, rows: Vec<crate::Row>) -> ResultsPage {
    ResultsPage {
        complete,
        rows,
        total_rows: total,
    }
}

// =============================================================================
// Job poller tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_poller_paginates_in_order() {
    let api = Arc::new(ScriptedApi::default().with_pages(vec![
        page(false, None, vec![]),
        page(false, None, vec![]),
        page(true, Some(5), vec![row(0), row(1), row(2)]),
        page(true, Some(5), vec![row(3), row(4)]),
    ]));
    let rows = poller(Arc::clone(&api))
        .run_query("proj", "SELECT 1")
        .await
        .unwrap();

    assert_eq!(rows, vec![row(0), row(1), row(2), row(3), row(4)]);

    // Pagination fetched exactly once, at the offset of rows accumulated
    let offsets = api.poll_offsets.lock().clone();
    assert_eq!(offsets, vec![None, None, None, Some(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_poller_single_complete_page() {
    let api = Arc::new(
        ScriptedApi::default().with_pages(vec![page(true, Some(2), vec![row(0), row(1)])]),
    );
    let rows = poller(api).run_query("proj", "SELECT 1").await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poller_times_out_past_hard_ceiling() {
    // No scripted pages: every poll reports "still running"
    let api = Arc::new(ScriptedApi::default());
    let result = poller(api).run_query("proj", "SELECT 1").await;

    assert!(matches!(result, Err(ProbeError::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_poller_short_page_is_failure_not_loop() {
    let api = Arc::new(ScriptedApi::default().with_pages(vec![
        page(true, Some(5), vec![row(0), row(1)]),
        page(true, Some(5), vec![]),
    ]));
    let result = poller(api).run_query("proj", "SELECT 1").await;

    assert!(matches!(result, Err(ProbeError::JobFailed { .. })));
}

#[tokio::test]
async fn test_dry_run_short_circuits() {
    let api = Arc::new(ScriptedApi {
        ack: SubmitAck {
            total_bytes_processed: Some(15_817_422),
            cache_hit: Some(true),
        },
        ..Default::default()
    });
    let stats = poller(Arc::clone(&api))
        .dry_run("proj", "SELECT 1")
        .await
        .unwrap();

    assert_eq!(stats.total_bytes_processed, 15_817_422);
    assert!(stats.cache_hit);
    // Never entered the poll loop
    assert!(api.poll_offsets.lock().is_empty());

    let submits = api.submits.lock();
    assert_eq!(submits.len(), 1);
    assert!(submits[0].dry_run);
}

#[tokio::test]
async fn test_job_ids_are_fresh_per_submission() {
    let api = Arc::new(
        ScriptedApi::default().with_pages(vec![page(true, Some(0), vec![]), page(true, Some(0), vec![])]),
    );
    let p = poller(Arc::clone(&api));
    p.run_query("proj", "SELECT 1").await.unwrap();
    p.run_query("proj", "SELECT 1").await.unwrap();

    let submits = api.submits.lock();
    assert_ne!(submits[0].job_id, submits[1].job_id);
}

// =============================================================================
// Probe tests
// =============================================================================

fn probe(api: Arc<ScriptedApi>) -> WarehouseProbe {
    let p = poller(Arc::clone(&api));
    WarehouseProbe::new(api, p)
}

#[tokio::test]
async fn test_probe_one_returns_marker() {
    let api = Arc::new(ScriptedApi::default().with_table("logs_20170306", 1_488_750_000_000));
    let marker = probe(api)
        .probe_one("proj", "dataset", "logs_20170306")
        .await
        .unwrap();
    assert_eq!(marker, 1_488_750_000_000);
}

#[tokio::test]
async fn test_probe_one_missing_table_is_not_found() {
    let api = Arc::new(ScriptedApi::default());
    let result = probe(api).probe_one("proj", "dataset", "absent").await;
    assert!(matches!(result, Err(ProbeError::NotFound(_))));
}

#[tokio::test]
async fn test_probe_one_backend_failure_surfaces() {
    let api = Arc::new(ScriptedApi::default().with_failing_table("flaky"));
    let result = probe(api).probe_one("proj", "dataset", "flaky").await;
    assert!(matches!(
        result,
        Err(ProbeError::Backend {
            status: Some(500),
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_probe_partitions_coerces_rows() {
    let api = Arc::new(ScriptedApi::default().with_pages(vec![page(
        true,
        Some(2),
        vec![
            vec![json!("20170307"), json!("1488800000000"), json!("1488844800000")],
            vec![json!("20170306"), json!("1488700000000"), json!("1488758400000")],
        ],
    )]));
    let partitions = probe(api)
        .probe_partitions("proj", "dataset", "logs", 2)
        .await
        .unwrap();

    assert_eq!(partitions.len(), 2);
    assert_eq!(partitions[0].partition_id, "20170307");
    assert_eq!(partitions[0].last_modified_time, 1_488_844_800_000);
    assert_eq!(partitions[1].partition_id, "20170306");
}

#[tokio::test(start_paused = true)]
async fn test_probe_partitions_rejects_bad_rows() {
    let api = Arc::new(
        ScriptedApi::default()
            .with_pages(vec![page(true, Some(1), vec![vec![json!(null)]])]),
    );
    let result = probe(api).probe_partitions("proj", "dataset", "logs", 2).await;
    assert!(matches!(result, Err(ProbeError::Backend { .. })));
}

#[test]
fn test_partitions_summary_sql_shape() {
    let sql = partitions_summary_sql("proj", "dataset", "logs", 32);
    assert_eq!(
        sql,
        "SELECT partition_id, creation_time, last_modified_time \
         FROM [proj:dataset.logs$__PARTITIONS_SUMMARY__] LIMIT 32"
    );
}
