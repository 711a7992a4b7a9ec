//! End-to-end warehouse detection cycles against scripted backends

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use tablewatch_config::{MonitorConfig, WarehouseConfig};
use tablewatch_monitor::{
    CycleOutcome, EventSender, Monitor, SendError, WarehouseMonitor, expand_tables, run_cycles,
};
use tablewatch_probes::ProbeError;
use tablewatch_probes::warehouse::{
    JobPoller, JobSpec, ResultsPage, SubmitAck, TableMeta, WarehouseApi, WarehouseProbe,
};
use tablewatch_protocol::{Event, Resource};
use tablewatch_state::{MAX_KEY, StateStore};

// =============================================================================
// Scripted collaborators
// =============================================================================

#[derive(Default)]
struct StubApi {
    /// table name -> marker; consulted first
    tables: Mutex<HashMap<String, i64>>,
    /// marker returned for any table not otherwise scripted
    default_marker: Option<i64>,
    /// tables that answer with a 500
    failing: HashSet<String>,
    /// responses for partitions-summary jobs
    pages: Mutex<VecDeque<ResultsPage>>,
}

#[async_trait::async_trait]
impl WarehouseApi for StubApi {
    async fn get_table(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
    ) -> Result<TableMeta, ProbeError> {
        let context = format!("{project}:{dataset}.{table}");
        if self.failing.contains(table) {
            return Err(ProbeError::Backend {
                context,
                status: Some(500),
                message: "internal".into(),
            });
        }
        let marker = self
            .tables
            .lock()
            .get(table)
            .copied()
            .or(self.default_marker);
        match marker {
            Some(last_modified_time) => Ok(TableMeta {
                id: context,
                creation_time: 1,
                last_modified_time,
                location: None,
                num_bytes: 0,
                num_rows: 0,
            }),
            None => Err(ProbeError::NotFound(context)),
        }
    }

    async fn submit_query(&self, _project: &str, _job: &JobSpec) -> Result<SubmitAck, ProbeError> {
        Ok(SubmitAck::default())
    }

    async fn poll_job(
        &self,
        _project: &str,
        _job_id: &str,
        _start_index: Option<u64>,
    ) -> Result<ResultsPage, ProbeError> {
        match self.pages.lock().pop_front() {
            Some(page) => Ok(page),
            None => Ok(ResultsPage {
                complete: true,
                rows: vec![],
                total_rows: Some(0),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSender {
    batches: Mutex<Vec<Vec<Event>>>,
    fail: AtomicBool,
}

#[async_trait::async_trait]
impl EventSender for RecordingSender {
    async fn send(&self, events: &[Event]) -> Result<(), SendError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(SendError("bus unavailable".into()));
        }
        self.batches.lock().push(events.to_vec());
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn resource(table_template: &str, unit: &str) -> Resource {
    Resource {
        uri: format!("https://warehouse.example.com/table/proj:dataset.{table_template}"),
        unit: unit.to_string(),
        timezone: "+09:00".to_string(),
        span_in_days: 2,
    }
}

fn monitor_config(dir: &tempfile::TempDir) -> MonitorConfig {
    MonitorConfig {
        status_file: dir.path().join("status.json"),
        bootstrap_from_zero: true,
        ..Default::default()
    }
}

struct Fixture {
    monitor: WarehouseMonitor,
    sender: Arc<RecordingSender>,
    state: Arc<StateStore>,
    api: Arc<StubApi>,
    _dir: tempfile::TempDir,
}

fn fixture(resource: Resource, api: StubApi, config_tweak: impl FnOnce(&mut MonitorConfig)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = monitor_config(&dir);
    config_tweak(&mut config);

    let api = Arc::new(api);
    let api_dyn: Arc<dyn WarehouseApi> = Arc::clone(&api) as Arc<dyn WarehouseApi>;
    let poller = JobPoller::new(Arc::clone(&api_dyn), &WarehouseConfig::default());
    let probe = Arc::new(WarehouseProbe::new(api_dyn, poller));
    let state = Arc::new(StateStore::open(&config.status_file).unwrap());
    let sender = Arc::new(RecordingSender::default());

    let monitor = WarehouseMonitor::new(
        resource,
        probe,
        Arc::clone(&state),
        Arc::clone(&sender) as Arc<dyn EventSender>,
        &config,
    );
    Fixture {
        monitor,
        sender,
        state,
        api,
        _dir: dir,
    }
}

/// Bucket names the expander produces for this resource right now
fn bucket_names(resource: &Resource) -> Vec<String> {
    expand_tables(resource, Utc::now())
        .unwrap()
        .into_iter()
        .map(|b| b.key.state_key())
        .collect()
}

// =============================================================================
// Daily cycles
// =============================================================================

#[tokio::test]
async fn test_daily_cycle_emits_and_persists() {
    let resource = resource("t_%Y%m%d", "daily");
    let names = bucket_names(&resource);
    assert_eq!(names.len(), 2);

    let api = StubApi::default();
    api.tables.lock().insert(names[0].clone(), 200);
    api.tables.lock().insert(names[1].clone(), 100);
    let f = fixture(resource.clone(), api, |_| {});

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 2,
            partial: false
        }
    );

    // One batch of two events, expansion order (most recent date first)
    let batches = f.sender.batches.lock().clone();
    assert_eq!(batches.len(), 1);
    let events = &batches[0];
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].resource_uri, resource.uri);
    assert_eq!(events[0].resource_unit, "daily");
    assert_eq!(events[0].resource_timezone, "+09:00");
    assert_eq!(events[0].payload["table"], json!(names[0]));
    assert_eq!(events[0].payload["last_modified_time"], json!(200));
    assert_eq!(events[1].payload["table"], json!(names[1]));
    assert!(events[0].resource_time > 0);
    assert_ne!(events[0].uuid, events[1].uuid);

    // Persisted: both markers plus the folded max
    let persisted = f.state.get(&resource.uri);
    assert_eq!(persisted.get(&names[0]), Some(&200));
    assert_eq!(persisted.get(&names[1]), Some(&100));
    assert_eq!(persisted.get(MAX_KEY), Some(&200));

    // Identical markers next cycle: nothing advances, state untouched
    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, CycleOutcome::NoChange { partial: false });
    assert_eq!(f.sender.batches.lock().len(), 1);
    assert_eq!(f.state.get(&resource.uri), persisted);
}

#[tokio::test]
async fn test_advanced_marker_emits_again() {
    let resource = resource("t_%Y%m%d", "daily");
    let names = bucket_names(&resource);

    let api = StubApi::default();
    api.tables.lock().insert(names[0].clone(), 100);
    let f = fixture(resource.clone(), api, |_| {});
    f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();

    // Backend touched the table: marker advances past the stored one
    f.api.tables.lock().insert(names[0].clone(), 150);

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 1,
            partial: false
        }
    );
    assert_eq!(f.state.get(&resource.uri).get(&names[0]), Some(&150));
}

#[tokio::test]
async fn test_missing_tables_are_skipped_quietly() {
    let resource = resource("t_%Y%m%d", "daily");
    let names = bucket_names(&resource);

    // Only the most recent table exists
    let api = StubApi::default();
    api.tables.lock().insert(names[0].clone(), 100);
    let f = fixture(resource.clone(), api, |_| {});

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 1,
            partial: false
        }
    );
    let persisted = f.state.get(&resource.uri);
    assert_eq!(persisted.get(&names[1]), None);
}

#[tokio::test]
async fn test_backend_failure_is_partial() {
    let resource = resource("t_%Y%m%d", "daily");
    let names = bucket_names(&resource);

    let mut api = StubApi::default();
    api.tables.lock().insert(names[0].clone(), 100);
    api.failing.insert(names[1].clone());
    let f = fixture(resource.clone(), api, |_| {});

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 1,
            partial: true
        }
    );
}

#[tokio::test]
async fn test_send_failure_skips_persistence() {
    let resource = resource("t_%Y%m%d", "daily");
    let names = bucket_names(&resource);

    let api = StubApi::default();
    api.tables.lock().insert(names[0].clone(), 200);
    api.tables.lock().insert(names[1].clone(), 100);
    let f = fixture(resource.clone(), api, |_| {});

    f.sender.fail.store(true, Ordering::Relaxed);
    let result = f.monitor.run_cycle(&CancellationToken::new()).await;
    assert!(result.is_err());

    // No bucket markers were persisted
    let persisted = f.state.get(&resource.uri);
    assert_eq!(persisted.get(&names[0]), None);
    assert_eq!(persisted.get(&names[1]), None);

    // Recovery: the same changes are re-detected and delivered
    f.sender.fail.store(false, Ordering::Relaxed);
    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 2,
            partial: false
        }
    );
}

#[tokio::test]
async fn test_first_run_without_debug_bootstraps_to_now() {
    let resource = resource("t_%Y%m%d", "daily");
    let names = bucket_names(&resource);

    // Markers far in the past: below the bootstrapped "now" floor
    let api = StubApi::default();
    api.tables.lock().insert(names[0].clone(), 200);
    let f = fixture(resource.clone(), api, |config| {
        config.bootstrap_from_zero = false;
    });

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, CycleOutcome::NoChange { partial: false });
    assert!(f.state.get(&resource.uri).get(MAX_KEY).copied().unwrap() > 200);
}

// =============================================================================
// Hourly cycle
// =============================================================================

#[tokio::test]
async fn test_hourly_cycle_covers_every_hour() {
    let mut resource = resource("t_%H_%Y%m%d", "hourly");
    resource.span_in_days = 1;

    let api = StubApi {
        default_marker: Some(100),
        ..Default::default()
    };
    let f = fixture(resource.clone(), api, |_| {});

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 24,
            partial: false
        }
    );
    let events = f.sender.batches.lock()[0].clone();
    assert!(events.iter().all(|e| e.resource_unit == "hourly"));
}

// =============================================================================
// Partitioned path
// =============================================================================

fn summary_page(rows: Vec<(&str, i64, i64)>) -> ResultsPage {
    ResultsPage {
        complete: true,
        total_rows: Some(rows.len() as u64),
        rows: rows
            .into_iter()
            .map(|(id, created, modified)| {
                vec![json!(id), json!(created.to_string()), json!(modified.to_string())]
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_partitioned_cycle_uses_summary_query() {
    let resource = resource("logs$%Y%m%d", "daily");

    let api = StubApi::default();
    api.pages.lock().push_back(summary_page(vec![
        ("20170307", 1, 200),
        ("20170306", 1, 100),
    ]));
    let f = fixture(resource.clone(), api, |_| {});

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Emitted {
            events: 2,
            partial: false
        }
    );

    let events = f.sender.batches.lock()[0].clone();
    let tables: Vec<_> = events
        .iter()
        .map(|e| e.payload["table"].as_str().unwrap().to_string())
        .collect();
    assert!(tables.contains(&"logs$20170306".to_string()));
    assert!(tables.contains(&"logs$20170307".to_string()));
    assert!(events
        .iter()
        .all(|e| e.payload["partition_id"].is_string()));

    let persisted = f.state.get(&resource.uri);
    assert_eq!(persisted.get("logs$20170307"), Some(&200));
    assert_eq!(persisted.get(MAX_KEY), Some(&200));
}

// =============================================================================
// Validation, cancellation, isolation
// =============================================================================

#[tokio::test]
async fn test_invalid_resource_aborts_without_probing() {
    let resource = resource("t_%H_%Y%m%d", "daily,hourly");
    let f = fixture(resource.clone(), StubApi::default(), |_| {});

    let outcome = f.monitor.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Aborted);
    assert!(f.sender.batches.lock().is_empty());
    assert!(f.state.get(&resource.uri).is_empty());
}

#[tokio::test]
async fn test_cancelled_cycle_stops_before_emitting() {
    let resource = resource("t_%Y%m%d", "daily");
    let api = StubApi {
        default_marker: Some(100),
        ..Default::default()
    };
    let f = fixture(resource, api, |_| {});

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = f.monitor.run_cycle(&cancel).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert!(f.sender.batches.lock().is_empty());
}

#[tokio::test]
async fn test_run_cycles_isolates_resources() {
    let good = resource("t_%Y%m%d", "daily");
    let api = StubApi {
        default_marker: Some(100),
        ..Default::default()
    };
    let good_fixture = fixture(good.clone(), api, |_| {});

    let bad = resource("t_%Y%m%d", "daily,hourly");
    let bad_fixture = fixture(bad.clone(), StubApi::default(), |_| {});

    let monitors: Vec<Arc<dyn Monitor>> = vec![
        Arc::new(good_fixture.monitor),
        Arc::new(bad_fixture.monitor),
    ];
    let reports = run_cycles(monitors, 2, &CancellationToken::new()).await;
    assert_eq!(reports.len(), 2);

    let by_uri: HashMap<_, _> = reports
        .iter()
        .map(|r| (r.resource_uri.clone(), &r.outcome))
        .collect();
    assert!(matches!(
        by_uri[&good.uri],
        Ok(CycleOutcome::Emitted { events: 2, .. })
    ));
    assert!(matches!(by_uri[&bad.uri], Ok(CycleOutcome::Aborted)));
}
