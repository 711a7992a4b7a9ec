//! Warehouse detection cycle

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tablewatch_config::MonitorConfig;
use tablewatch_probes::ProbeError;
use tablewatch_probes::warehouse::WarehouseProbe;
use tablewatch_protocol::{Bucket, Event, EventBuilder, Resource};
use tablewatch_state::{MAX_KEY, ResourceState, StateStore};

use crate::cycle::{CycleOutcome, CycleState};
use crate::diff;
use crate::error::MonitorError;
use crate::expand::{TablePath, expand_tables};
use crate::sender::EventSender;
use crate::validate::validate_warehouse;

/// Probing result of one cycle
enum Probed {
    Done {
        fresh: HashMap<String, i64>,
        partial: bool,
    },
    Cancelled,
}

/// Runs detection cycles for one warehouse resource
///
/// Non-partitioned tables are probed one metadata call per bucket, with
/// bounded concurrency; a `$`-partitioned table is probed with a single
/// partitions-summary query instead.
pub struct WarehouseMonitor {
    resource: Resource,
    probe: Arc<WarehouseProbe>,
    state: Arc<StateStore>,
    sender: Arc<dyn EventSender>,
    bucket_fanout: usize,
    bootstrap_from_zero: bool,
}

impl WarehouseMonitor {
    pub fn new(
        resource: Resource,
        probe: Arc<WarehouseProbe>,
        state: Arc<StateStore>,
        sender: Arc<dyn EventSender>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            resource,
            probe,
            state,
            sender,
            bucket_fanout: config.bucket_fanout.max(1),
            bootstrap_from_zero: config.bootstrap_from_zero,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Run one detection cycle
    ///
    /// # Errors
    ///
    /// Job timeouts/failures and send/state failures abort the cycle
    /// without persisting, so the next cycle re-detects the same changes.
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, MonitorError> {
        let uri = self.resource.uri.clone();

        debug!(resource = %uri, state = ?CycleState::Validating, "cycle started");
        if let Err(e) = validate_warehouse(&self.resource) {
            warn!(resource = %uri, error = %e, "broken resource, aborting cycle");
            return Ok(CycleOutcome::Aborted);
        }
        let path = match TablePath::parse(&uri) {
            Ok(path) => path,
            Err(e) => {
                warn!(resource = %uri, error = %e, "broken resource, aborting cycle");
                return Ok(CycleOutcome::Aborted);
            }
        };
        let builder = EventBuilder::new(&self.resource)?;

        debug!(resource = %uri, state = ?CycleState::Expanding, "expanding buckets");
        let buckets = match expand_tables(&self.resource, Utc::now()) {
            Ok(buckets) => buckets,
            Err(e) => {
                warn!(resource = %uri, error = %e, "expansion failed, aborting cycle");
                return Ok(CycleOutcome::Aborted);
            }
        };
        let expansion_keys: Vec<String> =
            buckets.iter().map(|b| b.key.state_key()).collect();
        let slots: HashMap<String, (Option<NaiveDate>, u32)> = buckets
            .iter()
            .map(|b| (b.key.state_key(), (b.date, b.hour)))
            .collect();

        let (floors, windowed, max) = self.prepare_floors(&expansion_keys)?;

        debug!(
            resource = %uri,
            state = ?CycleState::Probing,
            table = %path.label(),
            buckets = buckets.len(),
            "probing buckets"
        );
        let (fresh, partial) = if path.is_partitioned() {
            self.probe_partitioned(&path).await?
        } else {
            match self.probe_each(&path, &buckets, cancel).await? {
                Probed::Done { fresh, partial } => (fresh, partial),
                Probed::Cancelled => return Ok(CycleOutcome::Cancelled),
            }
        };

        debug!(resource = %uri, state = ?CycleState::Diffing, markers = fresh.len(), "diffing markers");
        let selected = diff::select_updated(&fresh, &floors);
        if selected.is_empty() {
            debug!(resource = %uri, partial, "no buckets advanced");
            return Ok(CycleOutcome::NoChange { partial });
        }

        debug!(resource = %uri, state = ?CycleState::Building, selected = selected.len(), "building events");
        let events = self.build_events(&builder, &expansion_keys, &slots, &selected);

        info!(
            resource = %uri,
            state = ?CycleState::Emitting,
            events = events.len(),
            "emitting events"
        );
        self.sender.send(&events).await?;

        debug!(resource = %uri, state = ?CycleState::Persisting, "persisting markers");
        let mut committed = windowed;
        committed.extend(fresh.iter().map(|(k, v)| (k.clone(), *v)));
        let cycle_max = fresh.values().copied().max().unwrap_or(max);
        committed.insert(MAX_KEY.to_string(), cycle_max.max(max));
        self.state.replace(&uri, committed)?;

        info!(
            resource = %uri,
            state = ?CycleState::Done,
            events = events.len(),
            partial,
            "cycle complete"
        );
        Ok(CycleOutcome::Emitted {
            events: events.len(),
            partial,
        })
    }

    /// Prior markers prepared for diffing
    ///
    /// Returns the diff floors (windowed markers with new buckets
    /// bootstrapped to the running max), the stored markers still inside
    /// the window (the prune survivors), and the running max itself.
    fn prepare_floors(
        &self,
        expansion_keys: &[String],
    ) -> Result<(HashMap<String, i64>, ResourceState, i64), MonitorError> {
        let default_max = if self.bootstrap_from_zero {
            0
        } else {
            Utc::now().timestamp_millis()
        };
        let max = self
            .state
            .get_or_init(&self.resource.uri, MAX_KEY, default_max)?;

        let mut windowed = self.state.get(&self.resource.uri);
        windowed.remove(MAX_KEY);
        let keys: HashSet<&String> = expansion_keys.iter().collect();
        windowed.retain(|key, _| keys.contains(key));

        let mut floors = windowed.clone();
        for key in expansion_keys {
            floors.entry(key.clone()).or_insert(max);
        }
        Ok((floors, windowed, max))
    }

    /// One metadata probe per bucket, with bounded fan-out
    async fn probe_each(
        &self,
        path: &TablePath,
        buckets: &[Bucket],
        cancel: &CancellationToken,
    ) -> Result<Probed, MonitorError> {
        let semaphore = Arc::new(Semaphore::new(self.bucket_fanout));
        let mut join_set: JoinSet<(String, Result<i64, ProbeError>)> = JoinSet::new();

        for bucket in buckets {
            if cancel.is_cancelled() {
                join_set.abort_all();
                info!(resource = %self.resource.uri, "cycle cancelled between probes");
                return Ok(Probed::Cancelled);
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let probe = Arc::clone(&self.probe);
            let project = path.project.clone();
            let dataset = path.dataset.clone();
            let table = bucket.key.state_key();
            join_set.spawn(async move {
                let _permit = permit;
                let result = probe.probe_one(&project, &dataset, &table).await;
                (table, result)
            });
        }

        let mut fresh = HashMap::new();
        let mut partial = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((table, Ok(marker))) => {
                    fresh.insert(table, marker);
                }
                Ok((table, Err(ProbeError::NotFound(_)))) => {
                    debug!(
                        project = %path.project,
                        dataset = %path.dataset,
                        table = %table,
                        "table does not exist"
                    );
                }
                Ok((table, Err(e))) => {
                    warn!(
                        project = %path.project,
                        dataset = %path.dataset,
                        table = %table,
                        error = %e,
                        "probe failed, skipping bucket"
                    );
                    partial = true;
                }
                Err(e) => {
                    warn!(resource = %self.resource.uri, error = %e, "probe task failed");
                    partial = true;
                }
            }
        }
        Ok(Probed::Done { fresh, partial })
    }

    /// One partitions-summary query covering the whole window
    async fn probe_partitioned(
        &self,
        path: &TablePath,
    ) -> Result<(HashMap<String, i64>, bool), MonitorError> {
        let table = path.table_without_partition();
        match self
            .probe
            .probe_partitions(
                &path.project,
                &path.dataset,
                table,
                self.resource.span_in_days,
            )
            .await
        {
            Ok(partitions) => {
                let fresh = partitions
                    .into_iter()
                    .map(|p| (format!("{table}${}", p.partition_id), p.last_modified_time))
                    .collect();
                Ok((fresh, false))
            }
            // A lost or timed-out job is fatal to this cycle
            Err(e @ (ProbeError::Timeout { .. } | ProbeError::JobFailed { .. })) => Err(e.into()),
            Err(e) => {
                warn!(
                    project = %path.project,
                    dataset = %path.dataset,
                    table = %table,
                    error = %e,
                    "partitions summary failed, skipping cycle"
                );
                Ok((HashMap::new(), true))
            }
        }
    }

    /// Events in expansion order, then any extra probed keys sorted
    fn build_events(
        &self,
        builder: &EventBuilder,
        expansion_keys: &[String],
        slots: &HashMap<String, (Option<NaiveDate>, u32)>,
        selected: &HashMap<String, i64>,
    ) -> Vec<Event> {
        let mut events = Vec::with_capacity(selected.len());
        for key in expansion_keys {
            if let Some(marker) = selected.get(key) {
                events.push(self.build_event(builder, key, *marker, slots.get(key)));
            }
        }

        let mut extras: Vec<&String> = selected
            .keys()
            .filter(|key| !slots.contains_key(*key))
            .collect();
        extras.sort();
        for key in extras {
            if let Some(marker) = selected.get(key) {
                events.push(self.build_event(builder, key, *marker, None));
            }
        }
        events
    }

    fn build_event(
        &self,
        builder: &EventBuilder,
        key: &str,
        marker: i64,
        slot: Option<&(Option<NaiveDate>, u32)>,
    ) -> Event {
        let (date, hour) = slot.copied().unwrap_or((None, 0));
        let mut payload = json!({ "table": key, "last_modified_time": marker });
        if let Some((_, partition)) = key.split_once('$') {
            payload["partition_id"] = json!(partition);
        }
        builder.build(&self.resource.unit, date, hour, payload)
    }
}
