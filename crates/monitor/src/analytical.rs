//! Analytical-db detection cycle
//!
//! One aggregate query per requested unit; the backend filters to
//! buckets above the persisted floor, so the query result is already
//! the diff. When hourly and daily are both requested, daily events are
//! derived from the hourly rows without a second query.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tablewatch_config::MonitorConfig;
use tablewatch_probes::ProbeError;
use tablewatch_probes::analytical::{AnalyticalDbProbe, AnalyticalTarget, SlotMarker};
use tablewatch_protocol::{Event, EventBuilder, Resource, Unit};
use tablewatch_state::{ResourceState, StateStore};

use crate::cycle::{CycleOutcome, CycleState};
use crate::error::MonitorError;
use crate::expand::probe_dates;
use crate::sender::EventSender;
use crate::validate::validate_analytical;

/// Floor key for date-driven units (hourly/daily share one floor)
const PERIODIC_FLOOR_KEY: &str = "periodic_last_epoch";

/// Floor key for the singular unit
const SINGULAR_FLOOR_KEY: &str = "singular_last_epoch";

/// Runs detection cycles for one analytical-db resource
pub struct AnalyticalMonitor {
    resource: Resource,
    probe: Arc<AnalyticalDbProbe>,
    state: Arc<StateStore>,
    sender: Arc<dyn EventSender>,
    bootstrap_from_zero: bool,
}

impl AnalyticalMonitor {
    pub fn new(
        resource: Resource,
        probe: Arc<AnalyticalDbProbe>,
        state: Arc<StateStore>,
        sender: Arc<dyn EventSender>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            resource,
            probe,
            state,
            sender,
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
    /// Send and state failures abort the cycle without persisting;
    /// query rejections and db timeouts degrade to an empty result.
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, MonitorError> {
        let uri = self.resource.uri.clone();

        debug!(resource = %uri, state = ?CycleState::Validating, "cycle started");
        if let Err(e) = validate_analytical(&self.resource) {
            warn!(resource = %uri, error = %e, "broken resource, aborting cycle");
            return Ok(CycleOutcome::Aborted);
        }
        let target = match AnalyticalTarget::parse(&uri) {
            Ok(target) => target,
            Err(e) => {
                warn!(resource = %uri, error = %e, "broken resource, aborting cycle");
                return Ok(CycleOutcome::Aborted);
            }
        };
        let builder = EventBuilder::new(&self.resource)?;
        let units = self.resource.units()?;

        debug!(resource = %uri, state = ?CycleState::Expanding, "computing probe dates");
        let dates = match probe_dates(&self.resource, Utc::now()) {
            Ok(dates) => dates,
            Err(e) => {
                warn!(resource = %uri, error = %e, "expansion failed, aborting cycle");
                return Ok(CycleOutcome::Aborted);
            }
        };

        let mut events: Vec<Event> = Vec::new();
        let mut floor_updates = ResourceState::new();
        let mut partial = false;

        if units.is_periodic() {
            if cancel.is_cancelled() {
                info!(resource = %uri, "cycle cancelled between probes");
                return Ok(CycleOutcome::Cancelled);
            }
            let floor = self.floor(PERIODIC_FLOOR_KEY).await?;
            debug!(
                resource = %uri,
                state = ?CycleState::Probing,
                table = %target.label(),
                floor,
                "running periodic query"
            );

            if units.hourly() {
                match self.probe.fetch_hourly(&target, &dates, floor).await {
                    Ok(markers) => {
                        for m in &markers {
                            events.push(build_slot_event(&builder, Unit::Hourly, m));
                        }
                        if units.daily() {
                            for event in derive_daily_events(&builder, &markers) {
                                events.push(event);
                            }
                        }
                        if let Some(new_floor) = markers.iter().map(|m| m.epoch).max() {
                            floor_updates.insert(PERIODIC_FLOOR_KEY.to_string(), new_floor);
                        }
                    }
                    Err(e) => partial = degrade(&uri, &target, e)?,
                }
            } else {
                match self.probe.fetch_daily(&target, &dates, floor).await {
                    Ok(markers) => {
                        for m in &markers {
                            events.push(build_slot_event(&builder, Unit::Daily, m));
                        }
                        if let Some(new_floor) = markers.iter().map(|m| m.epoch).max() {
                            floor_updates.insert(PERIODIC_FLOOR_KEY.to_string(), new_floor);
                        }
                    }
                    Err(e) => partial = degrade(&uri, &target, e)?,
                }
            }
        }

        if units.singular() {
            if cancel.is_cancelled() {
                info!(resource = %uri, "cycle cancelled between probes");
                return Ok(CycleOutcome::Cancelled);
            }
            let floor = self.floor(SINGULAR_FLOOR_KEY).await?;
            debug!(
                resource = %uri,
                state = ?CycleState::Probing,
                table = %target.label(),
                floor,
                "running singular query"
            );

            match self.probe.fetch_singular(&target, floor).await {
                Ok(Some(epoch)) => {
                    events.push(builder.build(
                        Unit::Singular.as_str(),
                        None,
                        0,
                        json!({ "epoch": epoch }),
                    ));
                    floor_updates.insert(SINGULAR_FLOOR_KEY.to_string(), epoch);
                }
                Ok(None) => {}
                Err(e) => partial = degrade(&uri, &target, e)?,
            }
        }

        if events.is_empty() {
            debug!(resource = %uri, partial, "no buckets advanced");
            return Ok(CycleOutcome::NoChange { partial });
        }

        info!(
            resource = %uri,
            state = ?CycleState::Emitting,
            events = events.len(),
            "emitting events"
        );
        self.sender.send(&events).await?;

        debug!(resource = %uri, state = ?CycleState::Persisting, "persisting floors");
        self.state.merge(&uri, &floor_updates)?;

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

    /// Current floor for a unit, bootstrapping on first sight
    ///
    /// The first run initializes to the backend's current epoch (or 0 in
    /// debug runs), so deploying the agent does not replay all history.
    async fn floor(&self, key: &str) -> Result<i64, MonitorError> {
        if let Some(value) = self.state.get(&self.resource.uri).get(key) {
            return Ok(*value);
        }
        let default = if self.bootstrap_from_zero {
            0
        } else {
            self.probe.current_epoch().await?
        };
        Ok(self.state.get_or_init(&self.resource.uri, key, default)?)
    }
}

/// Treat query rejections and db timeouts as an empty result
fn degrade(uri: &str, target: &AnalyticalTarget, error: ProbeError) -> Result<bool, MonitorError> {
    match error {
        ProbeError::Query(_) | ProbeError::DbTimeout(_) => {
            warn!(resource = %uri, table = %target.label(), error = %error, "query failed, skipping");
            Ok(true)
        }
        other => Err(other.into()),
    }
}

fn build_slot_event(builder: &EventBuilder, unit: Unit, marker: &SlotMarker) -> Event {
    builder.build(
        unit.as_str(),
        Some(marker.date),
        marker.hour,
        json!({
            "d": marker.date.format("%Y-%m-%d").to_string(),
            "h": marker.hour,
            "epoch": marker.epoch,
        }),
    )
}

/// Daily events folded from hourly rows (max epoch per date)
fn derive_daily_events(builder: &EventBuilder, markers: &[SlotMarker]) -> Vec<Event> {
    let mut max_epoch_of: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for m in markers {
        let entry = max_epoch_of.entry(m.date).or_insert(0);
        *entry = (*entry).max(m.epoch);
    }
    max_epoch_of
        .into_iter()
        .map(|(date, epoch)| {
            builder.build(
                Unit::Daily.as_str(),
                Some(date),
                0,
                json!({
                    "d": date.format("%Y-%m-%d").to_string(),
                    "h": 0,
                    "epoch": epoch,
                }),
            )
        })
        .collect()
}
