//! Resource expansion
//!
//! Turns a resource descriptor into the ordered set of concrete buckets
//! to probe for its lookback window, deterministically for a given "now".

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use tablewatch_protocol::{Bucket, BucketKey, Resource, ResourceError, Unit};

/// Seconds subtracted per step when walking the lookback window.
///
/// Deliberately 86000, not 86400: each step lands 400 seconds short of a
/// full day, so over long spans the walk drifts into the previous date
/// slightly early. Changing this alters which calendar dates get probed
/// for large spans and would shift persisted bucket keys.
pub const DAY_BACKSTEP_SECS: i64 = 86_000;

/// Errors raised during expansion
#[derive(Debug, Error)]
pub enum ExpandError {
    /// URI path did not end in project:dataset.table
    #[error("URI '{0}' has no project:dataset.table path")]
    BadTablePath(String),

    /// Table template is not valid strftime
    #[error("invalid table template '{0}'")]
    BadTemplate(String),

    /// Resource fields failed to parse
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Warehouse table coordinates parsed from a resource URI
///
/// The URI's last path segment carries `project:dataset.table`; the
/// table part is a strftime template and may embed a `$` partition
/// marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePath {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TablePath {
    /// Parse the last URI path segment
    ///
    /// # Errors
    ///
    /// Returns `BadTablePath` when the segment is not
    /// `project:dataset.table`.
    pub fn parse(uri: &str) -> Result<Self, ExpandError> {
        let bad = || ExpandError::BadTablePath(uri.to_string());

        let segment = uri.rsplit('/').next().ok_or_else(bad)?;
        let (project, rest) = segment.split_once(':').ok_or_else(bad)?;
        let (dataset, table) = rest.rsplit_once('.').ok_or_else(bad)?;
        if project.is_empty() || dataset.is_empty() || table.is_empty() {
            return Err(bad());
        }

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// True when the table template embeds a partition marker
    pub fn is_partitioned(&self) -> bool {
        self.table.contains('$')
    }

    /// Table name with the partition suffix stripped
    pub fn table_without_partition(&self) -> &str {
        self.table.split('$').next().unwrap_or(&self.table)
    }

    /// Log-friendly identifier
    pub fn label(&self) -> String {
        format!("{}:{}.{}", self.project, self.dataset, self.table)
    }
}

/// Dates covered by the lookback window, most recent first
pub fn probe_dates(resource: &Resource, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, ExpandError> {
    let offset = resource.offset()?;
    let local_now = now.with_timezone(&offset);
    Ok((0..i64::from(resource.span_in_days))
        .map(|i| (local_now - Duration::seconds(i * DAY_BACKSTEP_SECS)).date_naive())
        .collect())
}

/// Expand a warehouse resource into its probe buckets
///
/// Iteration runs most-recent-first; when two rendered names collide the
/// first (most recent) date/hour pair is kept.
pub fn expand_tables(resource: &Resource, now: DateTime<Utc>) -> Result<Vec<Bucket>, ExpandError> {
    let units = resource.units()?;
    let path = TablePath::parse(&resource.uri)?;
    let template = &path.table;

    let Some(unit) = units.single() else {
        // Warehouse validation rejects combinations before expansion
        return Err(ExpandError::BadTemplate(resource.unit.clone()));
    };

    let mut seen = HashSet::new();
    let mut buckets = Vec::new();
    match unit {
        Unit::Singular => {
            buckets.push(Bucket::dateless(BucketKey::table(template.clone())));
        }
        Unit::Daily => {
            for date in probe_dates(resource, now)? {
                let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
                let name = render_template(template, &naive)?;
                if seen.insert(name.clone()) {
                    buckets.push(Bucket::new(BucketKey::table(name), Some(date), 0));
                }
            }
        }
        Unit::Hourly => {
            for date in probe_dates(resource, now)? {
                for hour in 0..24 {
                    let naive = date.and_hms_opt(hour, 0, 0).unwrap_or_default();
                    let name = render_template(template, &naive)?;
                    if seen.insert(name.clone()) {
                        buckets.push(Bucket::new(BucketKey::table(name), Some(date), hour));
                    }
                }
            }
        }
    }
    Ok(buckets)
}

/// Render a strftime template against a date-time
fn render_template(template: &str, at: &NaiveDateTime) -> Result<String, ExpandError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ExpandError::BadTemplate(template.to_string()));
    }

    let mut rendered = String::with_capacity(template.len() + 8);
    write!(rendered, "{}", at.format_with_items(items.into_iter()))
        .map_err(|_| ExpandError::BadTemplate(template.to_string()))?;
    Ok(rendered)
}
