//! Analytical-db probe
//!
//! The analytical backend keeps a monotonically increasing `epoch`
//! counter per row. Change detection runs one aggregate query per unit,
//! grouped into date/hour buckets and filtered server-side to buckets
//! whose max epoch exceeds the persisted floor - the query result is
//! already the diff.
//!
//! The wire-level driver is out of scope: [`AnalyticalDbClient`] is the
//! full dependency surface (run a SQL string, get rows back).

mod sql;

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use tablewatch_config::AnalyticalConfig;

use crate::Row;
use crate::convert::{as_i64, as_u32};
use crate::error::ProbeError;

pub use sql::{FilterValue, quote_ident, quote_str, where_fragment};

/// External dependency surface of the analytical database
///
/// # Errors
///
/// Implementations classify failures as [`ProbeError::Query`] (backend
/// rejected the SQL) or [`ProbeError::DbTimeout`] (connection-level
/// timeout); both are non-fatal to the agent.
#[async_trait::async_trait]
pub trait AnalyticalDbClient: Send + Sync {
    /// Run a SQL string and return all result rows
    async fn query(&self, sql: &str) -> Result<Vec<Row>, ProbeError>;
}

/// A probeable analytical table resolved from a resource URI
///
/// URI shape: `adb://cluster/db/schema/table?date=d&timestamp=t&where.col=v`
/// The `date`/`timestamp` parameters override the configured default
/// column names; `where.` parameters add equality filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticalTarget {
    pub db: String,
    pub schema: String,
    pub table: String,
    pub date_column: Option<String>,
    pub timestamp_column: Option<String>,
    pub filters: Vec<(String, FilterValue)>,
}

impl AnalyticalTarget {
    /// Parse a resource URI into a target
    ///
    /// # Errors
    ///
    /// Returns `InvalidTarget` when the path does not resolve to
    /// db/schema/table.
    pub fn parse(uri: &str) -> Result<Self, ProbeError> {
        let invalid = || ProbeError::InvalidTarget(uri.to_string());

        let rest = uri.split_once("://").map(|(_, r)| r).ok_or_else(invalid)?;
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut segments = path.split('/');
        let _cluster = segments.next().ok_or_else(invalid)?;
        let db = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let schema = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let table = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        let mut target = Self {
            db: db.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            date_column: None,
            timestamp_column: None,
            filters: Vec::new(),
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "date" => target.date_column = Some(value.to_string()),
                "timestamp" => target.timestamp_column = Some(value.to_string()),
                _ => {
                    if let Some(column) = key.strip_prefix("where.") {
                        target
                            .filters
                            .push((column.to_string(), FilterValue::parse(value)));
                    }
                }
            }
        }

        Ok(target)
    }

    /// Fully qualified, quoted table reference
    pub fn table_ref(&self) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.db),
            quote_ident(&self.schema),
            quote_ident(&self.table)
        )
    }

    /// Log-friendly identifier
    pub fn label(&self) -> String {
        format!("{}.{}.{}", self.db, self.schema, self.table)
    }
}

/// One bucket's marker from an aggregate query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMarker {
    pub date: NaiveDate,
    pub hour: u32,
    pub epoch: i64,
}

/// Probes analytical tables with per-unit aggregate queries
pub struct AnalyticalDbProbe {
    client: Arc<dyn AnalyticalDbClient>,
    date_column: String,
    timestamp_column: String,
}

impl AnalyticalDbProbe {
    pub fn new(client: Arc<dyn AnalyticalDbClient>, config: &AnalyticalConfig) -> Self {
        Self {
            client,
            date_column: config.date_column.clone(),
            timestamp_column: config.timestamp_column.clone(),
        }
    }

    /// The backend's current epoch counter (first-run floor bootstrap)
    pub async fn current_epoch(&self) -> Result<i64, ProbeError> {
        let rows = self.client.query("select GET_CURRENT_EPOCH()").await?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(as_i64)
            .ok_or_else(|| ProbeError::Query("GET_CURRENT_EPOCH returned no value".to_string()))
    }

    /// Per-hour max epochs above `floor`, for the given dates
    pub async fn fetch_hourly(
        &self,
        target: &AnalyticalTarget,
        dates: &[NaiveDate],
        floor: i64,
    ) -> Result<Vec<SlotMarker>, ProbeError> {
        let sql = self.hourly_sql(target, dates, floor);
        self.query_markers(target, &sql).await
    }

    /// Per-day max epochs above `floor`, for the given dates
    pub async fn fetch_daily(
        &self,
        target: &AnalyticalTarget,
        dates: &[NaiveDate],
        floor: i64,
    ) -> Result<Vec<SlotMarker>, ProbeError> {
        let sql = self.daily_sql(target, dates, floor);
        self.query_markers(target, &sql).await
    }

    /// Whole-table max epoch, if it exceeds `floor`
    pub async fn fetch_singular(
        &self,
        target: &AnalyticalTarget,
        floor: i64,
    ) -> Result<Option<i64>, ProbeError> {
        let sql = self.singular_sql(target, floor);
        debug!(table = %target.label(), sql = %sql, "running singular query");
        let rows = self.client.query(&sql).await?;
        match rows.first() {
            Some(row) => {
                let epoch = row.get(2).and_then(as_i64).ok_or_else(|| {
                    ProbeError::Query(format!("unexpected singular row for {}", target.label()))
                })?;
                Ok(Some(epoch))
            }
            None => Ok(None),
        }
    }

    async fn query_markers(
        &self,
        target: &AnalyticalTarget,
        sql: &str,
    ) -> Result<Vec<SlotMarker>, ProbeError> {
        debug!(table = %target.label(), sql = %sql, "running aggregate query");
        let rows = self.client.query(sql).await?;
        let mut markers = Vec::with_capacity(rows.len());
        for row in &rows {
            markers.push(parse_marker_row(row).ok_or_else(|| {
                ProbeError::Query(format!(
                    "unexpected aggregate row for {}: {row:?}",
                    target.label()
                ))
            })?);
        }
        Ok(markers)
    }

    fn date_column<'a>(&'a self, target: &'a AnalyticalTarget) -> &'a str {
        target.date_column.as_deref().unwrap_or(&self.date_column)
    }

    fn timestamp_column<'a>(&'a self, target: &'a AnalyticalTarget) -> &'a str {
        target
            .timestamp_column
            .as_deref()
            .unwrap_or(&self.timestamp_column)
    }

    fn hourly_sql(&self, target: &AnalyticalTarget, dates: &[NaiveDate], floor: i64) -> String {
        let d = quote_ident(self.date_column(target));
        let t = quote_ident(self.timestamp_column(target));
        let filters = where_fragment(&target.filters);
        let and_filters = if filters.is_empty() {
            String::new()
        } else {
            format!("AND {filters} ")
        };
        format!(
            "select {d} AS d, DATE_PART('hour', {t}) AS h, max(epoch) \
             from {table} \
             where {d} IN ({dates}) {and_filters}\
             group by d, h having max(epoch) > {floor} \
             order by d, h",
            table = target.table_ref(),
            dates = date_list(dates),
        )
    }

    fn daily_sql(&self, target: &AnalyticalTarget, dates: &[NaiveDate], floor: i64) -> String {
        let d = quote_ident(self.date_column(target));
        let filters = where_fragment(&target.filters);
        let and_filters = if filters.is_empty() {
            String::new()
        } else {
            format!("AND {filters} ")
        };
        format!(
            "select {d} AS d, 0 AS h, max(epoch) \
             from {table} \
             where {d} IN ({dates}) {and_filters}\
             group by d having max(epoch) > {floor} \
             order by d",
            table = target.table_ref(),
            dates = date_list(dates),
        )
    }

    fn singular_sql(&self, target: &AnalyticalTarget, floor: i64) -> String {
        let filters = where_fragment(&target.filters);
        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!("where {filters} ")
        };
        format!(
            "select NULL AS d, NULL AS h, max(epoch) \
             from {table} \
             {where_clause}having max(epoch) > {floor}",
            table = target.table_ref(),
        )
    }
}

fn date_list(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|d| quote_str(&d.format("%Y-%m-%d").to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse an aggregate row: (date, hour, epoch)
fn parse_marker_row(row: &Row) -> Option<SlotMarker> {
    if row.len() < 3 {
        return None;
    }
    let date_str = row[0].as_str()?;
    let date = NaiveDate::parse_from_str(date_str.get(..10)?, "%Y-%m-%d").ok()?;
    Some(SlotMarker {
        date,
        hour: as_u32(&row[1])?,
        epoch: as_i64(&row[2])?,
    })
}
