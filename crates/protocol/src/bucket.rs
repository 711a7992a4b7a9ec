//! Bucket identification types
//!
//! A `BucketKey` names one concrete probe target derived from a resource.
//! Its string form doubles as the key under which the last observed
//! marker is persisted.

use chrono::NaiveDate;
use std::fmt;

/// A resolved, concrete identifier for one probe target
///
/// Produced by resource expansion (or, for the analytical backend, from
/// aggregate query rows); never assembled ad hoc from raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// A literal warehouse table name (non-partitioned)
    Table(String),

    /// A warehouse `table$partition` pair
    Partition { table: String, partition: String },

    /// A date/hour pair on the analytical backend
    DateHour { date: NaiveDate, hour: u32 },
}

impl BucketKey {
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table(name.into())
    }

    pub fn partition(table: impl Into<String>, partition: impl Into<String>) -> Self {
        Self::Partition {
            table: table.into(),
            partition: partition.into(),
        }
    }

    pub fn date_hour(date: NaiveDate, hour: u32) -> Self {
        Self::DateHour { date, hour }
    }

    /// Serialized form used as the persisted-state key
    pub fn state_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(name) => f.write_str(name),
            Self::Partition { table, partition } => write!(f, "{table}${partition}"),
            Self::DateHour { date, hour } => write!(f, "{date}/{hour:02}"),
        }
    }
}

/// A probeable bucket: its key plus the wall-clock slot it stands for
///
/// The slot feeds `resource_time` on emitted events. A bucket without a
/// date (the singular case) yields `resource_time = 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: BucketKey,
    pub date: Option<NaiveDate>,
    pub hour: u32,
}

impl Bucket {
    pub fn new(key: BucketKey, date: Option<NaiveDate>, hour: u32) -> Self {
        Self { key, date, hour }
    }

    /// Bucket with no associated date (singular resources)
    pub fn dateless(key: BucketKey) -> Self {
        Self {
            key,
            date: None,
            hour: 0,
        }
    }
}
