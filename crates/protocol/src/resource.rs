//! Resource descriptors
//!
//! A `Resource` is the sole input contract from the upstream resource
//! registry: a templated URI, a comma-joined unit list, a fixed-offset
//! timezone, and a lookback window in days.

use chrono::FixedOffset;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while interpreting a resource's fields
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The unit list contained a value other than singular/daily/hourly
    #[error("unknown unit '{0}' (expected singular, daily, or hourly)")]
    UnknownUnit(String),

    /// The unit list was empty
    #[error("empty unit list")]
    EmptyUnit,

    /// The timezone was not a fixed UTC offset such as "+09:00"
    #[error("invalid timezone offset '{0}'")]
    InvalidTimezone(String),
}

/// Time unit of a monitored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Hourly,
    Daily,
    Singular,
}

impl Unit {
    /// Unit name as it appears in registry payloads and emitted events
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Singular => "singular",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed set of units from a resource's comma-joined `unit` field
///
/// The registry sends `unit` as a string such as `"daily"` or
/// `"singular,hourly"`. Which combinations are allowed depends on the
/// backend and is checked during cycle validation, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitSet {
    hourly: bool,
    daily: bool,
    singular: bool,
}

impl UnitSet {
    /// Parse a comma-joined unit list
    ///
    /// # Errors
    ///
    /// Returns an error for an empty list or an unrecognized unit name.
    pub fn parse(s: &str) -> Result<Self, ResourceError> {
        let mut set = Self::default();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match item {
                "hourly" => set.hourly = true,
                "daily" => set.daily = true,
                "singular" => set.singular = true,
                other => return Err(ResourceError::UnknownUnit(other.to_string())),
            }
        }
        if set.len() == 0 {
            return Err(ResourceError::EmptyUnit);
        }
        Ok(set)
    }

    pub fn hourly(&self) -> bool {
        self.hourly
    }

    pub fn daily(&self) -> bool {
        self.daily
    }

    pub fn singular(&self) -> bool {
        self.singular
    }

    /// True if the set contains a date-driven unit (hourly or daily)
    pub fn is_periodic(&self) -> bool {
        self.hourly || self.daily
    }

    /// Number of units in the set
    pub fn len(&self) -> usize {
        usize::from(self.hourly) + usize::from(self.daily) + usize::from(self.singular)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sole unit, if exactly one is set
    pub fn single(&self) -> Option<Unit> {
        if self.len() != 1 {
            return None;
        }
        if self.hourly {
            Some(Unit::Hourly)
        } else if self.daily {
            Some(Unit::Daily)
        } else {
            Some(Unit::Singular)
        }
    }
}

/// One table (or table family) to monitor for freshness
///
/// # Example URIs
///
/// ```text
/// https://warehouse.example.com/table/proj:dataset.logs_%Y%m%d
/// adb://cluster/vdb/sandbox/events?date=d&timestamp=t
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Resource {
    /// Templated URI; may embed strftime-style date/hour placeholders
    pub uri: String,

    /// Comma-joined unit list, e.g. "daily" or "singular,hourly"
    pub unit: String,

    /// Fixed UTC-offset string, e.g. "+09:00"
    pub timezone: String,

    /// Lookback window in days
    pub span_in_days: u32,
}

impl Resource {
    /// Parse the unit field into a [`UnitSet`]
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or names an unknown unit.
    pub fn units(&self) -> Result<UnitSet, ResourceError> {
        UnitSet::parse(&self.unit)
    }

    /// Parse the timezone field into a fixed UTC offset
    ///
    /// # Errors
    ///
    /// Returns an error if the field is not an offset like "+09:00".
    pub fn offset(&self) -> Result<FixedOffset, ResourceError> {
        self.timezone
            .parse::<FixedOffset>()
            .map_err(|_| ResourceError::InvalidTimezone(self.timezone.clone()))
    }
}
