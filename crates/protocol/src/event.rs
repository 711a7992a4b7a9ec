//! Output event records
//!
//! Events are created fresh per detection cycle, handed to the sender,
//! then discarded. The only retained history is the marker map in the
//! state store.

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::resource::{Resource, ResourceError};

/// A "table updated" record for the downstream notification bus
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    /// Freshly generated per event; a deduplication hint for consumers,
    /// nothing more
    pub uuid: Uuid,

    /// URI of the resource that produced this event
    pub resource_uri: String,

    /// Unit the event was detected under ("hourly", "daily", "singular",
    /// or the resource's combined unit string)
    pub resource_unit: String,

    /// Unix seconds of the bucket's slot in the resource timezone;
    /// 0 when the bucket has no date
    pub resource_time: i64,

    /// The resource's fixed UTC-offset string
    pub resource_timezone: String,

    /// Backend-specific JSON carrying at least the marker
    pub payload: serde_json::Value,
}

/// Convert a bucket slot to Unix seconds in a fixed-offset timezone
///
/// A missing date yields 0, as does an hour outside 0..=23.
pub fn date_hour_to_unix(date: Option<NaiveDate>, hour: u32, offset: FixedOffset) -> i64 {
    let Some(date) = date else {
        return 0;
    };
    let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
        return 0;
    };
    match naive.and_local_timezone(offset) {
        chrono::LocalResult::Single(dt) => dt.timestamp(),
        _ => 0,
    }
}

/// Builds well-formed events for one resource
///
/// Holds the resource identity and parsed timezone so per-bucket event
/// construction is a pure formatting step.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    resource_uri: String,
    resource_timezone: String,
    offset: FixedOffset,
}

impl EventBuilder {
    /// Create a builder for a resource
    ///
    /// # Errors
    ///
    /// Returns an error if the resource's timezone is not a fixed offset.
    pub fn new(resource: &Resource) -> Result<Self, ResourceError> {
        Ok(Self {
            resource_uri: resource.uri.clone(),
            resource_timezone: resource.timezone.clone(),
            offset: resource.offset()?,
        })
    }

    /// Unix seconds for a bucket slot in this resource's timezone
    pub fn resource_time(&self, date: Option<NaiveDate>, hour: u32) -> i64 {
        date_hour_to_unix(date, hour, self.offset)
    }

    /// Build one event
    pub fn build(
        &self,
        unit: &str,
        date: Option<NaiveDate>,
        hour: u32,
        payload: serde_json::Value,
    ) -> Event {
        Event {
            uuid: Uuid::new_v4(),
            resource_uri: self.resource_uri.clone(),
            resource_unit: unit.to_string(),
            resource_time: self.resource_time(date, hour),
            resource_timezone: self.resource_timezone.clone(),
            payload,
        }
    }
}
