//! Event metadata resolved from the calendar store.
//!
//! An agenda only ever displays occurrences, but every occurrence points back
//! at the event it was expanded from. `EventInfo` is that resolved event:
//! the label, owning calendar and all-day flag the agenda filters and sorts on.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A point in time as stored in an ICS file, preserving how it was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// Resolve to a UTC instant.
    ///
    /// Dates map to midnight UTC and floating times are read as UTC.
    /// Returns `None` when a zoned time names an unknown timezone.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            EventTime::DateTimeUtc(dt) => Some(*dt),
            EventTime::DateTimeFloating(dt) => Some(dt.and_utc()),
            EventTime::DateTimeZoned { datetime, tzid } => {
                let tz: Tz = tzid.parse().ok()?;
                tz.from_local_datetime(datetime)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Format as the ICS value string, e.g. `20250320T150000Z`.
    ///
    /// Used as the canonical key for RECURRENCE-ID matching.
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, tzid } => {
                format!("{};{}", tzid, datetime.format("%Y%m%dT%H%M%S"))
            }
        }
    }
}

/// Resolved metadata of the event an occurrence belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub uid: String,
    /// Set for instance overrides of a recurring series
    pub recurrence_id: Option<EventTime>,
    pub label: String,
    /// Identity of the calendar (collection) the event lives in
    pub calendar: String,
    pub all_day: bool,
    pub location: Option<String>,
    pub description: Option<String>,
}
