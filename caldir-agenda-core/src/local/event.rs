//! Events as stored in a calendar directory.

use chrono::{DateTime, Duration, Utc};

use crate::event::{EventInfo, EventTime};

/// Recurrence rule and exclusions of a master event.
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    /// RRULE value, e.g. `FREQ=WEEKLY;BYDAY=MO`
    pub rrule: String,
    pub exdates: Vec<EventTime>,
}

/// One VEVENT read from an .ics file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub cancelled: bool,
    /// Set on master events of a series
    pub recurrence: Option<Recurrence>,
    /// Set on instance overrides of a series
    pub recurrence_id: Option<EventTime>,
}

impl StoredEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.is_date()
    }

    /// Start and end as UTC instants, if both resolve.
    pub fn utc_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.start.to_utc()?, self.end.to_utc()?))
    }

    pub fn duration(&self) -> Duration {
        self.utc_span()
            .map(|(start, end)| end - start)
            .unwrap_or_else(Duration::zero)
    }

    /// Key used to look this event up again: uid plus recurrence-id.
    pub fn key(&self) -> (String, Option<String>) {
        (
            self.uid.clone(),
            self.recurrence_id.as_ref().map(EventTime::to_ics_string),
        )
    }

    pub fn info(&self, calendar: &str) -> EventInfo {
        EventInfo {
            uid: self.uid.clone(),
            recurrence_id: self.recurrence_id.clone(),
            label: self.summary.clone(),
            calendar: calendar.to_string(),
            all_day: self.is_all_day(),
            location: self.location.clone(),
            description: self.description.clone(),
        }
    }
}
