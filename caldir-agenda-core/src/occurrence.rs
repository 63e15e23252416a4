//! Occurrence records displayed by an agenda view.
//!
//! One `Occurrence` is one concrete time slot of an event inside the agenda
//! window: a single meeting, or one instance of a recurring series. Two
//! predicates drive everything downstream:
//!
//! - [`Occurrence::cmp_order`] totally orders occurrences by start time, then
//!   case-insensitive label, then event uid.
//! - [`Occurrence::same_instance`] decides whether two occurrences describe the
//!   same thing. It is narrower than "compares equal": two
//!   occurrences can sit at the same sort position and still differ in end
//!   time, and an occurrence whose event failed to resolve never matches.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::event::{EventInfo, EventTime};

/// Raw occurrence as produced by a provider fetch, before event resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedOccurrence {
    pub uid: String,
    pub recurrence_id: Option<EventTime>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub uid: String,
    pub recurrence_id: Option<EventTime>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `None` when the owning event could not be resolved
    pub event: Option<Arc<EventInfo>>,
}

impl Occurrence {
    pub fn new(fetched: FetchedOccurrence, event: Option<EventInfo>) -> Self {
        Occurrence {
            uid: fetched.uid,
            recurrence_id: fetched.recurrence_id,
            start: fetched.start,
            end: fetched.end,
            event: event.map(Arc::new),
        }
    }

    /// Display label of the owning event, empty when unresolved.
    pub fn label(&self) -> &str {
        self.event.as_deref().map(|e| e.label.as_str()).unwrap_or("")
    }

    pub fn calendar(&self) -> Option<&str> {
        self.event.as_deref().map(|e| e.calendar.as_str())
    }

    /// Unresolved occurrences are never all-day.
    pub fn all_day(&self) -> bool {
        self.event.as_deref().is_some_and(|e| e.all_day)
    }

    /// The day this occurrence is grouped under when rendered as sections.
    pub fn section_bucket(&self) -> NaiveDate {
        if self.all_day() {
            self.start.date_naive()
        } else {
            self.start.with_timezone(&Local).date_naive()
        }
    }

    /// Agenda ordering: start time, then label (case-insensitive), then uid.
    pub fn cmp_order(&self, other: &Occurrence) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| cmp_case_insensitive(self.label(), other.label()))
            .then_with(|| self.uid.cmp(&other.uid))
    }

    pub fn less_than(&self, other: &Occurrence) -> bool {
        self.cmp_order(other) == Ordering::Less
    }

    /// True when both occurrences are the same instance of the same event
    /// over the same time span.
    pub fn same_instance(&self, other: &Occurrence) -> bool {
        if self.start != other.start || self.end != other.end {
            return false;
        }

        match (self.event.as_deref(), other.event.as_deref()) {
            (Some(a), Some(b)) => a.uid == b.uid && a.recurrence_id == b.recurrence_id,
            _ => false,
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event.as_deref() {
            Some(event) => write!(f, "{}", event.label),
            None => write!(f, "<unresolved {}>", self.uid),
        }
    }
}

fn cmp_case_insensitive(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
