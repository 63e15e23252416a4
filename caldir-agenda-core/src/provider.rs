//! Data provider seam.
//!
//! Agenda views never read calendars themselves. A provider expands
//! recurrences and resolves timezones, and hands back plain occurrences for a
//! window; views only ever diff what it returns.

use std::future::Future;

use crate::date_range::DateRange;
use crate::error::AgendaResult;
use crate::event::{EventInfo, EventTime};
use crate::occurrence::FetchedOccurrence;

pub trait OccurrenceProvider: Send + Sync + 'static {
    /// All occurrences visible in `range`, in provider order.
    ///
    /// Order matters: the one-per-calendar filter keeps the first occurrence
    /// it sees for each calendar.
    fn fetch_occurrences(
        &self,
        range: DateRange,
    ) -> impl Future<Output = AgendaResult<Vec<FetchedOccurrence>>> + Send;

    /// Look up the event an occurrence belongs to.
    fn resolve_event(&self, uid: &str, recurrence_id: Option<&EventTime>) -> Option<EventInfo>;
}
