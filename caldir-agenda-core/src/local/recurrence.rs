//! RRULE expansion for recurring events.
//!
//! Expands a master recurring event into the instances that can overlap a
//! window, respecting EXDATEs and instance overrides.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::constants::MAX_INSTANCES_PER_SERIES;
use crate::error::{AgendaError, AgendaResult};
use crate::event::EventTime;
use crate::local::event::{Recurrence, StoredEvent};

/// One generated instance of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<'a> {
    pub event: &'a StoredEvent,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Build an iCalendar-format RRULE string for the rrule crate parser.
fn build_rrule_string(start: &EventTime, recurrence: &Recurrence) -> String {
    let mut lines = vec![format!("DTSTART{}", rrule_value(start))];
    lines.push(format!("RRULE:{}", recurrence.rrule));
    for exdate in &recurrence.exdates {
        lines.push(format!("EXDATE{}", rrule_value(exdate)));
    }
    lines.join("\n")
}

/// `:value` or `;TZID=zone:value`. The rrule crate needs a datetime, so
/// all-day dates become midnight UTC.
fn rrule_value(time: &EventTime) -> String {
    match time {
        EventTime::Date(d) => format!(":{}T000000Z", d.format("%Y%m%d")),
        EventTime::DateTimeUtc(dt) => format!(":{}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::DateTimeFloating(dt) => format!(":{}Z", dt.format("%Y%m%dT%H%M%S")),
        EventTime::DateTimeZoned { datetime, tzid } => {
            format!(";TZID={}:{}", tzid, datetime.format("%Y%m%dT%H%M%S"))
        }
    }
}

/// Convert an rrule occurrence back to the recurrence-id key of that instance.
fn instance_key(dt: &DateTime<rrule::Tz>, master_start: &EventTime) -> String {
    let time = match master_start {
        EventTime::Date(_) => EventTime::Date(dt.date_naive()),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(dt.with_timezone(&Utc)),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_utc()),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    };
    time.to_ics_string()
}

/// Expand `master` into instances that may overlap `[range_start, range_end)`.
///
/// - `overrides` maps recurrence-id ICS strings to instance exceptions. An
///   overridden instance is skipped here; the override is listed on its own.
/// - The master itself is not included.
pub fn expand_recurring_event<'a>(
    master: &'a StoredEvent,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    overrides: &HashMap<String, &StoredEvent>,
) -> AgendaResult<Vec<Instance<'a>>> {
    let Some(recurrence) = &master.recurrence else {
        return Ok(Vec::new());
    };

    let rrule_set: RRuleSet = build_rrule_string(&master.start, recurrence)
        .parse()
        .map_err(|e| {
            AgendaError::Recurrence(format!(
                "Failed to parse RRULE for event '{}': {}",
                master.uid, e
            ))
        })?;

    let duration = master.duration();

    // Instances that start before the window can still run into it.
    // `after`/`before` are exclusive, hence the extra second.
    let tz: rrule::Tz = Utc.into();
    let after = (range_start - duration - Duration::seconds(1)).with_timezone(&tz);
    let before = range_end.with_timezone(&tz);

    let result = rrule_set
        .after(after)
        .before(before)
        .all(MAX_INSTANCES_PER_SERIES);

    Ok(result
        .dates
        .iter()
        .filter(|dt| !overrides.contains_key(&instance_key(dt, &master.start)))
        .map(|dt| {
            let start = dt.with_timezone(&Utc);
            Instance {
                event: master,
                start,
                end: start + duration,
            }
        })
        .collect())
}
