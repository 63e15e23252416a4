//! ICS parsing using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::constants::UNTITLED_EVENT;
use crate::error::{AgendaError, AgendaResult};
use crate::event::EventTime;
use crate::local::event::{Recurrence, StoredEvent};

/// Parse every VEVENT in an ICS document.
///
/// VEVENTs without a UID or DTSTART are skipped. A document that is not
/// valid iCalendar at all is an error.
pub fn parse_events(content: &str) -> AgendaResult<Vec<StoredEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| AgendaError::IcsParse(e.to_string()))?;

    Ok(calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(parse_vevent)
        .collect())
}

fn parse_vevent(vevent: &Component) -> Option<StoredEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| UNTITLED_EVENT.to_string());
    let start = to_event_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => to_event_time(DatePerhapsTime::try_from(prop).ok()?),
        None => default_end(&start, vevent.find_prop("DURATION")),
    };

    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let cancelled = vevent
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref() == "CANCELLED");

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();
    let recurrence = rrule.map(|rrule| Recurrence { rrule, exdates });

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    Some(StoredEvent {
        uid,
        summary,
        description,
        location,
        start,
        end,
        cancelled,
        recurrence,
        recurrence_id,
    })
}

/// End of an event without DTEND: start plus DURATION if present, otherwise
/// the next day for all-day events and the start itself for timed ones.
fn default_end(start: &EventTime, duration: Option<&Property>) -> EventTime {
    let duration = duration
        .and_then(|p| iso8601::duration(p.val.as_ref()).ok())
        .and_then(|d| Duration::from_std(std::time::Duration::from(d)).ok());

    match (start, duration) {
        (EventTime::Date(d), Some(dur)) => EventTime::Date(*d + Duration::days(dur.num_days().max(1))),
        (EventTime::Date(d), None) => EventTime::Date(*d + Duration::days(1)),
        (EventTime::DateTimeUtc(dt), Some(dur)) => EventTime::DateTimeUtc(*dt + dur),
        (EventTime::DateTimeFloating(dt), Some(dur)) => EventTime::DateTimeFloating(*dt + dur),
        (EventTime::DateTimeZoned { datetime, tzid }, Some(dur)) => EventTime::DateTimeZoned {
            datetime: *datetime + dur,
            tzid: tzid.clone(),
        },
        (timed, None) => timed.clone(),
    }
}

fn to_event_time(value: DatePerhapsTime) -> EventTime {
    use CalendarDateTime::{Floating, Utc, WithTimezone};

    match value {
        DatePerhapsTime::Date(date) => EventTime::Date(date),
        DatePerhapsTime::DateTime(Utc(instant)) => EventTime::DateTimeUtc(instant),
        DatePerhapsTime::DateTime(Floating(datetime)) => EventTime::DateTimeFloating(datetime),
        DatePerhapsTime::DateTime(WithTimezone { date_time, tzid }) => {
            EventTime::DateTimeZoned { datetime: date_time, tzid }
        }
    }
}

/// Every value of an EXDATE property. The property may list several
/// comma-separated values, all sharing its TZID and VALUE parameters.
fn parse_exdate_property(prop: &Property) -> Vec<EventTime> {
    let tzid = param(prop, "TZID");
    let date_only = param(prop, "VALUE") == Some("DATE");

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|value| exdate_value(value, tzid, date_only))
        .collect()
}

fn param<'a>(prop: &'a Property, key: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref())
        .map(|v| v.as_ref())
}

const ICS_DATE: &str = "%Y%m%d";
const ICS_DATE_TIME: &str = "%Y%m%dT%H%M%S";

fn exdate_value(value: &str, tzid: Option<&str>, date_only: bool) -> Option<EventTime> {
    if date_only {
        return NaiveDate::parse_from_str(value, ICS_DATE).ok().map(EventTime::Date);
    }

    let (local, utc) = match value.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (value, false),
    };
    let datetime = NaiveDateTime::parse_from_str(local, ICS_DATE_TIME).ok()?;

    Some(match (tzid, utc) {
        (_, true) => EventTime::DateTimeUtc(datetime.and_utc()),
        (Some(tzid), false) => EventTime::DateTimeZoned {
            datetime,
            tzid: tzid.to_string(),
        },
        (None, false) => EventTime::DateTimeFloating(datetime),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const WEEKLY: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//caldir//agenda//EN\r
BEGIN:VEVENT\r
UID:weekly-sync@caldir\r
SUMMARY:Weekly sync\r
DTSTART:20250303T090000Z\r
DTEND:20250303T093000Z\r
RRULE:FREQ=WEEKLY;COUNT=4\r
EXDATE:20250310T090000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:weekly-sync@caldir\r
SUMMARY:Weekly sync (moved)\r
RECURRENCE-ID:20250317T090000Z\r
DTSTART:20250317T140000Z\r
DTEND:20250317T143000Z\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn parses_master_and_override() {
        let events = parse_events(WEEKLY).unwrap();
        assert_eq!(events.len(), 2);

        let master = &events[0];
        assert_eq!(master.summary, "Weekly sync");
        let recurrence = master.recurrence.as_ref().unwrap();
        assert_eq!(recurrence.rrule, "FREQ=WEEKLY;COUNT=4");
        assert_eq!(
            recurrence.exdates,
            [EventTime::DateTimeUtc(
                Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
            )]
        );

        let moved = &events[1];
        assert!(moved.recurrence.is_none());
        assert_eq!(
            moved.recurrence_id,
            Some(EventTime::DateTimeUtc(
                Utc.with_ymd_and_hms(2025, 3, 17, 9, 0, 0).unwrap()
            ))
        );
    }

    #[test]
    fn all_day_event_without_end_lasts_one_day() {
        let ics = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:holiday@caldir\r
DTSTART;VALUE=DATE:20250320\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = parse_events(ics).unwrap();

        assert_eq!(events[0].summary, UNTITLED_EVENT);
        assert!(events[0].is_all_day());
        assert_eq!(
            events[0].end,
            EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 21).unwrap())
        );
    }

    #[test]
    fn duration_sets_end_of_timed_event() {
        let ics = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:call@caldir\r
SUMMARY:Call\r
STATUS:CANCELLED\r
DTSTART:20250320T150000Z\r
DURATION:PT45M\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = parse_events(ics).unwrap();

        assert!(events[0].cancelled);
        assert_eq!(
            events[0].end,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 20, 15, 45, 0).unwrap())
        );
    }

    #[test]
    fn exdate_lists_share_their_parameters() {
        let ics = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:gym@caldir\r
DTSTART;TZID=Europe/Berlin:20250303T070000\r
DTEND;TZID=Europe/Berlin:20250303T080000\r
RRULE:FREQ=DAILY;COUNT=5\r
EXDATE;TZID=Europe/Berlin:20250304T070000,20250305T070000\r
EXDATE;VALUE=DATE:20250306\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = parse_events(ics).unwrap();
        let exdates = &events[0].recurrence.as_ref().unwrap().exdates;

        let berlin = |d| EventTime::DateTimeZoned {
            datetime: NaiveDate::from_ymd_opt(2025, 3, d)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap(),
            tzid: "Europe/Berlin".to_string(),
        };
        assert_eq!(
            *exdates,
            [
                berlin(4),
                berlin(5),
                EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 6).unwrap()),
            ]
        );
    }

    #[test]
    fn skips_vevents_without_uid() {
        let ics = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
SUMMARY:Anonymous\r
DTSTART:20250320T150000Z\r
END:VEVENT\r
END:VCALENDAR\r
";
        assert!(parse_events(ics).unwrap().is_empty());
    }
}
