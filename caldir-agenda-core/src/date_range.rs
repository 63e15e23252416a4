//! Date window displayed by an agenda view.

use chrono::{DateTime, Days, Duration, Local, NaiveDate, Utc};

use crate::constants::DEFAULT_AGENDA_DAYS;
use crate::error::{AgendaError, AgendaResult};

/// An agenda window from `start` through `end`, both dates inclusive.
///
/// The bounds are plain dates; a window with `end < start` is allowed and
/// simply contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for DateRange {
    /// Default window: today plus the following DEFAULT_AGENDA_DAYS - 1 days
    fn default() -> Self {
        let today = Local::now().date_naive();
        DateRange {
            start: today,
            end: today + Duration::days(DEFAULT_AGENDA_DAYS - 1),
        }
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// A window of `days` days beginning at `start`.
    ///
    /// Fails when the last day would fall outside the representable calendar.
    pub fn starting_at(start: NaiveDate, days: i64) -> AgendaResult<Self> {
        let span = Days::new(days.max(1).unsigned_abs() - 1);
        let end = start.checked_add_days(span).ok_or_else(|| {
            AgendaError::InvalidRange(format!("{} days from {} is out of range", days, start))
        })?;
        Ok(DateRange { start, end })
    }

    /// Parse CLI-style bounds into a window.
    /// - `from`: YYYY-MM-DD, "today" or "tomorrow"; defaults to today
    /// - `to`: YYYY-MM-DD; defaults to `days` days after `from`
    pub fn from_args(from: Option<&str>, to: Option<&str>, days: i64) -> AgendaResult<Self> {
        let today = Local::now().date_naive();

        let start = match from {
            None | Some("today") => today,
            Some("tomorrow") => today + Duration::days(1),
            Some(s) => parse_date(s)?,
        };

        match to {
            Some(s) => {
                let end = parse_date(s)?;
                if end < start {
                    return Err(AgendaError::InvalidRange(format!(
                        "end date {} is before start date {}",
                        end, start
                    )));
                }
                Ok(DateRange { start, end })
            }
            None => Self::starting_at(start, days),
        }
    }

    /// Midnight UTC at the start of the window.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC after the last day of the window (exclusive bound).
    pub fn end_utc(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
    }

    /// Whether an occurrence spanning `[start, end)` is visible in this window.
    ///
    /// Zero-length occurrences are visible when they start inside the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let (from, to) = (self.start_utc(), self.end_utc());
        if end <= start {
            return start >= from && start < to;
        }
        start < to && end > from
    }
}

/// Parse YYYY-MM-DD
fn parse_date(s: &str) -> AgendaResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        AgendaError::InvalidRange(format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
    })
}
