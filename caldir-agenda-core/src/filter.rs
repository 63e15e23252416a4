//! Candidate filtering applied before occurrences reach the diff.

use std::collections::HashSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::error::AgendaError;
use crate::occurrence::Occurrence;

/// Set of independent filter options. Active options are cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FilterMode(u8);

impl FilterMode {
    pub const NONE: FilterMode = FilterMode(0);
    /// Keep only all-day occurrences
    pub const ALL_DAY_ONLY: FilterMode = FilterMode(1 << 0);
    /// Keep only the first occurrence (in provider order) of each calendar
    pub const ONE_PER_CALENDAR: FilterMode = FilterMode(1 << 1);

    const NAMED: [(&'static str, FilterMode); 2] = [
        ("all-day-only", FilterMode::ALL_DAY_ONLY),
        ("one-per-calendar", FilterMode::ONE_PER_CALENDAR),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: FilterMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Combine option names such as `["all-day-only", "one-per-calendar"]`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, AgendaError> {
        names.iter().try_fold(FilterMode::NONE, |mode, name| {
            Ok::<_, AgendaError>(mode | name.as_ref().parse::<FilterMode>()?)
        })
    }
}

impl BitOr for FilterMode {
    type Output = FilterMode;

    fn bitor(self, rhs: FilterMode) -> FilterMode {
        FilterMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for FilterMode {
    fn bitor_assign(&mut self, rhs: FilterMode) {
        self.0 |= rhs.0;
    }
}

impl FromStr for FilterMode {
    type Err = AgendaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "none" {
            return Ok(FilterMode::NONE);
        }
        FilterMode::NAMED
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, mode)| *mode)
            .ok_or_else(|| AgendaError::Config(format!("Unknown agenda filter '{}'", s)))
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let names: Vec<&str> = FilterMode::NAMED
            .iter()
            .filter(|(_, mode)| self.contains(*mode))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "{}", names.join(","))
    }
}

impl<'de> Deserialize<'de> for FilterMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        FilterMode::from_names(&names).map_err(serde::de::Error::custom)
    }
}

/// Result of a filter pass: what goes on to sorting, and what gets dropped.
#[derive(Debug, Default)]
pub struct Filtered {
    pub retained: Vec<Arc<Occurrence>>,
    pub rejected: Vec<Arc<Occurrence>>,
}

/// Partition `candidates` according to `mode` in a single pass.
///
/// Both checks run on every candidate, so a timed occurrence rejected by the
/// all-day check still claims its calendar's slot. Per-calendar selection
/// keeps the first candidate seen in input order, not in sorted order.
/// Occurrences whose event is unresolved share one unknown-calendar slot.
pub fn apply_filter(candidates: Vec<Arc<Occurrence>>, mode: FilterMode) -> Filtered {
    if mode.is_none() {
        return Filtered {
            retained: candidates,
            rejected: Vec::new(),
        };
    }

    let mut filtered = Filtered::default();
    let mut seen_calendars: HashSet<Option<String>> = HashSet::new();

    for candidate in candidates {
        let first_of_calendar = !mode.contains(FilterMode::ONE_PER_CALENDAR)
            || seen_calendars.insert(candidate.calendar().map(str::to_owned));
        let all_day_ok = !mode.contains(FilterMode::ALL_DAY_ONLY) || candidate.all_day();
        let keep = first_of_calendar && all_day_ok;

        if keep {
            filtered.retained.push(candidate);
        } else {
            filtered.rejected.push(candidate);
        }
    }

    filtered
}
