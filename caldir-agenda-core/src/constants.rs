/// Number of days an agenda window spans when no end date is given.
pub const DEFAULT_AGENDA_DAYS: i64 = 7;

/// Upper bound on instances generated for a single recurring series per fetch.
pub const MAX_INSTANCES_PER_SERIES: u16 = 365;

/// Label used for events without a SUMMARY.
pub const UNTITLED_EVENT: &str = "(No title)";
