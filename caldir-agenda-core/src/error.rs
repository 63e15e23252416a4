//! Error types for caldir agenda views.

use thiserror::Error;

/// Errors that can occur while loading calendars or refreshing an agenda.
#[derive(Error, Debug)]
pub enum AgendaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar directory not found: {0}")]
    CalendarDirNotFound(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Recurrence error: {0}")]
    Recurrence(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for agenda operations.
pub type AgendaResult<T> = Result<T, AgendaError>;
