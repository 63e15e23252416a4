//! Agenda views over caldir calendars.
//!
//! An agenda view lists the occurrences of calendar events inside a date
//! window. Each refresh fetches a fresh batch from an [`OccurrenceProvider`]
//! and pipes it through:
//! - the filter stage ([`filter::apply_filter`])
//! - the sort stage ([`sort::sort_occurrences`])
//! - reconciliation against the live list ([`reconcile::reconcile`]), which
//!   reports contiguous row insertions and removals to listeners and keeps
//!   unchanged rows as the same allocation
//!
//! [`AgendaCoordinator`] owns the views and their refresh requests;
//! [`local::CaldirProvider`] reads occurrences from a caldir directory.

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod date_range;
pub mod error;
pub mod event;
pub mod filter;
pub mod local;
pub mod occurrence;
pub mod provider;
pub mod reconcile;
pub mod sort;
pub mod view;

pub use crate::config::AgendaConfig;
pub use coordinator::{AgendaCoordinator, RefreshHandle, ViewId};
pub use date_range::DateRange;
pub use error::{AgendaError, AgendaResult};
pub use event::{EventInfo, EventTime};
pub use filter::FilterMode;
pub use local::{CaldirProvider, StorageFingerprint};
pub use occurrence::{FetchedOccurrence, Occurrence};
pub use provider::OccurrenceProvider;
pub use view::{
    AgendaData, AgendaListener, AgendaNotification, AgendaRole, AgendaView, AgendaViewBuilder,
    ApplySummary, ListenerId,
};
