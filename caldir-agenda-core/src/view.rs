//! Agenda views: the ordered, observable list a presentation layer binds to.
//!
//! A view owns its displayed occurrences and a window/filter configuration.
//! Changing the configuration never edits the list in place; it asks the
//! coordinator for a fresh fetch, and the result comes back through
//! [`AgendaView::apply`], which filters, sorts and reconciles it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::coordinator::{RefreshHandle, ViewId};
use crate::date_range::DateRange;
use crate::event::EventInfo;
use crate::filter::{FilterMode, apply_filter};
use crate::occurrence::Occurrence;
use crate::reconcile::{RowChange, reconcile};
use crate::sort::sort_occurrences;

/// Receives change notifications from an agenda view.
///
/// Callbacks run synchronously, in mutation order, while the view is being
/// updated. Row indices refer to the list as it is after all earlier
/// callbacks of the same pass.
pub trait AgendaListener {
    fn rows_inserted(&mut self, _start: usize, _count: usize) {}
    fn rows_removed(&mut self, _start: usize, _count: usize) {}
    fn count_changed(&mut self, _count: usize) {}
    /// Emitted once per applied fetch, even when nothing changed.
    fn updated(&mut self) {}
    fn window_changed(&mut self, _window: &DateRange) {}
    fn filter_changed(&mut self, _filter: FilterMode) {}
}

/// Notification passed to closure listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum AgendaNotification {
    RowsInserted { start: usize, count: usize },
    RowsRemoved { start: usize, count: usize },
    CountChanged(usize),
    Updated,
    WindowChanged(DateRange),
    FilterChanged(FilterMode),
}

impl<F> AgendaListener for F
where
    F: FnMut(AgendaNotification),
{
    fn rows_inserted(&mut self, start: usize, count: usize) {
        self(AgendaNotification::RowsInserted { start, count })
    }

    fn rows_removed(&mut self, start: usize, count: usize) {
        self(AgendaNotification::RowsRemoved { start, count })
    }

    fn count_changed(&mut self, count: usize) {
        self(AgendaNotification::CountChanged(count))
    }

    fn updated(&mut self) {
        self(AgendaNotification::Updated)
    }

    fn window_changed(&mut self, window: &DateRange) {
        self(AgendaNotification::WindowChanged(*window))
    }

    fn filter_changed(&mut self, filter: FilterMode) {
        self(AgendaNotification::FilterChanged(filter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Per-row data roles exposed to a presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgendaRole {
    Event,
    Occurrence,
    SectionBucket,
}

impl AgendaRole {
    pub const ALL: [AgendaRole; 3] = [
        AgendaRole::Event,
        AgendaRole::Occurrence,
        AgendaRole::SectionBucket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AgendaRole::Event => "event",
            AgendaRole::Occurrence => "occurrence",
            AgendaRole::SectionBucket => "sectionBucket",
        }
    }

    pub fn from_name(name: &str) -> Option<AgendaRole> {
        AgendaRole::ALL.into_iter().find(|role| role.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgendaData {
    Event(Arc<EventInfo>),
    Occurrence(Arc<Occurrence>),
    SectionBucket(NaiveDate),
}

/// What one applied fetch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub inserted: usize,
    pub removed: usize,
    /// Records released: filter rejects, removed rows and matched duplicates
    pub disposed: usize,
}

impl ApplySummary {
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.removed == 0
    }
}

/// Collects everything a view needs before it exists.
pub struct AgendaViewBuilder {
    window: DateRange,
    filter: FilterMode,
    listeners: Vec<Box<dyn AgendaListener>>,
}

impl AgendaViewBuilder {
    pub fn new(window: DateRange) -> Self {
        AgendaViewBuilder {
            window,
            filter: FilterMode::NONE,
            listeners: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn listener(mut self, listener: impl AgendaListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Build a view wired to `refresh`. The view starts empty; nothing is
    /// fetched until the caller requests a refresh.
    pub fn build(self, refresh: RefreshHandle) -> AgendaView {
        let listeners: Vec<_> = self
            .listeners
            .into_iter()
            .enumerate()
            .map(|(i, listener)| (ListenerId(i as u64), listener))
            .collect();

        AgendaView {
            id: refresh.view(),
            window: self.window,
            filter: self.filter,
            occurrences: Vec::new(),
            next_listener: listeners.len() as u64,
            listeners,
            refresh,
            last_updated: None,
        }
    }
}

pub struct AgendaView {
    id: ViewId,
    window: DateRange,
    filter: FilterMode,
    occurrences: Vec<Arc<Occurrence>>,
    listeners: Vec<(ListenerId, Box<dyn AgendaListener>)>,
    next_listener: u64,
    refresh: RefreshHandle,
    last_updated: Option<DateTime<Utc>>,
}

impl AgendaView {
    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn window(&self) -> DateRange {
        self.window
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter
    }

    pub fn count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// When the last fetch was applied, `None` before the first one.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Occurrence>> {
        let occurrence = self.occurrences.get(index);
        if occurrence.is_none() {
            warn!(view = %self.id, index, count = self.count(), "invalid agenda index");
        }
        occurrence
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Occurrence>> {
        self.occurrences.iter()
    }

    /// Role-based row access for presentation bindings.
    ///
    /// Unknown roles and out-of-range indices yield `None`, as does the
    /// event role of an occurrence whose event could not be resolved.
    pub fn data(&self, index: usize, role: &str) -> Option<AgendaData> {
        let Some(role) = AgendaRole::from_name(role) else {
            warn!(view = %self.id, role, "unknown agenda role");
            return None;
        };
        let occurrence = self.get(index)?;

        match role {
            AgendaRole::Event => occurrence.event.clone().map(AgendaData::Event),
            AgendaRole::Occurrence => Some(AgendaData::Occurrence(occurrence.clone())),
            AgendaRole::SectionBucket => Some(AgendaData::SectionBucket(occurrence.section_bucket())),
        }
    }

    // CONFIGURATION:

    pub fn set_window(&mut self, window: DateRange) {
        if self.window == window {
            return;
        }
        self.window = window;
        self.notify(|l| l.window_changed(&window));
        self.refresh();
    }

    pub fn set_start_date(&mut self, start: NaiveDate) {
        self.set_window(DateRange::new(start, self.window.end));
    }

    pub fn set_end_date(&mut self, end: NaiveDate) {
        self.set_window(DateRange::new(self.window.start, end));
    }

    pub fn set_filter_mode(&mut self, filter: FilterMode) {
        if self.filter == filter {
            return;
        }
        self.filter = filter;
        self.notify(|l| l.filter_changed(filter));
        self.refresh();
    }

    /// Ask the coordinator for a new fetch of this view's window.
    pub fn refresh(&self) {
        if !self.refresh.request() {
            debug!(view = %self.id, "refresh requested after coordinator shut down");
        }
    }

    // LISTENERS:

    pub fn subscribe(&mut self, listener: impl AgendaListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn AgendaListener)) {
        for (_, listener) in &mut self.listeners {
            f(listener.as_mut());
        }
    }

    // UPDATES:

    /// Replace the displayed list with a freshly fetched batch.
    ///
    /// Runs the filter, sort and reconcile stages, notifying listeners of
    /// every row run, then of the count (if it changed), then `updated`.
    pub fn apply(&mut self, batch: Vec<Occurrence>) -> ApplySummary {
        let old_count = self.occurrences.len();
        let candidates = batch.into_iter().map(Arc::new).collect();

        let filtered = apply_filter(candidates, self.filter);
        let mut retained = filtered.retained;
        sort_occurrences(&mut retained);

        let mut summary = ApplySummary::default();
        let AgendaView {
            occurrences,
            listeners,
            ..
        } = self;
        let removed = reconcile(occurrences, retained, |change| {
            for (_, listener) in listeners.iter_mut() {
                match change {
                    RowChange::Removed { start, count } => listener.rows_removed(start, count),
                    RowChange::Inserted { start, count } => listener.rows_inserted(start, count),
                }
            }
            match change {
                RowChange::Removed { .. } => summary.removed += change.count(),
                RowChange::Inserted { .. } => summary.inserted += change.count(),
            }
        });

        summary.disposed = filtered.rejected.len() + removed.len();
        drop(filtered.rejected);
        drop(removed);

        self.last_updated = Some(Utc::now());

        let count = self.occurrences.len();
        if count != old_count {
            self.notify(|l| l.count_changed(count));
        }
        self.notify(|l| l.updated());

        debug!(
            view = %self.id,
            inserted = summary.inserted,
            removed = summary.removed,
            disposed = summary.disposed,
            count,
            "agenda reconciled"
        );

        summary
    }
}

impl fmt::Debug for AgendaView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgendaView")
            .field("id", &self.id)
            .field("window", &self.window)
            .field("filter", &self.filter)
            .field("count", &self.occurrences.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
