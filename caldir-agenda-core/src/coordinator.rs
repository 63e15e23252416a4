//! Refresh coordination for agenda views.
//!
//! The coordinator owns every active view plus the queue of refresh requests
//! they raise. Requests for the same view coalesce, and at most one fetch per
//! view is in flight: a newer request aborts the older fetch, and results
//! from superseded or removed views are dropped without touching any list.
//!
//! Fetches run on tokio tasks. Results are applied only from
//! [`AgendaCoordinator::next_update`], so views are never mutated
//! concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AgendaError, AgendaResult};
use crate::occurrence::Occurrence;
use crate::provider::OccurrenceProvider;
use crate::view::{AgendaView, AgendaViewBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    pub(crate) fn new(id: u64) -> Self {
        ViewId(id)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

/// Handle a view uses to ask its coordinator for a new fetch.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    view: ViewId,
    requests: mpsc::UnboundedSender<ViewId>,
}

impl RefreshHandle {
    pub(crate) fn new(view: ViewId, requests: mpsc::UnboundedSender<ViewId>) -> Self {
        RefreshHandle { view, requests }
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    /// Queue a refresh. Returns false if the coordinator is gone.
    pub fn request(&self) -> bool {
        self.requests.send(self.view).is_ok()
    }
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
}

struct FetchResult {
    view: ViewId,
    generation: u64,
    outcome: AgendaResult<Vec<Occurrence>>,
}

/// Sends a fetch's result exactly once. If the task unwinds or is aborted
/// before finishing, the drop sends a failure so the fetch never stays in
/// flight forever.
struct FetchReporter {
    view: ViewId,
    generation: u64,
    results: Option<mpsc::UnboundedSender<FetchResult>>,
}

impl FetchReporter {
    fn finish(mut self, outcome: AgendaResult<Vec<Occurrence>>) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: AgendaResult<Vec<Occurrence>>) {
        if let Some(results) = self.results.take() {
            let _ = results.send(FetchResult {
                view: self.view,
                generation: self.generation,
                outcome,
            });
        }
    }
}

impl Drop for FetchReporter {
    fn drop(&mut self) {
        self.send(Err(AgendaError::Provider(
            "fetch task ended without a result".into(),
        )));
    }
}

pub struct AgendaCoordinator<P: OccurrenceProvider> {
    provider: Arc<P>,
    views: HashMap<ViewId, AgendaView>,
    next_view: u64,
    next_generation: u64,
    requests_tx: mpsc::UnboundedSender<ViewId>,
    requests_rx: mpsc::UnboundedReceiver<ViewId>,
    in_flight: HashMap<ViewId, InFlight>,
    results_tx: mpsc::UnboundedSender<FetchResult>,
    results_rx: mpsc::UnboundedReceiver<FetchResult>,
}

impl<P: OccurrenceProvider> AgendaCoordinator<P> {
    pub fn new(provider: P) -> Self {
        Self::with_shared(Arc::new(provider))
    }

    /// Build a coordinator around a provider the caller keeps a handle to.
    pub fn with_shared(provider: Arc<P>) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        AgendaCoordinator {
            provider,
            views: HashMap::new(),
            next_view: 1,
            next_generation: 1,
            requests_tx,
            requests_rx,
            in_flight: HashMap::new(),
            results_tx,
            results_rx,
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    // VIEWS:

    /// Register a new, empty view. Call [`Self::refresh`] to load it.
    pub fn create_view(&mut self, builder: AgendaViewBuilder) -> ViewId {
        let id = ViewId(self.next_view);
        self.next_view += 1;

        let view = builder.build(RefreshHandle::new(id, self.requests_tx.clone()));
        self.views.insert(id, view);
        debug!(view = %id, "agenda view registered");
        id
    }

    pub fn view(&self, id: ViewId) -> Option<&AgendaView> {
        self.views.get(&id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut AgendaView> {
        self.views.get_mut(&id)
    }

    pub fn views(&self) -> impl Iterator<Item = &AgendaView> {
        self.views.values()
    }

    /// Unregister a view, cancelling its pending fetch.
    pub fn remove_view(&mut self, id: ViewId) -> Option<AgendaView> {
        if let Some(in_flight) = self.in_flight.remove(&id) {
            in_flight.task.abort();
            debug!(view = %id, "cancelled fetch for removed view");
        }
        self.views.remove(&id)
    }

    // REQUESTS:

    pub fn refresh(&self, id: ViewId) -> bool {
        self.views.contains_key(&id) && self.requests_tx.send(id).is_ok()
    }

    /// The underlying calendar storage changed: refetch every view.
    pub fn storage_modified(&self) {
        for id in self.views.keys() {
            let _ = self.requests_tx.send(*id);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.requests_rx.is_empty()
    }

    /// Start fetches for all queued requests, one per view.
    /// Returns how many fetches were started.
    pub fn dispatch(&mut self) -> usize {
        let mut pending: Vec<ViewId> = Vec::new();
        while let Ok(id) = self.requests_rx.try_recv() {
            if !pending.contains(&id) {
                pending.push(id);
            }
        }

        let mut started = 0;
        for id in pending {
            let Some(view) = self.views.get(&id) else {
                continue;
            };
            let window = view.window();

            if let Some(previous) = self.in_flight.remove(&id) {
                previous.task.abort();
                debug!(view = %id, generation = previous.generation, "superseded in-flight fetch");
            }

            let generation = self.next_generation;
            self.next_generation += 1;

            let provider = Arc::clone(&self.provider);
            let reporter = FetchReporter {
                view: id,
                generation,
                results: Some(self.results_tx.clone()),
            };
            let task = tokio::spawn(async move {
                let outcome = provider.fetch_occurrences(window).await.map(|fetched| {
                    fetched
                        .into_iter()
                        .map(|f| {
                            let event = provider.resolve_event(&f.uid, f.recurrence_id.as_ref());
                            Occurrence::new(f, event)
                        })
                        .collect()
                });
                reporter.finish(outcome);
            });

            debug!(view = %id, generation, "agenda fetch started");
            self.in_flight.insert(id, InFlight { generation, task });
            started += 1;
        }
        started
    }

    /// Wait for the next fetch to complete and apply it to its view.
    ///
    /// Returns the id of the updated view, or `None` once nothing is queued
    /// or in flight. Failed fetches are logged and leave the view as it was.
    pub async fn next_update(&mut self) -> Option<ViewId> {
        loop {
            self.dispatch();
            if self.in_flight.is_empty() {
                return None;
            }

            let result = self.results_rx.recv().await?;

            let current = self
                .in_flight
                .get(&result.view)
                .is_some_and(|f| f.generation == result.generation);
            if !current {
                debug!(view = %result.view, generation = result.generation, "dropped stale fetch");
                continue;
            }
            self.in_flight.remove(&result.view);

            let Some(view) = self.views.get_mut(&result.view) else {
                continue;
            };

            match result.outcome {
                Ok(batch) => {
                    view.apply(batch);
                    return Some(result.view);
                }
                Err(e) => {
                    warn!(view = %result.view, error = %e, "agenda fetch failed");
                }
            }
        }
    }

    /// Apply updates until no request is queued or in flight.
    /// Returns how many updates were applied.
    pub async fn settle(&mut self) -> usize {
        let mut applied = 0;
        while self.next_update().await.is_some() {
            applied += 1;
        }
        applied
    }
}

impl<P: OccurrenceProvider> Drop for AgendaCoordinator<P> {
    fn drop(&mut self) {
        for (_, in_flight) in self.in_flight.drain() {
            in_flight.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::date_range::DateRange;
    use crate::filter::FilterMode;
    use crate::occurrence::tests::{at, info};
    use crate::provider::fake::FakeProvider;
    use crate::view::AgendaNotification;

    type Log = Rc<RefCell<Vec<AgendaNotification>>>;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn march_20() -> DateRange {
        DateRange::new(day(20), day(20))
    }

    fn provider() -> Arc<FakeProvider> {
        let provider = FakeProvider::default();
        provider.add(info("e1", "Standup", "work", false), at(10, 0), at(10, 15));
        provider.add(info("e2", "Lunch", "personal", false), at(12, 0), at(13, 0));
        provider.add(info("h1", "Holiday", "personal", true), at(0, 0), at(23, 0));
        Arc::new(provider)
    }

    fn logged_view(log: &Log, window: DateRange) -> AgendaViewBuilder {
        let sink = log.clone();
        AgendaViewBuilder::new(window).listener(move |n: AgendaNotification| sink.borrow_mut().push(n))
    }

    fn labels(view: &AgendaView) -> Vec<String> {
        view.iter().map(|o| o.label().to_string()).collect()
    }

    #[tokio::test]
    async fn first_load_is_explicit() {
        let provider = provider();
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let id = coordinator.create_view(AgendaViewBuilder::new(march_20()));

        assert_eq!(coordinator.next_update().await, None);
        assert_eq!(provider.fetch_count(), 0);

        assert!(coordinator.refresh(id));
        assert_eq!(coordinator.next_update().await, Some(id));

        let view = coordinator.view(id).unwrap();
        assert_eq!(labels(view), ["Holiday", "Standup", "Lunch"]);
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn repeated_requests_coalesce_into_one_fetch() {
        let provider = provider();
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let id = coordinator.create_view(AgendaViewBuilder::new(march_20()));

        coordinator.refresh(id);
        coordinator.refresh(id);
        let view = coordinator.view_mut(id).unwrap();
        view.set_filter_mode(FilterMode::ALL_DAY_ONLY);

        assert_eq!(coordinator.settle().await, 1);
        assert_eq!(provider.fetch_count(), 1);
        assert_eq!(labels(coordinator.view(id).unwrap()), ["Holiday"]);
    }

    #[tokio::test]
    async fn storage_changes_reconcile_incrementally() {
        let provider = provider();
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let log: Log = Rc::default();
        let id = coordinator.create_view(logged_view(&log, march_20()));
        coordinator.refresh(id);
        coordinator.settle().await;
        let standup = coordinator.view(id).unwrap().get(1).cloned().unwrap();
        log.borrow_mut().clear();

        provider.add(info("e3", "Review", "work", false), at(11, 0), at(11, 30));
        provider.reschedule("e2", at(12, 0), at(13, 30));
        coordinator.storage_modified();
        coordinator.settle().await;

        let view = coordinator.view(id).unwrap();
        assert_eq!(labels(view), ["Holiday", "Standup", "Review", "Lunch"]);
        assert!(Arc::ptr_eq(view.get(1).unwrap(), &standup));
        assert_eq!(
            *log.borrow(),
            [
                AgendaNotification::RowsInserted { start: 2, count: 2 },
                AgendaNotification::RowsRemoved { start: 4, count: 1 },
                AgendaNotification::CountChanged(4),
                AgendaNotification::Updated,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn newer_window_supersedes_slow_fetch() {
        let provider = provider();
        provider.slow_for(day(19));
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let log: Log = Rc::default();
        let id = coordinator.create_view(logged_view(&log, DateRange::new(day(19), day(20))));
        coordinator.refresh(id);

        let pending = tokio::time::timeout(Duration::from_secs(1), coordinator.next_update()).await;
        assert!(pending.is_err());

        coordinator.view_mut(id).unwrap().set_start_date(day(20));
        assert_eq!(coordinator.settle().await, 1);

        assert_eq!(provider.fetch_count(), 2);
        let view = coordinator.view(id).unwrap();
        assert_eq!(view.count(), 3);
        let updates = log
            .borrow()
            .iter()
            .filter(|n| **n == AgendaNotification::Updated)
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_view_discards_its_pending_fetch() {
        let provider = provider();
        provider.slow_for(day(19));
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let slow_log: Log = Rc::default();
        let slow = coordinator.create_view(logged_view(&slow_log, DateRange::new(day(19), day(20))));
        let fast = coordinator.create_view(AgendaViewBuilder::new(march_20()));
        coordinator.refresh(slow);
        coordinator.refresh(fast);

        assert_eq!(coordinator.next_update().await, Some(fast));
        let removed = coordinator.remove_view(slow);

        assert!(removed.is_some_and(|v| v.is_empty()));
        assert_eq!(coordinator.next_update().await, None);
        assert!(slow_log.borrow().is_empty());
        assert!(!coordinator.refresh(slow));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_view_untouched() {
        let provider = provider();
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let log: Log = Rc::default();
        let id = coordinator.create_view(logged_view(&log, march_20()));
        coordinator.refresh(id);
        coordinator.settle().await;
        log.borrow_mut().clear();

        provider.failing.store(true, Ordering::SeqCst);
        provider.remove("e1");
        coordinator.storage_modified();

        assert_eq!(coordinator.settle().await, 0);
        assert_eq!(coordinator.view(id).unwrap().count(), 3);
        assert!(log.borrow().is_empty());
    }

    #[tokio::test]
    async fn panicking_fetch_counts_as_failed() {
        let provider = provider();
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let log: Log = Rc::default();
        let id = coordinator.create_view(logged_view(&log, march_20()));

        provider.panicking.store(true, Ordering::SeqCst);
        coordinator.refresh(id);
        assert_eq!(coordinator.settle().await, 0);
        assert!(coordinator.is_idle());
        assert!(coordinator.view(id).unwrap().is_empty());
        assert!(log.borrow().is_empty());

        provider.panicking.store(false, Ordering::SeqCst);
        coordinator.refresh(id);
        assert_eq!(coordinator.settle().await, 1);
        assert_eq!(coordinator.view(id).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn unresolved_events_still_display() {
        let provider = provider();
        provider.forget("e2");
        let mut coordinator = AgendaCoordinator::with_shared(provider.clone());
        let id = coordinator.create_view(AgendaViewBuilder::new(march_20()));
        coordinator.refresh(id);
        coordinator.settle().await;

        let view = coordinator.view(id).unwrap();
        assert_eq!(view.count(), 3);
        assert_eq!(view.get(2).unwrap().uid, "e2");
        assert!(view.data(2, "event").is_none());
        assert!(view.data(2, "occurrence").is_some());
    }
}
