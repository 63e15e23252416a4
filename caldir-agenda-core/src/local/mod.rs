//! Occurrence provider backed by a local caldir directory.

mod calendar;
mod event;
mod ics;
mod recurrence;

pub use calendar::LocalCalendar;
pub use event::{Recurrence, StoredEvent};
pub use ics::parse_events;
pub use recurrence::{Instance, expand_recurring_event};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::config::AgendaConfig;
use crate::date_range::DateRange;
use crate::error::{AgendaError, AgendaResult};
use crate::event::{EventInfo, EventTime};
use crate::occurrence::FetchedOccurrence;
use crate::provider::OccurrenceProvider;

type EventKey = (String, Option<String>);

/// Cheap summary of the directory state, compared to detect storage changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFingerprint {
    pub calendars: usize,
    pub newest: Option<SystemTime>,
}

/// Event table from one directory load, tagged with the load's sequence number.
#[derive(Default)]
struct EventIndex {
    load: u64,
    events: HashMap<EventKey, EventInfo>,
}

pub struct CaldirProvider {
    data_path: PathBuf,
    only: Option<Vec<String>>,
    loads: AtomicU64,
    index: RwLock<EventIndex>,
}

impl CaldirProvider {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        CaldirProvider {
            data_path: data_path.into(),
            only: None,
            loads: AtomicU64::new(0),
            index: RwLock::new(EventIndex::default()),
        }
    }

    pub fn from_config(config: &AgendaConfig) -> Self {
        Self::new(config.data_path())
    }

    /// Restrict the provider to the given calendar slugs.
    pub fn only_calendars(mut self, slugs: Vec<String>) -> Self {
        self.only = Some(slugs);
        self
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn calendars(&self) -> AgendaResult<Vec<LocalCalendar>> {
        discover(&self.data_path, self.only.as_deref())
    }

    pub fn fingerprint(&self) -> AgendaResult<StorageFingerprint> {
        let calendars = self.calendars()?;
        let mut newest = std::fs::metadata(&self.data_path)?.modified().ok();
        for calendar in &calendars {
            newest = newest.max(calendar.last_modified()?);
        }

        Ok(StorageFingerprint {
            calendars: calendars.len(),
            newest,
        })
    }

    /// Install the event table of load number `load`, unless a later load
    /// already installed its own. Concurrent fetches may finish out of order.
    fn store_index(&self, load: u64, events: HashMap<EventKey, EventInfo>) -> bool {
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if load <= guard.load {
            debug!(load, current = guard.load, "kept newer event index");
            return false;
        }
        *guard = EventIndex { load, events };
        true
    }
}

impl OccurrenceProvider for CaldirProvider {
    async fn fetch_occurrences(&self, range: DateRange) -> AgendaResult<Vec<FetchedOccurrence>> {
        let data_path = self.data_path.clone();
        let only = self.only.clone();
        let load_id = self.loads.fetch_add(1, Ordering::SeqCst) + 1;

        let (occurrences, index) =
            tokio::task::spawn_blocking(move || load(&data_path, only.as_deref(), range))
                .await
                .map_err(|e| AgendaError::Provider(format!("calendar load task failed: {e}")))??;

        debug!(
            occurrences = occurrences.len(),
            events = index.len(),
            start = %range.start,
            end = %range.end,
            "loaded caldir occurrences"
        );

        self.store_index(load_id, index);

        Ok(occurrences)
    }

    fn resolve_event(&self, uid: &str, recurrence_id: Option<&EventTime>) -> Option<EventInfo> {
        let key = (uid.to_string(), recurrence_id.map(EventTime::to_ics_string));
        let index = self.index.read().ok()?;
        index.events.get(&key).cloned()
    }
}

fn discover(data_path: &Path, only: Option<&[String]>) -> AgendaResult<Vec<LocalCalendar>> {
    if !data_path.is_dir() {
        return Err(AgendaError::CalendarDirNotFound(
            data_path.display().to_string(),
        ));
    }

    let mut calendars = LocalCalendar::discover(data_path)?;
    if let Some(slugs) = only {
        calendars.retain(|c| slugs.contains(&c.slug));
    }
    Ok(calendars)
}

/// Read every calendar and list the occurrences overlapping `range`.
///
/// Occurrences come out calendar by calendar (by slug), then in file order,
/// with the instances of a series in chronological order. The returned
/// index covers every event on disk, not just those in range.
fn load(
    data_path: &Path,
    only: Option<&[String]>,
    range: DateRange,
) -> AgendaResult<(Vec<FetchedOccurrence>, HashMap<EventKey, EventInfo>)> {
    let mut occurrences = Vec::new();
    let mut index = HashMap::new();
    let (range_start, range_end) = (range.start_utc(), range.end_utc());

    for calendar in discover(data_path, only)? {
        let events = match calendar.events() {
            Ok(events) => events,
            Err(e) => {
                warn!(calendar = %calendar.slug, error = %e, "skipping unreadable calendar");
                continue;
            }
        };

        let mut overrides: HashMap<&str, HashMap<String, &StoredEvent>> = HashMap::new();
        for event in &events {
            if let Some(rid) = &event.recurrence_id {
                overrides
                    .entry(event.uid.as_str())
                    .or_default()
                    .insert(rid.to_ics_string(), event);
            }
        }

        for event in &events {
            if event.cancelled {
                continue;
            }
            index.insert(event.key(), event.info(&calendar.slug));

            if event.recurrence.is_some() {
                let no_overrides = HashMap::new();
                let series_overrides = overrides.get(event.uid.as_str()).unwrap_or(&no_overrides);
                match expand_recurring_event(event, range_start, range_end, series_overrides) {
                    Ok(instances) => occurrences.extend(
                        instances
                            .into_iter()
                            .filter(|i| range.overlaps(i.start, i.end))
                            .map(|i| FetchedOccurrence {
                                uid: i.event.uid.clone(),
                                recurrence_id: None,
                                start: i.start,
                                end: i.end,
                            }),
                    ),
                    Err(e) => warn!(calendar = %calendar.slug, uid = %event.uid, error = %e, "skipping series"),
                }
                continue;
            }

            let Some((start, end)) = event.utc_span() else {
                warn!(calendar = %calendar.slug, uid = %event.uid, "skipping event with unknown timezone");
                continue;
            };
            if range.overlaps(start, end) {
                occurrences.push(FetchedOccurrence {
                    uid: event.uid.clone(),
                    recurrence_id: event.recurrence_id.clone(),
                    start,
                    end,
                });
            }
        }
    }

    Ok((occurrences, index))
}
