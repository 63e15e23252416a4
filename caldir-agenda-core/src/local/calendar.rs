//! Calendar directories on disk.
//!
//! A caldir directory holds one subdirectory per calendar, each containing
//! one .ics file per event (overrides of a recurring series may live in the
//! master's file or in files of their own).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::error::{AgendaError, AgendaResult};
use crate::local::event::StoredEvent;
use crate::local::ics::parse_events;

#[derive(Debug, Clone)]
pub struct LocalCalendar {
    pub slug: String,
    pub path: PathBuf,
}

impl LocalCalendar {
    /// Discover calendars: visible subdirectories of `data_path`, by slug.
    pub fn discover(data_path: &Path) -> AgendaResult<Vec<LocalCalendar>> {
        let mut calendars: Vec<LocalCalendar> = std::fs::read_dir(data_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let slug = path.file_name()?.to_str()?.to_string();
                (!slug.starts_with('.')).then_some(LocalCalendar { slug, path })
            })
            .collect();

        calendars.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(calendars)
    }

    /// Event files of this calendar, in file name order.
    pub fn event_files(&self) -> AgendaResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "ics"))
            .collect();

        files.sort();
        Ok(files)
    }

    /// Load all events. Unreadable or malformed files are logged and skipped.
    pub fn events(&self) -> AgendaResult<Vec<StoredEvent>> {
        let mut events = Vec::new();

        for path in self.event_files()? {
            let parsed = std::fs::read_to_string(&path)
                .map_err(AgendaError::from)
                .and_then(|content| parse_events(&content));

            match parsed {
                Ok(mut file_events) => events.append(&mut file_events),
                Err(e) => warn!(calendar = %self.slug, path = %path.display(), error = %e, "skipping event file"),
            }
        }

        Ok(events)
    }

    /// Newest modification time among the directory and its event files.
    pub fn last_modified(&self) -> AgendaResult<Option<SystemTime>> {
        let dir_mtime = std::fs::metadata(&self.path)?.modified().ok();
        let newest_file = self
            .event_files()?
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok()?.modified().ok())
            .max();

        Ok(dir_mtime.max(newest_file))
    }
}
