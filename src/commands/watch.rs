use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use caldir_agenda_core::{AgendaCoordinator, AgendaListener, AgendaViewBuilder, DateRange};
use chrono::Local;
use owo_colors::OwoColorize;
use tracing::{debug, warn};

use crate::AgendaRequest;
use crate::render::Render;

/// Prints row changes as they are reconciled and remembers whether any
/// happened, so the agenda is only redrawn when it actually changed.
struct ChangePrinter {
    changed: Rc<Cell<bool>>,
}

impl AgendaListener for ChangePrinter {
    fn rows_inserted(&mut self, start: usize, count: usize) {
        self.changed.set(true);
        println!("{} {} at row {}", "+".green(), rows(count).green(), start);
    }

    fn rows_removed(&mut self, start: usize, count: usize) {
        self.changed.set(true);
        println!("{} {} at row {}", "-".red(), rows(count).red(), start);
    }

    fn window_changed(&mut self, window: &DateRange) {
        self.changed.set(true);
        println!("{} {}", "~".yellow(), format!("now showing {}", window.render()).yellow());
    }
}

fn rows(count: usize) -> String {
    if count == 1 {
        "1 row".to_string()
    } else {
        format!("{} rows", count)
    }
}

pub async fn run(request: AgendaRequest, interval: Duration) -> Result<()> {
    let provider = Arc::new(request.provider);
    let mut coordinator = AgendaCoordinator::with_shared(provider.clone());

    let changed = Rc::new(Cell::new(true));
    let id = coordinator.create_view(
        AgendaViewBuilder::new(request.window)
            .filter(request.filter)
            .listener(ChangePrinter {
                changed: changed.clone(),
            }),
    );
    coordinator.refresh(id);

    let mut fingerprint = provider.fingerprint()?;
    let mut ticker = tokio::time::interval(interval);

    loop {
        coordinator.settle().await;

        if changed.replace(false) {
            if let Some(view) = coordinator.view(id) {
                let status = format!(
                    "Updated {}, watching for changes (ctrl-c to stop)",
                    Local::now().format("%H:%M:%S")
                );
                println!("{}\n{}", view.render(), status.dimmed());
            }
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        if let Some(days) = request.follow_today {
            match DateRange::starting_at(Local::now().date_naive(), days) {
                Ok(today) => {
                    if let Some(view) = coordinator.view_mut(id) {
                        view.set_window(today);
                    }
                }
                Err(e) => warn!(error = %e, "could not roll the agenda window forward"),
            }
        }

        match provider.fingerprint() {
            Ok(current) if current != fingerprint => {
                debug!(?current, "calendar directory changed");
                fingerprint = current;
                coordinator.storage_modified();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not check calendar directory"),
        }
    }

    Ok(())
}
