//! Terminal rendering of agenda views using owo_colors.

use caldir_agenda_core::{AgendaView, DateRange, FilterMode, Occurrence};
use chrono::{Local, NaiveDate};
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Occurrence {
    fn render(&self) -> String {
        let time = if self.all_day() {
            format!("{:>7}", "all-day")
        } else {
            format!("{:>7}", self.start.with_timezone(&Local).format("%H:%M"))
        };

        match self.calendar() {
            Some(calendar) => {
                let tag = format!("[{}]", calendar);
                format!("{} {} {}", time, self, tag.dimmed())
            }
            None => format!("{} {}", time, self.to_string().dimmed()),
        }
    }
}

impl Render for DateRange {
    fn render(&self) -> String {
        if self.start == self.end {
            return self.start.format("%a %b %-d").to_string();
        }
        format!(
            "{} - {}",
            self.start.format("%a %b %-d"),
            self.end.format("%a %b %-d")
        )
    }
}

impl Render for AgendaView {
    /// Rows grouped under a heading per day.
    fn render(&self) -> String {
        let mut lines = vec![header(self.window(), self.filter_mode())];

        if self.is_empty() {
            lines.push(format!("  {}", "No events found".dimmed()));
            return lines.join("\n");
        }

        let mut current: Option<NaiveDate> = None;
        for occurrence in self.iter() {
            let bucket = occurrence.section_bucket();
            if current != Some(bucket) {
                lines.push(String::new());
                lines.push(format_date_label(bucket).bold().to_string());
                current = Some(bucket);
            }
            lines.push(format!("  {}", occurrence.render()));
        }

        lines.join("\n")
    }
}

fn header(window: DateRange, filter: FilterMode) -> String {
    let title = format!("Agenda {}", window.render());
    if filter.is_none() {
        return title.bold().to_string();
    }
    format!("{} {}", title.bold(), format!("({})", filter).dimmed())
}

/// Format a date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
fn format_date_label(date: NaiveDate) -> String {
    let today = Local::now().date_naive();

    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}
