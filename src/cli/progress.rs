//! Live execution feedback on stderr.
//!
//! - Human mode: one line per change start and per file
//! - Robot mode: JSON event lines, one per execution event
//! - Quiet mode: nothing
//!
//! Final results go to stdout separately, so progress never mixes with
//! the `--json` envelope.

use std::io::{IsTerminal, Write};

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::executor::{EventSink, ExecutionEvent};
use crate::storage::FileStatus;

use super::output::file_status_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Human,
    Robot,
    Quiet,
}

impl ProgressMode {
    /// Human progress only makes sense on a terminal.
    #[must_use]
    pub fn detect(robot_mode: bool, quiet: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if robot_mode {
            Self::Robot
        } else if std::io::stderr().is_terminal() {
            Self::Human
        } else {
            Self::Quiet
        }
    }
}

#[derive(Serialize)]
struct TimedEvent<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a ExecutionEvent,
}

pub struct ProgressReporter {
    mode: ProgressMode,
}

impl ProgressReporter {
    #[must_use]
    pub const fn new(mode: ProgressMode) -> Self {
        Self { mode }
    }

    fn human_line(event: &ExecutionEvent) -> Option<String> {
        match event {
            ExecutionEvent::ChangeStart {
                name,
                direction,
                file_count,
            } => Some(format!(
                "{} {} {}",
                "→".cyan(),
                format!("{direction} {name}").bold(),
                format!("({file_count} files)").dimmed()
            )),
            ExecutionEvent::FileComplete {
                filepath,
                status: FileStatus::Skipped,
                ..
            } => Some(format!("  {} {}", "·".dimmed(), filepath.dimmed())),
            ExecutionEvent::FileComplete {
                filepath,
                status,
                duration_ms,
                ..
            } => Some(format!(
                "  {} {filepath} {}",
                file_status_label(*status),
                format!("{duration_ms} ms").dimmed()
            )),
            ExecutionEvent::ChangeComplete { .. } => None,
        }
    }
}

impl EventSink for ProgressReporter {
    fn emit(&self, event: &ExecutionEvent) {
        let line = match self.mode {
            ProgressMode::Quiet => return,
            ProgressMode::Human => Self::human_line(event),
            ProgressMode::Robot => serde_json::to_string(&TimedEvent {
                timestamp: Utc::now().to_rfc3339(),
                event,
            })
            .ok(),
        };
        if let Some(line) = line {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }
}
