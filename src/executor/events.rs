//! Progress notifications emitted while changes execute.

use serde::Serialize;

use crate::change::Direction;
use crate::storage::{FileStatus, OperationStatus};

/// One lifecycle step of an operation. Observers cannot influence execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ChangeStart {
        name: String,
        direction: Direction,
        file_count: usize,
    },
    FileComplete {
        name: String,
        direction: Direction,
        filepath: String,
        status: FileStatus,
        duration_ms: u64,
    },
    ChangeComplete {
        name: String,
        direction: Direction,
        status: OperationStatus,
        duration_ms: u64,
    },
}

impl ExecutionEvent {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ChangeStart { name, .. }
            | Self::FileComplete { name, .. }
            | Self::ChangeComplete { name, .. } => name,
        }
    }
}

/// Receiver of [`ExecutionEvent`]s.
pub trait EventSink {
    fn emit(&self, event: &ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ExecutionEvent) {}
}

impl<F> EventSink for F
where
    F: Fn(&ExecutionEvent),
{
    fn emit(&self, event: &ExecutionEvent) {
        self(event);
    }
}
