//! Executes change files against the target database.
//!
//! One call processes one change in one direction. Files run strictly in
//! sequence order; the first failure stops the run and every later file is
//! recorded as skipped. History is written as each file finishes rather
//! than at the end, so an interrupted run shows exactly where it stopped.

mod events;
mod plan;
mod render;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::change::{Change, Direction, FileKind};
use crate::error::Result;
use crate::storage::{
    ChangeStatus, FileScope, FileStatus, HistoryTracker, NewFileRecord, NewOperation, OperationKind,
    OperationStatus,
};

pub use events::{EventSink, ExecutionEvent, NullSink};
pub(crate) use plan::display_path;
pub use plan::{PlannedFile, combined_checksum, file_checksum, manifest_checksum};
pub use render::{RenderContext, SqlRenderer, TemplateRenderer};

/// Skip reason for files whose checksum matches their last execution.
pub const SKIP_UNCHANGED: &str = "unchanged";
/// Skip reason for files after a failure in the same operation.
pub const SKIP_PREVIOUS_FAILED: &str = "previous file failed";

/// Everything an execution borrows from its caller.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub conn: &'a Connection,
    /// Partition key for history and locks.
    pub target: &'a str,
    /// Audit string stored as `executed_by`.
    pub identity: &'a str,
    pub project_root: &'a Path,
    pub schema_root: &'a Path,
    pub renderer: &'a dyn SqlRenderer,
    pub events: &'a dyn EventSink,
}

impl<'a> ExecutionContext<'a> {
    #[must_use]
    pub const fn history(&self) -> HistoryTracker<'a> {
        HistoryTracker::new(self.conn, self.target)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run even when history says the change or file is up to date.
    pub force: bool,
    /// Render and report without executing or writing history.
    pub dry_run: bool,
    /// Like `dry_run`, and keep the rendered SQL in the results.
    pub preview: bool,
}

impl ExecuteOptions {
    #[must_use]
    pub const fn inspect_only(self) -> bool {
        self.dry_run || self.preview
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    pub filepath: String,
    pub kind: FileKind,
    pub status: FileStatus,
    pub checksum: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Final SQL, kept only in preview mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

impl FileResult {
    fn new(file: &PlannedFile, status: FileStatus) -> Self {
        Self {
            filepath: file.filepath.clone(),
            kind: file.kind,
            status,
            checksum: file.checksum.clone(),
            duration_ms: 0,
            skip_reason: None,
            error: None,
            rendered: None,
        }
    }

    fn skipped(file: &PlannedFile, reason: &str) -> Self {
        Self {
            skip_reason: Some(reason.to_string()),
            ..Self::new(file, FileStatus::Skipped)
        }
    }

    fn as_record(&self) -> NewFileRecord<'_> {
        NewFileRecord {
            filepath: &self.filepath,
            file_kind: self.kind,
            checksum: &self.checksum,
            status: self.status,
            skip_reason: self.skip_reason.as_deref(),
            error_message: self.error.as_deref(),
            duration_ms: millis_i64(self.duration_ms),
        }
    }
}

/// Outcome of one change (or build/run) in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeResult {
    pub name: String,
    pub direction: Direction,
    pub status: OperationStatus,
    /// History row, absent for dry runs and up-to-date short circuits.
    pub operation_id: Option<i64>,
    pub checksum: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub files: Vec<FileResult>,
    /// History already showed this exact change applied in this direction.
    pub up_to_date: bool,
    pub dry_run: bool,
}

impl ChangeResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// Files that ran (successfully or not).
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status != FileStatus::Skipped)
            .count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.files.len() - self.executed_count()
    }
}

/// Identifies the operation a file list belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OperationInfo<'s> {
    pub name: &'s str,
    pub kind: OperationKind,
    pub direction: Direction,
    pub checksum: &'s str,
    pub scope: FileScope<'s>,
}

/// Applies and reverts single changes.
pub struct Executor<'a> {
    ctx: ExecutionContext<'a>,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub const fn new(ctx: ExecutionContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn execute_change(&self, change: &Change, opts: ExecuteOptions) -> Result<ChangeResult> {
        self.execute(change, Direction::Change, opts)
    }

    pub fn revert_change(&self, change: &Change, opts: ExecuteOptions) -> Result<ChangeResult> {
        self.execute(change, Direction::Revert, opts)
    }

    /// Hash every file of `change` in `direction`, in execution order.
    pub fn plan(&self, change: &Change, direction: Direction) -> Result<Vec<PlannedFile>> {
        change
            .files(direction)
            .iter()
            .map(|file| {
                PlannedFile::load(&file.path, file.kind, self.ctx.project_root, self.ctx.schema_root)
            })
            .collect()
    }

    /// Run one direction of a change.
    ///
    /// Structural problems (unreadable files, broken manifests) return `Err`
    /// before any history is written. SQL and render failures are captured
    /// in the returned result and in history instead.
    pub fn execute(
        &self,
        change: &Change,
        direction: Direction,
        opts: ExecuteOptions,
    ) -> Result<ChangeResult> {
        let plan = self.plan(change, direction)?;
        let checksum = combined_checksum(&plan);
        let history = self.ctx.history();

        if !opts.force {
            if let Some(status) = history.get_status(&change.name)? {
                let applied = status.last_direction == direction
                    && status.last_checksum == checksum
                    && matches!(
                        (direction, status.status),
                        (Direction::Change, ChangeStatus::Success)
                            | (Direction::Revert, ChangeStatus::Reverted)
                    );
                if applied {
                    info!(change = %change.name, %direction, "already up to date");
                    return Ok(up_to_date(&self.ctx, &change.name, direction, checksum, opts));
                }
            }
        }

        let after_operation = history
            .last_success_id(OperationKind::Change, &change.name, direction.opposite())?
            .unwrap_or(0);
        let op = OperationInfo {
            name: &change.name,
            kind: OperationKind::Change,
            direction,
            checksum: &checksum,
            scope: FileScope {
                kind: OperationKind::Change,
                name: Some(&change.name),
                direction,
                after_operation,
            },
        };
        run_operation(&self.ctx, &op, &plan, opts)
    }
}

fn up_to_date(
    ctx: &ExecutionContext<'_>,
    name: &str,
    direction: Direction,
    checksum: String,
    opts: ExecuteOptions,
) -> ChangeResult {
    ctx.events.emit(&ExecutionEvent::ChangeStart {
        name: name.to_string(),
        direction,
        file_count: 0,
    });
    ctx.events.emit(&ExecutionEvent::ChangeComplete {
        name: name.to_string(),
        direction,
        status: OperationStatus::Success,
        duration_ms: 0,
    });
    ChangeResult {
        name: name.to_string(),
        direction,
        status: OperationStatus::Success,
        operation_id: None,
        checksum,
        duration_ms: 0,
        error: None,
        files: Vec::new(),
        up_to_date: true,
        dry_run: opts.inspect_only(),
    }
}

/// Process `plan` in order as one operation.
pub(crate) fn run_operation(
    ctx: &ExecutionContext<'_>,
    op: &OperationInfo<'_>,
    plan: &[PlannedFile],
    opts: ExecuteOptions,
) -> Result<ChangeResult> {
    let started = Instant::now();
    let history = ctx.history();
    let operation_id = if opts.inspect_only() {
        None
    } else {
        Some(history.create_operation(&NewOperation {
            name: op.name,
            kind: op.kind,
            direction: op.direction,
            checksum: op.checksum,
            executed_by: ctx.identity,
        })?)
    };

    ctx.events.emit(&ExecutionEvent::ChangeStart {
        name: op.name.to_string(),
        direction: op.direction,
        file_count: plan.len(),
    });

    let mut files = Vec::with_capacity(plan.len());
    let mut failure: Option<String> = None;
    for file in plan {
        let file_started = Instant::now();
        let mut result = if failure.is_some() {
            FileResult::skipped(file, SKIP_PREVIOUS_FAILED)
        } else if !opts.force && !history.needs_run(&op.scope, &file.filepath, &file.checksum)? {
            debug!(file = %file.filepath, "unchanged, skipping");
            FileResult::skipped(file, SKIP_UNCHANGED)
        } else {
            match run_file(ctx, file, opts) {
                Ok(rendered) => FileResult {
                    rendered: opts.preview.then_some(rendered),
                    ..FileResult::new(file, FileStatus::Success)
                },
                Err(message) => {
                    warn!(file = %file.filepath, "file failed: {message}");
                    failure = Some(format!("{}: {message}", file.filepath));
                    FileResult {
                        error: Some(message),
                        ..FileResult::new(file, FileStatus::Failed)
                    }
                }
            }
        };
        result.duration_ms = millis(file_started.elapsed());

        if let Some(id) = operation_id {
            history.record_file(id, &result.as_record())?;
        }
        ctx.events.emit(&ExecutionEvent::FileComplete {
            name: op.name.to_string(),
            direction: op.direction,
            filepath: result.filepath.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
        });
        files.push(result);
    }

    let status = if failure.is_some() {
        OperationStatus::Failed
    } else {
        OperationStatus::Success
    };
    let duration_ms = millis(started.elapsed());
    if let Some(id) = operation_id {
        history.finish_operation(id, status, millis_i64(duration_ms), failure.as_deref())?;
    }
    ctx.events.emit(&ExecutionEvent::ChangeComplete {
        name: op.name.to_string(),
        direction: op.direction,
        status,
        duration_ms,
    });
    info!(
        name = op.name,
        kind = op.kind.as_str(),
        direction = %op.direction,
        status = status.as_str(),
        duration_ms,
        "operation finished"
    );

    Ok(ChangeResult {
        name: op.name.to_string(),
        direction: op.direction,
        status,
        operation_id,
        checksum: op.checksum.to_string(),
        duration_ms,
        error: failure,
        files,
        up_to_date: false,
        dry_run: opts.inspect_only(),
    })
}

/// Render and (unless inspecting) execute every source of one file.
///
/// Returns the rendered SQL, or the failure message.
fn run_file(
    ctx: &ExecutionContext<'_>,
    file: &PlannedFile,
    opts: ExecuteOptions,
) -> std::result::Result<String, String> {
    let mut rendered_all = Vec::with_capacity(file.sources.len());
    for source in &file.sources {
        let label = || {
            if file.sources.len() > 1 || source != &file.path {
                format!("{}: ", display_path(source, ctx.schema_root))
            } else {
                String::new()
            }
        };
        let text = fs::read_to_string(source).map_err(|err| format!("{}{err}", label()))?;
        let sql = ctx
            .renderer
            .render(source, &text)
            .map_err(|err| format!("{}{err}", label()))?;
        if !opts.inspect_only() {
            if let Err(err) = ctx.conn.execute_batch(&sql) {
                rollback_open_transaction(ctx.conn);
                return Err(format!("{}{err}", label()));
            }
            if !ctx.conn.is_autocommit() {
                rollback_open_transaction(ctx.conn);
                return Err(format!("{}transaction left open, rolled back", label()));
            }
        }
        rendered_all.push(sql);
    }
    Ok(rendered_all.join("\n"))
}

/// Abort a transaction a failed file opened, so history writes and the lock
/// release run outside of it.
fn rollback_open_transaction(conn: &Connection) {
    if conn.is_autocommit() {
        return;
    }
    warn!("file left a transaction open, rolling back");
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        warn!("rollback failed: {err}");
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn millis_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
