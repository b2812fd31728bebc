//! Change orchestration: listing, single runs and reverts, batches.
//!
//! The manager never takes the lease lock itself; callers wrap mutating
//! calls in [`LockManager::with_lock`](crate::storage::LockManager::with_lock)
//! so the lock covers the whole read-check-act sequence.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::change::{Change, ChangeParser, ChangeScaffold, Direction, change_dir};
use crate::error::{Result, ShiftError};
use crate::executor::{ChangeResult, ExecuteOptions, ExecutionContext, Executor};
use crate::storage::{ChangeStatus, FileRecord, OperationRecord, OperationStatus};

/// A change as seen from disk and history together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeListItem {
    pub name: String,
    pub status: ChangeStatus,
    /// On disk with no history yet.
    pub is_new: bool,
    /// In history with no folder on disk.
    pub orphaned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_changelog: Option<bool>,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
    #[serde(skip)]
    applied_operation_id: Option<i64>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ChangeListItem {
    fn from_disk(change: &Change) -> Self {
        Self {
            name: change.name.clone(),
            status: ChangeStatus::Pending,
            is_new: true,
            orphaned: false,
            path: Some(change.path.clone()),
            date: change.date,
            description: Some(change.description.clone()),
            change_files: Some(change.change_files.len()),
            revert_files: Some(change.revert_files.len()),
            has_changelog: Some(change.has_changelog),
            applied_at: None,
            applied_by: None,
            applied_operation_id: None,
            reverted_at: None,
            error_message: None,
        }
    }

    fn orphan(name: String) -> Self {
        Self {
            name,
            status: ChangeStatus::Pending,
            is_new: false,
            orphaned: true,
            path: None,
            date: None,
            description: None,
            change_files: None,
            revert_files: None,
            has_changelog: None,
            applied_at: None,
            applied_by: None,
            applied_operation_id: None,
            reverted_at: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub execute: ExecuteOptions,
    /// Stop at the first failed change.
    pub abort_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            execute: ExecuteOptions::default(),
            abort_on_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub direction: Direction,
    /// One entry per attempted change, in execution order.
    pub results: Vec<ChangeResult>,
    /// Changes that ran to success.
    pub succeeded: usize,
    pub failed: usize,
    /// Changes history already showed as done.
    pub skipped: usize,
    /// Selected changes left untouched after an abort.
    pub not_attempted: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn new(direction: Direction) -> Self {
        Self {
            status: BatchStatus::Success,
            direction,
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            not_attempted: Vec::new(),
            duration_ms: 0,
            error: None,
        }
    }

    fn push(&mut self, result: ChangeResult) {
        if !result.is_success() {
            self.failed += 1;
        } else if result.up_to_date {
            self.skipped += 1;
        } else {
            self.succeeded += 1;
        }
        self.results.push(result);
    }

    fn finish(mut self, started: Instant) -> Self {
        self.status = match (self.succeeded, self.failed) {
            (_, 0) => BatchStatus::Success,
            (0, _) => BatchStatus::Failed,
            _ => BatchStatus::Partial,
        };
        self.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// How far `rewind` goes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewindTarget {
    /// The N most recently applied changes.
    Count(usize),
    /// Every applied change back to and including this one.
    Name(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub disk: bool,
    pub db: bool,
    /// Allow deleting the folder of an applied change while keeping its history.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoveResult {
    pub folder_removed: bool,
    pub records_removed: usize,
}

pub struct ChangeManager<'a> {
    ctx: ExecutionContext<'a>,
    changes_root: &'a Path,
}

impl<'a> ChangeManager<'a> {
    #[must_use]
    pub const fn new(ctx: ExecutionContext<'a>, changes_root: &'a Path) -> Self {
        Self { ctx, changes_root }
    }

    /// Every change on disk plus orphans from history, sorted by name.
    ///
    /// Only history entries whose folder is gone are orphans. A folder that
    /// exists but does not parse is left out entirely; `load` reports why.
    pub fn list(&self) -> Result<Vec<ChangeListItem>> {
        let history = self.ctx.history();
        let changes = ChangeParser::discover(self.changes_root)?;
        let mut statuses = history.get_all_statuses()?;

        let disk_names = ChangeParser::folder_names(self.changes_root)?;
        let mut items: Vec<ChangeListItem> = changes.iter().map(ChangeListItem::from_disk).collect();
        items.extend(
            history
                .get_orphaned(&disk_names)?
                .into_iter()
                .map(ChangeListItem::orphan),
        );

        for item in &mut items {
            if let Some(record) = statuses.remove(&item.name) {
                item.is_new = false;
                item.status = record.status;
                item.applied_at = record.applied_at;
                item.applied_by = record.applied_by;
                item.applied_operation_id = record.applied_operation_id;
                item.reverted_at = record.reverted_at;
                item.error_message = record.error_message;
            }
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    /// Parse one change by folder name.
    ///
    /// A missing folder is reported as orphaned when history knows the name.
    pub fn load(&self, name: &str) -> Result<Change> {
        match ChangeParser::parse(&change_dir(self.changes_root, name)?) {
            Ok(change) => Ok(change),
            Err(ShiftError::ChangeNotFound(_)) => {
                if self.ctx.history().get_status(name)?.is_some() {
                    Err(ShiftError::Orphaned(name.to_string()))
                } else {
                    Err(ShiftError::ChangeNotFound(name.to_string()))
                }
            }
            Err(err) => Err(err),
        }
    }

    pub fn run(&self, name: &str, opts: ExecuteOptions) -> Result<ChangeResult> {
        let change = self.load(name)?;
        Executor::new(self.ctx).execute_change(&change, opts)
    }

    /// Revert one change. Without `force`, the change must have been applied.
    pub fn revert(&self, name: &str, opts: ExecuteOptions) -> Result<ChangeResult> {
        let change = self.load(name)?;
        if !opts.force {
            let applied = self
                .ctx
                .history()
                .get_status(name)?
                .is_some_and(|s| s.applied_at.is_some() || s.status == ChangeStatus::Failed);
            if !applied {
                return Err(ShiftError::NotApplied(name.to_string()));
            }
        }
        Executor::new(self.ctx).revert_change(&change, opts)
    }

    /// Apply the first `count` outstanding changes in name order.
    pub fn next(&self, count: usize, opts: BatchOptions) -> Result<BatchResult> {
        let names: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|item| !item.orphaned && item.status.is_outstanding())
            .take(count)
            .map(|item| item.name)
            .collect();
        Ok(self.batch(Direction::Change, names, opts))
    }

    /// Apply every outstanding change.
    pub fn ff(&self, opts: BatchOptions) -> Result<BatchResult> {
        let outstanding = self
            .list()?
            .iter()
            .filter(|item| !item.orphaned && item.status.is_outstanding())
            .count();
        self.next(outstanding, opts)
    }

    /// Revert applied changes, most recently applied first.
    pub fn rewind(&self, target: &RewindTarget, opts: BatchOptions) -> Result<BatchResult> {
        let mut candidates: Vec<ChangeListItem> = self
            .list()?
            .into_iter()
            .filter(|item| !item.orphaned && item.status == ChangeStatus::Success)
            .collect();
        candidates.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then(b.applied_operation_id.cmp(&a.applied_operation_id))
        });

        let selected: Vec<String> = match target {
            RewindTarget::Count(count) => candidates
                .into_iter()
                .take(*count)
                .map(|item| item.name)
                .collect(),
            RewindTarget::Name(name) => {
                let Some(pos) = candidates.iter().position(|item| &item.name == name) else {
                    let mut result = BatchResult::new(Direction::Revert);
                    result.error = Some(format!("'{name}' is not an applied change"));
                    result.status = BatchStatus::Failed;
                    return Ok(result);
                };
                candidates
                    .into_iter()
                    .take(pos + 1)
                    .map(|item| item.name)
                    .collect()
            }
        };
        Ok(self.batch(Direction::Revert, selected, opts))
    }

    /// Operations most recent first.
    pub fn history(&self, name: Option<&str>, limit: Option<usize>) -> Result<Vec<OperationRecord>> {
        self.ctx.history().get_history(name, limit)
    }

    pub fn file_history(&self, operation_id: i64) -> Result<Vec<FileRecord>> {
        self.ctx.history().get_file_history(operation_id)
    }

    /// Delete a change's folder, its history, or both.
    pub fn remove(&self, name: &str, opts: RemoveOptions) -> Result<RemoveResult> {
        if !opts.disk && !opts.db {
            return Err(ShiftError::Validation(
                "nothing to remove: choose the folder, the history, or both".to_string(),
            ));
        }
        let path = change_dir(self.changes_root, name)?;
        let history = self.ctx.history();
        let status = history.get_status(name)?;

        if opts.disk && !opts.db && !opts.force {
            if let Some(status) = &status {
                if status.status == ChangeStatus::Success {
                    return Err(ShiftError::AlreadyApplied(name.to_string()));
                }
            }
        }
        if status.is_none() && !path.is_dir() {
            return Err(ShiftError::ChangeNotFound(name.to_string()));
        }

        let mut result = RemoveResult {
            folder_removed: false,
            records_removed: 0,
        };
        if opts.disk {
            if path.is_dir() {
                ChangeScaffold::delete(&path)?;
                result.folder_removed = true;
            } else {
                info!(change = name, "folder already absent");
            }
        }
        if opts.db {
            result.records_removed = history.delete_records(name)?;
        }
        Ok(result)
    }

    fn batch(&self, direction: Direction, names: Vec<String>, opts: BatchOptions) -> BatchResult {
        let started = Instant::now();
        let mut batch = BatchResult::new(direction);
        let mut remaining = names.into_iter();

        while let Some(name) = remaining.next() {
            let outcome = match direction {
                Direction::Change => self.run(&name, opts.execute),
                Direction::Revert => self.revert(&name, opts.execute),
            };
            let result = outcome.unwrap_or_else(|err| {
                warn!(change = %name, %direction, "change could not start: {err}");
                failed_to_start(&name, direction, &err)
            });
            let failed = !result.is_success();
            batch.push(result);

            if failed && opts.abort_on_error {
                batch.not_attempted = remaining.by_ref().collect();
                batch.error = Some(format!("stopped after '{name}' failed"));
                break;
            }
        }
        batch.finish(started)
    }
}

fn failed_to_start(name: &str, direction: Direction, err: &ShiftError) -> ChangeResult {
    ChangeResult {
        name: name.to_string(),
        direction,
        status: OperationStatus::Failed,
        operation_id: None,
        checksum: String::new(),
        duration_ms: 0,
        error: Some(err.to_string()),
        files: Vec::new(),
        up_to_date: false,
        dry_run: false,
    }
}
