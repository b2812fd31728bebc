//! Execution history.
//!
//! Two tables: `shift_operations` holds one row per execution attempt of a
//! change, a build, or an ad-hoc run; `shift_file_executions` holds one row
//! per file inside that attempt. Every query is partitioned by target.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::{Direction, FileKind};
use crate::error::{Result, ShiftError};

use super::sqlite::{format_timestamp, opt_timestamp_at, timestamp_at};

/// What an operation row executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Change,
    Build,
    Run,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Build => "build",
            Self::Run => "run",
        }
    }
}

/// Lifecycle of one operation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Written before the first file runs; left behind only by a crash.
    Pending,
    Success,
    Failed,
}

impl OperationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
    Skipped,
}

impl FileStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical state of a change, derived from its latest operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Success,
    Failed,
    Reverted,
}

impl ChangeStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Reverted => "reverted",
        }
    }

    /// Pending and reverted changes are what `next`/`ff` pick up.
    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Reverted)
    }

    const fn from_operation(direction: Direction, status: OperationStatus) -> Self {
        match (direction, status) {
            (_, OperationStatus::Pending) => Self::Pending,
            (_, OperationStatus::Failed) => Self::Failed,
            (Direction::Change, OperationStatus::Success) => Self::Success,
            (Direction::Revert, OperationStatus::Success) => Self::Reverted,
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of one change under the tracker's target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatusRecord {
    pub name: String,
    pub status: ChangeStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
    /// Operation id of the last successful apply; breaks `applied_at` ties.
    pub applied_operation_id: Option<i64>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// The latest operation, whatever its outcome.
    pub last_operation_id: i64,
    pub last_direction: Direction,
    pub last_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    pub name: String,
    pub kind: OperationKind,
    pub direction: Direction,
    pub status: OperationStatus,
    pub target: String,
    pub executed_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub checksum: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub operation_id: i64,
    pub filepath: String,
    pub file_kind: FileKind,
    pub checksum: String,
    pub status: FileStatus,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub executed_at: DateTime<Utc>,
}

/// Fields supplied when opening an operation.
#[derive(Debug, Clone, Copy)]
pub struct NewOperation<'a> {
    pub name: &'a str,
    pub kind: OperationKind,
    pub direction: Direction,
    pub checksum: &'a str,
    pub executed_by: &'a str,
}

/// Fields supplied when recording a file outcome.
#[derive(Debug, Clone, Copy)]
pub struct NewFileRecord<'a> {
    pub filepath: &'a str,
    pub file_kind: FileKind,
    pub checksum: &'a str,
    pub status: FileStatus,
    pub skip_reason: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub duration_ms: i64,
}

/// Which earlier file records count when deciding whether a file must run.
#[derive(Debug, Clone, Copy)]
pub struct FileScope<'a> {
    pub kind: OperationKind,
    /// Restrict to operations with this name. `None` matches any name.
    pub name: Option<&'a str>,
    pub direction: Direction,
    /// Only operations with a larger id are considered.
    pub after_operation: i64,
}

const OPERATION_COLUMNS: &str = "id, name, kind, direction, status, target, executed_by, \
     started_at, completed_at, duration_ms, checksum, error_message";

const FILE_COLUMNS: &str = "id, operation_id, filepath, file_kind, checksum, status, \
     skip_reason, error_message, duration_ms, executed_at";

/// Reads and writes history rows for one target.
pub struct HistoryTracker<'a> {
    conn: &'a Connection,
    target: &'a str,
}

impl<'a> HistoryTracker<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, target: &'a str) -> Self {
        Self { conn, target }
    }

    #[must_use]
    pub const fn target(&self) -> &str {
        self.target
    }

    /// Open an operation in `pending` state and return its id.
    pub fn create_operation(&self, op: &NewOperation<'_>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO shift_operations \
             (name, kind, direction, status, target, executed_by, started_at, checksum) \
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7)",
            params![
                op.name,
                op.kind.as_str(),
                op.direction.as_str(),
                self.target,
                op.executed_by,
                format_timestamp(Utc::now()),
                op.checksum,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(
            operation_id = id,
            name = op.name,
            kind = op.kind.as_str(),
            direction = op.direction.as_str(),
            "opened operation"
        );
        Ok(id)
    }

    /// Close an operation with its final status.
    pub fn finish_operation(
        &self,
        id: i64,
        status: OperationStatus,
        duration_ms: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE shift_operations \
             SET status = ?1, completed_at = ?2, duration_ms = ?3, error_message = ?4 \
             WHERE id = ?5",
            params![
                status.as_str(),
                format_timestamp(Utc::now()),
                duration_ms,
                error_message,
                id,
            ],
        )?;
        if updated == 0 {
            return Err(ShiftError::Validation(format!("operation {id} does not exist")));
        }
        debug!(operation_id = id, status = status.as_str(), "closed operation");
        Ok(())
    }

    pub fn record_file(&self, operation_id: i64, file: &NewFileRecord<'_>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO shift_file_executions \
             (operation_id, filepath, file_kind, checksum, status, skip_reason, \
              error_message, duration_ms, executed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                operation_id,
                file.filepath,
                file.file_kind.as_str(),
                file.checksum,
                file.status.as_str(),
                file.skip_reason,
                file.error_message,
                file.duration_ms,
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Latest status per change name. Last write wins.
    pub fn get_all_statuses(&self) -> Result<HashMap<String, ChangeStatusRecord>> {
        let operations = self.change_operations(None)?;
        Ok(fold_statuses(operations))
    }

    pub fn get_status(&self, name: &str) -> Result<Option<ChangeStatusRecord>> {
        let operations = self.change_operations(Some(name))?;
        Ok(fold_statuses(operations).remove(name))
    }

    /// Names with change history that are absent from `disk_names`, sorted.
    pub fn get_orphaned(&self, disk_names: &HashSet<String>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT name FROM shift_operations \
             WHERE target = ?1 AND kind = 'change' ORDER BY name",
        )?;
        let names = stmt
            .query_map([self.target], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names
            .into_iter()
            .filter(|name| !disk_names.contains(name))
            .collect())
    }

    /// Id of the most recent successful operation for `name` in `direction`.
    pub fn last_success_id(
        &self,
        kind: OperationKind,
        name: &str,
        direction: Direction,
    ) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT MAX(id) FROM shift_operations \
                 WHERE target = ?1 AND kind = ?2 AND name = ?3 AND direction = ?4 \
                   AND status = 'success'",
                params![self.target, kind.as_str(), name, direction.as_str()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(id)
    }

    /// Most recent executed (not skipped) record of `filepath` within `scope`.
    pub fn last_file_record(
        &self,
        scope: &FileScope<'_>,
        filepath: &str,
    ) -> Result<Option<FileRecord>> {
        let sql = format!(
            "SELECT {} FROM shift_file_executions f \
             JOIN shift_operations o ON o.id = f.operation_id \
             WHERE o.target = ?1 AND o.kind = ?2 AND o.direction = ?3 AND o.id > ?4 \
               AND (?5 IS NULL OR o.name = ?5) \
               AND f.filepath = ?6 AND f.status IN ('success', 'failed') \
             ORDER BY f.id DESC LIMIT 1",
            prefixed(FILE_COLUMNS, "f.")
        );
        let record = self
            .conn
            .query_row(
                &sql,
                params![
                    self.target,
                    scope.kind.as_str(),
                    scope.direction.as_str(),
                    scope.after_operation,
                    scope.name,
                    filepath,
                ],
                file_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Whether a file must execute.
    ///
    /// It runs when it has never executed in scope, when its last execution
    /// failed, or when its checksum differs from the last execution.
    pub fn needs_run(&self, scope: &FileScope<'_>, filepath: &str, checksum: &str) -> Result<bool> {
        Ok(match self.last_file_record(scope, filepath)? {
            Some(record) => record.status != FileStatus::Success || record.checksum != checksum,
            None => true,
        })
    }

    /// Operations most recent first, optionally for one name.
    pub fn get_history(&self, name: Option<&str>, limit: Option<usize>) -> Result<Vec<OperationRecord>> {
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM shift_operations \
             WHERE target = ?1 AND (?2 IS NULL OR name = ?2) \
             ORDER BY id DESC LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.target, name, limit], operation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_operation(&self, id: i64) -> Result<Option<OperationRecord>> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM shift_operations WHERE id = ?1 AND target = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![id, self.target], operation_from_row)
            .optional()?)
    }

    /// File rows of one operation, most recent first.
    pub fn get_file_history(&self, operation_id: i64) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM shift_file_executions \
             WHERE operation_id = ?1 ORDER BY id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([operation_id], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Remove every operation and file row of a change. Returns operations removed.
    pub fn delete_records(&self, name: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM shift_file_executions WHERE operation_id IN \
             (SELECT id FROM shift_operations WHERE target = ?1 AND kind = 'change' AND name = ?2)",
            params![self.target, name],
        )?;
        let removed = tx.execute(
            "DELETE FROM shift_operations WHERE target = ?1 AND kind = 'change' AND name = ?2",
            params![self.target, name],
        )?;
        tx.commit()?;
        debug!(name, removed, "deleted change history");
        Ok(removed)
    }

    fn change_operations(&self, name: Option<&str>) -> Result<Vec<OperationRecord>> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM shift_operations \
             WHERE target = ?1 AND kind = 'change' AND (?2 IS NULL OR name = ?2) \
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.target, name], operation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Fold operations in ascending id order into one status per name.
fn fold_statuses(operations: Vec<OperationRecord>) -> HashMap<String, ChangeStatusRecord> {
    let mut statuses: HashMap<String, ChangeStatusRecord> = HashMap::new();
    for op in operations {
        let entry = statuses
            .entry(op.name.clone())
            .or_insert_with(|| ChangeStatusRecord {
                name: op.name.clone(),
                status: ChangeStatus::Pending,
                applied_at: None,
                applied_by: None,
                applied_operation_id: None,
                reverted_at: None,
                error_message: None,
                last_operation_id: op.id,
                last_direction: op.direction,
                last_checksum: String::new(),
            });

        entry.status = ChangeStatus::from_operation(op.direction, op.status);
        entry.error_message = op.error_message.clone();
        entry.last_operation_id = op.id;
        entry.last_direction = op.direction;
        entry.last_checksum = op.checksum.clone();

        if op.status == OperationStatus::Success {
            let finished = op.completed_at.unwrap_or(op.started_at);
            match op.direction {
                Direction::Change => {
                    entry.applied_at = Some(finished);
                    entry.applied_by = Some(op.executed_by.clone());
                    entry.applied_operation_id = Some(op.id);
                }
                Direction::Revert => entry.reverted_at = Some(finished),
            }
        }
    }
    statuses
}

fn prefixed(columns: &str, prefix: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{prefix}{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn conversion_error(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected value '{value}'").into(),
    )
}

fn parse_kind(idx: usize, value: &str) -> rusqlite::Result<OperationKind> {
    match value {
        "change" => Ok(OperationKind::Change),
        "build" => Ok(OperationKind::Build),
        "run" => Ok(OperationKind::Run),
        other => Err(conversion_error(idx, other)),
    }
}

fn parse_direction(idx: usize, value: &str) -> rusqlite::Result<Direction> {
    Direction::parse(value).map_err(|_| conversion_error(idx, value))
}

fn parse_operation_status(idx: usize, value: &str) -> rusqlite::Result<OperationStatus> {
    match value {
        "pending" => Ok(OperationStatus::Pending),
        "success" => Ok(OperationStatus::Success),
        "failed" => Ok(OperationStatus::Failed),
        other => Err(conversion_error(idx, other)),
    }
}

fn parse_file_status(idx: usize, value: &str) -> rusqlite::Result<FileStatus> {
    match value {
        "success" => Ok(FileStatus::Success),
        "failed" => Ok(FileStatus::Failed),
        "skipped" => Ok(FileStatus::Skipped),
        other => Err(conversion_error(idx, other)),
    }
}

fn parse_file_kind(idx: usize, value: &str) -> rusqlite::Result<FileKind> {
    match value {
        "sql" => Ok(FileKind::Sql),
        "txt" => Ok(FileKind::Manifest),
        other => Err(conversion_error(idx, other)),
    }
}

fn operation_from_row(row: &Row<'_>) -> rusqlite::Result<OperationRecord> {
    Ok(OperationRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: parse_kind(2, &row.get::<_, String>(2)?)?,
        direction: parse_direction(3, &row.get::<_, String>(3)?)?,
        status: parse_operation_status(4, &row.get::<_, String>(4)?)?,
        target: row.get(5)?,
        executed_by: row.get(6)?,
        started_at: timestamp_at(row, 7)?,
        completed_at: opt_timestamp_at(row, 8)?,
        duration_ms: row.get(9)?,
        checksum: row.get(10)?,
        error_message: row.get(11)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        operation_id: row.get(1)?,
        filepath: row.get(2)?,
        file_kind: parse_file_kind(3, &row.get::<_, String>(3)?)?,
        checksum: row.get(4)?,
        status: parse_file_status(5, &row.get::<_, String>(5)?)?,
        skip_reason: row.get(6)?,
        error_message: row.get(7)?,
        duration_ms: row.get(8)?,
        executed_at: timestamp_at(row, 9)?,
    })
}
