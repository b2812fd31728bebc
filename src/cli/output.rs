use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::error::{ErrorCode, Result, ShiftError};
use crate::executor::{ChangeResult, FileResult};
use crate::manager::{BatchResult, BatchStatus};
use crate::storage::{ChangeStatus, FileStatus, OperationStatus};

#[derive(Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
    #[serde(rename = "error")]
    StructuredError {
        /// Error code enum value (e.g., "LOCK_HELD")
        code: ErrorCode,
        /// Numeric error code (e.g., 701)
        numeric_code: u16,
        message: String,
        suggestion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
        recoverable: bool,
        category: String,
    },
    /// Execution finished but some changes or files failed.
    Failed {
        succeeded: usize,
        failed: usize,
    },
    Partial {
        succeeded: usize,
        failed: usize,
    },
}

impl From<&ShiftError> for RobotStatus {
    fn from(err: &ShiftError) -> Self {
        let structured = err.to_structured();
        Self::StructuredError {
            code: structured.code,
            numeric_code: structured.numeric_code,
            message: structured.message,
            suggestion: structured.suggestion,
            context: structured.context,
            recoverable: structured.recoverable,
            category: structured.category,
        }
    }
}

fn respond<T>(status: RobotStatus, data: T) -> RobotResponse<T> {
    RobotResponse {
        status,
        timestamp: Utc::now(),
        version: crate::VERSION.to_string(),
        data,
        warnings: Vec::new(),
    }
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    respond(RobotStatus::Ok, data)
}

/// Envelope for a change result: `ok` unless the change failed.
pub fn robot_change(result: &ChangeResult) -> RobotResponse<&ChangeResult> {
    let status = if result.is_success() {
        RobotStatus::Ok
    } else {
        RobotStatus::Failed {
            succeeded: 0,
            failed: 1,
        }
    };
    respond(status, result)
}

pub fn robot_batch(batch: &BatchResult) -> RobotResponse<&BatchResult> {
    let status = match batch.status {
        BatchStatus::Success => RobotStatus::Ok,
        BatchStatus::Partial => RobotStatus::Partial {
            succeeded: batch.succeeded,
            failed: batch.failed,
        },
        BatchStatus::Failed => RobotStatus::Failed {
            succeeded: batch.succeeded,
            failed: batch.failed,
        },
    };
    respond(status, batch)
}

/// Create a robot error response from a `ShiftError` with structured information.
pub fn robot_error_structured(err: &ShiftError) -> RobotResponse<serde_json::Value> {
    respond(RobotStatus::from(err), serde_json::Value::Null)
}

pub fn emit_robot<T: Serialize>(response: &RobotResponse<T>) -> Result<()> {
    emit_json(response)
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 14,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        self.lines.push(format!(
            "{:width$} {value}",
            key.dimmed().to_string(),
            width = self.key_width
        ));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn push_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

#[must_use]
pub fn change_status_label(status: ChangeStatus) -> ColoredString {
    match status {
        ChangeStatus::Pending => status.as_str().yellow(),
        ChangeStatus::Success => status.as_str().green(),
        ChangeStatus::Failed => status.as_str().red(),
        ChangeStatus::Reverted => status.as_str().blue(),
    }
}

#[must_use]
pub fn operation_status_label(status: OperationStatus) -> ColoredString {
    match status {
        OperationStatus::Pending => status.as_str().yellow(),
        OperationStatus::Success => status.as_str().green(),
        OperationStatus::Failed => status.as_str().red(),
    }
}

#[must_use]
pub fn file_status_label(status: FileStatus) -> ColoredString {
    match status {
        FileStatus::Success => status.as_str().green(),
        FileStatus::Failed => status.as_str().red(),
        FileStatus::Skipped => status.as_str().dimmed(),
    }
}

fn file_line(file: &FileResult) -> String {
    let mut line = format!(
        "  {:8} {} {}",
        file_status_label(file.status).to_string(),
        file.filepath,
        format!("({} ms)", file.duration_ms).dimmed()
    );
    if let Some(reason) = &file.skip_reason {
        line.push_str(&format!(" {}", format!("[{reason}]").dimmed()));
    }
    if let Some(error) = &file.error {
        line.push_str(&format!("\n           {}", error.red()));
    }
    line
}

/// One change outcome, file by file.
#[must_use]
pub fn format_change(result: &ChangeResult) -> String {
    let mut layout = HumanLayout::new();
    let verb = match (result.dry_run, result.up_to_date) {
        (_, true) => "up to date".dimmed(),
        (true, false) => "dry run".cyan(),
        (false, false) => operation_status_label(result.status),
    };
    layout.push_line(format!(
        "{} {} {} {}",
        result.direction.as_str().bold(),
        result.name.bold(),
        verb,
        format!("({} ms)", result.duration_ms).dimmed()
    ));
    if !result.up_to_date {
        for file in &result.files {
            layout.push_line(file_line(file));
            if let Some(sql) = &file.rendered {
                for line in sql.lines() {
                    layout.push_line(format!("      {}", line.dimmed()));
                }
            }
        }
    }
    if let Some(error) = &result.error {
        layout.push_line(format!("{} {error}", "error:".red().bold()));
    }
    layout.build()
}

#[must_use]
pub fn format_batch(batch: &BatchResult) -> String {
    let mut layout = HumanLayout::new();
    if batch.results.is_empty() && batch.error.is_none() {
        layout.push_line("Nothing to do".dimmed().to_string());
        return layout.build();
    }
    for result in &batch.results {
        layout.push_line(format_change(result));
    }
    layout.blank();
    let status = match batch.status {
        BatchStatus::Success => "success".green(),
        BatchStatus::Partial => "partial".yellow(),
        BatchStatus::Failed => "failed".red(),
    };
    layout.push_line(format!(
        "{} {} succeeded, {} failed, {} skipped",
        status.bold(),
        batch.succeeded,
        batch.failed,
        batch.skipped
    ));
    if !batch.not_attempted.is_empty() {
        layout.push_line(format!(
            "{} {}",
            "not attempted:".dimmed(),
            batch.not_attempted.join(", ")
        ));
    }
    if let Some(error) = &batch.error {
        layout.push_line(format!("{} {error}", "error:".red().bold()));
    }
    layout.build()
}
