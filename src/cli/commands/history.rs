//! shift history - Recorded operations and their files

use std::process::ExitCode;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{
    HumanLayout, emit_human, emit_robot, file_status_label, operation_status_label, robot_ok,
};
use crate::error::{Result, ShiftError};
use crate::executor::NullSink;
use crate::storage::{FileRecord, OperationRecord};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only operations of this change
    pub change: Option<String>,

    /// Maximum number of operations to show
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,

    /// Show the file executions of one operation
    #[arg(long, value_name = "ID", conflicts_with = "change")]
    pub operation: Option<i64>,
}

pub fn run(ctx: &AppContext, args: &HistoryArgs) -> Result<ExitCode> {
    if let Some(id) = args.operation {
        return operation_detail(ctx, id);
    }

    let operations = ctx
        .manager(&NullSink)
        .history(args.change.as_deref(), Some(args.limit))?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "target": ctx.target(),
            "operations": operations,
        })))?;
    } else {
        history_human(&operations);
    }
    Ok(ExitCode::SUCCESS)
}

fn history_human(operations: &[OperationRecord]) {
    if operations.is_empty() {
        println!("{}", "No history recorded".dimmed());
        return;
    }
    for op in operations {
        let duration = op
            .duration_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_default();
        println!(
            "{:>5} {} {:7} {:6} {:8} {} {} {}",
            op.id.to_string().dimmed(),
            op.started_at.format("%Y-%m-%d %H:%M:%S"),
            op.kind.as_str(),
            op.direction.as_str(),
            operation_status_label(op.status).to_string(),
            op.name.bold(),
            op.executed_by.dimmed(),
            duration.dimmed()
        );
        if let Some(error) = &op.error_message {
            println!("      {}", error.red());
        }
    }
}

fn operation_detail(ctx: &AppContext, id: i64) -> Result<ExitCode> {
    let operation = ctx
        .execution(&NullSink)
        .history()
        .get_operation(id)?
        .ok_or_else(|| ShiftError::Validation(format!("no operation with id {id}")))?;
    let files = ctx.manager(&NullSink).file_history(id)?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "operation": operation,
            "files": files,
        })))?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Operation {id}"))
        .kv("name", &operation.name)
        .kv("kind", operation.kind.as_str())
        .kv("direction", operation.direction.as_str())
        .kv("status", &operation_status_label(operation.status).to_string())
        .kv("target", &operation.target)
        .kv("executed by", &operation.executed_by)
        .kv("started", &operation.started_at.to_rfc3339())
        .kv("checksum", &operation.checksum);
    if let Some(error) = &operation.error_message {
        layout.kv("error", error);
    }
    layout.blank();
    // Stored newest first; show in execution order.
    for file in files.iter().rev() {
        layout.bullet(&file_line(file));
    }
    emit_human(layout);
    Ok(ExitCode::SUCCESS)
}

fn file_line(file: &FileRecord) -> String {
    let mut line = format!(
        "{} {} {}",
        file_status_label(file.status),
        file.filepath,
        format!("({} ms)", file.duration_ms).dimmed()
    );
    if let Some(reason) = &file.skip_reason {
        line.push_str(&format!(" [{reason}]"));
    }
    if let Some(error) = &file.error_message {
        line.push_str(&format!(": {}", error.red()));
    }
    line
}
