//! shift add / rm-file / mv-file - Edit the files of one change

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::change::{ChangeFile, ChangeScaffold, Direction, FileKind, change_dir};
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::{Result, ShiftError};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Change folder name
    pub change: String,

    /// What the file does; becomes the file name
    pub description: String,

    /// Add to revert/ instead of change/
    #[arg(long)]
    pub revert: bool,

    /// Create a .txt manifest listing schema files instead of SQL
    #[arg(long)]
    pub manifest: bool,

    /// Copy content from this file instead of writing a stub
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RmFileArgs {
    pub change: String,

    /// File name, e.g. 002_add_index.sql
    pub filename: String,

    #[arg(long)]
    pub revert: bool,
}

#[derive(Args, Debug)]
pub struct MvFileArgs {
    pub change: String,

    pub filename: String,

    /// New description; the sequence number is kept
    pub description: String,

    #[arg(long)]
    pub revert: bool,
}

const fn direction(revert: bool) -> Direction {
    if revert {
        Direction::Revert
    } else {
        Direction::Change
    }
}

pub fn add(ctx: &AppContext, args: &AddArgs) -> Result<ExitCode> {
    let kind = if args.manifest {
        FileKind::Manifest
    } else {
        FileKind::Sql
    };
    let content = match &args.from {
        Some(path) => std::fs::read_to_string(path).map_err(|err| {
            ShiftError::Validation(format!("cannot read {}: {err}", path.display()))
        })?,
        None => stub(kind, &args.description),
    };
    let file = ChangeScaffold::add_file(
        &change_dir(&ctx.changes_root, &args.change)?,
        direction(args.revert),
        &args.description,
        kind,
        &content,
    )?;
    report(ctx, "added", &file)
}

pub fn rm_file(ctx: &AppContext, args: &RmFileArgs) -> Result<ExitCode> {
    ChangeScaffold::remove_file(
        &change_dir(&ctx.changes_root, &args.change)?,
        direction(args.revert),
        &args.filename,
    )?;
    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "change": args.change,
            "removed": args.filename,
        })))?;
    } else {
        println!("{} removed {}", "✓".green(), args.filename);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn mv_file(ctx: &AppContext, args: &MvFileArgs) -> Result<ExitCode> {
    let file = ChangeScaffold::rename_file(
        &change_dir(&ctx.changes_root, &args.change)?,
        direction(args.revert),
        &args.filename,
        &args.description,
    )?;
    report(ctx, "renamed to", &file)
}

fn report(ctx: &AppContext, verb: &str, file: &ChangeFile) -> Result<ExitCode> {
    if ctx.robot_mode {
        emit_robot(&robot_ok(file))?;
    } else {
        println!("{} {verb} {}", "✓".green(), file.path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn stub(kind: FileKind, description: &str) -> String {
    match kind {
        FileKind::Sql => format!("-- {description}\n"),
        FileKind::Manifest => format!("# {description}\n# One schema-relative path per line\n"),
    }
}
