//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;
pub mod progress;

/// shift - apply, revert and track versioned SQL changes
#[derive(Parser, Debug)]
#[command(name = "shift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root (default: nearest ancestor with shift.toml, else the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Config file path, replacing the global and project config files
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target whose history and lock to use (overrides [database].target)
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress logs and progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create shift.toml, the changes and schema folders, and the database
    Init(commands::init::InitArgs),

    /// List changes from disk and history
    List(commands::list::ListArgs),

    /// Scaffold a new dated change folder
    New(commands::new::NewArgs),

    /// Add a numbered SQL file to a change
    Add(commands::files::AddArgs),

    /// Delete a file from a change
    RmFile(commands::files::RmFileArgs),

    /// Rename a file in a change, keeping its sequence number
    MvFile(commands::files::MvFileArgs),

    /// Apply one change
    Run(commands::apply::RunArgs),

    /// Revert one change
    Revert(commands::apply::RunArgs),

    /// Apply the next N outstanding changes
    Next(commands::apply::NextArgs),

    /// Apply every outstanding change
    Ff(commands::apply::BatchArgs),

    /// Revert the most recent N changes, or back to a named change
    Rewind(commands::apply::RewindArgs),

    /// Show recorded operations
    History(commands::history::HistoryArgs),

    /// Delete a change folder and/or its history
    Remove(commands::remove::RemoveArgs),

    /// Run every SQL file under the schema directory
    Build(commands::build::BuildArgs),

    /// Run specific SQL files or a directory of them
    Exec(commands::build::ExecArgs),

    /// Inspect and manage the target's lease lock
    Lock(commands::lock::LockArgs),
}
