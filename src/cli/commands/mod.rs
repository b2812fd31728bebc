//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use std::process::ExitCode;

use clap::Args;

use crate::app::AppContext;
use crate::cli::Commands;
use crate::cli::output::{self, emit_robot, robot_batch, robot_change};
use crate::cli::progress::{ProgressMode, ProgressReporter};
use crate::error::Result;
use crate::executor::{ChangeResult, ExecuteOptions};
use crate::manager::{BatchResult, BatchStatus};

pub mod apply;
pub mod build;
pub mod files;
pub mod history;
pub mod init;
pub mod list;
pub mod lock;
pub mod new;
pub mod remove;

/// Exit status when a command ran but SQL execution failed.
pub const EXIT_EXECUTION_FAILED: u8 = 2;

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<ExitCode> {
    match command {
        Commands::Init(args) => init::run(ctx, args),
        Commands::List(args) => list::run(ctx, args),
        Commands::New(args) => new::run(ctx, args),
        Commands::Add(args) => files::add(ctx, args),
        Commands::RmFile(args) => files::rm_file(ctx, args),
        Commands::MvFile(args) => files::mv_file(ctx, args),
        Commands::Run(args) => apply::run(ctx, args),
        Commands::Revert(args) => apply::revert(ctx, args),
        Commands::Next(args) => apply::next(ctx, args),
        Commands::Ff(args) => apply::ff(ctx, args),
        Commands::Rewind(args) => apply::rewind(ctx, args),
        Commands::History(args) => history::run(ctx, args),
        Commands::Remove(args) => remove::run(ctx, args),
        Commands::Build(args) => build::build(ctx, args),
        Commands::Exec(args) => build::exec(ctx, args),
        Commands::Lock(args) => lock::run(ctx, args),
    }
}

/// Execution switches shared by every command that runs SQL.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ExecFlags {
    /// Execute even when history says the files are up to date
    #[arg(long, short)]
    pub force: bool,

    /// Report what would run without executing or recording anything
    #[arg(long)]
    pub dry_run: bool,

    /// Like --dry-run, and print the rendered SQL of each file
    #[arg(long)]
    pub preview: bool,
}

impl ExecFlags {
    #[must_use]
    pub const fn options(self) -> ExecuteOptions {
        ExecuteOptions {
            force: self.force,
            dry_run: self.dry_run,
            preview: self.preview,
        }
    }
}

fn progress(ctx: &AppContext) -> ProgressReporter {
    ProgressReporter::new(ProgressMode::detect(ctx.robot_mode, ctx.quiet))
}

/// Run `f` under the target lock unless it only inspects.
fn locked<T>(
    ctx: &AppContext,
    reason: &str,
    opts: ExecuteOptions,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if opts.inspect_only() {
        f()
    } else {
        ctx.with_lock(reason, f)
    }
}

fn ok() -> ExitCode {
    ExitCode::SUCCESS
}

fn report_change(ctx: &AppContext, result: &ChangeResult) -> Result<ExitCode> {
    if ctx.robot_mode {
        emit_robot(&robot_change(result))?;
    } else {
        println!("{}", output::format_change(result));
    }
    Ok(if result.is_success() {
        ok()
    } else {
        ExitCode::from(EXIT_EXECUTION_FAILED)
    })
}

fn report_batch(ctx: &AppContext, batch: &BatchResult) -> Result<ExitCode> {
    if ctx.robot_mode {
        emit_robot(&robot_batch(batch))?;
    } else {
        println!("{}", output::format_batch(batch));
    }
    Ok(match batch.status {
        BatchStatus::Success => ok(),
        BatchStatus::Partial | BatchStatus::Failed => ExitCode::from(EXIT_EXECUTION_FAILED),
    })
}
