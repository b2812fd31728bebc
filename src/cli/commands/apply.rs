//! shift run / revert / next / ff / rewind - Execute changes

use std::process::ExitCode;

use clap::Args;

use crate::app::AppContext;
use crate::error::Result;
use crate::manager::{BatchOptions, RewindTarget};

use super::{ExecFlags, locked, progress, report_batch, report_change};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Change folder name
    pub change: String,

    #[command(flatten)]
    pub exec: ExecFlags,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct BatchArgs {
    #[command(flatten)]
    pub exec: ExecFlags,

    /// Keep going after a change fails
    #[arg(long)]
    pub continue_on_error: bool,
}

#[derive(Args, Debug)]
pub struct NextArgs {
    /// How many outstanding changes to apply
    #[arg(default_value = "1")]
    pub count: usize,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct RewindArgs {
    /// A count of changes, or the name of the oldest change to revert
    #[arg(default_value = "1")]
    pub target: String,

    #[command(flatten)]
    pub batch: BatchArgs,
}

impl BatchArgs {
    fn options(self, ctx: &AppContext) -> BatchOptions {
        BatchOptions {
            execute: self.exec.options(),
            abort_on_error: ctx.config.execution.abort_on_error && !self.continue_on_error,
        }
    }
}

/// All digits means a count; anything else is a change name.
fn rewind_target(raw: &str) -> RewindTarget {
    raw.parse::<usize>()
        .map_or_else(|_| RewindTarget::Name(raw.to_string()), RewindTarget::Count)
}

pub fn run(ctx: &AppContext, args: &RunArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.exec.options();
    let result = locked(ctx, &format!("run {}", args.change), opts, || {
        ctx.manager(&events).run(&args.change, opts)
    })?;
    report_change(ctx, &result)
}

pub fn revert(ctx: &AppContext, args: &RunArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.exec.options();
    let result = locked(ctx, &format!("revert {}", args.change), opts, || {
        ctx.manager(&events).revert(&args.change, opts)
    })?;
    report_change(ctx, &result)
}

pub fn next(ctx: &AppContext, args: &NextArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.batch.options(ctx);
    let batch = locked(ctx, "next", opts.execute, || {
        ctx.manager(&events).next(args.count, opts)
    })?;
    report_batch(ctx, &batch)
}

pub fn ff(ctx: &AppContext, args: &BatchArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.options(ctx);
    let batch = locked(ctx, "ff", opts.execute, || ctx.manager(&events).ff(opts))?;
    report_batch(ctx, &batch)
}

pub fn rewind(ctx: &AppContext, args: &RewindArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.batch.options(ctx);
    let target = rewind_target(&args.target);
    let batch = locked(ctx, "rewind", opts.execute, || {
        ctx.manager(&events).rewind(&target, opts)
    })?;
    report_batch(ctx, &batch)
}
