//! shift build / exec - Run schema files outside of changes

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;

use crate::app::AppContext;
use crate::error::Result;

use super::{ExecFlags, locked, progress, report_change};

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub exec: ExecFlags,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// SQL files to run in order, or a single directory
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub exec: ExecFlags,
}

pub fn build(ctx: &AppContext, args: &BuildArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.exec.options();
    let result = locked(ctx, "build", opts, || ctx.runner(&events).build(opts))?;
    report_change(ctx, &result)
}

pub fn exec(ctx: &AppContext, args: &ExecArgs) -> Result<ExitCode> {
    let events = progress(ctx);
    let opts = args.exec.options();
    let paths = args
        .paths
        .iter()
        .map(std::path::absolute)
        .collect::<std::io::Result<Vec<PathBuf>>>()?;

    let result = locked(ctx, "exec", opts, || {
        let runner = ctx.runner(&events);
        match paths.as_slice() {
            [dir] if dir.is_dir() => runner.run_dir(dir, opts),
            _ => runner.run_files(&paths, opts),
        }
    })?;
    report_change(ctx, &result)
}
