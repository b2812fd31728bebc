//! shift remove - Delete a change folder and/or its recorded history

use std::process::ExitCode;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;
use crate::executor::NullSink;
use crate::manager::RemoveOptions;

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Change folder name
    pub change: String,

    /// Delete only the folder
    #[arg(long)]
    pub disk: bool,

    /// Delete only the history records
    #[arg(long)]
    pub db: bool,

    /// Allow deleting the folder of an applied change
    #[arg(long, short)]
    pub force: bool,
}

impl RemoveArgs {
    /// Neither flag means both.
    const fn options(&self) -> RemoveOptions {
        let both = !self.disk && !self.db;
        RemoveOptions {
            disk: self.disk || both,
            db: self.db || both,
            force: self.force,
        }
    }
}

pub fn run(ctx: &AppContext, args: &RemoveArgs) -> Result<ExitCode> {
    let opts = args.options();
    let manager = ctx.manager(&NullSink);
    let removed = if opts.db {
        ctx.with_lock(&format!("remove {}", args.change), || {
            manager.remove(&args.change, opts)
        })?
    } else {
        manager.remove(&args.change, opts)?
    };

    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "change": args.change,
            "folder_removed": removed.folder_removed,
            "records_removed": removed.records_removed,
        })))?;
    } else {
        if removed.folder_removed {
            println!("{} deleted folder {}", "✓".green(), args.change);
        }
        if opts.db {
            println!(
                "{} deleted {} history operations for {}",
                "✓".green(),
                removed.records_removed,
                args.change
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
