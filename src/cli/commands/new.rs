//! shift new - Scaffold a dated change folder

use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::change::ChangeScaffold;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct NewArgs {
    /// What the change does, e.g. "add users table"
    #[arg(required = true)]
    pub description: Vec<String>,

    /// Date prefix for the folder (default: today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,
}

pub fn run(ctx: &AppContext, args: &NewArgs) -> Result<ExitCode> {
    let description = args.description.join(" ");
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    let change = ChangeScaffold::create(&ctx.changes_root, &description, Some(date))?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&change))?;
    } else {
        println!("{} created {}", "✓".green(), change.path.display());
        println!();
        println!("Add files with:");
        println!("  shift add {} \"<description>\"", change.name);
        println!("  shift add {} \"<description>\" --revert", change.name);
    }
    Ok(ExitCode::SUCCESS)
}
