//! shift list - Changes from disk and history, merged

use std::process::ExitCode;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{change_status_label, emit_robot, robot_ok};
use crate::error::Result;
use crate::executor::NullSink;
use crate::manager::ChangeListItem;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only changes that `next`/`ff` would apply
    #[arg(long)]
    pub pending: bool,

    /// Only changes whose folder is gone
    #[arg(long)]
    pub orphaned: bool,
}

pub fn run(ctx: &AppContext, args: &ListArgs) -> Result<ExitCode> {
    let items: Vec<ChangeListItem> = ctx
        .manager(&NullSink)
        .list()?
        .into_iter()
        .filter(|item| !args.pending || (!item.orphaned && item.status.is_outstanding()))
        .filter(|item| !args.orphaned || item.orphaned)
        .collect();

    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "target": ctx.target(),
            "count": items.len(),
            "changes": items,
        })))?;
    } else {
        list_human(ctx, &items);
    }
    Ok(ExitCode::SUCCESS)
}

fn list_human(ctx: &AppContext, items: &[ChangeListItem]) {
    if items.is_empty() {
        println!("{}", "No changes found".dimmed());
        println!();
        println!("Create one with: shift new \"<description>\"");
        return;
    }

    println!(
        "{:44} {:10} {:20} {}",
        "CHANGE".bold(),
        "STATUS".bold(),
        "APPLIED".bold(),
        "FILES".bold()
    );
    println!("{}", "─".repeat(84).dimmed());

    for item in items {
        let applied = item
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let files = match (item.change_files, item.revert_files) {
            (Some(up), Some(down)) => format!("{up}/{down}"),
            _ => String::new(),
        };
        let mut marker = String::new();
        if item.orphaned {
            marker = " [orphaned]".red().to_string();
        } else if item.is_new {
            marker = " [new]".cyan().to_string();
        }
        println!(
            "{:44} {:10} {:20} {}{}",
            item.name,
            change_status_label(item.status).to_string(),
            applied,
            files,
            marker
        );
    }
    println!();
    println!(
        "{} changes for target {}",
        items.len(),
        ctx.target().bold()
    );
}
