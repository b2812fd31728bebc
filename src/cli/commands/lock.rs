//! shift lock - Inspect and manage the target's lease lock

use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;
use crate::storage::{Lock, LockOptions};

#[derive(Args, Debug)]
pub struct LockArgs {
    #[command(subcommand)]
    pub command: LockCommand,
}

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Show who holds the lock; clears an expired lock
    Status,

    /// Take the lock, or renew it if you already hold it
    Acquire {
        /// Why the lock is held, shown to other users
        #[arg(long)]
        reason: Option<String>,

        /// Lease length in seconds (default: [lock].timeout_secs)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Poll until the lock frees up (up to [lock].wait_timeout_secs)
        #[arg(long)]
        wait: bool,
    },

    /// Release a lock you hold
    Release,

    /// Push the expiry of a lock you hold
    Extend {
        /// New lease length in seconds from now
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Delete the lock regardless of holder
    ForceRelease,
}

impl LockArgs {
    fn options(&self, ctx: &AppContext, reason: Option<String>, timeout: Option<u64>, wait: bool) -> LockOptions {
        let mut config = ctx.config.lock.clone();
        if let Some(secs) = timeout {
            config.timeout_secs = secs;
        }
        config.wait |= wait;
        config.options(reason)
    }
}

pub fn run(ctx: &AppContext, args: &LockArgs) -> Result<ExitCode> {
    let locks = ctx.locks();
    let target = ctx.target();

    match &args.command {
        LockCommand::Status => {
            let status = locks.status(target)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(&status))?;
            } else if let Some(lock) = &status.lock {
                print_lock(ctx, "Lock held", lock);
            } else {
                println!("{} no lock held for {}", "○".dimmed(), target.bold());
            }
        }
        LockCommand::Acquire {
            reason,
            timeout,
            wait,
        } => {
            let opts = args.options(ctx, reason.clone(), *timeout, *wait);
            let lock = locks.acquire(target, &ctx.identity, &opts)?;
            report(ctx, "Lock acquired", &lock)?;
        }
        LockCommand::Release => {
            locks.release(target, &ctx.identity)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(serde_json::json!({ "target": target, "released": true })))?;
            } else {
                println!("{} released lock for {}", "✓".green(), target.bold());
            }
        }
        LockCommand::Extend { timeout } => {
            let opts = args.options(ctx, None, *timeout, false);
            let lock = locks.extend(target, &ctx.identity, &opts)?;
            report(ctx, "Lock extended", &lock)?;
        }
        LockCommand::ForceRelease => {
            let removed = locks.force_release(target)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(serde_json::json!({ "target": target, "released": removed })))?;
            } else if removed {
                println!("{} force-released lock for {}", "!".yellow(), target.bold());
            } else {
                println!("{} no lock held for {}", "○".dimmed(), target.bold());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn report(ctx: &AppContext, title: &str, lock: &Lock) -> Result<()> {
    if ctx.robot_mode {
        emit_robot(&robot_ok(lock))
    } else {
        print_lock(ctx, title, lock);
        Ok(())
    }
}

fn print_lock(ctx: &AppContext, title: &str, lock: &Lock) {
    let remaining = lock.remaining(Utc::now()).as_secs();
    let holder = if lock.locked_by == ctx.identity {
        format!("{} (you)", lock.locked_by)
    } else {
        lock.locked_by.clone()
    };
    let mut layout = HumanLayout::new();
    layout
        .title(title)
        .kv("target", &lock.target)
        .kv("held by", &holder)
        .kv("since", &lock.locked_at.to_rfc3339())
        .kv("expires", &format!("{} ({remaining}s left)", lock.expires_at.to_rfc3339()));
    if let Some(reason) = &lock.reason {
        layout.kv("reason", reason);
    }
    emit_human(layout);
}
