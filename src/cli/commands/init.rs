//! shift init - Prepare a project for change management

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{emit_robot, robot_ok};
use crate::config::PROJECT_CONFIG_FILE;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing shift.toml with the defaults
    #[arg(long, short)]
    pub force: bool,
}

const DEFAULT_CONFIG: &str = r#"# shift configuration

[paths]
changes_dir = "changes"
schema_dir = "schema"

[database]
path = ".shift/shift.db"
target = "default"
dialect = "sqlite"

[lock]
# Lease length; renewed on every acquire by the holder
timeout_secs = 300
wait = false
wait_timeout_secs = 30
poll_interval_ms = 1000

[execution]
abort_on_error = true

# Values available to .sql.tmpl files as {{ config.KEY }}
[vars]
"#;

pub fn run(ctx: &AppContext, args: &InitArgs) -> Result<ExitCode> {
    fs::create_dir_all(&ctx.changes_root)?;
    fs::create_dir_all(&ctx.schema_root)?;
    let config_path = ctx.root.join(PROJECT_CONFIG_FILE);
    let wrote_config = write_config(&config_path, args.force)?;
    let db_path = ctx.config.database_path(&ctx.root);

    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "root": ctx.root.display().to_string(),
            "config": config_path.display().to_string(),
            "config_written": wrote_config,
            "changes": ctx.changes_root.display().to_string(),
            "schema": ctx.schema_root.display().to_string(),
            "database": db_path.display().to_string(),
            "schema_version": ctx.db.schema_version(),
        })))?;
        return Ok(ExitCode::SUCCESS);
    }

    if wrote_config {
        println!("{} wrote {}", "✓".green(), config_path.display());
    } else {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "!".yellow(),
            config_path.display()
        );
    }
    println!("{} changes in {}", "✓".green(), ctx.changes_root.display());
    println!("{} schema in {}", "✓".green(), ctx.schema_root.display());
    println!("{} database at {}", "✓".green(), db_path.display());
    println!();
    println!("Create your first change with:");
    println!("  shift new \"create users table\"");
    Ok(ExitCode::SUCCESS)
}

fn write_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    fs::write(path, DEFAULT_CONFIG)?;
    Ok(true)
}
