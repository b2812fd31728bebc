//! Shared state for one CLI invocation.

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::config::{self, Config};
use crate::error::{Result, ShiftError};
use crate::executor::{EventSink, ExecutionContext, RenderContext, TemplateRenderer};
use crate::manager::ChangeManager;
use crate::runner::Runner;
use crate::storage::{Database, LockManager};

pub struct AppContext {
    pub root: PathBuf,
    pub changes_root: PathBuf,
    pub schema_root: PathBuf,
    pub config: Config,
    pub db: Database,
    pub identity: String,
    pub renderer: TemplateRenderer,
    pub robot_mode: bool,
    pub quiet: bool,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = project_root(cli.root.as_deref())?;
        let mut config = Config::load(cli.config.as_deref(), &root)?;
        if let Some(target) = &cli.target {
            config.database.target.clone_from(target);
        }
        let db = Database::open(config.database_path(&root))?;
        let mut ctx = Self::with_database(root, config, db, cli.json);
        ctx.quiet = cli.quiet;
        Ok(ctx)
    }

    /// Assemble a context around an already open database.
    #[must_use]
    pub fn with_database(root: PathBuf, config: Config, db: Database, robot_mode: bool) -> Self {
        let renderer = TemplateRenderer::new(RenderContext {
            config: config.vars.clone(),
            secrets: config::secrets_from_env(),
        });
        Self {
            changes_root: config.changes_root(&root),
            schema_root: config.schema_root(&root),
            identity: config.identity.resolve(),
            root,
            config,
            db,
            renderer,
            robot_mode,
            quiet: false,
        }
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.config.database.target
    }

    #[must_use]
    pub fn execution<'a>(&'a self, events: &'a dyn EventSink) -> ExecutionContext<'a> {
        ExecutionContext {
            conn: self.db.conn(),
            target: self.target(),
            identity: &self.identity,
            project_root: &self.root,
            schema_root: &self.schema_root,
            renderer: &self.renderer,
            events,
        }
    }

    #[must_use]
    pub fn manager<'a>(&'a self, events: &'a dyn EventSink) -> ChangeManager<'a> {
        ChangeManager::new(self.execution(events), &self.changes_root)
    }

    #[must_use]
    pub fn runner<'a>(&'a self, events: &'a dyn EventSink) -> Runner<'a> {
        Runner::new(self.execution(events))
    }

    #[must_use]
    pub fn locks(&self) -> LockManager<'_> {
        LockManager::new(self.db.conn(), self.config.database.dialect)
    }

    /// Run `f` while holding the target's lease lock.
    pub fn with_lock<T>(&self, reason: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let opts = self.config.lock.options(Some(reason.to_string()));
        self.locks()
            .with_lock(self.target(), &self.identity, &opts, f)
    }
}

/// `--root`, or the nearest ancestor of the working directory holding a
/// project config, or the working directory itself.
pub fn project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        if !root.is_dir() {
            return Err(ShiftError::Config(format!(
                "project root {} is not a directory",
                root.display()
            )));
        }
        return Ok(std::path::absolute(root)?);
    }
    let cwd = std::env::current_dir()?;
    let found = cwd
        .ancestors()
        .find(|dir| dir.join(config::PROJECT_CONFIG_FILE).is_file())
        .map(Path::to_path_buf);
    Ok(found.unwrap_or(cwd))
}
