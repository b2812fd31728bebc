use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};
use crate::storage::{Dialect, LockOptions};

/// Project config file name, looked up at the project root.
pub const PROJECT_CONFIG_FILE: &str = "shift.toml";

/// Environment prefix for renderer secrets (`SHIFT_SECRET_API_KEY` -> `api_key`).
pub const SECRET_ENV_PREFIX: &str = "SHIFT_SECRET_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Values exposed to templates as `{{ config.KEY }}`.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("SHIFT_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?.ok_or_else(|| {
                ShiftError::MissingConfig(format!("{} does not exist", path.display()))
            })?;
            config.merge_patch(patch);
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(project_root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Path of the per-user config file, if a config directory exists.
    #[must_use]
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shift/config.toml"))
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        match Self::global_path() {
            Some(path) => Self::load_patch(&path),
            None => Ok(None),
        }
    }

    fn load_project(project_root: &Path) -> Result<Option<ConfigPatch>> {
        Self::load_patch(&project_root.join(PROJECT_CONFIG_FILE))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ShiftError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| ShiftError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.paths {
            self.paths.merge(patch);
        }
        if let Some(patch) = patch.database {
            self.database.merge(patch);
        }
        if let Some(patch) = patch.lock {
            self.lock.merge(patch);
        }
        if let Some(patch) = patch.execution {
            self.execution.merge(patch);
        }
        if let Some(patch) = patch.identity {
            self.identity.merge(patch);
        }
        if let Some(vars) = patch.vars {
            self.vars.extend(vars);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = var("SHIFT_CHANGES_DIR") {
            self.paths.changes_dir = PathBuf::from(value);
        }
        if let Some(value) = var("SHIFT_SCHEMA_DIR") {
            self.paths.schema_dir = PathBuf::from(value);
        }

        if let Some(value) = var("SHIFT_DATABASE") {
            self.database.path = PathBuf::from(value);
        }
        if let Some(value) = var("SHIFT_TARGET") {
            self.database.target = value;
        }
        if let Some(value) = var("SHIFT_DIALECT") {
            self.database.dialect = value.parse()?;
        }

        if let Some(value) = parse_var::<u64>(&var, "SHIFT_LOCK_TIMEOUT")? {
            self.lock.timeout_secs = value;
        }
        if let Some(value) = bool_var(&var, "SHIFT_LOCK_WAIT") {
            self.lock.wait = value;
        }
        if let Some(value) = parse_var::<u64>(&var, "SHIFT_LOCK_WAIT_TIMEOUT")? {
            self.lock.wait_timeout_secs = value;
        }
        if let Some(value) = parse_var::<u64>(&var, "SHIFT_LOCK_POLL_MS")? {
            self.lock.poll_interval_ms = value;
        }

        if let Some(value) = bool_var(&var, "SHIFT_ABORT_ON_ERROR") {
            self.execution.abort_on_error = value;
        }

        if let Some(value) = var("SHIFT_USER") {
            self.identity.name = Some(value);
        }
        if let Some(value) = var("SHIFT_EMAIL") {
            self.identity.email = Some(value);
        }

        Ok(())
    }

    #[must_use]
    pub fn changes_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.paths.changes_dir)
    }

    #[must_use]
    pub fn schema_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.paths.schema_dir)
    }

    #[must_use]
    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.database.path)
    }
}

/// Secrets from `SHIFT_SECRET_*` variables, keyed by the lowercased suffix.
#[must_use]
pub fn secrets_from_env() -> BTreeMap<String, String> {
    secrets_from(std::env::vars())
}

fn secrets_from(vars: impl Iterator<Item = (String, String)>) -> BTreeMap<String, String> {
    vars.filter_map(|(key, value)| {
        key.strip_prefix(SECRET_ENV_PREFIX)
            .filter(|suffix| !suffix.is_empty())
            .map(|suffix| (suffix.to_lowercase(), value))
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_changes_dir")]
    pub changes_dir: PathBuf,
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,
}

fn default_changes_dir() -> PathBuf {
    PathBuf::from("changes")
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schema")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            changes_dir: default_changes_dir(),
            schema_dir: default_schema_dir(),
        }
    }
}

impl PathsConfig {
    fn merge(&mut self, patch: PathsPatch) {
        if let Some(value) = patch.changes_dir {
            self.changes_dir = value;
        }
        if let Some(value) = patch.schema_dir {
            self.schema_dir = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, relative to the project root.
    pub path: PathBuf,
    /// History and locks are kept per target.
    pub target: String,
    pub dialect: Dialect,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".shift/shift.db"),
            target: "default".to_string(),
            dialect: Dialect::Sqlite,
        }
    }
}

impl DatabaseConfig {
    fn merge(&mut self, patch: DatabasePatch) {
        if let Some(value) = patch.path {
            self.path = value;
        }
        if let Some(value) = patch.target {
            self.target = value;
        }
        if let Some(value) = patch.dialect {
            self.dialect = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    pub timeout_secs: u64,
    pub wait: bool,
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            wait: false,
            wait_timeout_secs: 30,
            poll_interval_ms: 1000,
        }
    }
}

impl LockConfig {
    fn merge(&mut self, patch: LockPatch) {
        if let Some(value) = patch.timeout_secs {
            self.timeout_secs = value;
        }
        if let Some(value) = patch.wait {
            self.wait = value;
        }
        if let Some(value) = patch.wait_timeout_secs {
            self.wait_timeout_secs = value;
        }
        if let Some(value) = patch.poll_interval_ms {
            self.poll_interval_ms = value;
        }
    }

    /// Acquire options for a lock taken on behalf of `reason`.
    #[must_use]
    pub fn options(&self, reason: Option<String>) -> LockOptions {
        LockOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            reason,
            wait: self.wait,
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub abort_on_error: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            abort_on_error: true,
        }
    }
}

impl ExecutionConfig {
    fn merge(&mut self, patch: ExecutionPatch) {
        if let Some(value) = patch.abort_on_error {
            self.abort_on_error = value;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl IdentityConfig {
    fn merge(&mut self, patch: IdentityPatch) {
        if let Some(value) = patch.name {
            self.name = Some(value);
        }
        if let Some(value) = patch.email {
            self.email = Some(value);
        }
    }

    /// `name <email>`, or `user@host` when no name is configured.
    #[must_use]
    pub fn resolve(&self) -> String {
        let name = self.name.clone().unwrap_or_else(|| {
            let user = std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string());
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string());
            format!("{user}@{host}")
        });
        match &self.email {
            Some(email) => format!("{name} <{email}>"),
            None => name,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub paths: Option<PathsPatch>,
    pub database: Option<DatabasePatch>,
    pub lock: Option<LockPatch>,
    pub execution: Option<ExecutionPatch>,
    pub identity: Option<IdentityPatch>,
    pub vars: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PathsPatch {
    pub changes_dir: Option<PathBuf>,
    pub schema_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabasePatch {
    pub path: Option<PathBuf>,
    pub target: Option<String>,
    pub dialect: Option<Dialect>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LockPatch {
    pub timeout_secs: Option<u64>,
    pub wait: Option<bool>,
    pub wait_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExecutionPatch {
    pub abort_on_error: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IdentityPatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn bool_var(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    var(key).map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| ShiftError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
