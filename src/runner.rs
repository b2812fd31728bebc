//! Ad-hoc execution of schema files outside of changes.
//!
//! `build` runs every SQL file under the schema root; `run_files` and
//! `run_dir` run an explicit selection. Both reuse the executor's per-file
//! policy: unchanged files are skipped, the first failure skips the rest.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::change::{Direction, FileKind};
use crate::error::{Result, ShiftError};
use crate::executor::{
    ChangeResult, ExecuteOptions, ExecutionContext, OperationInfo, PlannedFile, combined_checksum,
    display_path, run_operation,
};
use crate::storage::{FileScope, OperationKind};

/// Operation name recorded for schema builds.
pub const BUILD_NAME: &str = "build";

pub struct Runner<'a> {
    ctx: ExecutionContext<'a>,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub const fn new(ctx: ExecutionContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run every `.sql`/`.sql.tmpl` file under the schema root in path order.
    pub fn build(&self, opts: ExecuteOptions) -> Result<ChangeResult> {
        let paths = sql_files_under(self.ctx.schema_root)?;
        self.execute(BUILD_NAME, OperationKind::Build, &paths, opts)
    }

    /// Run the given files in the order given.
    pub fn run_files(&self, paths: &[PathBuf], opts: ExecuteOptions) -> Result<ChangeResult> {
        if paths.is_empty() {
            return Err(ShiftError::Validation("no files to run".to_string()));
        }
        for path in paths {
            if !path.is_file() {
                return Err(ShiftError::Validation(format!(
                    "{} is not a file",
                    path.display()
                )));
            }
        }
        let name = match paths {
            [single] => display_path(single, self.ctx.project_root),
            _ => "run".to_string(),
        };
        self.execute(&name, OperationKind::Run, paths, opts)
    }

    /// Run every SQL file below `dir` in path order.
    pub fn run_dir(&self, dir: &Path, opts: ExecuteOptions) -> Result<ChangeResult> {
        if !dir.is_dir() {
            return Err(ShiftError::Validation(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        let paths = sql_files_under(dir)?;
        let name = display_path(dir, self.ctx.project_root);
        self.execute(&name, OperationKind::Run, &paths, opts)
    }

    fn execute(
        &self,
        name: &str,
        kind: OperationKind,
        paths: &[PathBuf],
        opts: ExecuteOptions,
    ) -> Result<ChangeResult> {
        let plan = paths
            .iter()
            .map(|path| {
                let file_kind = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(FileKind::from_filename)
                    .ok_or_else(|| {
                        ShiftError::Validation(format!("{} is not a SQL file", path.display()))
                    })?;
                PlannedFile::load(path, file_kind, self.ctx.project_root, self.ctx.schema_root)
            })
            .collect::<Result<Vec<_>>>()?;
        let checksum = combined_checksum(&plan);

        let op = OperationInfo {
            name,
            kind,
            direction: Direction::Change,
            checksum: &checksum,
            scope: FileScope {
                kind,
                name: None,
                direction: Direction::Change,
                after_operation: 0,
            },
        };
        run_operation(&self.ctx, &op, &plan, opts)
    }
}

/// Non-hidden `.sql` and `.sql.tmpl` files below `root`, sorted by path.
fn sql_files_under(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.map_err(|err| ShiftError::Io(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if FileKind::from_filename(&name) == Some(FileKind::Sql) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
