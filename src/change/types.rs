use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};

/// Which half of a change is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Change,
    Revert,
}

impl Direction {
    /// Subfolder holding this direction's files.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Revert => "revert",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.dir_name()
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Change => Self::Revert,
            Self::Revert => Self::Change,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "change" => Ok(Self::Change),
            "revert" => Ok(Self::Revert),
            other => Err(ShiftError::Validation(format!(
                "unknown direction '{other}' (expected change|revert)"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a change file is turned into executable SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// `.sql` or `.sql.tmpl`, rendered and executed directly.
    Sql,
    /// `.txt` manifest listing schema files to execute.
    Manifest,
}

impl FileKind {
    /// Short tag stored in history (`sql` / `txt`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Manifest => "txt",
        }
    }

    /// Classify a filename by extension. `None` for unrecognized files.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.ends_with(".sql") || filename.ends_with(".sql.tmpl") {
            Some(Self::Sql)
        } else if filename.ends_with(".txt") {
            Some(Self::Manifest)
        } else {
            None
        }
    }

    /// Extension written by the scaffold for new files of this kind.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Manifest => "txt",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One numbered file inside `change/` or `revert/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFile {
    pub filename: String,
    pub path: PathBuf,
    pub kind: FileKind,
    /// Leading `NNN` of the filename.
    pub sequence: u16,
}

impl ChangeFile {
    /// Whether the file goes through template substitution before execution.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.filename.ends_with(".tmpl")
    }
}

/// A change folder as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub name: String,
    pub path: PathBuf,
    pub date: Option<NaiveDate>,
    pub description: String,
    pub change_files: Vec<ChangeFile>,
    pub revert_files: Vec<ChangeFile>,
    pub has_changelog: bool,
}

impl Change {
    #[must_use]
    pub fn files(&self, direction: Direction) -> &[ChangeFile] {
        match direction {
            Direction::Change => &self.change_files,
            Direction::Revert => &self.revert_files,
        }
    }

    /// Structural re-check of an already constructed change.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ShiftError::Validation("change name must be non-empty".to_string()));
        }
        for direction in [Direction::Change, Direction::Revert] {
            let mut seen = std::collections::HashSet::new();
            for file in self.files(direction) {
                if !seen.insert(file.filename.as_str()) {
                    return Err(ShiftError::Validation(format!(
                        "duplicate file '{}' in {}/{}",
                        file.filename, self.name, direction
                    )));
                }
            }
        }
        Ok(())
    }
}
