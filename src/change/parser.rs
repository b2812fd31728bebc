//! Reads change folders from disk.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Result, ShiftError};

use super::types::{Change, ChangeFile, Direction, FileKind};

/// `YYYY-MM-DD-slug` change names.
static DATED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-(.+)$").expect("dated name regex"));

/// `NNN_description.ext` change files.
static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3})_[^/\\]+\.(sql|sql\.tmpl|txt)$").expect("file name regex")
});

pub const CHANGELOG_FILE: &str = "changelog.md";

pub struct ChangeParser;

impl ChangeParser {
    /// Parse one change folder.
    pub fn parse(path: &Path) -> Result<Change> {
        if !path.is_dir() {
            return Err(ShiftError::ChangeNotFound(path.display().to_string()));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ShiftError::Validation(format!("invalid change folder name: {}", path.display()))
            })?
            .to_string();
        let (date, description) = split_name(&name);

        let change_files = read_direction(path, Direction::Change)?;
        let revert_files = read_direction(path, Direction::Revert)?;

        if change_files.is_empty() && revert_files.is_empty() {
            return Err(ShiftError::Validation(format!(
                "change '{name}' has no files in change/ or revert/"
            )));
        }

        let change = Change {
            has_changelog: path.join(CHANGELOG_FILE).is_file(),
            path: path.to_path_buf(),
            name,
            date,
            description,
            change_files,
            revert_files,
        };
        change.validate()?;
        Ok(change)
    }

    /// Resolve a `.txt` manifest into absolute schema file paths.
    ///
    /// Lines are paths relative to `schema_root`; `#` comments and blank
    /// lines are ignored. Result is sorted alphabetically.
    pub fn resolve_manifest(path: &Path, schema_root: &Path) -> Result<Vec<PathBuf>> {
        let content = fs::read_to_string(path)?;
        let references = manifest_entries(&content);

        if references.is_empty() {
            return Err(ShiftError::Validation(format!(
                "manifest {} lists no files",
                path.display()
            )));
        }

        let mut resolved = Vec::with_capacity(references.len());
        for reference in references {
            let full = schema_root.join(reference);
            if !full.is_file() {
                return Err(ShiftError::ManifestReference {
                    manifest: path.to_path_buf(),
                    reference: reference.to_string(),
                });
            }
            resolved.push(full);
        }
        resolved.sort();
        Ok(resolved)
    }

    /// Parse every immediate subfolder of `changes_root`.
    ///
    /// Folders that fail to parse are logged and skipped. Missing root yields
    /// an empty list.
    pub fn discover(changes_root: &Path) -> Result<Vec<Change>> {
        if !changes_root.is_dir() {
            debug!("changes directory {} does not exist", changes_root.display());
            return Ok(Vec::new());
        }

        let mut changes = Vec::new();
        for entry in fs::read_dir(changes_root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || is_hidden(&path) {
                continue;
            }
            match Self::parse(&path) {
                Ok(change) => changes.push(change),
                Err(err) => warn!("skipping {}: {err}", path.display()),
            }
        }
        changes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(changes)
    }

    /// Names of every non-hidden folder under `changes_root`, valid or not.
    pub fn folder_names(changes_root: &Path) -> Result<HashSet<String>> {
        if !changes_root.is_dir() {
            return Ok(HashSet::new());
        }
        let mut names = HashSet::new();
        for entry in fs::read_dir(changes_root)? {
            let path = entry?.path();
            if !path.is_dir() || is_hidden(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Folder of change `name` under `changes_root`.
///
/// `name` must be a single plain path component, so the result never leaves
/// `changes_root`.
pub fn change_dir(changes_root: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name && !name.starts_with('.') => {
            Ok(changes_root.join(name))
        }
        _ => Err(ShiftError::Validation(format!(
            "'{name}' is not a change folder name"
        ))),
    }
}

/// Non-comment, non-blank manifest lines, trimmed.
pub(crate) fn manifest_entries(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Sequence number of a well-formed change filename.
pub(crate) fn sequence_of(filename: &str) -> Option<u16> {
    FILE_NAME
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn split_name(name: &str) -> (Option<NaiveDate>, String) {
    if let Some(caps) = DATED_NAME.captures(name) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            return (Some(date), caps[2].replace('-', " "));
        }
    }
    (None, name.replace('-', " "))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn read_direction(change_path: &Path, direction: Direction) -> Result<Vec<ChangeFile>> {
    let dir = change_path.join(direction.dir_name());
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut saw_entries = false;
    let mut files = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || is_hidden(&path) {
            continue;
        }
        saw_entries = true;
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            continue;
        };
        let (Some(kind), Some(sequence)) =
            (FileKind::from_filename(&filename), sequence_of(&filename))
        else {
            debug!("ignoring unrecognized file {}", path.display());
            continue;
        };
        files.push(ChangeFile {
            filename,
            path,
            kind,
            sequence,
        });
    }

    if saw_entries && files.is_empty() {
        return Err(ShiftError::Validation(format!(
            "{} contains files but none are valid change files",
            dir.display()
        )));
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}
