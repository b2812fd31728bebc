//! Filesystem operations that create and edit change folders.
//!
//! Nothing here touches the database; history is only written by the
//! executor.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::error::{Result, ShiftError};

use super::parser::{sequence_of, CHANGELOG_FILE};
use super::types::{Change, ChangeFile, Direction, FileKind};

pub struct ChangeScaffold;

impl ChangeScaffold {
    /// Create `<changes_root>/<date>-<slug>/` with empty `change/` and `revert/`.
    pub fn create(changes_root: &Path, description: &str, date: Option<NaiveDate>) -> Result<Change> {
        let slug = slugify(description);
        if slug.is_empty() {
            return Err(ShiftError::Validation(
                "change description must contain letters or digits".to_string(),
            ));
        }
        let name = match date {
            Some(date) => format!("{}-{slug}", date.format("%Y-%m-%d")),
            None => slug,
        };
        let path = changes_root.join(&name);
        if path.exists() {
            return Err(ShiftError::Validation(format!("change '{name}' already exists")));
        }

        fs::create_dir_all(path.join(Direction::Change.dir_name()))?;
        fs::create_dir_all(path.join(Direction::Revert.dir_name()))?;
        fs::write(path.join(CHANGELOG_FILE), format!("# {}\n", description.trim()))?;
        info!("created change {name}");

        Ok(Change {
            name,
            path,
            date,
            description: description.trim().to_string(),
            change_files: Vec::new(),
            revert_files: Vec::new(),
            has_changelog: true,
        })
    }

    /// Add the next numbered file to one direction of a change.
    pub fn add_file(
        change_path: &Path,
        direction: Direction,
        description: &str,
        kind: FileKind,
        content: &str,
    ) -> Result<ChangeFile> {
        ensure_change(change_path)?;
        let slug = slugify(description).replace('-', "_");
        if slug.is_empty() {
            return Err(ShiftError::Validation(
                "file description must contain letters or digits".to_string(),
            ));
        }

        let dir = change_path.join(direction.dir_name());
        fs::create_dir_all(&dir)?;
        let sequence = next_sequence(&dir)?;
        let filename = format!("{sequence:03}_{slug}.{}", kind.extension());
        let path = dir.join(&filename);
        fs::write(&path, content)?;

        Ok(ChangeFile {
            filename,
            path,
            kind,
            sequence,
        })
    }

    /// Delete one file; numbering of the others is left alone.
    pub fn remove_file(change_path: &Path, direction: Direction, filename: &str) -> Result<()> {
        let path = existing_file(change_path, direction, filename)?;
        fs::remove_file(path)?;
        Ok(())
    }

    /// Change a file's description, keeping its sequence number and extension.
    pub fn rename_file(
        change_path: &Path,
        direction: Direction,
        filename: &str,
        new_description: &str,
    ) -> Result<ChangeFile> {
        let old_path = existing_file(change_path, direction, filename)?;
        let kind = FileKind::from_filename(filename)
            .ok_or_else(|| ShiftError::Validation(format!("'{filename}' is not a change file")))?;
        let sequence = sequence_of(filename)
            .ok_or_else(|| ShiftError::Validation(format!("'{filename}' has no sequence number")))?;
        let slug = slugify(new_description).replace('-', "_");
        if slug.is_empty() {
            return Err(ShiftError::Validation(
                "file description must contain letters or digits".to_string(),
            ));
        }

        let extension = if filename.ends_with(".sql.tmpl") {
            "sql.tmpl"
        } else {
            kind.extension()
        };
        let new_filename = format!("{sequence:03}_{slug}.{extension}");
        let new_path = change_path.join(direction.dir_name()).join(&new_filename);
        if new_path != old_path && new_path.exists() {
            return Err(ShiftError::Validation(format!("'{new_filename}' already exists")));
        }
        fs::rename(&old_path, &new_path)?;

        Ok(ChangeFile {
            filename: new_filename,
            path: new_path,
            kind,
            sequence,
        })
    }

    /// Remove a change folder and everything in it.
    ///
    /// Refuses folders without a `change/` or `revert/` subfolder.
    pub fn delete(change_path: &Path) -> Result<()> {
        ensure_change(change_path)?;
        let has_direction = [Direction::Change, Direction::Revert]
            .iter()
            .any(|d| change_path.join(d.dir_name()).is_dir());
        if !has_direction {
            return Err(ShiftError::Validation(format!(
                "{} is not a change folder",
                change_path.display()
            )));
        }
        fs::remove_dir_all(change_path)?;
        info!("deleted change folder {}", change_path.display());
        Ok(())
    }
}

/// Lowercase, alphanumeric runs joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn ensure_change(change_path: &Path) -> Result<()> {
    if change_path.is_dir() {
        Ok(())
    } else {
        Err(ShiftError::ChangeNotFound(change_path.display().to_string()))
    }
}

fn existing_file(change_path: &Path, direction: Direction, filename: &str) -> Result<PathBuf> {
    ensure_change(change_path)?;
    let path = change_path.join(direction.dir_name()).join(filename);
    if sequence_of(filename).is_some() && path.is_file() {
        Ok(path)
    } else {
        Err(ShiftError::Validation(format!(
            "'{filename}' is not in {}/",
            direction.dir_name()
        )))
    }
}

fn next_sequence(dir: &Path) -> Result<u16> {
    let mut max = 0u16;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(seq) = entry.file_name().to_str().and_then(sequence_of) {
            max = max.max(seq);
        }
    }
    if max >= 999 {
        return Err(ShiftError::Validation(format!(
            "{} already uses sequence 999",
            dir.display()
        )));
    }
    Ok(max + 1)
}
