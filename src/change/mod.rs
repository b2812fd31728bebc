//! On-disk change model.
//!
//! A change is a folder holding numbered SQL files in `change/` (forward) and
//! `revert/` (reverse), plus an optional `changelog.md`. This module reads
//! those folders ([`ChangeParser`]) and edits them ([`ChangeScaffold`]); it
//! never touches the database.

mod parser;
mod scaffold;
mod types;

pub use parser::{CHANGELOG_FILE, ChangeParser, change_dir};
pub(crate) use parser::manifest_entries;
pub use scaffold::{ChangeScaffold, slugify};
pub use types::{Change, ChangeFile, Direction, FileKind};
