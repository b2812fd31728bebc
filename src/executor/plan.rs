//! File checksums and the ordered list of files an operation will process.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::change::{ChangeParser, FileKind};
use crate::error::Result;

/// One unit of execution: a SQL file, or a manifest and the files it lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Path recorded in history, relative to the project root when possible.
    pub filepath: String,
    pub path: PathBuf,
    pub kind: FileKind,
    pub checksum: String,
    /// Files whose SQL runs, in order. A SQL file lists only itself.
    pub sources: Vec<PathBuf>,
}

impl PlannedFile {
    /// Hash the file and, for a manifest, resolve its references.
    pub fn load(path: &Path, kind: FileKind, project_root: &Path, schema_root: &Path) -> Result<Self> {
        let (checksum, sources) = match kind {
            FileKind::Sql => (file_checksum(path)?, vec![path.to_path_buf()]),
            FileKind::Manifest => {
                let sources = ChangeParser::resolve_manifest(path, schema_root)?;
                (manifest_checksum(&sources, schema_root)?, sources)
            }
        };
        Ok(Self {
            filepath: display_path(path, project_root),
            path: path.to_path_buf(),
            kind,
            checksum,
            sources,
        })
    }
}

/// SHA-256 hex of the file bytes.
pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over each referenced file's relative path followed by its bytes.
pub fn manifest_checksum(sources: &[PathBuf], schema_root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update(display_path(source, schema_root).as_bytes());
        hasher.update([0]);
        hasher.update(fs::read(source)?);
        hasher.update([0]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over the ordered file checksums of one direction.
#[must_use]
pub fn combined_checksum(files: &[PlannedFile]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.checksum.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// `path` relative to `root` with `/` separators, or as given when outside it.
pub(crate) fn display_path(path: &Path, root: &Path) -> String {
    let Ok(relative) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn file_checksum_is_sha256_hex() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.sql");
        write(&path, "abc");
        assert_eq!(
            file_checksum(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn manifest_checksum_follows_referenced_content() {
        let temp = TempDir::new().unwrap();
        let schema = temp.path().join("schema");
        write(&schema.join("tables/a.sql"), "create table a(id int);");
        let manifest = temp.path().join("001_m.txt");
        write(&manifest, "tables/a.sql\n");

        let before = PlannedFile::load(&manifest, FileKind::Manifest, temp.path(), &schema).unwrap();
        write(&schema.join("tables/a.sql"), "create table a(id bigint);");
        let after = PlannedFile::load(&manifest, FileKind::Manifest, temp.path(), &schema).unwrap();

        assert_ne!(before.checksum, after.checksum);
        assert_eq!(before.filepath, "001_m.txt");
        assert_eq!(before.sources, vec![schema.join("tables/a.sql")]);
    }

    #[test]
    fn combined_checksum_depends_on_order() {
        let file = |sum: &str| PlannedFile {
            filepath: String::new(),
            path: PathBuf::new(),
            kind: FileKind::Sql,
            checksum: sum.to_string(),
            sources: Vec::new(),
        };
        let ab = combined_checksum(&[file("a"), file("b")]);
        let ba = combined_checksum(&[file("b"), file("a")]);
        assert_ne!(ab, ba);
        assert_eq!(ab, combined_checksum(&[file("a"), file("b")]));
    }

    #[test]
    fn display_path_is_relative_with_slashes() {
        let root = Path::new("/proj");
        assert_eq!(
            display_path(Path::new("/proj/changes/x/change/001_a.sql"), root),
            "changes/x/change/001_a.sql"
        );
        assert_eq!(display_path(Path::new("/elsewhere/a.sql"), root), "/elsewhere/a.sql");
    }
}
