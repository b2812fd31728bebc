use std::fs;
use std::path::{Path, PathBuf};

use shiftdb::executor::{EventSink, ExecutionContext, NullSink, TemplateRenderer};
use shiftdb::manager::ChangeManager;
use shiftdb::storage::{Database, Dialect, LockManager};
use tempfile::TempDir;

pub const TARGET: &str = "test";
pub const IDENTITY: &str = "tester <tester@example.com>";

/// A project on disk with a file-backed database.
pub struct TestFixture {
    pub temp: TempDir,
    pub changes: PathBuf,
    pub schema: PathBuf,
    pub db_path: PathBuf,
    pub db: Database,
    pub renderer: TemplateRenderer,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join(".shift/shift.db");
        let db = Database::open(&db_path).unwrap();
        Self {
            changes: temp.path().join("changes"),
            schema: temp.path().join("schema"),
            db_path,
            db,
            renderer: TemplateRenderer::default(),
            temp,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a change folder with the given forward and revert files.
    pub fn change(&self, name: &str, up: &[(&str, &str)], down: &[(&str, &str)]) {
        for (file, sql) in up {
            self.write(&format!("changes/{name}/change/{file}"), sql);
        }
        for (file, sql) in down {
            self.write(&format!("changes/{name}/revert/{file}"), sql);
        }
        fs::create_dir_all(self.changes.join(name).join("change")).unwrap();
        fs::create_dir_all(self.changes.join(name).join("revert")).unwrap();
    }

    /// A change creating and dropping one table named after it.
    pub fn table_change(&self, name: &str) {
        let table = format!("t_{}", name.replace('-', "_"));
        self.change(
            name,
            &[("001_create.sql", &format!("CREATE TABLE {table}(id INTEGER);"))],
            &[("001_drop.sql", &format!("DROP TABLE {table};"))],
        );
    }

    pub fn ctx<'a>(&'a self, events: &'a dyn EventSink) -> ExecutionContext<'a> {
        ExecutionContext {
            conn: self.db.conn(),
            target: TARGET,
            identity: IDENTITY,
            project_root: self.root(),
            schema_root: &self.schema,
            renderer: &self.renderer,
            events,
        }
    }

    pub fn manager(&self) -> ChangeManager<'_> {
        ChangeManager::new(self.ctx(&NullSink), &self.changes)
    }

    pub fn locks(&self) -> LockManager<'_> {
        LockManager::new(self.db.conn(), Dialect::Sqlite)
    }

    /// A second, independent connection to the same database file.
    pub fn reopen(&self) -> Database {
        Database::open(&self.db_path).unwrap()
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
            == 1
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.db.conn().query_row(sql, [], |row| row.get(0)).unwrap()
    }
}
