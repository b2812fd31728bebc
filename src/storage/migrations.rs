//! Schema bootstrap for the history and lock tables.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, ShiftError};

const MIGRATIONS: [&str; 2] = [
    include_str!("../../migrations/001_history.sql"),
    include_str!("../../migrations/002_locks.sql"),
];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Apply every migration newer than `PRAGMA user_version`.
///
/// Idempotent; returns the resulting schema version.
pub fn bootstrap(conn: &Connection) -> Result<u32> {
    let current_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| ShiftError::Migration(format!("read user_version: {err}")))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let target_version = (idx + 1) as u32;
        if current_version >= target_version {
            continue;
        }

        conn.execute_batch(sql).map_err(|err| {
            ShiftError::Migration(format!("migration {target_version} failed: {err}"))
        })?;
        conn.pragma_update(None, "user_version", target_version)
            .map_err(|err| {
                ShiftError::Migration(format!(
                    "failed to set user_version {target_version}: {err}"
                ))
            })?;
        debug!("applied schema migration {target_version}");
    }

    Ok(SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_user_version(conn: &Connection) -> u32 {
        conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn schema_version_matches_migrations_count() {
        assert_eq!(SCHEMA_VERSION, MIGRATIONS.len() as u32);
    }

    #[test]
    fn migrations_are_not_empty() {
        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            assert!(!sql.trim().is_empty(), "Migration {} is empty", idx + 1);
        }
    }

    #[test]
    fn bootstrap_on_empty_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_user_version(&conn), 0);

        assert_eq!(bootstrap(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(get_user_version(&conn), SCHEMA_VERSION);
        for table in ["shift_operations", "shift_file_executions", "shift_locks"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        for _ in 0..3 {
            assert_eq!(bootstrap(&conn).unwrap(), SCHEMA_VERSION);
        }
        assert_eq!(get_user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn bootstrap_resumes_from_partial_version() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0]).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        bootstrap(&conn).unwrap();
        assert!(table_exists(&conn, "shift_locks"));
    }

    #[test]
    fn lock_target_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        let insert = "INSERT INTO shift_locks (target, locked_by, locked_at, expires_at) \
                      VALUES ('dev', 'a', 'x', 'y')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
