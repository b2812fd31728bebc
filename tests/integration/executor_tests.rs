use std::cell::RefCell;
use std::collections::BTreeMap;

use shiftdb::ShiftError;
use shiftdb::change::{ChangeParser, Direction};
use shiftdb::executor::{
    ExecuteOptions, ExecutionContext, ExecutionEvent, Executor, NullSink, RenderContext,
    SKIP_PREVIOUS_FAILED, SKIP_UNCHANGED, TemplateRenderer,
};
use shiftdb::storage::{FileStatus, LockOptions, OperationStatus};

use super::fixture::{IDENTITY, TARGET, TestFixture};

fn apply(fx: &TestFixture, name: &str) -> shiftdb::executor::ChangeResult {
    let change = ChangeParser::parse(&fx.changes.join(name)).unwrap();
    Executor::new(fx.ctx(&NullSink))
        .execute_change(&change, ExecuteOptions::default())
        .unwrap()
}

#[test]
fn second_run_processes_nothing() {
    let fx = TestFixture::new();
    fx.table_change("2024-01-01-users");

    let first = apply(&fx, "2024-01-01-users");
    assert_eq!(first.status, OperationStatus::Success);
    assert_eq!(first.executed_count(), 1);

    let second = apply(&fx, "2024-01-01-users");
    assert_eq!(second.status, OperationStatus::Success);
    assert!(second.up_to_date);
    assert_eq!(second.executed_count(), 0);
    assert_eq!(fx.count("SELECT COUNT(*) FROM shift_operations"), 1);
}

#[test]
fn editing_one_file_reruns_only_that_file() {
    let fx = TestFixture::new();
    let name = "2024-01-02-log";
    fx.change(
        name,
        &[
            ("001_table.sql", "CREATE TABLE IF NOT EXISTS log(v TEXT);"),
            ("002_first.sql", "INSERT INTO log VALUES ('b1');"),
            ("003_second.sql", "INSERT INTO log VALUES ('c');"),
        ],
        &[("001_drop.sql", "DROP TABLE log;")],
    );
    apply(&fx, name);

    fx.write(
        &format!("changes/{name}/change/002_first.sql"),
        "INSERT INTO log VALUES ('b2');",
    );
    let rerun = apply(&fx, name);

    let statuses: Vec<_> = rerun.files.iter().map(|f| f.status).collect();
    assert_eq!(
        statuses,
        [FileStatus::Skipped, FileStatus::Success, FileStatus::Skipped]
    );
    assert_eq!(rerun.files[0].skip_reason.as_deref(), Some(SKIP_UNCHANGED));
    assert_eq!(fx.count("SELECT COUNT(*) FROM log"), 3);
    assert_eq!(fx.count("SELECT COUNT(*) FROM log WHERE v = 'b2'"), 1);
}

#[test]
fn failure_skips_remaining_files_in_result_and_history() {
    let fx = TestFixture::new();
    let name = "2024-01-03-broken";
    fx.change(
        name,
        &[
            ("001_a.sql", "CREATE TABLE a(id INTEGER);"),
            ("002_b.sql", "INSERT INTO missing_table VALUES (1);"),
            ("003_c.sql", "CREATE TABLE c(id INTEGER);"),
        ],
        &[],
    );

    let result = apply(&fx, name);
    assert_eq!(result.status, OperationStatus::Failed);
    let statuses: Vec<_> = result.files.iter().map(|f| f.status).collect();
    assert_eq!(
        statuses,
        [FileStatus::Success, FileStatus::Failed, FileStatus::Skipped]
    );
    assert_eq!(
        result.files[2].skip_reason.as_deref(),
        Some(SKIP_PREVIOUS_FAILED)
    );
    assert!(result.error.as_deref().unwrap().contains("002_b.sql"));
    assert!(fx.table_exists("a"));
    assert!(!fx.table_exists("c"));

    let files = fx
        .manager()
        .file_history(result.operation_id.unwrap())
        .unwrap();
    assert_eq!(files.len(), 3);
    let operation = &fx.manager().history(Some(name), None).unwrap()[0];
    assert_eq!(operation.status, OperationStatus::Failed);
}

#[test]
fn failed_file_transaction_is_rolled_back_before_history_and_release() {
    let fx = TestFixture::new();
    let name = "2024-01-03-explicit-tx";
    fx.change(
        name,
        &[(
            "001_tx.sql",
            "BEGIN; CREATE TABLE t(id INTEGER); INSERT INTO nowhere VALUES (1); COMMIT;",
        )],
        &[],
    );

    let result = fx
        .locks()
        .with_lock(TARGET, IDENTITY, &LockOptions::default(), || {
            fx.manager().run(name, ExecuteOptions::default())
        })
        .unwrap();
    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.files[0].status, FileStatus::Failed);
    assert!(fx.db.conn().is_autocommit());
    assert!(!fx.table_exists("t"));
    assert_eq!(fx.count("SELECT COUNT(*) FROM shift_locks"), 0);

    // History was committed, so another connection sees the failure.
    let other = fx.reopen();
    let status: String = other
        .conn()
        .query_row(
            "SELECT status FROM shift_operations WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "failed");
}

#[test]
fn file_leaving_a_transaction_open_fails() {
    let fx = TestFixture::new();
    let name = "2024-01-03-unclosed-tx";
    fx.change(
        name,
        &[("001_tx.sql", "BEGIN; CREATE TABLE u(id INTEGER);")],
        &[],
    );

    let result = apply(&fx, name);
    assert_eq!(result.status, OperationStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("transaction"));
    assert!(fx.db.conn().is_autocommit());
    assert!(!fx.table_exists("u"));
}

#[test]
fn reapply_after_revert_runs_every_file() {
    let fx = TestFixture::new();
    fx.table_change("2024-01-04-orders");
    let manager = fx.manager();

    manager.run("2024-01-04-orders", ExecuteOptions::default()).unwrap();
    manager.revert("2024-01-04-orders", ExecuteOptions::default()).unwrap();
    assert!(!fx.table_exists("t_2024_01_04_orders"));

    let again = manager.run("2024-01-04-orders", ExecuteOptions::default()).unwrap();
    assert_eq!(again.executed_count(), 1);
    assert!(fx.table_exists("t_2024_01_04_orders"));
}

#[test]
fn manifest_runs_referenced_schema_files() {
    let fx = TestFixture::new();
    fx.write("schema/tables/users.sql", "CREATE TABLE IF NOT EXISTS users(id INTEGER);");
    fx.write(
        "schema/views/active.sql",
        "CREATE VIEW active_users AS SELECT id FROM users;",
    );
    fx.change(
        "2024-01-05-manifest",
        &[(
            "001_objects.txt",
            "# objects\n\ntables/users.sql\nviews/active.sql\n",
        )],
        &[],
    );

    let result = apply(&fx, "2024-01-05-manifest");
    assert_eq!(result.status, OperationStatus::Success);
    assert!(fx.table_exists("users"));
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM sqlite_master WHERE name = 'active_users'"),
        1
    );

    // Editing a referenced file changes the manifest's checksum.
    fx.write(
        "schema/views/active.sql",
        "DROP VIEW active_users; CREATE VIEW active_users AS SELECT id FROM users WHERE id > 0;",
    );
    let rerun = apply(&fx, "2024-01-05-manifest");
    assert_eq!(rerun.executed_count(), 1);
}

#[test]
fn manifest_errors_name_the_missing_reference() {
    let fx = TestFixture::new();
    fx.write("schema/a.sql", "SELECT 1;");
    fx.write("schema/b.sql", "SELECT 2;");
    let manifest = fx.write("m.txt", "a.sql\nb.sql\nnope.sql\n");

    match ChangeParser::resolve_manifest(&manifest, &fx.schema) {
        Err(ShiftError::ManifestReference { reference, .. }) => assert_eq!(reference, "nope.sql"),
        other => panic!("expected manifest reference error, got {other:?}"),
    }

    let only_comments = fx.write("empty.txt", "# nothing\n\n   \n# here\n");
    assert!(matches!(
        ChangeParser::resolve_manifest(&only_comments, &fx.schema),
        Err(ShiftError::Validation(_))
    ));
}

#[test]
fn templates_receive_config_values() {
    let fx = TestFixture::new();
    fx.change(
        "2024-01-06-templated",
        &[(
            "001_table.sql.tmpl",
            "CREATE TABLE {{ config.table }}(id INTEGER);",
        )],
        &[],
    );
    let renderer = TemplateRenderer::new(RenderContext {
        config: BTreeMap::from([("table".to_string(), "accounts".to_string())]),
        secrets: BTreeMap::new(),
    });
    let ctx = ExecutionContext {
        conn: fx.db.conn(),
        target: TARGET,
        identity: IDENTITY,
        project_root: fx.root(),
        schema_root: &fx.schema,
        renderer: &renderer,
        events: &NullSink,
    };
    let change = ChangeParser::parse(&fx.changes.join("2024-01-06-templated")).unwrap();
    let result = Executor::new(ctx)
        .execute_change(&change, ExecuteOptions::default())
        .unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert!(fx.table_exists("accounts"));
}

#[test]
fn events_follow_execution_order() {
    let fx = TestFixture::new();
    fx.change(
        "2024-01-07-events",
        &[
            ("001_a.sql", "CREATE TABLE ea(id INTEGER);"),
            ("002_b.sql", "CREATE TABLE eb(id INTEGER);"),
        ],
        &[],
    );
    let seen = RefCell::new(Vec::new());
    let sink = |event: &ExecutionEvent| seen.borrow_mut().push(event.clone());
    let change = ChangeParser::parse(&fx.changes.join("2024-01-07-events")).unwrap();
    Executor::new(fx.ctx(&sink))
        .execute_change(&change, ExecuteOptions::default())
        .unwrap();

    let seen = seen.into_inner();
    assert_eq!(seen.len(), 4);
    assert!(matches!(
        seen[0],
        ExecutionEvent::ChangeStart { file_count: 2, direction: Direction::Change, .. }
    ));
    assert!(matches!(&seen[1], ExecutionEvent::FileComplete { filepath, .. } if filepath.ends_with("001_a.sql")));
    assert!(matches!(&seen[2], ExecutionEvent::FileComplete { filepath, .. } if filepath.ends_with("002_b.sql")));
    assert!(matches!(
        seen[3],
        ExecutionEvent::ChangeComplete { status: OperationStatus::Success, .. }
    ));
}

#[test]
fn dry_run_leaves_no_trace() {
    let fx = TestFixture::new();
    fx.table_change("2024-01-08-dry");
    let result = fx
        .manager()
        .run(
            "2024-01-08-dry",
            ExecuteOptions {
                dry_run: true,
                ..ExecuteOptions::default()
            },
        )
        .unwrap();

    assert!(result.dry_run);
    assert!(result.operation_id.is_none());
    assert!(!fx.table_exists("t_2024_01_08_dry"));
    assert_eq!(fx.count("SELECT COUNT(*) FROM shift_operations"), 0);
}
