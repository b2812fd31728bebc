use std::fs;

use shiftdb::ShiftError;
use shiftdb::executor::ExecuteOptions;
use shiftdb::manager::{BatchOptions, BatchStatus, RemoveOptions, RewindTarget};
use shiftdb::storage::ChangeStatus;

use super::fixture::TestFixture;

const FIVE: [&str; 5] = [
    "2024-02-01-first",
    "2024-02-02-second",
    "2024-02-03-third",
    "2024-02-04-fourth",
    "2024-02-05-fifth",
];

fn five_changes(fx: &TestFixture) {
    for name in FIVE {
        fx.table_change(name);
    }
}

#[test]
fn deleted_folder_shows_up_as_orphan() {
    let fx = TestFixture::new();
    five_changes(&fx);
    let manager = fx.manager();
    manager.ff(BatchOptions::default()).unwrap();

    fs::remove_dir_all(fx.changes.join(FIVE[1])).unwrap();
    let items = manager.list().unwrap();

    assert_eq!(items.len(), 5);
    let orphan = items.iter().find(|i| i.name == FIVE[1]).unwrap();
    assert!(orphan.orphaned);
    assert_eq!(orphan.status, ChangeStatus::Success);
    assert!(orphan.path.is_none());
    assert!(items.iter().filter(|i| i.name != FIVE[1]).all(|i| !i.orphaned));

    assert!(matches!(
        manager.run(FIVE[1], ExecuteOptions::default()),
        Err(ShiftError::Orphaned(_))
    ));
}

#[test]
fn next_stops_at_the_first_failure() {
    let fx = TestFixture::new();
    five_changes(&fx);
    fx.write(
        &format!("changes/{}/change/001_create.sql", FIVE[1]),
        "THIS IS NOT SQL;",
    );

    let batch = fx.manager().next(3, BatchOptions::default()).unwrap();

    assert_eq!(batch.status, BatchStatus::Partial);
    assert_eq!(batch.succeeded, 1);
    assert_eq!(batch.failed, 1);
    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.not_attempted, [FIVE[2]]);
    assert!(fx.table_exists("t_2024_02_01_first"));
    assert!(!fx.table_exists("t_2024_02_03_third"));
}

#[test]
fn ff_applies_everything_outstanding() {
    let fx = TestFixture::new();
    five_changes(&fx);
    let manager = fx.manager();
    manager.next(2, BatchOptions::default()).unwrap();

    let batch = manager.ff(BatchOptions::default()).unwrap();
    let names: Vec<_> = batch.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, &FIVE[2..]);
    assert_eq!(batch.status, BatchStatus::Success);

    let again = manager.ff(BatchOptions::default()).unwrap();
    assert!(again.results.is_empty());
    assert_eq!(again.status, BatchStatus::Success);
}

#[test]
fn rewind_by_count_reverts_most_recent_first() {
    let fx = TestFixture::new();
    five_changes(&fx);
    let manager = fx.manager();
    manager.ff(BatchOptions::default()).unwrap();

    let batch = manager
        .rewind(&RewindTarget::Count(2), BatchOptions::default())
        .unwrap();
    let names: Vec<_> = batch.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, [FIVE[4], FIVE[3]]);
    assert!(!fx.table_exists("t_2024_02_05_fifth"));
    assert!(!fx.table_exists("t_2024_02_04_fourth"));
    assert!(fx.table_exists("t_2024_02_03_third"));

    let statuses: Vec<_> = manager.list().unwrap().into_iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        [
            ChangeStatus::Success,
            ChangeStatus::Success,
            ChangeStatus::Success,
            ChangeStatus::Reverted,
            ChangeStatus::Reverted,
        ]
    );
}

#[test]
fn rewind_by_name_includes_the_named_change() {
    let fx = TestFixture::new();
    five_changes(&fx);
    let manager = fx.manager();
    manager.ff(BatchOptions::default()).unwrap();

    let batch = manager
        .rewind(&RewindTarget::Name(FIVE[2].to_string()), BatchOptions::default())
        .unwrap();
    let names: Vec<_> = batch.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, [FIVE[4], FIVE[3], FIVE[2]]);
    assert!(fx.table_exists("t_2024_02_02_second"));

    let unknown = manager
        .rewind(&RewindTarget::Name("2030-01-01-nope".into()), BatchOptions::default())
        .unwrap();
    assert_eq!(unknown.status, BatchStatus::Failed);
    assert!(unknown.results.is_empty());
}

#[test]
fn rewind_follows_application_order_not_names() {
    let fx = TestFixture::new();
    fx.table_change("2024-03-01-a");
    fx.table_change("2024-03-02-b");
    let manager = fx.manager();
    manager.run("2024-03-02-b", ExecuteOptions::default()).unwrap();
    manager.run("2024-03-01-a", ExecuteOptions::default()).unwrap();

    let batch = manager
        .rewind(&RewindTarget::Count(1), BatchOptions::default())
        .unwrap();
    assert_eq!(batch.results[0].name, "2024-03-01-a");
    assert!(fx.table_exists("t_2024_03_02_b"));
}

#[test]
fn remove_of_folder_and_history_forgets_the_change() {
    let fx = TestFixture::new();
    fx.table_change("2024-04-01-gone");
    let manager = fx.manager();
    manager.run("2024-04-01-gone", ExecuteOptions::default()).unwrap();

    let guarded = manager.remove(
        "2024-04-01-gone",
        RemoveOptions {
            disk: true,
            ..RemoveOptions::default()
        },
    );
    assert!(matches!(guarded, Err(ShiftError::AlreadyApplied(_))));

    let removed = manager
        .remove(
            "2024-04-01-gone",
            RemoveOptions {
                disk: true,
                db: true,
                force: false,
            },
        )
        .unwrap();
    assert!(removed.folder_removed);
    assert_eq!(removed.records_removed, 1);
    assert!(manager.list().unwrap().is_empty());
    assert!(matches!(
        manager.run("2024-04-01-gone", ExecuteOptions::default()),
        Err(ShiftError::ChangeNotFound(_))
    ));
}
