use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use shiftdb::ShiftError;
use shiftdb::storage::{Database, Dialect, LockManager, LockOptions};

use super::fixture::{TARGET, TestFixture};

const ALICE: &str = "alice <alice@example.com>";
const BOB: &str = "bob <bob@example.com>";

#[test]
fn second_connection_sees_the_holder() {
    let fx = TestFixture::new();
    let other = fx.reopen();
    let alice = fx.locks();
    let bob = LockManager::new(other.conn(), Dialect::Sqlite);

    alice
        .acquire(TARGET, ALICE, &LockOptions::default())
        .unwrap();

    match bob.acquire(TARGET, BOB, &LockOptions::default()) {
        Err(ShiftError::LockAcquire { holder, .. }) => assert_eq!(holder, ALICE),
        other => panic!("expected lock contention, got {other:?}"),
    }
    assert_eq!(
        bob.status(TARGET).unwrap().lock.unwrap().locked_by,
        ALICE
    );
}

#[test]
fn waiting_picks_up_an_expiring_lease() {
    let fx = TestFixture::new();
    let other = fx.reopen();
    let alice = fx.locks();
    let bob = LockManager::new(other.conn(), Dialect::Sqlite);

    alice
        .acquire(
            TARGET,
            ALICE,
            &LockOptions {
                timeout: Duration::from_millis(300),
                ..LockOptions::default()
            },
        )
        .unwrap();

    let lock = bob
        .acquire(
            TARGET,
            BOB,
            &LockOptions {
                wait: true,
                wait_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(50),
                ..LockOptions::default()
            },
        )
        .unwrap();
    assert_eq!(lock.locked_by, BOB);
}

#[test]
fn concurrent_acquirers_get_exactly_one_winner() {
    let fx = TestFixture::new();
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let path = fx.db_path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                let locks = LockManager::new(db.conn(), Dialect::Sqlite);
                let identity = format!("worker-{i}");
                barrier.wait();
                locks
                    .acquire(TARGET, &identity, &LockOptions::default())
                    .is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn renewal_only_moves_expiry_forward() {
    let fx = TestFixture::new();
    let locks = fx.locks();
    let opts = LockOptions::default();

    let first = locks.acquire(TARGET, ALICE, &opts).unwrap();
    let renewed = locks.acquire(TARGET, ALICE, &opts).unwrap();
    assert!(renewed.expires_at > first.expires_at);
    assert_eq!(renewed.locked_at, first.locked_at);

    let shorter = locks
        .extend(
            TARGET,
            ALICE,
            &LockOptions {
                timeout: Duration::from_secs(1),
                ..LockOptions::default()
            },
        )
        .unwrap();
    assert!(shorter.expires_at > renewed.expires_at);
}

#[test]
fn with_lock_releases_after_an_error() {
    let fx = TestFixture::new();
    let locks = fx.locks();

    let outcome: shiftdb::Result<()> =
        locks.with_lock(TARGET, ALICE, &LockOptions::default(), || {
            Err(ShiftError::Validation("boom".into()))
        });
    assert!(matches!(outcome, Err(ShiftError::Validation(msg)) if msg == "boom"));
    assert!(!locks.status(TARGET).unwrap().is_locked);

    let value = locks
        .with_lock(TARGET, ALICE, &LockOptions::default(), || Ok(7))
        .unwrap();
    assert_eq!(value, 7);
    assert!(!locks.status(TARGET).unwrap().is_locked);
}

#[test]
fn with_lock_keeps_the_result_when_the_lease_lapses() {
    let fx = TestFixture::new();
    let other = fx.reopen();
    let locks = fx.locks();
    let observer = LockManager::new(other.conn(), Dialect::Sqlite);
    let lease = LockOptions {
        timeout: Duration::from_millis(30),
        ..LockOptions::default()
    };

    let outcome = locks.with_lock(TARGET, ALICE, &lease, || {
        thread::sleep(Duration::from_millis(60));
        // Status on another connection deletes the expired row.
        assert!(!observer.status(TARGET).unwrap().is_locked);
        Ok("work done")
    });
    assert_eq!(outcome.unwrap(), "work done");
    assert!(!locks.status(TARGET).unwrap().is_locked);
}

#[test]
fn with_lock_leaves_a_takeover_alone() {
    let fx = TestFixture::new();
    let other = fx.reopen();
    let locks = fx.locks();
    let bob = LockManager::new(other.conn(), Dialect::Sqlite);
    let lease = LockOptions {
        timeout: Duration::from_millis(30),
        ..LockOptions::default()
    };

    let outcome = locks.with_lock(TARGET, ALICE, &lease, || {
        thread::sleep(Duration::from_millis(60));
        bob.acquire(TARGET, BOB, &LockOptions::default())?;
        Ok(1)
    });
    assert_eq!(outcome.unwrap(), 1);
    assert_eq!(
        locks.status(TARGET).unwrap().lock.unwrap().locked_by,
        BOB
    );
}

#[test]
fn only_the_holder_can_release() {
    let fx = TestFixture::new();
    let locks = fx.locks();
    locks
        .acquire(TARGET, ALICE, &LockOptions::default())
        .unwrap();

    assert!(matches!(
        locks.release(TARGET, BOB),
        Err(ShiftError::LockOwnership { .. })
    ));
    assert!(locks.force_release(TARGET).unwrap());
    assert!(!locks.force_release(TARGET).unwrap());
}
