//! Lease locks stored in the target database.
//!
//! One row per target in `shift_locks`. A lock is valid until `expires_at`;
//! nothing watches the holder process, so a crashed holder's lock simply
//! lapses. Expired rows are logically absent and get deleted lazily by
//! [`LockManager::acquire`] and [`LockManager::status`].
//!
//! Every read-check-act sequence runs in an IMMEDIATE transaction, which
//! takes the SQLite write lock at `BEGIN`, so two processes cannot both see
//! an empty row and insert.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ShiftError};

use super::dialect::Dialect;
use super::sqlite::{format_timestamp, timestamp_at};

const LOCK_TABLE: &str = "shift_locks";

/// Acquire and extend parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Lease length from the moment of acquisition.
    pub timeout: Duration,
    pub reason: Option<String>,
    /// Poll until `wait_timeout` instead of failing on contention.
    pub wait: bool,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            reason: None,
            wait: false,
            wait_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub target: String,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl Lock {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left on the lease, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    fn held_error(self) -> ShiftError {
        ShiftError::LockAcquire {
            target: self.target,
            holder: self.locked_by,
            held_since: self.locked_at,
            expires_at: self.expires_at,
            reason: self.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub is_locked: bool,
    pub lock: Option<Lock>,
}

enum Attempt {
    Acquired(Lock),
    Held(Lock),
}

pub struct LockManager<'a> {
    conn: &'a Connection,
    table: String,
}

impl<'a> LockManager<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection, dialect: Dialect) -> Self {
        Self {
            conn,
            table: dialect.quote_ident(LOCK_TABLE),
        }
    }

    /// Take the lock for `target`, or renew it if `identity` already holds it.
    ///
    /// Fails with [`ShiftError::LockAcquire`] when another identity holds a
    /// live lease. With `opts.wait`, polls every `poll_interval` until
    /// `wait_timeout` has elapsed before failing.
    pub fn acquire(&self, target: &str, identity: &str, opts: &LockOptions) -> Result<Lock> {
        let deadline = Instant::now() + opts.wait_timeout;
        loop {
            match self.try_acquire(target, identity, opts)? {
                Attempt::Acquired(lock) => return Ok(lock),
                Attempt::Held(holder) => {
                    let now = Instant::now();
                    if !opts.wait || now >= deadline {
                        debug!(
                            lock_target = target,
                            holder = %holder.locked_by,
                            "lock held by another identity"
                        );
                        return Err(holder.held_error());
                    }
                    let pause = opts.poll_interval.min(deadline - now);
                    debug!(lock_target = target, ?pause, "waiting for lock");
                    thread::sleep(pause);
                }
            }
        }
    }

    /// Delete the lock if `identity` holds it.
    pub fn release(&self, target: &str, identity: &str) -> Result<()> {
        let tx = self.begin()?;
        let current = self.read(&tx, target)?;
        match current {
            None => return Err(ShiftError::LockNotFound(target.to_string())),
            Some(lock) if lock.locked_by != identity => {
                return Err(ShiftError::LockOwnership {
                    target: target.to_string(),
                    holder: lock.locked_by,
                    requester: identity.to_string(),
                });
            }
            Some(_) => {}
        }
        self.delete(&tx, target)?;
        tx.commit()?;
        info!(lock_target = target, "released lock");
        Ok(())
    }

    /// Delete the lock regardless of holder. Returns whether a row existed.
    pub fn force_release(&self, target: &str) -> Result<bool> {
        let tx = self.begin()?;
        if let Some(lock) = self.read(&tx, target)? {
            warn!(
                lock_target = target,
                holder = %lock.locked_by,
                since = %lock.locked_at,
                "force-releasing lock"
            );
        }
        let removed = self.delete(&tx, target)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Push the expiry of a lock `identity` holds. Never creates a lock.
    ///
    /// An expired row counts as absent.
    pub fn extend(&self, target: &str, identity: &str, opts: &LockOptions) -> Result<Lock> {
        let tx = self.begin()?;
        let now = now();
        let lock = match self.read(&tx, target)? {
            Some(lock) if lock.is_expired_at(now) => {
                return Err(ShiftError::LockNotFound(target.to_string()));
            }
            None => return Err(ShiftError::LockNotFound(target.to_string())),
            Some(lock) if lock.locked_by != identity => {
                return Err(ShiftError::LockOwnership {
                    target: target.to_string(),
                    holder: lock.locked_by,
                    requester: identity.to_string(),
                });
            }
            Some(lock) => self.renew(&tx, lock, now, opts)?,
        };
        tx.commit()?;
        Ok(lock)
    }

    /// Read-only check that `identity` holds a live lease on `target`.
    pub fn validate(&self, target: &str, identity: &str) -> Result<Lock> {
        let Some(lock) = self.read(self.conn, target)? else {
            return Err(ShiftError::LockNotFound(target.to_string()));
        };
        if lock.locked_by != identity {
            return Err(ShiftError::LockOwnership {
                target: target.to_string(),
                holder: lock.locked_by,
                requester: identity.to_string(),
            });
        }
        if lock.is_expired_at(now()) {
            return Err(ShiftError::LockExpired {
                target: target.to_string(),
                expired_at: lock.expires_at,
            });
        }
        Ok(lock)
    }

    /// Current lock for `target`. An expired row is deleted on the way.
    pub fn status(&self, target: &str) -> Result<LockStatus> {
        let tx = self.begin()?;
        let lock = match self.read(&tx, target)? {
            Some(lock) if lock.is_expired_at(now()) => {
                self.delete(&tx, target)?;
                debug!(lock_target = target, holder = %lock.locked_by, "cleaned up expired lock");
                None
            }
            other => other,
        };
        tx.commit()?;
        Ok(LockStatus {
            is_locked: lock.is_some(),
            lock,
        })
    }

    /// Acquire, returning a guard that releases on drop.
    pub fn guard(
        &self,
        target: &str,
        identity: &str,
        opts: &LockOptions,
    ) -> Result<LockGuard<'_>> {
        let lock = self.acquire(target, identity, opts)?;
        Ok(LockGuard {
            manager: self,
            lock,
            released: false,
        })
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released whether `f` succeeds or fails, and the result of
    /// `f` is returned unchanged. Losing the lock before the release (an
    /// expired lease taken over or cleaned up) is logged, not returned: the
    /// work has already been committed.
    pub fn with_lock<T, F>(&self, target: &str, identity: &str, opts: &LockOptions, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let guard = self.guard(target, identity, opts)?;
        let result = f();
        match result {
            Ok(value) => {
                if let Err(err) = guard.release() {
                    warn!(lock_target = target, "lock lost before release: {err}");
                }
                Ok(value)
            }
            Err(err) => {
                drop(guard);
                Err(err)
            }
        }
    }

    fn try_acquire(&self, target: &str, identity: &str, opts: &LockOptions) -> Result<Attempt> {
        let tx = self.begin()?;
        let now = now();
        let attempt = match self.read(&tx, target)? {
            Some(lock) if lock.is_expired_at(now) => {
                debug!(lock_target = target, holder = %lock.locked_by, "replacing expired lock");
                self.delete(&tx, target)?;
                match self.insert(&tx, target, identity, now, opts)? {
                    Some(lock) => Attempt::Acquired(lock),
                    None => return self.conflict(tx, target),
                }
            }
            Some(lock) if lock.locked_by == identity => {
                Attempt::Acquired(self.renew(&tx, lock, now, opts)?)
            }
            Some(lock) => Attempt::Held(lock),
            None => match self.insert(&tx, target, identity, now, opts)? {
                Some(lock) => Attempt::Acquired(lock),
                None => return self.conflict(tx, target),
            },
        };
        tx.commit()?;
        if let Attempt::Acquired(lock) = &attempt {
            info!(lock_target = target, holder = identity, expires_at = %lock.expires_at, "acquired lock");
        }
        Ok(attempt)
    }

    /// A unique violation on insert means a concurrent writer won the row.
    fn conflict(&self, tx: Transaction<'_>, target: &str) -> Result<Attempt> {
        tx.rollback()?;
        match self.read(self.conn, target)? {
            Some(lock) => Ok(Attempt::Held(lock)),
            None => Err(ShiftError::LockNotFound(target.to_string())),
        }
    }

    fn renew(
        &self,
        conn: &Connection,
        mut lock: Lock,
        now: DateTime<Utc>,
        opts: &LockOptions,
    ) -> Result<Lock> {
        let requested = now + lease(opts.timeout)?;
        let bumped = lock.expires_at + chrono::Duration::microseconds(1);
        lock.expires_at = requested.max(bumped);
        if opts.reason.is_some() {
            lock.reason.clone_from(&opts.reason);
        }
        let sql = format!(
            "UPDATE {} SET expires_at = ?1, reason = ?2 WHERE target = ?3",
            self.table
        );
        conn.execute(
            &sql,
            params![format_timestamp(lock.expires_at), lock.reason, lock.target],
        )?;
        debug!(lock_target = %lock.target, expires_at = %lock.expires_at, "renewed lock");
        Ok(lock)
    }

    /// `None` when the target already has a row.
    fn insert(
        &self,
        conn: &Connection,
        target: &str,
        identity: &str,
        now: DateTime<Utc>,
        opts: &LockOptions,
    ) -> Result<Option<Lock>> {
        let lock = Lock {
            target: target.to_string(),
            locked_by: identity.to_string(),
            locked_at: now,
            expires_at: now + lease(opts.timeout)?,
            reason: opts.reason.clone(),
        };
        let sql = format!(
            "INSERT INTO {} (target, locked_by, locked_at, expires_at, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        let inserted = conn.execute(
            &sql,
            params![
                lock.target,
                lock.locked_by,
                format_timestamp(lock.locked_at),
                format_timestamp(lock.expires_at),
                lock.reason,
            ],
        );
        match inserted {
            Ok(_) => Ok(Some(lock)),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read(&self, conn: &Connection, target: &str) -> Result<Option<Lock>> {
        let sql = format!(
            "SELECT target, locked_by, locked_at, expires_at, reason FROM {} WHERE target = ?1",
            self.table
        );
        let lock = conn
            .query_row(&sql, [target], |row| {
                Ok(Lock {
                    target: row.get(0)?,
                    locked_by: row.get(1)?,
                    locked_at: timestamp_at(row, 2)?,
                    expires_at: timestamp_at(row, 3)?,
                    reason: row.get(4)?,
                })
            })
            .optional()?;
        Ok(lock)
    }

    fn delete(&self, conn: &Connection, target: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE target = ?1", self.table);
        Ok(conn.execute(&sql, [target])? > 0)
    }

    fn begin(&self) -> Result<Transaction<'a>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

/// Holds a lock until released or dropped.
pub struct LockGuard<'a> {
    manager: &'a LockManager<'a>,
    lock: Lock,
    released: bool,
}

impl LockGuard<'_> {
    #[must_use]
    pub const fn lock(&self) -> &Lock {
        &self.lock
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.release(&self.lock.target, &self.lock.locked_by)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self
            .manager
            .release(&self.lock.target, &self.lock.locked_by)
        {
            warn!(lock_target = %self.lock.target, "failed to release lock: {err}");
        }
    }
}

/// Current time at the precision locks are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn lease(timeout: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(timeout)
        .map_err(|_| ShiftError::Config(format!("lock timeout {timeout:?} is out of range")))
}
