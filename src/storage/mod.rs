//! Storage layer for shiftdb
//!
//! Everything persistent lives in the target database itself: execution
//! history and lease locks, bootstrapped by the embedded migrations.

pub mod dialect;
pub mod history;
pub mod lock;
pub mod migrations;
pub mod sqlite;

pub use dialect::Dialect;
pub use history::{
    ChangeStatus, ChangeStatusRecord, FileRecord, FileScope, FileStatus, HistoryTracker,
    NewFileRecord, NewOperation, OperationKind, OperationRecord, OperationStatus,
};
pub use lock::{Lock, LockGuard, LockManager, LockOptions, LockStatus};
pub use sqlite::Database;
