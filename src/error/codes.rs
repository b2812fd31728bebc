//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Change structure errors (folders, files, manifests)
//! - 2xx: State conflicts between disk and recorded history
//! - 3xx: Config errors
//! - 4xx: Template render errors
//! - 6xx: Storage errors
//! - 7xx: Lock contention errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for `--json` output.
///
/// Each variant maps to a numeric code (e.g., `ChangeNotFound` -> E101).
/// Codes are grouped by category for easy identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Change structure errors (1xx)
    // ========================================
    /// E101: Change folder does not exist
    ChangeNotFound,
    /// E102: Change folder exists but its structure is invalid
    ChangeInvalid,
    /// E103: A manifest references a file that does not exist
    ManifestReferenceMissing,

    // ========================================
    // State conflicts (2xx)
    // ========================================
    /// E201: Change is already applied
    ChangeAlreadyApplied,
    /// E202: Change has never been applied
    ChangeNotApplied,
    /// E203: History exists but the change folder is gone
    ChangeOrphaned,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file has invalid syntax or values
    ConfigInvalid,
    /// E302: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Render errors (4xx)
    // ========================================
    /// E401: Template rendering failed
    RenderFailed,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Database operation failed
    DatabaseError,
    /// E602: Serialization/deserialization failed
    SerializationError,
    /// E603: IO operation failed
    IoError,

    // ========================================
    // Lock errors (7xx)
    // ========================================
    /// E701: Another identity holds the lock
    LockHeld,
    /// E702: The lock belongs to a different identity
    LockNotOwned,
    /// E703: No lock exists for the target
    LockNotFound,
    /// E704: The caller's lock lapsed
    LockExpired,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ChangeNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::ChangeNotFound => 101,
            Self::ChangeInvalid => 102,
            Self::ManifestReferenceMissing => 103,

            Self::ChangeAlreadyApplied => 201,
            Self::ChangeNotApplied => 202,
            Self::ChangeOrphaned => 203,

            Self::ConfigInvalid => 301,
            Self::ConfigMissingRequired => 302,

            Self::RenderFailed => 401,

            Self::DatabaseError => 601,
            Self::SerializationError => 602,
            Self::IoError => 603,

            Self::LockHeld => 701,
            Self::LockNotOwned => 702,
            Self::LockNotFound => 703,
            Self::LockExpired => 704,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ChangeNotFound => "Run `shift list` to see known changes, or `shift new <description>` to create one",
            Self::ChangeInvalid => "Each change needs at least one NNN_name.sql, .sql.tmpl or .txt file under change/ or revert/",
            Self::ManifestReferenceMissing => "Fix the manifest entry or add the missing file under the schema directory",

            Self::ChangeAlreadyApplied => "Revert the change first, or remove its history with `shift remove --db`",
            Self::ChangeNotApplied => "Nothing to revert. Run `shift list` to check the change status",
            Self::ChangeOrphaned => "Restore the change folder, or drop its history with `shift remove <name> --db`",

            Self::ConfigInvalid => "Check TOML syntax in shift.toml and SHIFT_* environment variables",
            Self::ConfigMissingRequired => "Set the value in shift.toml or via the matching SHIFT_* variable",

            Self::RenderFailed => "Check the template placeholders against the [vars] section and SHIFT_SECRET_* variables",

            Self::DatabaseError => "Check that the database file is reachable and not corrupted",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",

            Self::LockHeld => "Wait for the holder to finish (`--wait`), or break an abandoned lock with `shift lock force-release`",
            Self::LockNotOwned => "Only the holder can release or extend this lock",
            Self::LockNotFound => "No lock is held. Run `shift lock status` to check",
            Self::LockExpired => "Your lease lapsed. Acquire the lock again before continuing",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::DatabaseError | Self::SerializationError)
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "change",
            2 => "state",
            3 => "config",
            4 => "render",
            6 => "storage",
            7 => "lock",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ChangeNotFound,
            Self::ChangeInvalid,
            Self::ManifestReferenceMissing,
            Self::ChangeAlreadyApplied,
            Self::ChangeNotApplied,
            Self::ChangeOrphaned,
            Self::ConfigInvalid,
            Self::ConfigMissingRequired,
            Self::RenderFailed,
            Self::DatabaseError,
            Self::SerializationError,
            Self::IoError,
            Self::LockHeld,
            Self::LockNotOwned,
            Self::LockNotFound,
            Self::LockExpired,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
