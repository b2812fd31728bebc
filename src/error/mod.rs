//! Error handling for shiftdb.
//!
//! This module provides:
//! - [`ShiftError`]: The main error enum for all engine operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestions and context
//! - Suggestion helpers for context-aware error recovery hints

mod codes;
mod suggestions;

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;
pub use suggestions::suggest_for_error;

/// Main error type for shiftdb operations.
#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Change not found: {0}")]
    ChangeNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Manifest {} references missing file: {reference}", .manifest.display())]
    ManifestReference { manifest: PathBuf, reference: String },

    #[error("Change '{0}' is already applied")]
    AlreadyApplied(String),

    #[error("Change '{0}' has not been applied")]
    NotApplied(String),

    #[error("Change '{0}' is orphaned: history exists but its folder is missing")]
    Orphaned(String),

    #[error("Template render failed for {}: {reason}", .path.display())]
    Render { path: PathBuf, reason: String },

    #[error(
        "Lock for '{target}' is held by {holder} since {held_since} (expires {expires_at}){}",
        .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
    )]
    LockAcquire {
        target: String,
        holder: String,
        held_since: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        reason: Option<String>,
    },

    #[error("Lock for '{target}' is held by {holder}, not {requester}")]
    LockOwnership {
        target: String,
        holder: String,
        requester: String,
    },

    #[error("No lock held for '{0}'")]
    LockNotFound(String),

    #[error("Lock for '{target}' expired at {expired_at}")]
    LockExpired {
        target: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),
}

impl ShiftError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) | Self::Migration(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::ChangeNotFound(_) => ErrorCode::ChangeNotFound,
            Self::Validation(_) => ErrorCode::ChangeInvalid,
            Self::ManifestReference { .. } => ErrorCode::ManifestReferenceMissing,
            Self::AlreadyApplied(_) => ErrorCode::ChangeAlreadyApplied,
            Self::NotApplied(_) => ErrorCode::ChangeNotApplied,
            Self::Orphaned(_) => ErrorCode::ChangeOrphaned,
            Self::Render { .. } => ErrorCode::RenderFailed,
            Self::LockAcquire { .. } => ErrorCode::LockHeld,
            Self::LockOwnership { .. } => ErrorCode::LockNotOwned,
            Self::LockNotFound(_) => ErrorCode::LockNotFound,
            Self::LockExpired { .. } => ErrorCode::LockExpired,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::ChangeNotFound(name)
            | Self::AlreadyApplied(name)
            | Self::NotApplied(name)
            | Self::Orphaned(name) => Some(serde_json::json!({ "change": name })),
            Self::ManifestReference {
                manifest,
                reference,
            } => Some(serde_json::json!({
                "manifest": manifest.display().to_string(),
                "reference": reference,
            })),
            Self::LockAcquire {
                target,
                holder,
                held_since,
                expires_at,
                reason,
            } => Some(serde_json::json!({
                "target": target,
                "holder": holder,
                "held_since": held_since,
                "expires_at": expires_at,
                "reason": reason,
            })),
            Self::LockOwnership {
                target,
                holder,
                requester,
            } => Some(serde_json::json!({
                "target": target,
                "holder": holder,
                "requester": requester,
            })),
            Self::LockNotFound(target) => Some(serde_json::json!({ "target": target })),
            Self::LockExpired { target, expired_at } => {
                Some(serde_json::json!({ "target": target, "expired_at": expired_at }))
            }
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_shift_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
///
/// Emitted in `--json` mode so scripts and CI jobs can branch on the code
/// instead of parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "LOCK_HELD")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 701)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "change", "lock", "storage")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`ShiftError`].
    #[must_use]
    pub fn from_shift_error(err: &ShiftError) -> Self {
        let code = err.code();
        let context = err.context();
        let suggestion = suggest_for_error(code, context.as_ref());

        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion,
            context,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self.suggestion = suggest_for_error(self.code, self.context.as_ref());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&ShiftError> for StructuredError {
    fn from(err: &ShiftError) -> Self {
        Self::from_shift_error(err)
    }
}

/// Result type alias using [`ShiftError`].
pub type Result<T> = std::result::Result<T, ShiftError>;
