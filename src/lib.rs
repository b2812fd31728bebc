pub mod app;
pub mod change;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod runner;
pub mod storage;

pub use error::{Result, ShiftError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
