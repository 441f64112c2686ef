//! Error types for snapshot calculation and installation.

use crate::oracle::OracleError;
use thiserror::Error;
use varve_store::StoreError;

/// Errors that abort a single compaction invocation.
///
/// Undecodable entries are never surfaced here; the scan skips them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompactionError {
    #[error("Log store read failed: {0}")]
    Store(#[from] StoreError),

    #[error("Pending transaction floor unavailable: {0}")]
    Oracle(#[from] OracleError),

    #[error("Snapshot installation failed: {0}")]
    Install(StoreError),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("Snapshot version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CompactionError>;
