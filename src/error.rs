//! Error types for the catalog loader and the favorites persistence layer.
//!
//! Application glue (the binary and the TUI) works with `anyhow`, but the
//! library boundary keeps typed errors so callers can tell a missing database
//! apart from a failing one and degrade accordingly.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the favorites store and its persistence coordinator.
/// Every variant is recoverable from the caller's point of view.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("favorites database at {} is unavailable: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// A read or write on an open database failed.
    #[error("favorites database I/O failed: {0}")]
    StorageIo(#[from] rusqlite::Error),

    /// Creating or migrating the favorites table failed after retries.
    #[error("failed to prepare favorites schema: {0}")]
    Schema(#[source] rusqlite::Error),

    /// An imported blob is not a database holding a favorites table.
    #[error("snapshot is not a valid favorites database: {0}")]
    InvalidSnapshot(String),

    /// Temporary files used by export/import could not be written or read.
    #[error("snapshot file operation failed: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// The blocking worker running a database call was lost.
    #[error("database worker stopped unexpectedly: {0}")]
    Worker(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures while loading or validating a song catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid song record: {0}")]
    InvalidSong(String),

    #[error("song id {0:?} appears more than once in the catalog")]
    DuplicateId(String),
}
