//! Error types for LapseKV
//!
//! Missing keys are never errors: the store reports them through sentinel
//! values (`None`, `0`, `-1`, `false`). The variants below cover I/O on the
//! append-only file and misuse of the sweeper lifecycle.

use std::io;
use thiserror::Error;

/// Result type alias for LapseKV operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A line of the append-only file could not be decoded.
    #[error("corrupt AOF record at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("expiry sweeper is already running")]
    CleanupAlreadyRunning,

    #[error("expiry sweeper is not running")]
    CleanupNotRunning,

    #[error("sweep interval must be greater than zero")]
    InvalidInterval,

    /// Background tasks need a Tokio runtime to be spawned on.
    #[error("no Tokio runtime available to spawn background task")]
    NoRuntime,
}
