//! Error types for the seekd orchestration core.

use std::path::PathBuf;

/// Top-level error type for the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Malformed or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A backend factory failed or panicked.
    #[error("failed to instantiate backend '{name}': {reason}")]
    BackendInstantiation { name: String, reason: String },

    /// A pre-built static index could not be opened.
    #[error("failed to open static index {}: {source}", path.display())]
    StaticIndex {
        path: PathBuf,
        #[source]
        source: StaticIndexError,
    },

    /// A worker was attached to, or detached from, a query result out of order.
    #[error("dispatch protocol error: {0}")]
    DispatchProtocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a static index directory cannot be served.
#[derive(Debug, thiserror::Error)]
pub enum StaticIndexError {
    /// The index was written by an incompatible format version.
    #[error("index format version {found} does not match supported version {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// The index contents could not be decoded.
    #[error("index is corrupt: {0}")]
    Corrupt(String),

    /// The index could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a backend while answering a query.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend tried to answer and failed.
    #[error("backend failed: {0}")]
    Failed(String),

    /// The backend cannot answer right now (still opening, shut down).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DaemonError>;
