//! Error types for store and playback operations.

use thiserror::Error;

/// Result type for macro operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The named macro (or its file) does not exist. Recoverable: the
    /// playback loop skips the entry and continues.
    #[error("macro not found: {0}")]
    NotFound(String),

    /// The macro file exists but its payload does not parse. Also skipped
    /// during playback, but logged at error level since it means corruption.
    #[error("corrupt macro {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A synthesize-input call was rejected by the host. Non-fatal;
    /// playback logs it and moves on.
    #[error("injection failed: {0}")]
    Injection(String),

    /// I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
