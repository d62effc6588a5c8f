//! Shared error kinds used across the agent orchestration crates.

use thiserror::Error;

/// Errors that can surface from the core data model and directory layout.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Neither `$GGCODE_HOME` nor `$HOME` could be resolved.
    #[error("cannot resolve ggcode home directory: {0}")]
    HomeUnresolved(String),

    /// A path supplied for a home override was not absolute.
    #[error("{0} must be an absolute path")]
    PathNotAbsolute(String),

    /// Failed to read or write a file under the ggcode home directory.
    #[error("io error at {path}: {source}")]
    Io {
        /// The path that was being accessed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document did not match the expected shape.
    #[error("malformed json at {path}: {source}")]
    Json {
        /// The path that was being parsed.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
