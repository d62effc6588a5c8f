//! Configuration error kinds (§7: `config-missing`, `config-schema`).

use thiserror::Error;

/// Errors that can surface while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("config file not found at {0}")]
    Missing(String),

    /// The config file exists but is not valid JSON.
    #[error("malformed config json at {path}: {source}")]
    Malformed {
        /// Path to the offending file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The config parsed but failed a validation rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// I/O failure reading or writing the config file.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
