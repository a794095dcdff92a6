//! Error types for the reconciliation engine

use std::path::PathBuf;

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, ReconError>;

/// Error type for reconciliation operations.
///
/// The variants fall into two groups. Per-file failures (`Io`, `Checksum`,
/// `Copy`) are recovered inside the reconciliation loop: the file is logged
/// and skipped. Run-level failures (`Config`, `Store`, `Report`) abort the
/// run and map to distinct process exit codes at the CLI boundary.
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Checksum computation errors
    #[error("Checksum error for '{path}': {message}")]
    Checksum { path: PathBuf, message: String },

    /// File copying errors
    #[error("Copy error: {message}")]
    Copy { message: String },

    /// Invalid or missing configuration, detected before any traversal
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Persisted store errors, fatal to the whole run
    #[error("Store error: {message}")]
    Store { message: String },

    /// Report sink errors
    #[error("Report error: {message}")]
    Report { message: String },
}

impl ReconError {
    /// Create a new checksum error
    pub fn checksum_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Checksum {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new copy error
    pub fn copy_error(
        source: impl AsRef<std::path::Path>,
        dest: impl AsRef<std::path::Path>,
        message: impl Into<String>,
    ) -> Self {
        let full_message = format!(
            "copy from '{}' to '{}' failed: {}",
            source.as_ref().display(),
            dest.as_ref().display(),
            message.into()
        );
        Self::Copy {
            message: full_message,
        }
    }

    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new store error
    pub fn store_error(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new report error
    pub fn report_error(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Store { .. } | Self::Report { .. }
        )
    }
}

impl From<rusqlite::Error> for ReconError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}
