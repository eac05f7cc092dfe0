use std::path::PathBuf;
use thiserror::Error;

/// The central error type for apidrift.
///
/// Only configuration and baseline-load failures abort a whole run; transport
/// and templating failures are caught per iteration and surfaced as
/// ERROR-status comparison results instead.
#[derive(Error, Debug)]
pub enum DriftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Baseline not found: {path}")]
    BaselineNotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Messaging error: {0}")]
    Messaging(String),
}

impl DriftError {
    /// Attach a path to an I/O failure.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach a path to a JSON (de)serialization failure.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriftError>;
