//! Error types shared across the crate.
//!
//! Only configuration problems and "nothing to build" surface as `Err`.
//! Everything that can go wrong per shot or per timeline item is collected
//! into the operation's result struct as an [`ItemError`].

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading / validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<String>),

    #[error("invalid naming pattern '{key}': {source}")]
    Pattern {
        key: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Directory scanning failures. Listing errors never reach callers
/// (they degrade to empty listings); these are reported per shot.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan worker panicked while scanning {0}")]
    WorkerPanic(String),
}

/// Failures raised by a timeline host adapter.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no active project")]
    NoProject,

    #[error("unknown {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("timeline {0} already has a track named {1}")]
    Duplicate(String, String),

    #[error("host rejected operation: {0}")]
    Rejected(String),

    #[error("session I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl HostError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        HostError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Hard failures of a timeline build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No valid shots found for {0}")]
    NoValidShots(String),

    #[error("host unavailable: {0}")]
    Host(#[from] HostError),
}

/// A recorded, non-fatal failure tied to one shot or timeline item.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ItemError {
    pub subject: String,
    pub message: String,
}

impl ItemError {
    pub fn new(subject: impl Into<String>, message: impl ToString) -> Self {
        Self {
            subject: subject.into(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}
