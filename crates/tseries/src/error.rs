//! Error types for the tseries crate.

use std::path::PathBuf;

use thiserror::Error;
use tseries_common::{Calendar, CommonError};

/// Errors raised while collecting history files or generating time series.
#[derive(Error, Debug)]
pub enum TseriesError {
    // === Discovery Errors ===
    #[error("Input directory does not exist: {0}")]
    MissingInputDir(PathBuf),

    #[error("Failed to read directory entry under {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    // === Metadata Errors ===
    #[error("Not a usable history file {path}: {reason}")]
    InvalidHistoryFile { path: PathBuf, reason: String },

    #[error("Calendar mismatch at {path}: expected {expected}, found {found}")]
    CalendarMismatch {
        expected: Calendar,
        found: Calendar,
        path: PathBuf,
    },

    // === Grouping Errors ===
    #[error("Ambiguous member order in group {group}: {reason}")]
    AmbiguousOrder { group: String, reason: String },

    // === Generation Errors ===
    #[error("Variable '{variable}' in {path} is not indexed by time first")]
    TimeNotLeading { variable: String, path: PathBuf },

    #[error("Output path claimed by more than one task: {0}")]
    DuplicateOutput(PathBuf),

    #[error("Task {0} has no member files")]
    EmptyTask(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Wrapped Errors ===
    #[error(transparent)]
    Engine(#[from] CommonError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TseriesError {
    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidHistoryFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn pattern(pattern: &str, err: glob::PatternError) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            message: err.msg.to_string(),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result type for tseries operations.
pub type Result<T> = std::result::Result<T, TseriesError>;
