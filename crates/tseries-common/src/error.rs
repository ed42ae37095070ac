//! Error types shared by array engines and the calendar model.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by array engines and time decoding.
#[derive(Debug, Error)]
pub enum CommonError {
    // === Engine Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Failed to read data: {0}")]
    Read(String),

    #[error("Failed to write data: {0}")]
    Write(String),

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    // === Array Errors ===
    #[error("Shape mismatch for '{variable}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        variable: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Type mismatch for '{variable}': {left} vs {right}")]
    TypeMismatch {
        variable: String,
        left: &'static str,
        right: &'static str,
    },

    // === Time Errors ===
    #[error("Unknown calendar: {0}")]
    UnknownCalendar(String),

    #[error("Invalid time units: {0}")]
    InvalidUnits(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),
}
