//! Error types for NetCDF engine operations.

use thiserror::Error;
use tseries_common::CommonError;

/// Result type for NetCDF engine operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF reads and writes.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// Error raised by libnetcdf
    #[error("NetCDF error on {path}: {source}")]
    Library {
        path: String,
        #[source]
        source: netcdf::Error,
    },

    /// Missing required variable or dimension
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Type the engine cannot map to an array
    #[error("Unsupported data type for '{variable}': {kind}")]
    UnsupportedType { variable: String, kind: String },

    /// Dimension already defined with another length
    #[error("Dimension '{name}' has length {existing}, variable needs {requested}")]
    DimensionConflict {
        name: String,
        existing: usize,
        requested: usize,
    },
}

impl NetCdfError {
    pub(crate) fn library(path: &std::path::Path, source: netcdf::Error) -> Self {
        NetCdfError::Library {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<NetCdfError> for CommonError {
    fn from(err: NetCdfError) -> Self {
        match err {
            NetCdfError::MissingData(name) => CommonError::VariableNotFound(name),
            NetCdfError::DimensionConflict {
                name,
                existing,
                requested,
            } => CommonError::ShapeMismatch {
                variable: name,
                expected: vec![existing],
                found: vec![requested],
            },
            other => CommonError::Read(other.to_string()),
        }
    }
}
