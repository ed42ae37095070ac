//! Array I/O collaborator interface.
//!
//! The core never touches file bytes itself. It reads headers and variable
//! slabs through an [`ArrayEngine`] and writes outputs through the
//! [`DatasetWriter`] the engine hands back from [`ArrayEngine::create`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::array::{AttrValue, DatasetHeader, VariableData};
use crate::error::{CommonError, CommonResult};

/// Compression codec applied to an output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Zlib,
    Zstd,
    Bzip2,
}

impl CompressionAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Zlib => "zlib",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Bzip2 => "bzip2",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zlib" | "deflate" => Ok(CompressionAlgorithm::Zlib),
            "zstd" | "zstandard" => Ok(CompressionAlgorithm::Zstd),
            "bzip2" | "bz2" => Ok(CompressionAlgorithm::Bzip2),
            other => Err(CommonError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Per-variable compression settings. The default is uncompressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    #[serde(default)]
    pub algorithm: Option<CompressionAlgorithm>,
    #[serde(default)]
    pub level: u8,
}

impl Compression {
    pub const NONE: Compression = Compression {
        algorithm: None,
        level: 0,
    };

    pub fn new(algorithm: Option<CompressionAlgorithm>, level: u8) -> Self {
        Self { algorithm, level }
    }

    pub fn zlib(level: u8) -> Self {
        Self::new(Some(CompressionAlgorithm::Zlib), level)
    }

    /// Codec and level to actually apply, or `None` when uncompressed.
    ///
    /// A positive level without an explicit codec means zlib.
    pub fn resolve(&self) -> Option<(CompressionAlgorithm, u8)> {
        if self.level == 0 {
            return None;
        }
        Some((
            self.algorithm.unwrap_or(CompressionAlgorithm::Zlib),
            self.level,
        ))
    }
}

/// Reads and creates self-describing array files.
///
/// Implementations must be shareable across worker threads; each call opens
/// its own handle so concurrent tasks never share file state.
pub trait ArrayEngine: Send + Sync {
    /// Variables, dimensions and attributes of the file at `path`.
    fn read_header(&self, path: &Path) -> CommonResult<DatasetHeader>;

    /// Full values of one variable.
    fn read_variable(&self, path: &Path, name: &str) -> CommonResult<VariableData>;

    fn read_global_attribute(&self, path: &Path, name: &str) -> CommonResult<Option<AttrValue>> {
        Ok(self.read_header(path)?.attributes.get(name).cloned())
    }

    /// Create (truncating) an output file.
    fn create(&self, path: &Path) -> CommonResult<Box<dyn DatasetWriter>>;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> CommonResult<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn prepare_dir(&self, dir: &Path) -> CommonResult<()> {
        std::fs::create_dir_all(dir)?;
        Ok(())
    }
}

/// An open output file.
pub trait DatasetWriter {
    fn put_global_attribute(&mut self, name: &str, value: &AttrValue) -> CommonResult<()>;

    /// Define and write one variable, creating any dimension it needs.
    /// A `time` dimension is always created unlimited.
    fn put_variable(&mut self, variable: &VariableData, compression: &Compression)
        -> CommonResult<()>;

    /// Flush and release the file handle.
    fn close(self: Box<Self>) -> CommonResult<()>;
}
