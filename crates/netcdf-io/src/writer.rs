//! Writing side of the NetCDF engine.

use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;
use tseries_common::{
    ArrayValues, AttrValue, CommonError, CommonResult, Compression, CompressionAlgorithm,
    DatasetWriter, VariableData, VariableHeader,
};

use crate::attributes::{is_fill_attribute, to_netcdf, typed_like};
use crate::error::NetCdfError;

/// Dimension that is always created unlimited.
const TIME_DIMENSION: &str = "time";

fn write_error(path: &Path, err: netcdf::Error) -> CommonError {
    CommonError::Write(NetCdfError::library(path, err).to_string())
}

/// An open NetCDF-4 output. The file handle is released on drop.
pub(crate) struct NetcdfWriter {
    path: PathBuf,
    file: netcdf::FileMut,
}

impl NetcdfWriter {
    pub(crate) fn new(path: &Path, file: netcdf::FileMut) -> Self {
        Self {
            path: path.to_path_buf(),
            file,
        }
    }

    fn ensure_dimension(&mut self, name: &str, len: usize) -> CommonResult<()> {
        if let Some(existing) = self.file.dimension(name) {
            if existing.is_unlimited() || existing.len() == len {
                return Ok(());
            }
            return Err(NetCdfError::DimensionConflict {
                name: name.to_string(),
                existing: existing.len(),
                requested: len,
            }
            .into());
        }
        let added = if name == TIME_DIMENSION {
            self.file.add_unlimited_dimension(name).map(|_| ())
        } else {
            self.file.add_dimension(name, len).map(|_| ())
        };
        added.map_err(|e| write_error(&self.path, e))
    }
}

/// Zlib level to apply, if any.
fn deflate_level(compression: &Compression) -> CommonResult<Option<i32>> {
    match compression.resolve() {
        None => Ok(None),
        Some((CompressionAlgorithm::Zlib, level)) => Ok(Some(i32::from(level))),
        Some((other, _)) => Err(CommonError::UnsupportedCompression(other.to_string())),
    }
}

fn put_attributes(
    var: &mut netcdf::VariableMut,
    header: &VariableHeader,
    values: &ArrayValues,
) -> Result<(), netcdf::Error> {
    for (name, value) in &header.attributes {
        let stored = if is_fill_attribute(name) {
            match typed_like(value, values) {
                Some(typed) => typed,
                None => continue,
            }
        } else {
            to_netcdf(value)
        };
        var.put_attribute(name, stored)?;
    }
    Ok(())
}

impl DatasetWriter for NetcdfWriter {
    fn put_global_attribute(&mut self, name: &str, value: &AttrValue) -> CommonResult<()> {
        self.file
            .add_attribute(name, to_netcdf(value))
            .map(|_| ())
            .map_err(|e| write_error(&self.path, e))
    }

    fn put_variable(
        &mut self,
        variable: &VariableData,
        compression: &Compression,
    ) -> CommonResult<()> {
        let level = deflate_level(compression)?;
        let header = &variable.header;
        for (dim, &len) in header.dimensions.iter().zip(&header.shape) {
            self.ensure_dimension(dim, len)?;
        }

        let path = self.path.clone();
        let dims: Vec<&str> = header.dimensions.iter().map(String::as_str).collect();
        let extents: Vec<Range<usize>> = header.shape.iter().map(|&n| 0..n).collect();
        let file = &mut self.file;

        macro_rules! write_as {
            ($ty:ty, $values:expr) => {{
                let mut var = file
                    .add_variable::<$ty>(&header.name, &dims)
                    .map_err(|e| write_error(&path, e))?;
                if let Some(level) = level {
                    var.set_compression(level, true)
                        .map_err(|e| write_error(&path, e))?;
                }
                put_attributes(&mut var, header, &variable.values)
                    .map_err(|e| write_error(&path, e))?;
                var.put_values::<$ty, _>($values.as_slice(), extents.as_slice())
                    .map_err(|e| write_error(&path, e))?;
            }};
        }

        // Character data is stored as unsigned bytes.
        match &variable.values {
            ArrayValues::I8(v) => write_as!(i8, v),
            ArrayValues::U8(v) => write_as!(u8, v),
            ArrayValues::I16(v) => write_as!(i16, v),
            ArrayValues::I32(v) => write_as!(i32, v),
            ArrayValues::I64(v) => write_as!(i64, v),
            ArrayValues::F32(v) => write_as!(f32, v),
            ArrayValues::F64(v) => write_as!(f64, v),
            ArrayValues::Char(v) => write_as!(u8, v),
        }
        debug!(
            path = %path.display(),
            variable = %header.name,
            deflate = ?level,
            "Wrote variable"
        );
        Ok(())
    }

    fn close(self: Box<Self>) -> CommonResult<()> {
        debug!(path = %self.path.display(), "Closing output");
        drop(self);
        Ok(())
    }
}
