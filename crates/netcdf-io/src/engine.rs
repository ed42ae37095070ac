//! Reading side of the NetCDF engine.

use std::path::Path;

use netcdf::types::{FloatType, IntType, NcVariableType};
use tracing::debug;
use tseries_common::{
    ArrayEngine, ArrayValues, AttrValue, CommonError, CommonResult, DatasetHeader, DatasetWriter,
    VariableData, VariableHeader,
};

use crate::attributes::from_netcdf;
use crate::error::{NetCdfError, NetCdfResult};
use crate::silence_hdf5_errors;
use crate::writer::NetcdfWriter;

/// [`ArrayEngine`] for NetCDF-4 files.
#[derive(Debug, Clone, Copy)]
pub struct NetcdfEngine {
    _private: (),
}

impl NetcdfEngine {
    /// Create the engine, silencing HDF5's stderr diagnostics for the
    /// process.
    pub fn new() -> Self {
        silence_hdf5_errors();
        Self { _private: () }
    }
}

impl Default for NetcdfEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn open(path: &Path) -> NetCdfResult<netcdf::File> {
    netcdf::open(path).map_err(|e| NetCdfError::library(path, e))
}

/// Readable attributes; values with no [`AttrValue`] counterpart are skipped.
fn attributes<'a, I>(attrs: I) -> Vec<(String, AttrValue)>
where
    I: Iterator<Item = netcdf::Attribute<'a>>,
{
    attrs
        .filter_map(|attr| {
            let value = from_netcdf(attr.value().ok()?)?;
            Some((attr.name().to_string(), value))
        })
        .collect()
}

fn variable_header(var: &netcdf::Variable) -> VariableHeader {
    VariableHeader {
        name: var.name(),
        dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
        shape: var.dimensions().iter().map(|d| d.len()).collect(),
        attributes: attributes(var.attributes()).into_iter().collect(),
    }
}

fn read_values(path: &Path, var: &netcdf::Variable) -> NetCdfResult<ArrayValues> {
    let lib = |e: netcdf::Error| NetCdfError::library(path, e);
    let values = match var.vartype() {
        NcVariableType::Int(IntType::I8) => ArrayValues::I8(var.get_values(..).map_err(lib)?),
        NcVariableType::Int(IntType::U8) => ArrayValues::U8(var.get_values(..).map_err(lib)?),
        NcVariableType::Int(IntType::I16) => ArrayValues::I16(var.get_values(..).map_err(lib)?),
        NcVariableType::Int(IntType::U16) => ArrayValues::I32(
            var.get_values::<u16, _>(..)
                .map_err(lib)?
                .into_iter()
                .map(i32::from)
                .collect(),
        ),
        NcVariableType::Int(IntType::I32) => ArrayValues::I32(var.get_values(..).map_err(lib)?),
        NcVariableType::Int(IntType::U32) => ArrayValues::I64(
            var.get_values::<u32, _>(..)
                .map_err(lib)?
                .into_iter()
                .map(i64::from)
                .collect(),
        ),
        NcVariableType::Int(IntType::I64) => ArrayValues::I64(var.get_values(..).map_err(lib)?),
        NcVariableType::Int(IntType::U64) => ArrayValues::I64(
            var.get_values::<u64, _>(..)
                .map_err(lib)?
                .into_iter()
                .map(|v| v as i64)
                .collect(),
        ),
        NcVariableType::Float(FloatType::F32) => {
            ArrayValues::F32(var.get_values(..).map_err(lib)?)
        }
        NcVariableType::Float(FloatType::F64) => {
            ArrayValues::F64(var.get_values(..).map_err(lib)?)
        }
        NcVariableType::Char => ArrayValues::Char(var.get_raw_values(..).map_err(lib)?),
        other => {
            return Err(NetCdfError::UnsupportedType {
                variable: var.name(),
                kind: format!("{:?}", other),
            })
        }
    };
    Ok(values)
}

impl ArrayEngine for NetcdfEngine {
    fn read_header(&self, path: &Path) -> CommonResult<DatasetHeader> {
        let file = open(path)?;
        let variables = file
            .variables()
            .map(|var| {
                let header = variable_header(&var);
                (header.name.clone(), header)
            })
            .collect();
        Ok(DatasetHeader {
            variables,
            attributes: attributes(file.attributes()).into_iter().collect(),
        })
    }

    fn read_variable(&self, path: &Path, name: &str) -> CommonResult<VariableData> {
        let file = open(path)?;
        let var = file
            .variable(name)
            .ok_or_else(|| CommonError::VariableNotFound(name.to_string()))?;
        let values = read_values(path, &var)?;
        debug!(path = %path.display(), variable = name, elements = values.len(), "Read variable");
        VariableData::new(variable_header(&var), values)
    }

    fn read_global_attribute(&self, path: &Path, name: &str) -> CommonResult<Option<AttrValue>> {
        let file = open(path)?;
        let value = match file.attribute(name) {
            Some(attr) => attr.value().ok().and_then(from_netcdf),
            None => None,
        };
        Ok(value)
    }

    fn create(&self, path: &Path) -> CommonResult<Box<dyn DatasetWriter>> {
        let file = netcdf::create(path)
            .map_err(|e| CommonError::Write(NetCdfError::library(path, e).to_string()))?;
        Ok(Box::new(NetcdfWriter::new(path, file)))
    }
}
