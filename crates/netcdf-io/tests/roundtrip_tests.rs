//! Write-then-read tests against real NetCDF-4 files.
//!
//! Requires libnetcdf and libhdf5 on the system.

use netcdf_io::NetcdfEngine;
use tseries_common::{
    ArrayEngine, ArrayValues, AttrValue, CommonError, Compression, CompressionAlgorithm,
    VariableData, VariableHeader,
};

fn time_var(values: Vec<f64>) -> VariableData {
    let header = VariableHeader::new("time", &[("time", values.len())])
        .with_attribute("units", "days since 1850-01-01")
        .with_attribute("calendar", "noleap");
    VariableData::new(header, ArrayValues::F64(values)).unwrap()
}

fn temp_var(steps: usize) -> VariableData {
    let header = VariableHeader::new("TEMP", &[("time", steps), ("lat", 2), ("lon", 3)])
        .with_attribute("units", "K")
        .with_attribute("_FillValue", 1.0e20);
    let values = (0..steps * 6).map(|i| i as f32).collect();
    VariableData::new(header, ArrayValues::F32(values)).unwrap()
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_write_then_read_variables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.nc");
    let engine = NetcdfEngine::new();

    let mut writer = engine.create(&path).unwrap();
    writer
        .put_global_attribute("source", &AttrValue::from("unit test"))
        .unwrap();
    writer
        .put_variable(&temp_var(2), &Compression::zlib(1))
        .unwrap();
    writer
        .put_variable(&time_var(vec![15.5, 45.0]), &Compression::NONE)
        .unwrap();
    writer.close().unwrap();

    let header = engine.read_header(&path).unwrap();
    let names: Vec<&str> = header.variable_names().collect();
    assert_eq!(names, vec!["TEMP", "time"]);
    assert_eq!(header.variable("TEMP").unwrap().shape, vec![2, 2, 3]);
    assert_eq!(
        header.variable("time").unwrap().attribute("calendar"),
        Some(&AttrValue::from("noleap"))
    );
    assert_eq!(header.attribute("source"), Some(&AttrValue::from("unit test")));

    let temp = engine.read_variable(&path, "TEMP").unwrap();
    assert_eq!(temp.values.type_name(), ArrayValues::F32(vec![]).type_name());
    assert_eq!(temp.values.to_f64().unwrap()[11], 11.0);
    let time = engine.read_variable(&path, "time").unwrap();
    assert_eq!(time.values, ArrayValues::F64(vec![15.5, 45.0]));
}

#[test]
fn test_completion_flag_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flag.nc");
    let engine = NetcdfEngine::new();

    let mut writer = engine.create(&path).unwrap();
    writer
        .put_global_attribute("timeseries_process", &AttrValue::Bool(false))
        .unwrap();
    writer.put_variable(&time_var(vec![1.0]), &Compression::NONE).unwrap();
    writer
        .put_global_attribute("timeseries_process", &AttrValue::Bool(true))
        .unwrap();
    writer.close().unwrap();

    let flag = engine
        .read_global_attribute(&path, "timeseries_process")
        .unwrap()
        .unwrap();
    assert_eq!(flag.as_bool(), Some(true));
    assert_eq!(engine.read_global_attribute(&path, "missing").unwrap(), None);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unsupported_codec_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zstd.nc");
    let engine = NetcdfEngine::new();

    let mut writer = engine.create(&path).unwrap();
    let result = writer.put_variable(
        &time_var(vec![1.0]),
        &Compression::new(Some(CompressionAlgorithm::Zstd), 3),
    );
    assert!(matches!(result, Err(CommonError::UnsupportedCompression(_))));
}

#[test]
fn test_missing_file_and_variable() {
    let dir = tempfile::tempdir().unwrap();
    let engine = NetcdfEngine::new();
    assert!(engine.read_header(&dir.path().join("absent.nc")).is_err());

    let path = dir.path().join("one.nc");
    let mut writer = engine.create(&path).unwrap();
    writer.put_variable(&time_var(vec![1.0]), &Compression::NONE).unwrap();
    writer.close().unwrap();
    assert!(matches!(
        engine.read_variable(&path, "nope"),
        Err(CommonError::VariableNotFound(_))
    ));
}

#[test]
fn test_conflicting_dimension_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dims.nc");
    let engine = NetcdfEngine::new();

    let mut writer = engine.create(&path).unwrap();
    let lat = |n: usize| {
        VariableData::new(
            VariableHeader::new("lat", &[("lat", n)]),
            ArrayValues::F64(vec![0.0; n]),
        )
        .unwrap()
    };
    writer.put_variable(&lat(2), &Compression::NONE).unwrap();
    let mut other = lat(3);
    other.header.name = "lat2".to_string();
    assert!(matches!(
        writer.put_variable(&other, &Compression::NONE),
        Err(CommonError::ShapeMismatch { .. })
    ));
}
