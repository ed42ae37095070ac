//! Synthetic history file generators.
//!
//! Generated files follow the usual model output layout: data variables over
//! `(time, lat, lon)`, a `time` coordinate in the `360_day` calendar counted
//! in `days since 1850-01-01`, and a `time_bounds` variable over
//! `(time, bnds)`.
//!
//! Data values are predictable: every cell of step `t` in variable index `v`
//! holds `times[t] + v`, so concatenation order can be checked by reading
//! the values back.

use std::io;
use std::path::{Path, PathBuf};

use tseries_common::{ArrayValues, AttrValue, VariableData, VariableHeader};

use crate::memory::{MemoryEngine, StoredDataset};
use crate::paths::touch;

pub const DEFAULT_CALENDAR: &str = "360_day";
pub const DEFAULT_UNITS: &str = "days since 1850-01-01";
pub const LAT: usize = 3;
pub const LON: usize = 4;
pub const LEV: usize = 5;

/// Description of one synthetic history file.
///
/// # Example
///
/// ```
/// use test_utils::HistoryFileSpec;
///
/// let dataset = HistoryFileSpec::monthly(0).build();
/// assert_eq!(dataset.values_f64("time"), Some(vec![30.0]));
/// assert!(dataset.header.variable("VAR5").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct HistoryFileSpec {
    pub times: Vec<f64>,
    pub bounds: Option<Vec<[f64; 2]>>,
    pub variables: Vec<String>,
    pub calendar: String,
    pub units: String,
    /// Add `lat`, `hyam` and `date_written` auxiliary variables.
    pub auxiliary: bool,
    pub global_attributes: Vec<(String, AttrValue)>,
}

impl HistoryFileSpec {
    pub fn new(times: Vec<f64>) -> Self {
        Self {
            times,
            bounds: None,
            variables: (0..6).map(|i| format!("VAR{}", i)).collect(),
            calendar: DEFAULT_CALENDAR.to_string(),
            units: DEFAULT_UNITS.to_string(),
            auxiliary: false,
            global_attributes: vec![
                ("source".to_string(), AttrValue::from("tseries testing suite")),
                ("frequency".to_string(), AttrValue::from("month")),
            ],
        }
    }

    /// The `index`-th file of a monthly run: one step at `(index + 1) * 30`
    /// bounded by `[index * 30, (index + 1) * 30]`.
    pub fn monthly(index: usize) -> Self {
        let lower = index as f64 * 30.0;
        Self::new(vec![lower + 30.0]).with_bounds(vec![[lower, lower + 30.0]])
    }

    /// `count` steps of `step_days`, starting at `first`, each bounded by
    /// the preceding interval.
    pub fn steps(first: f64, step_days: f64, count: usize) -> Self {
        let times: Vec<f64> = (0..count).map(|i| first + i as f64 * step_days).collect();
        let bounds = times.iter().map(|&t| [t - step_days, t]).collect();
        Self::new(times).with_bounds(bounds)
    }

    pub fn with_bounds(mut self, bounds: Vec<[f64; 2]>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn without_bounds(mut self) -> Self {
        self.bounds = None;
        self
    }

    pub fn num_vars(mut self, count: usize) -> Self {
        self.variables = (0..count).map(|i| format!("VAR{}", i)).collect();
        self
    }

    pub fn variables<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.variables = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn calendar(mut self, calendar: &str) -> Self {
        self.calendar = calendar.to_string();
        self
    }

    pub fn units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn with_auxiliary(mut self) -> Self {
        self.auxiliary = true;
        self
    }

    pub fn with_global_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.global_attributes.push((name.to_string(), value.into()));
        self
    }

    /// Expected value of every cell of step `t` in variable `var_index`.
    pub fn cell_value(&self, t: usize, var_index: usize) -> f64 {
        self.times[t] + var_index as f64
    }

    /// Materialize the dataset.
    pub fn build(&self) -> StoredDataset {
        let steps = self.times.len();
        let mut dataset = StoredDataset::new();
        for (name, value) in &self.global_attributes {
            dataset = dataset.with_attribute(name, value.clone());
        }

        for (index, name) in self.variables.iter().enumerate() {
            let header = VariableHeader::new(name.as_str(), &[("time", steps), ("lat", LAT), ("lon", LON)])
                .with_attribute("units", "kg/g/m^2/K")
                .with_attribute("long_name", format!("variable_{}", index));
            let values = (0..steps)
                .flat_map(|t| std::iter::repeat(self.cell_value(t, index)).take(LAT * LON))
                .collect();
            dataset.insert_variable(variable(header, ArrayValues::F64(values)));
        }

        let time = VariableHeader::new("time", &[("time", steps)])
            .with_attribute("calendar", self.calendar.as_str())
            .with_attribute("units", self.units.as_str())
            .with_attribute("standard_name", "time");
        dataset.insert_variable(variable(time, ArrayValues::F64(self.times.clone())));

        if let Some(bounds) = &self.bounds {
            let header = VariableHeader::new("time_bounds", &[("time", bounds.len()), ("bnds", 2)])
                .with_attribute("units", self.units.as_str());
            let values = bounds.iter().flat_map(|b| b.iter().copied()).collect();
            dataset.insert_variable(variable(header, ArrayValues::F64(values)));
        }

        if self.auxiliary {
            let lat = VariableHeader::new("lat", &[("lat", LAT)]).with_attribute("units", "degrees_north");
            let lat_values = (0..LAT).map(|i| -45.0 + 45.0 * i as f64).collect();
            dataset.insert_variable(variable(lat, ArrayValues::F64(lat_values)));

            let hyam = VariableHeader::new("hyam", &[("lev", LEV)]);
            let hyam_values = (0..LEV).map(|i| i as f64 * 0.1).collect();
            dataset.insert_variable(variable(hyam, ArrayValues::F64(hyam_values)));

            let written = VariableHeader::new("date_written", &[("time", steps), ("chars", 8)]);
            let chars = std::iter::repeat(*b"01/01/00").take(steps).flatten().collect();
            dataset.insert_variable(variable(written, ArrayValues::Char(chars)));
        }
        dataset
    }

    /// Touch a placeholder at `path` so discovery sees it, and register the
    /// dataset with `engine`.
    pub fn write(&self, engine: &MemoryEngine, path: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = path.as_ref().to_path_buf();
        touch(&path)?;
        engine.insert(path.clone(), self.build());
        Ok(path)
    }
}

fn variable(header: VariableHeader, values: ArrayValues) -> VariableData {
    let name = header.name.clone();
    VariableData::new(header, values)
        .unwrap_or_else(|e| panic!("generator produced an inconsistent variable '{}': {}", name, e))
}

/// Write `count` consecutive monthly files named `<prefix>.<index:05>.nc`
/// into `dir`, returning their paths in time order.
pub fn write_monthly_files(
    engine: &MemoryEngine,
    dir: &Path,
    prefix: &str,
    count: usize,
    num_vars: usize,
) -> io::Result<Vec<PathBuf>> {
    (0..count)
        .map(|index| {
            HistoryFileSpec::monthly(index)
                .num_vars(num_vars)
                .write(engine, dir.join(format!("{}.{:05}.nc", prefix, index)))
        })
        .collect()
}

/// Write the same monthly run into `<dir>/<d>_dir/<s>_subdir/` for every
/// directory and subdirectory index.
pub fn write_structured_tree(
    engine: &MemoryEngine,
    dir: &Path,
    dirs: usize,
    subdirs: usize,
    files_per_dir: usize,
) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for d in 0..dirs {
        for s in 0..subdirs {
            let leaf = dir.join(format!("{}_dir", d)).join(format!("{}_subdir", s));
            paths.extend(write_monthly_files(engine, &leaf, "testing.hf", files_per_dir, 2)?);
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tseries_common::ArrayEngine;

    #[test]
    fn test_monthly_layout() {
        let spec = HistoryFileSpec::monthly(3);
        let dataset = spec.build();
        assert_eq!(dataset.values_f64("time"), Some(vec![120.0]));
        assert_eq!(dataset.values_f64("time_bounds"), Some(vec![90.0, 120.0]));
        let var = &dataset.data["VAR2"];
        assert_eq!(var.header.shape, vec![1, LAT, LON]);
        assert_eq!(var.values.to_f64().unwrap()[0], 122.0);
        assert_eq!(
            dataset.header.variable("time").unwrap().attribute("calendar"),
            Some(&AttrValue::from("360_day"))
        );
    }

    #[test]
    fn test_steps_and_auxiliary() {
        let dataset = HistoryFileSpec::steps(0.125, 0.125, 8)
            .without_bounds()
            .with_auxiliary()
            .build();
        assert_eq!(dataset.data["time"].leading_len(), 8);
        assert!(dataset.data.get("time_bounds").is_none());
        assert_eq!(dataset.data["date_written"].header.shape, vec![8, 8]);
        assert_eq!(dataset.data["hyam"].header.dimensions, vec!["lev".to_string()]);
    }

    #[test]
    fn test_write_registers_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        let paths = write_monthly_files(&engine, dir.path(), "run.h0", 3, 2).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.exists()));
        assert!(paths[2].ends_with("run.h0.00002.nc"));
        assert!(engine.read_header(&paths[0]).unwrap().variable("VAR1").is_some());
        assert!(engine.read_header(&paths[0]).unwrap().variable("VAR2").is_none());
    }

    #[test]
    fn test_structured_tree() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        let paths = write_structured_tree(&engine, dir.path(), 3, 2, 2).unwrap();
        assert_eq!(paths.len(), 12);
        assert!(dir.path().join("2_dir/1_subdir/testing.hf.00001.nc").exists());
    }
}
