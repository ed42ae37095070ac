//! Header metadata pulled from one history file.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tseries_common::{
    ArrayEngine, AttrValue, Calendar, CalendarDate, DatasetHeader, TimeUnits, VariableHeader,
};

use crate::error::{Result, TseriesError};

/// Global attribute flagging a finished time series file.
pub const COMPLETION_ATTR: &str = "timeseries_process";

/// Global attribute recording the software version that wrote an output.
pub const VERSION_ATTR: &str = "timeseries_software_version";

/// Version string stamped into every output.
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Candidate names of the time bounds variable, in lookup order.
pub const TIME_BOUNDS_NAMES: [&str; 4] = ["time_bnds", "time_bnd", "time_bounds", "time_bound"];

/// Decides which variables are copied into every output (auxiliary) and
/// which get an output file of their own (time-varying).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableClassifier {
    pub time_dimension: String,
    /// Any of these dimensions makes a variable auxiliary.
    pub auxiliary_dimensions: Vec<String>,
    /// Variables that are always auxiliary.
    pub auxiliary_variables: Vec<String>,
}

impl Default for VariableClassifier {
    fn default() -> Self {
        Self {
            time_dimension: "time".to_string(),
            auxiliary_dimensions: ["nbnd", "chars", "string_length", "hist_interval"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            auxiliary_variables: TIME_BOUNDS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl VariableClassifier {
    pub fn is_auxiliary(&self, variable: &VariableHeader) -> bool {
        if self.auxiliary_variables.iter().any(|v| *v == variable.name) {
            return true;
        }
        if variable
            .dimensions
            .iter()
            .any(|d| self.auxiliary_dimensions.contains(d))
        {
            return true;
        }
        let mut distinct: Vec<&String> = variable.dimensions.iter().collect();
        distinct.sort();
        distinct.dedup();
        distinct.len() <= 1 || !variable.has_dimension(&self.time_dimension)
    }

    pub fn is_time_varying(&self, variable: &VariableHeader) -> bool {
        !self.is_auxiliary(variable)
    }
}

/// Immutable summary of one history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Every variable, in file order.
    pub variables: Vec<String>,
    pub time_varying: BTreeSet<String>,
    pub calendar: Calendar,
    pub units: TimeUnits,
    /// Decoded `time` values.
    pub times: Vec<CalendarDate>,
    /// `time` values as absolute day numbers in `calendar`.
    pub time_days: Vec<f64>,
    /// Earliest lower bound (or time value).
    pub start: CalendarDate,
    /// Latest upper bound (or time value).
    pub end: CalendarDate,
    pub start_days: f64,
    pub end_days: f64,
    /// Width of the first bounds interval in days, if bounds exist.
    pub bounds_width_days: Option<f64>,
    pub global_attributes: Vec<(String, AttrValue)>,
}

impl Metadata {
    /// Read and validate the header of `path`.
    pub fn pull(
        engine: &dyn ArrayEngine,
        path: &Path,
        classifier: &VariableClassifier,
    ) -> Result<Metadata> {
        let header = engine.read_header(path)?;
        Self::validate_header(path, &header, classifier)?;

        let time_name = classifier.time_dimension.as_str();
        let time_header = header
            .variable(time_name)
            .ok_or_else(|| TseriesError::invalid_file(path, "no time variable"))?;
        let units: TimeUnits = text_attr(path, time_header, "units")?.parse()?;
        let calendar: Calendar = text_attr(path, time_header, "calendar")?.parse()?;

        let time_values = engine
            .read_variable(path, time_name)?
            .values
            .to_f64()
            .ok_or_else(|| TseriesError::invalid_file(path, "time is not numeric"))?;
        if time_values.is_empty() {
            return Err(TseriesError::invalid_file(path, "time axis is empty"));
        }

        let bounds = match TIME_BOUNDS_NAMES
            .iter()
            .find(|name| header.variable(name).is_some())
        {
            Some(name) => {
                let values = engine.read_variable(path, name)?.values.to_f64();
                values.filter(|v| v.len() >= 2 && v.len() % 2 == 0)
            }
            None => None,
        };

        let origin = epoch_days(&calendar, &units)?;
        let to_abs = |v: f64| origin + units.to_days(v);
        let time_days: Vec<f64> = time_values.iter().map(|&v| to_abs(v)).collect();

        let (lower, upper, bounds_width_days) = match &bounds {
            Some(b) => {
                let lower = b.iter().step_by(2).cloned().fold(f64::INFINITY, f64::min);
                let upper = b.iter().skip(1).step_by(2).cloned().fold(f64::NEG_INFINITY, f64::max);
                (lower, upper, Some(units.to_days(b[1] - b[0]).abs()))
            }
            None => {
                let lower = time_values.iter().cloned().fold(f64::INFINITY, f64::min);
                let upper = time_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                (lower, upper, None)
            }
        };

        let times = time_values
            .iter()
            .map(|&v| calendar.date_from_offset(&units, v))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let metadata = Metadata {
            variables: header.variable_names().map(String::from).collect(),
            time_varying: header
                .variables
                .values()
                .filter(|v| classifier.is_time_varying(v))
                .map(|v| v.name.clone())
                .collect(),
            start: calendar.date_from_offset(&units, lower)?,
            end: calendar.date_from_offset(&units, upper)?,
            start_days: to_abs(lower),
            end_days: to_abs(upper),
            calendar,
            units,
            times,
            time_days,
            bounds_width_days,
            global_attributes: header
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        debug!(
            path = %path.display(),
            start = %metadata.start,
            end = %metadata.end,
            variables = metadata.time_varying.len(),
            "Pulled metadata"
        );
        Ok(metadata)
    }

    fn validate_header(
        path: &Path,
        header: &DatasetHeader,
        classifier: &VariableClassifier,
    ) -> Result<()> {
        if header.attribute(COMPLETION_ATTR).is_some() {
            return Err(TseriesError::invalid_file(
                path,
                "already a generated time series file",
            ));
        }
        if header.variable(&classifier.time_dimension).is_none() {
            return Err(TseriesError::invalid_file(path, "no time variable"));
        }
        if !header.variables.values().any(|v| classifier.is_time_varying(v)) {
            return Err(TseriesError::invalid_file(path, "no time-varying variables"));
        }
        Ok(())
    }

    /// Year of the midpoint between the start and end bounds.
    pub fn midpoint_year(&self) -> Result<i32> {
        let mid = ((self.start_days + self.end_days) / 2.0).floor() as i64;
        Ok(self.calendar.date_from_day_number(mid)?.year)
    }

    /// Whether `[start, end]` overlaps the inclusive year range.
    pub fn overlaps_years(&self, start_year: i32, end_year: i32) -> bool {
        self.end.year >= start_year && self.start.year <= end_year
    }
}

/// Absolute day number of the units epoch.
fn epoch_days(calendar: &Calendar, units: &TimeUnits) -> Result<f64> {
    let epoch = &units.epoch;
    let day = calendar.day_number(epoch)? as f64;
    let seconds = (epoch.hour * 3600 + epoch.minute * 60 + epoch.second) as f64;
    Ok(day + seconds / 86_400.0)
}

fn text_attr<'a>(path: &Path, variable: &'a VariableHeader, name: &str) -> Result<&'a str> {
    variable
        .attribute(name)
        .and_then(AttrValue::as_text)
        .ok_or_else(|| {
            TseriesError::invalid_file(path, format!("{} has no '{}' attribute", variable.name, name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, dims: &[&str]) -> VariableHeader {
        let dims: Vec<(&str, usize)> = dims.iter().map(|d| (*d, 2)).collect();
        VariableHeader::new(name, &dims)
    }

    #[test]
    fn test_classifier_defaults() {
        let c = VariableClassifier::default();
        assert!(c.is_time_varying(&var("TEMP", &["time", "lat", "lon"])));
        assert!(c.is_time_varying(&var("PS", &["time", "ncol"])));
        assert!(c.is_auxiliary(&var("time", &["time"])));
        assert!(c.is_auxiliary(&var("time_bnds", &["time", "nbnd"])));
        assert!(c.is_auxiliary(&var("date_written", &["time", "chars"])));
        assert!(c.is_auxiliary(&var("area", &["lat", "lon"])));
        assert!(c.is_auxiliary(&var("P0", &[])));
    }

    #[test]
    fn test_repeated_dimension_counts_once() {
        let c = VariableClassifier::default();
        assert!(c.is_auxiliary(&var("weird", &["time", "time"])));
    }
}
