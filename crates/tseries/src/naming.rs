//! Output file naming: time step detection, date strings and templates.

use std::fmt;
use std::path::{Path, PathBuf};

use tseries_common::CalendarDate;

use crate::collection::FileRecord;

/// Unit of a detected output time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepUnit {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl StepUnit {
    pub fn name(&self) -> &'static str {
        match self {
            StepUnit::Minute => "minute",
            StepUnit::Hour => "hour",
            StepUnit::Day => "day",
            StepUnit::Month => "month",
            StepUnit::Year => "year",
        }
    }

    /// Date format used in output file names for this cadence.
    pub fn date_format(&self) -> &'static str {
        match self {
            StepUnit::Minute => "%Y%m%d%H%M",
            StepUnit::Hour => "%Y%m%d%H",
            StepUnit::Day => "%Y%m%d",
            StepUnit::Month => "%Y%m",
            StepUnit::Year => "%Y",
        }
    }
}

/// Output cadence, e.g. `hour_6` or `month_1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestep {
    pub unit: StepUnit,
    pub count: u32,
}

impl Timestep {
    /// Classify a step length given in days. Non-positive steps are unknown.
    pub fn from_days(days: f64) -> Option<Timestep> {
        if !days.is_finite() || days <= 0.0 {
            return None;
        }
        // Steps come from float day differences; absorb rounding noise.
        const EPS: f64 = 1e-6;
        let ceil = |v: f64| (v - EPS).ceil().max(1.0) as u32;
        let hours = days * 24.0;
        let (unit, count) = if days >= 360.0 - EPS {
            (StepUnit::Year, ceil(days / 366.0))
        } else if days >= 28.0 - EPS {
            (StepUnit::Month, ceil(days / 31.0))
        } else if days >= 1.0 - EPS {
            (StepUnit::Day, ceil(days))
        } else if hours >= 1.0 - EPS {
            (StepUnit::Hour, ceil(hours))
        } else {
            (StepUnit::Minute, ceil(hours * 60.0))
        };
        Some(Timestep { unit, count })
    }

    /// Time step of a member sequence: the gap between the first two time
    /// values, else the width of the first bounds interval.
    pub fn detect(members: &[FileRecord]) -> Option<Timestep> {
        let mut times = members
            .iter()
            .filter_map(FileRecord::metadata)
            .flat_map(|m| m.time_days.iter().copied());
        if let (Some(a), Some(b)) = (times.next(), times.next()) {
            return Self::from_days(b - a);
        }
        members
            .iter()
            .filter_map(FileRecord::metadata)
            .find_map(|m| m.bounds_width_days)
            .and_then(Self::from_days)
    }
}

impl fmt::Display for Timestep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.unit.name(), self.count)
    }
}

/// `<start>-<end>` for the first and last time values of `members`.
pub fn time_range_string(members: &[FileRecord]) -> String {
    let format = Timestep::detect(members)
        .map(|t| t.unit.date_format())
        .unwrap_or(StepUnit::Day.date_format());
    let first: Option<&CalendarDate> = members
        .iter()
        .filter_map(FileRecord::metadata)
        .find_map(|m| m.times.first());
    let last: Option<&CalendarDate> = members
        .iter()
        .rev()
        .filter_map(FileRecord::metadata)
        .find_map(|m| m.times.last());
    match (first, last) {
        (Some(a), Some(b)) => format!("{}-{}", a.format(format), b.format(format)),
        _ => "unknown".to_string(),
    }
}

/// Where a task's output goes, minus the variable and time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    pub output_dir: PathBuf,
    /// Group directory relative to the input head, with leading and trailing
    /// `/` so literal swaps such as `/hist/` -> `/proc/tseries/` line up.
    pub relative_dir: String,
    pub prefix: String,
    pub timestep_dir: Option<String>,
}

impl OutputTemplate {
    /// Mirror `group_dir` (under `input_dir`) into `output_dir`.
    pub fn mirror(input_dir: &Path, output_dir: &Path, group_dir: &Path, prefix: &str) -> Self {
        let relative = group_dir.strip_prefix(input_dir).unwrap_or(group_dir);
        let mut relative_dir = String::from("/");
        for component in relative.components() {
            let part = component.as_os_str().to_string_lossy();
            if part == "/" {
                continue;
            }
            relative_dir.push_str(&part);
            relative_dir.push('/');
        }
        Self {
            output_dir: output_dir.to_path_buf(),
            relative_dir,
            prefix: prefix.to_string(),
            timestep_dir: None,
        }
    }

    /// Literal substring swap on the relative part only.
    pub fn swap(&mut self, old: &str, new: &str) {
        if !old.is_empty() {
            self.relative_dir = self.relative_dir.replace(old, new);
        }
    }

    pub fn directory(&self) -> PathBuf {
        let mut dir = self.output_dir.clone();
        for part in self.relative_dir.split('/').filter(|p| !p.is_empty()) {
            dir.push(part);
        }
        if let Some(step) = &self.timestep_dir {
            dir.push(step);
        }
        dir
    }

    /// `<dir>/<prefix>.<variable>.<range>.nc`
    pub fn resolve(&self, variable: &str, time_range: &str) -> PathBuf {
        self.directory()
            .join(format!("{}.{}.{}.nc", self.prefix, variable, time_range))
    }
}
