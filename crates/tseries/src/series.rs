//! Time series tasks derived from grouped history files.
//!
//! A [`SeriesCollection`] holds one [`SeriesTask`] per (group, time slice,
//! variable). Filters return copies; argument rules and path swaps mutate
//! the collection in place and apply in call order.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tseries_common::{Compression, CompressionAlgorithm};

use crate::collection::{FileCollection, FileRecord};
use crate::context::RunContext;
use crate::error::{Result, TseriesError};
use crate::grouping::GroupKey;
use crate::matcher::{PatternSet, TaskSelector};
use crate::naming::{time_range_string, OutputTemplate, Timestep};

/// Stable identity of a task, used to match failures for retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub group: String,
    pub variable: String,
    /// Year bin `(first, last)` after slicing.
    pub slice: Option<(i32, i32)>,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slice {
            Some((a, b)) => write!(f, "{}[{}-{}]::{}", self.group, a, b, self.variable),
            None => write!(f, "{}::{}", self.group, self.variable),
        }
    }
}

/// Per-task generation settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationArgs {
    pub overwrite: bool,
    pub compression: Compression,
    /// When set, only these auxiliary variables are copied.
    pub include_auxiliary: Option<Vec<String>>,
    pub exclude_auxiliary: Vec<String>,
}

impl GenerationArgs {
    pub fn keeps_auxiliary(&self, name: &str) -> bool {
        let included = self
            .include_auxiliary
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == name));
        included && !self.exclude_auxiliary.iter().any(|n| n == name)
    }
}

/// Partial update of [`GenerationArgs`]; unset fields leave a task alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgOverrides {
    pub overwrite: Option<bool>,
    pub compression: Option<CompressionAlgorithm>,
    pub level: Option<u8>,
    pub include_auxiliary: Option<Vec<String>>,
    pub exclude_auxiliary: Option<Vec<String>>,
}

impl ArgOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn compression(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.compression = Some(algorithm);
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn include_auxiliary<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.include_auxiliary = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude_auxiliary<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.exclude_auxiliary = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn apply_to(&self, args: &mut GenerationArgs) {
        if let Some(overwrite) = self.overwrite {
            args.overwrite = overwrite;
        }
        if let Some(algorithm) = self.compression {
            args.compression.algorithm = Some(algorithm);
        }
        if let Some(level) = self.level {
            args.compression.level = level;
        }
        if let Some(names) = &self.include_auxiliary {
            args.include_auxiliary = Some(names.clone());
        }
        if let Some(names) = &self.exclude_auxiliary {
            args.exclude_auxiliary = names.clone();
        }
    }
}

/// A recorded `add_args` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgRule {
    pub path_glob: String,
    pub var_glob: String,
    pub overrides: ArgOverrides,
}

/// A recorded path swap.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSwap {
    pub old: String,
    pub new: String,
    /// `(path_glob, var_glob)` restricting the swap, if any.
    pub scope: Option<(String, String)>,
}

/// One output file to produce.
#[derive(Debug, Clone)]
pub struct SeriesTask {
    id: TaskId,
    members: Vec<FileRecord>,
    template: OutputTemplate,
    args: GenerationArgs,
    output_path: PathBuf,
}

impl SeriesTask {
    fn new(id: TaskId, members: Vec<FileRecord>, template: OutputTemplate) -> Self {
        let mut task = Self {
            id,
            members,
            template,
            args: GenerationArgs::default(),
            output_path: PathBuf::new(),
        };
        task.refresh_output_path();
        task
    }

    fn refresh_output_path(&mut self) {
        let range = time_range_string(&self.members);
        self.output_path = self.template.resolve(&self.id.variable, &range);
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn variable(&self) -> &str {
        &self.id.variable
    }

    /// Contributing files in concatenation order.
    pub fn members(&self) -> &[FileRecord] {
        &self.members
    }

    pub fn member_paths(&self) -> Vec<&Path> {
        self.members.iter().map(FileRecord::path).collect()
    }

    pub fn template(&self) -> &OutputTemplate {
        &self.template
    }

    pub fn args(&self) -> &GenerationArgs {
        &self.args
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn matches(&self, selector: &TaskSelector) -> bool {
        selector.matches(&self.output_path, &self.id.variable)
    }
}

/// Ordered list of generation tasks plus the rules that shaped them.
#[derive(Debug, Clone)]
pub struct SeriesCollection {
    context: Arc<RunContext>,
    input_dir: PathBuf,
    output_dir: PathBuf,
    tasks: Vec<SeriesTask>,
    rules: Vec<ArgRule>,
    swaps: Vec<PathSwap>,
    warnings: Vec<String>,
}

impl SeriesCollection {
    /// Pull metadata where missing, group `files` and create one task per
    /// group and common time-varying variable.
    ///
    /// Files whose metadata cannot be pulled and groups that cannot be
    /// ordered are left out and recorded in [`SeriesCollection::warnings`].
    pub fn new(files: &FileCollection, output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        let mut warnings = Vec::new();

        let report = files.pull_metadata();
        for failure in &report.failures {
            warnings.push(format!(
                "skipped {}: {}",
                failure.path.display(),
                failure.error
            ));
        }

        let grouping = files.pulled().groups();
        for rejected in &grouping.rejected {
            warnings.push(format!("rejected group {}: {}", rejected.key, rejected.error));
        }

        let mut tasks = Vec::new();
        for mut group in grouping.groups {
            let variables = group.common_variables();
            warnings.extend(group.warnings.iter().cloned());
            let template = Self::template_for(files.input_dir(), &output_dir, &group.key);
            for variable in variables {
                let id = TaskId {
                    group: group.key.to_string(),
                    variable,
                    slice: None,
                };
                tasks.push(SeriesTask::new(id, group.members.clone(), template.clone()));
            }
        }

        info!(
            tasks = tasks.len(),
            warnings = warnings.len(),
            output_dir = %output_dir.display(),
            "Derived time series tasks"
        );
        Ok(Self {
            context: Arc::clone(files.context()),
            input_dir: files.input_dir().to_path_buf(),
            output_dir,
            tasks,
            rules: Vec::new(),
            swaps: Vec::new(),
            warnings,
        })
    }

    fn template_for(input_dir: &Path, output_dir: &Path, key: &GroupKey) -> OutputTemplate {
        let prefix = if key.dated {
            key.prefix.clone()
        } else {
            Path::new(&key.prefix)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| key.prefix.clone())
        };
        OutputTemplate::mirror(input_dir, output_dir, &key.dir, &prefix)
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn tasks(&self) -> &[SeriesTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn rules(&self) -> &[ArgRule] {
        &self.rules
    }

    pub fn swaps(&self) -> &[PathSwap] {
        &self.swaps
    }

    /// Pull failures, rejected groups and variable mismatches seen while
    /// deriving tasks.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn output_paths(&self) -> Vec<&Path> {
        self.tasks.iter().map(SeriesTask::output_path).collect()
    }

    pub fn find(&self, output_path: &Path) -> Option<&SeriesTask> {
        self.tasks.iter().find(|t| t.output_path == output_path)
    }

    fn with_tasks(&self, tasks: Vec<SeriesTask>) -> Self {
        Self {
            context: Arc::clone(&self.context),
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            tasks,
            rules: self.rules.clone(),
            swaps: self.swaps.clone(),
            warnings: self.warnings.clone(),
        }
    }

    /// Keep tasks whose output path and variable both match.
    pub fn include(&self, path_glob: &str, var_glob: &str) -> Result<Self> {
        let selector = TaskSelector::new(path_glob, var_glob)?;
        let tasks = self.tasks.iter().filter(|t| t.matches(&selector)).cloned().collect();
        Ok(self.with_tasks(tasks))
    }

    /// Drop tasks whose output path and variable both match.
    pub fn exclude(&self, path_glob: &str, var_glob: &str) -> Result<Self> {
        let selector = TaskSelector::new(path_glob, var_glob)?;
        let tasks = self.tasks.iter().filter(|t| !t.matches(&selector)).cloned().collect();
        Ok(self.with_tasks(tasks))
    }

    /// Apply `overrides` to every matching task. Later calls win on the
    /// fields they set.
    pub fn add_args(
        &mut self,
        path_glob: &str,
        var_glob: &str,
        overrides: ArgOverrides,
    ) -> Result<&mut Self> {
        let selector = TaskSelector::new(path_glob, var_glob)?;
        let mut matched = 0;
        for task in self.tasks.iter_mut().filter(|t| t.matches(&selector)) {
            overrides.apply_to(&mut task.args);
            matched += 1;
        }
        debug!(path_glob, var_glob, matched, "Applied argument rule");
        self.rules.push(ArgRule {
            path_glob: path_glob.to_string(),
            var_glob: var_glob.to_string(),
            overrides,
        });
        Ok(self)
    }

    pub fn apply_compression(
        &mut self,
        level: u8,
        algorithm: Option<CompressionAlgorithm>,
        path_glob: &str,
        var_glob: &str,
    ) -> Result<&mut Self> {
        let mut overrides = ArgOverrides::new().level(level);
        overrides.compression = algorithm;
        self.add_args(path_glob, var_glob, overrides)
    }

    pub fn apply_overwrite(&mut self, path_glob: &str, var_glob: &str) -> Result<&mut Self> {
        self.add_args(path_glob, var_glob, ArgOverrides::new().overwrite(true))
    }

    pub fn remove_overwrite(&mut self, path_glob: &str, var_glob: &str) -> Result<&mut Self> {
        self.add_args(path_glob, var_glob, ArgOverrides::new().overwrite(false))
    }

    /// Literal substring swap on every task's mirrored directory.
    pub fn apply_path_swap(&mut self, old: &str, new: &str) -> &mut Self {
        self.swap_where(old, new, &TaskSelector::any());
        self.swaps.push(PathSwap {
            old: old.to_string(),
            new: new.to_string(),
            scope: None,
        });
        self
    }

    /// [`SeriesCollection::apply_path_swap`] restricted to matching tasks.
    pub fn apply_path_swap_matching(
        &mut self,
        old: &str,
        new: &str,
        path_glob: &str,
        var_glob: &str,
    ) -> Result<&mut Self> {
        let selector = TaskSelector::new(path_glob, var_glob)?;
        self.swap_where(old, new, &selector);
        self.swaps.push(PathSwap {
            old: old.to_string(),
            new: new.to_string(),
            scope: Some((path_glob.to_string(), var_glob.to_string())),
        });
        Ok(self)
    }

    fn swap_where(&mut self, old: &str, new: &str, selector: &TaskSelector) {
        for task in self.tasks.iter_mut().filter(|t| t.matches(selector)) {
            task.template.swap(old, new);
            task.refresh_output_path();
        }
    }

    /// Insert a `<unit>_<count>` directory (e.g. `month_1`) above each
    /// output file. Tasks with an undetectable time step are left alone.
    pub fn append_timestep_dirs(&mut self) -> &mut Self {
        for task in &mut self.tasks {
            if let Some(step) = Timestep::detect(&task.members) {
                task.template.timestep_dir = Some(step.to_string());
                task.refresh_output_path();
            }
        }
        self
    }

    /// Narrow every task to the member files overlapping
    /// `[start_year, end_year]`; tasks left without members are dropped.
    pub fn include_years(&self, start_year: i32, end_year: i32) -> Result<Self> {
        check_single_calendar(self.tasks.iter().flat_map(|t| t.members.iter()))?;

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let members: Vec<FileRecord> = task
                .members
                .iter()
                .filter(|m| {
                    m.metadata()
                        .is_some_and(|meta| meta.overlaps_years(start_year, end_year))
                })
                .cloned()
                .collect();
            if members.is_empty() {
                continue;
            }
            let mut narrowed = task.clone();
            if members.len() != task.members.len() {
                narrowed.members = members;
                narrowed.refresh_output_path();
            }
            tasks.push(narrowed);
        }
        Ok(self.with_tasks(tasks))
    }

    /// Split tasks into consecutive runs of members whose midpoint years
    /// fall into the same `slice_years`-aligned bin.
    ///
    /// With `pattern`, only tasks whose group id (`<dir>/<prefix>*`) matches
    /// are sliced. Members are never reordered or split; single-member tasks
    /// are kept whole.
    pub fn slice_groups(&self, slice_years: u32, pattern: Option<&str>) -> Result<Self> {
        if slice_years == 0 {
            return Err(TseriesError::InvalidConfig(
                "slice size must be at least one year".to_string(),
            ));
        }
        let set = pattern.map(|p| PatternSet::new(&[p])).transpose()?;
        let size = slice_years as i32;

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let selected = set.as_ref().map_or(true, |s| s.matches(&task.id.group));
            if !selected {
                tasks.push(task.clone());
                continue;
            }
            if task.members.len() < 2 {
                warn!(task = %task.id, "Cannot slice a single-member task");
                tasks.push(task.clone());
                continue;
            }

            let mut chunks: Vec<(i32, Vec<FileRecord>)> = Vec::new();
            for member in &task.members {
                let meta = member.metadata().ok_or_else(|| {
                    TseriesError::invalid_file(member.path(), "metadata not pulled")
                })?;
                let bin = meta.midpoint_year()?.div_euclid(size);
                match chunks.last_mut() {
                    Some((last, members)) if *last == bin => members.push(member.clone()),
                    _ => chunks.push((bin, vec![member.clone()])),
                }
            }

            for (bin, members) in chunks {
                let mut sliced = task.clone();
                sliced.id.slice = Some((bin * size, bin * size + size - 1));
                sliced.members = members;
                sliced.refresh_output_path();
                tasks.push(sliced);
            }
        }
        debug!(
            slice_years,
            before = self.tasks.len(),
            after = tasks.len(),
            "Sliced tasks"
        );
        Ok(self.with_tasks(tasks))
    }

    /// Tasks whose id appears among the report's failures.
    pub fn retry_subset(&self, report: &crate::generate::GenerationReport) -> Self {
        let failed: HashSet<&TaskId> = report.failures.iter().map(|f| &f.task).collect();
        let tasks = self
            .tasks
            .iter()
            .filter(|t| failed.contains(&t.id))
            .cloned()
            .collect();
        self.with_tasks(tasks)
    }
}

fn check_single_calendar<'a, I>(records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let mut expected = None;
    for record in records {
        let Some(meta) = record.metadata() else {
            continue;
        };
        match expected {
            None => expected = Some(meta.calendar),
            Some(calendar) if calendar != meta.calendar => {
                return Err(TseriesError::CalendarMismatch {
                    expected: calendar,
                    found: meta.calendar,
                    path: record.path().to_path_buf(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_last_writer_wins() {
        let mut args = GenerationArgs::default();
        ArgOverrides::new().level(5).overwrite(true).apply_to(&mut args);
        ArgOverrides::new().level(2).apply_to(&mut args);
        assert_eq!(args.compression.level, 2);
        assert!(args.overwrite);
    }

    #[test]
    fn test_auxiliary_filters() {
        let args = GenerationArgs {
            include_auxiliary: Some(vec!["time".into(), "lat".into(), "lon".into()]),
            exclude_auxiliary: vec!["lon".into()],
            ..Default::default()
        };
        assert!(args.keeps_auxiliary("time"));
        assert!(!args.keeps_auxiliary("lon"));
        assert!(!args.keeps_auxiliary("area"));
        assert!(GenerationArgs::default().keeps_auxiliary("area"));
    }

    #[test]
    fn test_task_id_display() {
        let id = TaskId {
            group: "/run/atm/foo.h0*".into(),
            variable: "TEMP".into(),
            slice: Some((2000, 2009)),
        };
        assert_eq!(id.to_string(), "/run/atm/foo.h0*[2000-2009]::TEMP");
    }

    #[test]
    fn test_overrides_from_yaml() {
        let overrides: ArgOverrides =
            serde_yaml::from_str("level: 4\ncompression: zlib\noverwrite: false").unwrap();
        assert_eq!(overrides.level, Some(4));
        assert_eq!(overrides.compression, Some(CompressionAlgorithm::Zlib));
        assert_eq!(overrides.overwrite, Some(false));
        assert_eq!(overrides.include_auxiliary, None);
    }
}
