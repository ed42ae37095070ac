//! Writes time series files and reports per-task outcomes.
//!
//! Every output is stamped `timeseries_process = false` when created and
//! flipped to `true` as the last write before the handle is closed. An
//! output without the `true` flag is treated as garbage on the next run.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};
use tseries_common::{ArrayEngine, AttrValue, Compression, VariableData};

use crate::error::{panic_message, Result, TseriesError};
use crate::metadata::{VariableClassifier, COMPLETION_ATTR, SOFTWARE_VERSION, VERSION_ATTR};
use crate::series::{SeriesCollection, SeriesTask, TaskId};

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Generated(PathBuf),
    /// A complete output already existed and overwrite was off.
    Skipped(PathBuf),
}

/// A task that failed, with enough context to retry it.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: TaskId,
    pub output_path: PathBuf,
    pub error: TseriesError,
}

/// Aggregated outcome of a batch of tasks.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub generated: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<TaskFailure>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.generated.len() + self.skipped.len() + self.failures.len()
    }
}

/// Whether `path` holds an output whose completion flag is true.
///
/// Unreadable files count as incomplete.
pub fn is_complete(engine: &dyn ArrayEngine, path: &Path) -> bool {
    match engine.read_global_attribute(path, COMPLETION_ATTR) {
        Ok(Some(value)) => value.as_bool().unwrap_or(false),
        Ok(None) => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Existing output unreadable");
            false
        }
    }
}

/// Produce the output of one task.
pub fn generate_task(
    engine: &dyn ArrayEngine,
    classifier: &VariableClassifier,
    task: &SeriesTask,
) -> Result<TaskOutcome> {
    let output = task.output_path();
    let args = task.args();

    if engine.exists(output) {
        if !args.overwrite && is_complete(engine, output) {
            debug!(path = %output.display(), "Output complete, skipping");
            return Ok(TaskOutcome::Skipped(output.to_path_buf()));
        }
        if args.overwrite {
            debug!(path = %output.display(), "Overwriting existing output");
        } else {
            warn!(path = %output.display(), "Removing incomplete output");
        }
        engine.remove(output)?;
    }

    let members = task.member_paths();
    let first = *members
        .first()
        .ok_or_else(|| TseriesError::EmptyTask(task.id().to_string()))?;
    let header = engine.read_header(first)?;
    let time_dim = classifier.time_dimension.as_str();

    if let Some(parent) = output.parent() {
        engine.prepare_dir(parent)?;
    }
    let mut writer = engine.create(output)?;

    for (name, value) in &header.attributes {
        writer.put_global_attribute(name, value)?;
    }
    writer.put_global_attribute(VERSION_ATTR, &AttrValue::from(SOFTWARE_VERSION))?;
    writer.put_global_attribute(COMPLETION_ATTR, &AttrValue::Bool(false))?;

    let target = concat_members(engine, &members, task.variable(), time_dim, true)?;
    writer.put_variable(&target, &args.compression)?;

    for variable in header.variables.values() {
        if variable.name == task.variable()
            || !classifier.is_auxiliary(variable)
            || !args.keeps_auxiliary(&variable.name)
        {
            continue;
        }
        let data = if variable.leads_with(time_dim) {
            concat_members(engine, &members, &variable.name, time_dim, false)?
        } else {
            engine.read_variable(first, &variable.name)?
        };
        writer.put_variable(&data, &aux_compression(&args.compression, &data))?;
    }

    writer.put_global_attribute(COMPLETION_ATTR, &AttrValue::Bool(true))?;
    writer.close()?;
    Ok(TaskOutcome::Generated(output.to_path_buf()))
}

/// Character data is never compressed.
fn aux_compression(compression: &Compression, data: &VariableData) -> Compression {
    if matches!(data.values, tseries_common::ArrayValues::Char(_)) {
        Compression::NONE
    } else {
        *compression
    }
}

fn concat_members(
    engine: &dyn ArrayEngine,
    members: &[&Path],
    variable: &str,
    time_dim: &str,
    require_time: bool,
) -> Result<VariableData> {
    let mut parts = Vec::with_capacity(members.len());
    for path in members {
        let data = engine.read_variable(path, variable)?;
        if require_time && !data.header.leads_with(time_dim) {
            return Err(TseriesError::TimeNotLeading {
                variable: variable.to_string(),
                path: path.to_path_buf(),
            });
        }
        parts.push(data);
    }
    VariableData::concat_leading(parts)?
        .ok_or_else(|| TseriesError::EmptyTask(variable.to_string()))
}

impl SeriesCollection {
    /// Run every task on the context's executor, collecting all failures.
    pub fn execute(&self) -> GenerationReport {
        let context = self.context().as_ref();
        let engine = context.engine.as_ref();
        let started = Instant::now();

        let mut seen = HashSet::new();
        let duplicates: HashSet<usize> = self
            .tasks()
            .iter()
            .enumerate()
            .filter(|(_, t)| !seen.insert(t.output_path().to_path_buf()))
            .map(|(i, _)| i)
            .collect();

        let indexed: Vec<(usize, &SeriesTask)> = self.tasks().iter().enumerate().collect();
        let results = context.executor.map(&indexed, |(index, task)| {
            if duplicates.contains(index) {
                return Err(TseriesError::DuplicateOutput(task.output_path().to_path_buf()));
            }
            panic::catch_unwind(AssertUnwindSafe(|| {
                generate_task(engine, &context.classifier, task)
            }))
            .unwrap_or_else(|payload| Err(TseriesError::TaskPanicked(panic_message(&*payload))))
        });

        let mut report = GenerationReport::default();
        for (task, result) in self.tasks().iter().zip(results) {
            match result {
                Ok(TaskOutcome::Generated(path)) => {
                    debug!(task = %task.id(), path = %path.display(), "Generated time series");
                    report.generated.push(path);
                }
                Ok(TaskOutcome::Skipped(path)) => report.skipped.push(path),
                Err(e) => {
                    error!(task = %task.id(), error = %e, "Time series generation failed");
                    report.failures.push(TaskFailure {
                        task: task.id().clone(),
                        output_path: task.output_path().to_path_buf(),
                        error: e,
                    });
                }
            }
        }

        info!(
            generated = report.generated.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation finished"
        );
        report
    }
}
