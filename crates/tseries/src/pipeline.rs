//! End-to-end run driven by a [`RunConfig`].

use std::sync::Arc;

use tracing::{info, warn};
use tseries_common::ArrayEngine;

use crate::collection::FileCollection;
use crate::config::RunConfig;
use crate::context::RunContext;
use crate::error::Result;
use crate::generate::GenerationReport;
use crate::series::{ArgOverrides, SeriesCollection};

/// Build the run context described by `config`.
pub fn build_context(config: &RunConfig, engine: Arc<dyn ArrayEngine>) -> Result<Arc<RunContext>> {
    Ok(RunContext::new(engine)
        .with_executor(config.execution.build_executor()?)
        .with_classifier(config.classifier.clone())
        .with_discovery(config.discovery.clone())
        .shared())
}

/// Discover, filter and group history files, then derive the task list.
pub fn plan(config: &RunConfig, context: Arc<RunContext>) -> Result<SeriesCollection> {
    let mut files = FileCollection::discover(&config.input_dir, context)?;
    if !config.include_patterns.is_empty() {
        files = files.include_patterns(&config.include_patterns)?;
    }
    if !config.exclude_patterns.is_empty() {
        files = files.exclude_patterns(&config.exclude_patterns)?;
    }

    let report = files.pull_metadata();
    if !report.is_clean() {
        warn!(failed = report.failures.len(), "Some history files were skipped");
    }
    if let Some(range) = config.years {
        files = files.include_years(range.start, range.end)?;
    }

    let mut series = SeriesCollection::new(&files, &config.output_dir)?;
    for swap in &config.path_swaps {
        series.apply_path_swap(&swap.old, &swap.new);
    }
    if config.append_timestep_dirs {
        series.append_timestep_dirs();
    }

    let mut defaults = ArgOverrides::new()
        .overwrite(config.overwrite)
        .level(config.compression.level);
    defaults.compression = config.compression.algorithm;
    series.add_args("*", "*", defaults)?;
    for rule in &config.rules {
        series.add_args(&rule.path, &rule.variable, rule.overrides.clone())?;
    }

    if let Some(size) = config.slice_years {
        series = series.slice_groups(size, None)?;
    }
    Ok(series)
}

/// Run the whole pipeline. With `dry_run`, tasks are derived and logged but
/// nothing is written.
pub fn run(config: &RunConfig, engine: Arc<dyn ArrayEngine>) -> Result<GenerationReport> {
    let context = build_context(config, engine)?;
    info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        workers = context.executor.workers(),
        "Starting time series run"
    );

    let series = plan(config, context)?;
    for warning in series.warnings() {
        warn!(warning = %warning, "Planning warning");
    }

    if config.dry_run {
        for task in series.tasks() {
            info!(task = %task.id(), output = %task.output_path().display(), "Planned task");
        }
        info!(tasks = series.len(), "Dry run, nothing written");
        return Ok(GenerationReport::default());
    }
    Ok(series.execute())
}
