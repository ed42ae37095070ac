//! Run configuration.
//!
//! Loaded from YAML (or JSON for `.json` paths) with `${VAR}` / `${VAR:-default}` substitution, then
//! overridable by `TSERIES_*` environment variables:
//!
//! - `TSERIES_INPUT_DIR`, `TSERIES_OUTPUT_DIR`
//! - `TSERIES_THREADS` (switches to parallel execution)
//! - `TSERIES_OVERWRITE`, `TSERIES_DRY_RUN`
//! - `TSERIES_COMPRESSION`, `TSERIES_COMPRESSION_LEVEL`
//! - `TSERIES_SLICE_YEARS`, `TSERIES_LOG_LEVEL`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tseries_common::Compression;

use crate::context::{DiscoveryOptions, Executor};
use crate::logging::LoggingConfig;
use crate::metadata::VariableClassifier;
use crate::series::ArgOverrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSwapConfig {
    pub old: String,
    pub new: String,
}

/// One `add_args` rule; globs default to `*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgRuleConfig {
    #[serde(default = "match_all")]
    pub path: String,
    #[serde(default = "match_all")]
    pub variable: String,
    #[serde(flatten)]
    pub overrides: ArgOverrides,
}

fn match_all() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Worker threads for parallel mode; rayon's default when unset.
    pub threads: Option<usize>,
}

impl ExecutionConfig {
    pub fn build_executor(&self) -> crate::Result<Executor> {
        match self.mode {
            ExecutionMode::Serial => Ok(Executor::Serial),
            ExecutionMode::Parallel => Executor::parallel(self.threads),
        }
    }
}

/// Everything needed to run the pipeline end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub discovery: DiscoveryOptions,
    #[serde(default)]
    pub classifier: VariableClassifier,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub years: Option<YearRange>,
    #[serde(default)]
    pub slice_years: Option<u32>,
    #[serde(default)]
    pub path_swaps: Vec<PathSwapConfig>,
    #[serde(default)]
    pub append_timestep_dirs: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub compression: Compression,
    /// Applied in order after the defaults above.
    #[serde(default)]
    pub rules: Vec<ArgRuleConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Derive tasks but write nothing.
    #[serde(default)]
    pub dry_run: bool,
}

impl RunConfig {
    /// Minimal configuration for a pair of directories.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            discovery: DiscoveryOptions::default(),
            classifier: VariableClassifier::default(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            years: None,
            slice_years: None,
            path_swaps: Vec::new(),
            append_timestep_dirs: false,
            overwrite: false,
            compression: Compression::default(),
            rules: Vec::new(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
            dry_run: false,
        }
    }

    /// Load a YAML file, expand environment references, apply `TSERIES_*`
    /// overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read run config from {:?}", path.as_ref()))?;
        let is_json = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        };
        let mut config = parsed
            .with_context(|| format!("Failed to parse run config from {:?}", path.as_ref()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse run config YAML")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        serde_json::from_str(&expanded).with_context(|| "Failed to parse run config JSON")
    }

    /// Build a configuration purely from `TSERIES_*` variables.
    pub fn from_env() -> Result<Self> {
        let input = std::env::var("TSERIES_INPUT_DIR").context("TSERIES_INPUT_DIR not set")?;
        let output = std::env::var("TSERIES_OUTPUT_DIR").context("TSERIES_OUTPUT_DIR not set")?;
        let mut config = Self::new(input, output);
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TSERIES_INPUT_DIR") {
            self.input_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TSERIES_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TSERIES_THREADS") {
            let threads: usize = val
                .parse()
                .with_context(|| format!("Invalid TSERIES_THREADS: {}", val))?;
            self.execution.mode = ExecutionMode::Parallel;
            self.execution.threads = Some(threads);
        }
        if let Ok(val) = std::env::var("TSERIES_OVERWRITE") {
            self.overwrite = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("TSERIES_DRY_RUN") {
            self.dry_run = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("TSERIES_COMPRESSION") {
            self.compression.algorithm = Some(
                val.parse()
                    .with_context(|| format!("Invalid TSERIES_COMPRESSION: {}", val))?,
            );
        }
        if let Ok(val) = std::env::var("TSERIES_COMPRESSION_LEVEL") {
            self.compression.level = val
                .parse()
                .with_context(|| format!("Invalid TSERIES_COMPRESSION_LEVEL: {}", val))?;
        }
        if let Ok(val) = std::env::var("TSERIES_SLICE_YEARS") {
            self.slice_years = Some(
                val.parse()
                    .with_context(|| format!("Invalid TSERIES_SLICE_YEARS: {}", val))?,
            );
        }
        if let Ok(val) = std::env::var("TSERIES_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.input_dir.as_os_str().is_empty(),
            "Input directory cannot be empty"
        );
        anyhow::ensure!(
            !self.output_dir.as_os_str().is_empty(),
            "Output directory cannot be empty"
        );
        if let Some(range) = self.years {
            anyhow::ensure!(
                range.start <= range.end,
                "Year range start {} is after end {}",
                range.start,
                range.end
            );
        }
        if let Some(size) = self.slice_years {
            anyhow::ensure!(size > 0, "slice_years must be at least 1");
        }
        anyhow::ensure!(
            self.compression.level <= 9,
            "Compression level must be 0-9, got {}",
            self.compression.level
        );
        for rule in &self.rules {
            if let Some(level) = rule.overrides.level {
                anyhow::ensure!(level <= 9, "Compression level must be 0-9, got {}", level);
            }
        }
        if let Some(threads) = self.execution.threads {
            anyhow::ensure!(threads > 0, "Thread count must be greater than 0");
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        anyhow::ensure!(
            valid_levels.contains(&self.logging.level.as_str()),
            "Invalid log level: {}. Must be one of: {:?}",
            self.logging.level,
            valid_levels
        );
        Ok(())
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut expr = String::new();
        let mut depth = 1;
        while depth > 0 {
            match chars.next() {
                Some('{') => {
                    depth += 1;
                    expr.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth > 0 {
                        expr.push('}');
                    }
                }
                Some(c) => expr.push(c),
                None => anyhow::bail!("Unclosed variable substitution: ${{{}", expr),
            }
        }
        result.push_str(&resolve_var_expr(&expr)?);
    }
    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        },
        None => std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr)),
    }
}
