//! Time series generation from model history files.
//!
//! Converts directories of multi-variable, time-chunked history files into
//! single-variable files concatenated along time.
//!
//! # Architecture
//!
//! - [`collection`]: discovery, path and year filters, lazy metadata pulls
//! - [`grouping`]: path-based grouping into continuous timelines
//! - [`series`]: task derivation, argument rules, path swaps and slicing
//! - [`generate`]: per-task writing with a completion marker so interrupted
//!   runs resume safely
//! - [`pipeline`]: the above driven by a [`RunConfig`]
//!
//! Array I/O goes through the [`tseries_common::ArrayEngine`] held by the
//! run's [`RunContext`].

pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod generate;
pub mod grouping;
pub mod logging;
mod matcher;
pub mod metadata;
pub mod naming;
pub mod pipeline;
pub mod series;

// Re-exports
pub use collection::{FileCollection, FileRecord, PullFailure, PullReport};
pub use config::{ArgRuleConfig, ExecutionConfig, ExecutionMode, PathSwapConfig, RunConfig, YearRange};
pub use context::{DiscoveryOptions, Executor, RunContext};
pub use error::{Result, TseriesError};
pub use generate::{generate_task, is_complete, GenerationReport, TaskFailure, TaskOutcome};
pub use grouping::{
    group_records, DelimitedDateToken, Group, GroupKey, Grouping, GroupingStrategy, RejectedGroup,
    TokenKey,
};
pub use logging::{LogFormat, LoggingConfig};
pub use matcher::{PatternSet, TaskSelector};
pub use metadata::{
    Metadata, VariableClassifier, COMPLETION_ATTR, SOFTWARE_VERSION, TIME_BOUNDS_NAMES,
    VERSION_ATTR,
};
pub use naming::{OutputTemplate, StepUnit, Timestep};
pub use series::{
    ArgOverrides, ArgRule, GenerationArgs, PathSwap, SeriesCollection, SeriesTask, TaskId,
};
