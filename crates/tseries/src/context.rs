//! Per-run context shared by collections and the generation engine.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tseries_common::ArrayEngine;

use crate::error::{Result, TseriesError};
use crate::metadata::VariableClassifier;

/// Options controlling recursive history file discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Subdirectories with exactly one of these names are skipped.
    pub exclude_dirs: Vec<String>,
    /// Accepted file extensions, without the dot.
    pub extensions: Vec<String>,
    pub follow_links: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            exclude_dirs: vec!["rest".to_string(), "logs".to_string()],
            extensions: vec!["nc".to_string()],
            follow_links: false,
        }
    }
}

/// Runs independent units of work, serially or on a rayon pool.
#[derive(Clone)]
pub enum Executor {
    Serial,
    Parallel(Arc<rayon::ThreadPool>),
}

impl Executor {
    /// A rayon pool with `threads` workers, or rayon's default when `None`.
    pub fn parallel(threads: Option<usize>) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("tseries-worker-{}", i));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| TseriesError::ThreadPool(e.to_string()))?;
        Ok(Executor::Parallel(Arc::new(pool)))
    }

    /// Apply `f` to every item; results keep the input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self {
            Executor::Serial => items.iter().map(f).collect(),
            Executor::Parallel(pool) => pool.install(|| items.par_iter().map(f).collect()),
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            Executor::Serial => 1,
            Executor::Parallel(pool) => pool.current_num_threads(),
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Serial => f.write_str("Serial"),
            Executor::Parallel(pool) => write!(f, "Parallel({})", pool.current_num_threads()),
        }
    }
}

/// Everything a run needs besides the files themselves.
///
/// Built once per run and shared by `Arc`; there is no process-wide state.
pub struct RunContext {
    pub engine: Arc<dyn ArrayEngine>,
    pub executor: Executor,
    pub classifier: VariableClassifier,
    pub discovery: DiscoveryOptions,
}

impl RunContext {
    /// Serial context with default classification and discovery rules.
    pub fn new(engine: Arc<dyn ArrayEngine>) -> Self {
        Self {
            engine,
            executor: Executor::Serial,
            classifier: VariableClassifier::default(),
            discovery: DiscoveryOptions::default(),
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_classifier(mut self, classifier: VariableClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryOptions) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("executor", &self.executor)
            .field("classifier", &self.classifier)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_order() {
        let items: Vec<u32> = (0..200).collect();
        let serial = Executor::Serial.map(&items, |x| x * 2);
        let parallel = Executor::parallel(Some(4)).unwrap().map(&items, |x| x * 2);
        assert_eq!(serial, parallel);
        assert_eq!(parallel[199], 398);
    }

    #[test]
    fn test_workers() {
        assert_eq!(Executor::Serial.workers(), 1);
        assert_eq!(Executor::parallel(Some(3)).unwrap().workers(), 3);
    }
}
