//! In-memory array engine.
//!
//! Datasets live in a shared map keyed by path, so tests can inspect every
//! output a run produced without linking a real file format. Writes land in
//! the map as they happen: a writer that fails halfway leaves a partial
//! dataset behind, exactly like an interrupted file write.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tseries_common::{
    ArrayEngine, AttrValue, CommonError, CommonResult, Compression, DatasetHeader, DatasetWriter,
    VariableData,
};

/// One dataset held by a [`MemoryEngine`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredDataset {
    pub header: DatasetHeader,
    pub data: IndexMap<String, VariableData>,
    /// Compression requested for each written variable.
    pub compression: IndexMap<String, Compression>,
    /// Set when the writer was closed.
    pub closed: bool,
}

impl StoredDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, data: VariableData) -> Self {
        self.insert_variable(data);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.header.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn insert_variable(&mut self, data: VariableData) {
        self.header
            .variables
            .insert(data.name().to_string(), data.header.clone());
        self.data.insert(data.name().to_string(), data);
    }

    /// Values of `name` widened to `f64`.
    pub fn values_f64(&self, name: &str) -> Option<Vec<f64>> {
        self.data.get(name).and_then(|d| d.values.to_f64())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.header.attribute(name)
    }
}

type Store = Arc<RwLock<HashMap<PathBuf, StoredDataset>>>;

/// [`ArrayEngine`] backed by a shared in-memory map.
///
/// Clones share state, so a test can keep one handle while the run owns
/// another behind an `Arc<dyn ArrayEngine>`.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    store: Store,
    creates: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the dataset at `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, dataset: StoredDataset) {
        self.store.write().insert(path.into(), dataset);
    }

    pub fn dataset(&self, path: &Path) -> Option<StoredDataset> {
        self.store.read().get(path).cloned()
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.store.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Stored paths under `dir`, sorted.
    pub fn paths_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.paths()
            .into_iter()
            .filter(|p| p.starts_with(dir))
            .collect()
    }

    /// Number of [`ArrayEngine::create`] calls so far.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Make every writer created from now on fail when writing `variable`.
    pub fn fail_writes_for(&self, variable: &str) {
        self.failing.lock().insert(variable.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    fn missing(path: &Path) -> CommonError {
        CommonError::Open {
            path: path.display().to_string(),
            message: "no such dataset".to_string(),
        }
    }
}

impl ArrayEngine for MemoryEngine {
    fn read_header(&self, path: &Path) -> CommonResult<DatasetHeader> {
        self.store
            .read()
            .get(path)
            .map(|d| d.header.clone())
            .ok_or_else(|| Self::missing(path))
    }

    fn read_variable(&self, path: &Path, name: &str) -> CommonResult<VariableData> {
        let store = self.store.read();
        let dataset = store.get(path).ok_or_else(|| Self::missing(path))?;
        dataset
            .data
            .get(name)
            .cloned()
            .ok_or_else(|| CommonError::VariableNotFound(name.to_string()))
    }

    fn create(&self, path: &Path) -> CommonResult<Box<dyn DatasetWriter>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.store
            .write()
            .insert(path.to_path_buf(), StoredDataset::default());
        Ok(Box::new(MemoryWriter {
            store: Arc::clone(&self.store),
            path: path.to_path_buf(),
            failing: self.failing.lock().clone(),
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        self.store.read().contains_key(path)
    }

    fn remove(&self, path: &Path) -> CommonResult<()> {
        self.store
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::missing(path))
    }

    fn prepare_dir(&self, _dir: &Path) -> CommonResult<()> {
        Ok(())
    }
}

struct MemoryWriter {
    store: Store,
    path: PathBuf,
    failing: HashSet<String>,
}

impl MemoryWriter {
    fn with_dataset<F>(&self, f: F) -> CommonResult<()>
    where
        F: FnOnce(&mut StoredDataset),
    {
        let mut store = self.store.write();
        let dataset = store
            .get_mut(&self.path)
            .ok_or_else(|| MemoryEngine::missing(&self.path))?;
        f(dataset);
        Ok(())
    }
}

impl DatasetWriter for MemoryWriter {
    fn put_global_attribute(&mut self, name: &str, value: &AttrValue) -> CommonResult<()> {
        self.with_dataset(|d| {
            d.header.attributes.insert(name.to_string(), value.clone());
        })
    }

    fn put_variable(
        &mut self,
        variable: &VariableData,
        compression: &Compression,
    ) -> CommonResult<()> {
        if self.failing.contains(variable.name()) {
            return Err(CommonError::Write(format!(
                "injected failure writing '{}'",
                variable.name()
            )));
        }
        self.with_dataset(|d| {
            d.compression
                .insert(variable.name().to_string(), *compression);
            d.insert_variable(variable.clone());
        })
    }

    fn close(self: Box<Self>) -> CommonResult<()> {
        self.with_dataset(|d| d.closed = true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tseries_common::{ArrayValues, VariableHeader};

    fn time_var(values: Vec<f64>) -> VariableData {
        let header = VariableHeader::new("time", &[("time", values.len())]);
        VariableData::new(header, ArrayValues::F64(values)).unwrap()
    }

    #[test]
    fn test_writer_persists_into_store() {
        let engine = MemoryEngine::new();
        let path = Path::new("/out/a.nc");
        let mut writer = engine.create(path).unwrap();
        writer
            .put_global_attribute("title", &AttrValue::from("x"))
            .unwrap();
        writer
            .put_variable(&time_var(vec![1.0, 2.0]), &Compression::zlib(1))
            .unwrap();
        writer.close().unwrap();

        let stored = engine.dataset(path).unwrap();
        assert!(stored.closed);
        assert_eq!(stored.values_f64("time"), Some(vec![1.0, 2.0]));
        assert_eq!(stored.compression["time"], Compression::zlib(1));
        assert_eq!(
            engine.read_global_attribute(path, "title").unwrap(),
            Some(AttrValue::from("x"))
        );
        assert_eq!(engine.create_count(), 1);
    }

    #[test]
    fn test_injected_failure_leaves_partial_dataset() {
        let engine = MemoryEngine::new();
        engine.fail_writes_for("time");
        let path = Path::new("/out/b.nc");
        let mut writer = engine.create(path).unwrap();
        writer
            .put_global_attribute("flag", &AttrValue::Bool(false))
            .unwrap();
        assert!(writer
            .put_variable(&time_var(vec![1.0]), &Compression::NONE)
            .is_err());
        drop(writer);

        let stored = engine.dataset(path).unwrap();
        assert!(!stored.closed);
        assert!(stored.data.is_empty());
        assert!(engine.exists(path));
    }

    #[test]
    fn test_remove_and_missing() {
        let engine = MemoryEngine::new();
        let path = Path::new("/in/h.nc");
        engine.insert(path, StoredDataset::new().with_variable(time_var(vec![0.0])));
        assert!(engine.read_variable(path, "nope").is_err());
        engine.remove(path).unwrap();
        assert!(!engine.exists(path));
        assert!(engine.read_header(path).is_err());
        assert!(engine.remove(path).is_err());
    }
}
