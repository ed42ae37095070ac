//! Discovered history files and the filters that narrow them.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::RunContext;
use crate::error::{panic_message, Result, TseriesError};
use crate::grouping::{group_records, DelimitedDateToken, Grouping, GroupingStrategy};
use crate::matcher::PatternSet;
use crate::metadata::Metadata;

/// One discovered input file and its lazily pulled metadata.
///
/// Clones share the metadata cell, so a record copied into a filtered
/// collection never pulls twice.
#[derive(Debug, Clone)]
pub struct FileRecord {
    path: PathBuf,
    metadata: Arc<OnceLock<Metadata>>,
}

impl FileRecord {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            metadata: Arc::new(OnceLock::new()),
        }
    }

    /// A record whose metadata is already known.
    pub fn with_metadata(path: PathBuf, metadata: Metadata) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(metadata);
        Self {
            path,
            metadata: Arc::new(cell),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.get()
    }

    pub fn is_pulled(&self) -> bool {
        self.metadata.get().is_some()
    }

    /// Pull metadata unless already cached. Failures are not cached.
    pub fn pull(&self, context: &RunContext) -> Result<&Metadata> {
        if let Some(meta) = self.metadata.get() {
            return Ok(meta);
        }
        let meta = Metadata::pull(context.engine.as_ref(), &self.path, &context.classifier)?;
        Ok(self.metadata.get_or_init(|| meta))
    }

    /// Whether two records share the same metadata cell.
    pub fn shares_metadata_with(&self, other: &FileRecord) -> bool {
        Arc::ptr_eq(&self.metadata, &other.metadata)
    }
}

/// A file whose metadata could not be pulled.
#[derive(Debug)]
pub struct PullFailure {
    pub path: PathBuf,
    pub error: TseriesError,
}

/// Outcome of a batch metadata pull.
#[derive(Debug, Default)]
pub struct PullReport {
    /// Records pulled by this call.
    pub pulled: usize,
    /// Records that already held metadata.
    pub cached: usize,
    pub failures: Vec<PullFailure>,
}

impl PullReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Mapping from path to [`FileRecord`] for one input tree.
#[derive(Debug, Clone)]
pub struct FileCollection {
    input_dir: PathBuf,
    records: BTreeMap<PathBuf, FileRecord>,
    discovery_errors: Arc<[TseriesError]>,
    context: Arc<RunContext>,
}

impl FileCollection {
    /// Recursively collect array files under `input_dir`.
    ///
    /// Unreadable entries are logged and skipped.
    pub fn discover(input_dir: impl AsRef<Path>, context: Arc<RunContext>) -> Result<Self> {
        let input_dir = input_dir.as_ref().to_path_buf();
        if !input_dir.is_dir() {
            return Err(TseriesError::MissingInputDir(input_dir));
        }
        let options = &context.discovery;

        let mut records = BTreeMap::new();
        let mut discovery_errors = Vec::new();
        let walker = WalkDir::new(&input_dir)
            .follow_links(options.follow_links)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !options.exclude_dirs.iter().any(|dir| name == dir.as_str())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let error = TseriesError::Walk {
                        path: e.path().unwrap_or(input_dir.as_path()).to_path_buf(),
                        message: e.to_string(),
                    };
                    warn!(error = %error, "Skipping unreadable directory entry");
                    discovery_errors.push(error);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let accepted = path
                .extension()
                .map(|ext| options.extensions.iter().any(|e| ext == e.as_str()))
                .unwrap_or(false);
            if accepted {
                records.insert(path.to_path_buf(), FileRecord::new(path.to_path_buf()));
            }
        }

        info!(
            input_dir = %input_dir.display(),
            files = records.len(),
            skipped_entries = discovery_errors.len(),
            "Discovered history files"
        );
        Ok(Self {
            input_dir,
            records,
            discovery_errors: discovery_errors.into(),
            context,
        })
    }

    /// Build a collection from known records, bypassing discovery.
    pub fn from_records<I>(input_dir: impl AsRef<Path>, records: I, context: Arc<RunContext>) -> Self
    where
        I: IntoIterator<Item = FileRecord>,
    {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            records: records
                .into_iter()
                .map(|r| (r.path().to_path_buf(), r))
                .collect(),
            discovery_errors: Arc::from(Vec::new()),
            context,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(PathBuf::as_path)
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Entries skipped during discovery, shared by filtered copies.
    pub fn discovery_errors(&self) -> &[TseriesError] {
        &self.discovery_errors
    }

    pub fn is_pulled(&self) -> bool {
        self.records.values().all(FileRecord::is_pulled)
    }

    fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&FileRecord) -> bool,
    {
        Self {
            input_dir: self.input_dir.clone(),
            records: self
                .records
                .iter()
                .filter(|(_, r)| keep(r))
                .map(|(p, r)| (p.clone(), r.clone()))
                .collect(),
            discovery_errors: Arc::clone(&self.discovery_errors),
            context: Arc::clone(&self.context),
        }
    }

    /// Keep files whose path matches any pattern.
    pub fn include_patterns<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Self> {
        let set = PatternSet::new(patterns)?;
        Ok(self.filtered(|r| set.matches_path(r.path())))
    }

    /// Drop files whose path matches any pattern.
    pub fn exclude_patterns<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Self> {
        let set = PatternSet::new(patterns)?;
        Ok(self.filtered(|r| !set.matches_path(r.path())))
    }

    /// Pull metadata for every record that lacks it, using the run executor.
    pub fn pull_metadata(&self) -> PullReport {
        let pending: Vec<&FileRecord> = self.records.values().filter(|r| !r.is_pulled()).collect();
        let mut report = PullReport {
            cached: self.records.len() - pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return report;
        }

        let context = self.context.as_ref();
        // A panic while decoding one header is that file's failure only.
        let results = context.executor.map(&pending, |record| {
            panic::catch_unwind(AssertUnwindSafe(|| record.pull(context).map(|_| ())))
                .unwrap_or_else(|payload| {
                    Err(TseriesError::invalid_file(record.path(), panic_message(&*payload)))
                })
        });
        for (record, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => report.pulled += 1,
                Err(error) => {
                    warn!(path = %record.path().display(), error = %error, "Failed to pull metadata");
                    report.failures.push(PullFailure {
                        path: record.path().to_path_buf(),
                        error,
                    });
                }
            }
        }
        info!(
            pulled = report.pulled,
            cached = report.cached,
            failed = report.failures.len(),
            "Pulled history file metadata"
        );
        report
    }

    /// Only the records holding metadata.
    pub fn pulled(&self) -> Self {
        self.filtered(FileRecord::is_pulled)
    }

    /// Keep files whose time bounds overlap `[start_year, end_year]`.
    ///
    /// Metadata is pulled first where missing; files that still lack it
    /// cannot be tested and are dropped. All files must share one calendar.
    pub fn include_years(&self, start_year: i32, end_year: i32) -> Result<Self> {
        self.filter_years(start_year, end_year, None)
    }

    /// Like [`FileCollection::include_years`], but only files matching
    /// `patterns` are tested; the rest are kept untouched.
    pub fn include_years_matching<S: AsRef<str>>(
        &self,
        start_year: i32,
        end_year: i32,
        patterns: &[S],
    ) -> Result<Self> {
        self.filter_years(start_year, end_year, Some(PatternSet::new(patterns)?))
    }

    fn filter_years(&self, start_year: i32, end_year: i32, set: Option<PatternSet>) -> Result<Self> {
        let applies = |r: &FileRecord| set.as_ref().map_or(true, |s| s.matches_path(r.path()));

        let scoped = self.filtered(|r| applies(r));
        if !scoped.is_pulled() {
            scoped.pull_metadata();
        }

        let mut calendar = None;
        for record in scoped.records.values() {
            if let Some(meta) = record.metadata() {
                match calendar {
                    None => calendar = Some(meta.calendar),
                    Some(expected) if expected != meta.calendar => {
                        return Err(TseriesError::CalendarMismatch {
                            expected,
                            found: meta.calendar,
                            path: record.path().to_path_buf(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        let filtered = self.filtered(|r| {
            if !applies(r) {
                return true;
            }
            r.metadata()
                .is_some_and(|m| m.overlaps_years(start_year, end_year))
        });
        debug!(
            start_year,
            end_year,
            before = self.len(),
            after = filtered.len(),
            "Applied year filter"
        );
        Ok(filtered)
    }

    /// Group files with the default `.`-delimited date token strategy.
    pub fn groups(&self) -> Grouping {
        self.groups_with(&DelimitedDateToken::default())
    }

    pub fn groups_with<S: GroupingStrategy + ?Sized>(&self, strategy: &S) -> Grouping {
        let records: Vec<FileRecord> = self.records.values().cloned().collect();
        group_records(&records, strategy)
    }
}
