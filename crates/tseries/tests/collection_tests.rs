//! Filter, grouping and slicing properties of history file collections.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use test_utils::{
    history_and_output_dirs, touch, write_monthly_files, write_structured_tree, HistoryFileSpec,
    MemoryEngine, StoredDataset,
};
use tseries::{DiscoveryOptions, FileCollection, RunContext, SeriesCollection, TseriesError};

fn context(engine: &MemoryEngine) -> Arc<RunContext> {
    RunContext::new(Arc::new(engine.clone())).shared()
}

fn paths(files: &FileCollection) -> BTreeSet<PathBuf> {
    files.paths().map(|p| p.to_path_buf()).collect()
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_discovery_skips_restart_and_log_dirs() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history.join("atm"), "testing.hf", 2, 1).unwrap();
    write_monthly_files(&engine, &history.join("rest/0001"), "testing.hf", 2, 1).unwrap();
    write_monthly_files(&engine, &history.join("logs"), "testing.hf", 2, 1).unwrap();
    touch(&history.join("atm/readme.txt")).unwrap();

    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.paths().all(|p| p.starts_with(history.join("atm"))));
}

#[test]
fn test_discovery_excludes_only_exact_dir_names() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history.join("forest"), "testing.hf", 2, 1).unwrap();
    write_monthly_files(&engine, &history.join("catalogs"), "testing.hf", 2, 1).unwrap();
    write_monthly_files(&engine, &history.join("logs"), "testing.hf", 2, 1).unwrap();

    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    assert_eq!(files.len(), 4);
    assert!(files.paths().all(|p| !p.starts_with(history.join("logs"))));
    assert!(files.discovery_errors().is_empty());
}

#[cfg(unix)]
#[test]
fn test_unreadable_entries_are_reported_not_fatal() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history, "testing.hf", 2, 1).unwrap();
    let dangling = history.join("gone.nc");
    std::os::unix::fs::symlink(history.join("missing-target.nc"), &dangling).unwrap();

    let discovery = DiscoveryOptions {
        follow_links: true,
        ..Default::default()
    };
    let context = RunContext::new(Arc::new(engine.clone()))
        .with_discovery(discovery)
        .shared();
    let files = FileCollection::discover(&history, context).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files.discovery_errors().len(), 1);
    match &files.discovery_errors()[0] {
        TseriesError::Walk { path, .. } => assert_eq!(path, &dangling),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(files.include_patterns(&["*"]).unwrap().discovery_errors().len(), 1);
}

#[test]
fn test_discovery_requires_directory() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    let result = FileCollection::discover(history.join("missing"), context(&engine));
    assert!(matches!(result, Err(TseriesError::MissingInputDir(_))));
}

// ============================================================================
// Path filters
// ============================================================================

#[test]
fn test_include_and_exclude_are_complements() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_structured_tree(&engine, &history, 3, 2, 2).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    let all = paths(&files);
    assert_eq!(all.len(), 12);

    let patterns = ["*/0_dir/*", "*/2_dir/1_subdir/*"];
    let kept = paths(&files.include_patterns(&patterns).unwrap());
    let dropped = paths(&files.exclude_patterns(&patterns).unwrap());

    assert_eq!(kept.len(), 6);
    assert!(kept.is_subset(&all));
    assert!(kept.is_disjoint(&dropped));
    assert_eq!(kept.union(&dropped).cloned().collect::<BTreeSet<_>>(), all);
    assert!(kept.iter().all(|p| {
        let s = p.to_string_lossy();
        s.contains("/0_dir/") || s.contains("/2_dir/1_subdir/")
    }));
}

#[test]
fn test_filtered_copies_share_metadata() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history, "testing.hf", 4, 1).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let copy = files.include_patterns(&["*"]).unwrap();
    assert!(!files.is_pulled());
    let report = copy.pull_metadata();
    assert_eq!(report.pulled, 4);
    assert!(files.is_pulled());

    let report = files.pull_metadata();
    assert_eq!(report.pulled, 0);
    assert_eq!(report.cached, 4);

    for record in files.records() {
        let other = copy.get(record.path()).unwrap();
        assert!(record.shares_metadata_with(other));
    }
}

// ============================================================================
// Year filters
// ============================================================================

#[test]
fn test_include_years_is_boundary_inclusive() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    let written = write_monthly_files(&engine, &history, "testing.hf", 36, 1).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let kept = paths(&files.include_years(1851, 1851).unwrap());
    // File 11 closes on 1851-01-01; file 23 closes on 1852-01-01.
    let expected: BTreeSet<PathBuf> = written[11..=23].iter().cloned().collect();
    assert_eq!(kept, expected);

    assert!(files.include_years(1900, 1910).unwrap().is_empty());
    assert_eq!(files.include_years(1800, 2000).unwrap().len(), 36);
}

#[test]
fn test_include_years_matching_leaves_others_alone() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history.join("atm"), "testing.hf", 24, 1).unwrap();
    write_monthly_files(&engine, &history.join("lnd"), "testing.hf", 24, 1).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let filtered = files.include_years_matching(1850, 1850, &["*/atm/*"]).unwrap();
    assert_eq!(filtered.len(), 12 + 24);
}

#[test]
fn test_mixed_calendars_are_rejected() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    HistoryFileSpec::monthly(0)
        .write(&engine, history.join("a.h0.00000.nc"))
        .unwrap();
    HistoryFileSpec::monthly(0)
        .calendar("noleap")
        .write(&engine, history.join("b.h0.00000.nc"))
        .unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    assert!(matches!(
        files.include_years(1850, 1850),
        Err(TseriesError::CalendarMismatch { .. })
    ));
    let series = SeriesCollection::new(&files, &output).unwrap();
    assert!(matches!(
        series.include_years(1850, 1850),
        Err(TseriesError::CalendarMismatch { .. })
    ));
}

// ============================================================================
// Validation and grouping
// ============================================================================

#[test]
fn test_invalid_history_files_are_skipped_with_warning() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history, "testing.hf", 3, 1).unwrap();
    let broken = history.join("testing.hf.00003.nc");
    touch(&broken).unwrap();
    engine.insert(&broken, StoredDataset::new().with_attribute("title", "no time"));

    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    let report = files.pull_metadata();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, broken);
    assert!(matches!(
        report.failures[0].error,
        TseriesError::InvalidHistoryFile { .. }
    ));

    let series = SeriesCollection::new(&files, &output).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series.tasks()[0].members().len(), 3);
    assert!(series.warnings().iter().any(|w| w.contains("testing.hf.00003.nc")));
}

#[test]
fn test_fill_value_bounds_fail_only_that_file() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history, "testing.hf", 2, 1).unwrap();
    let broken = HistoryFileSpec::new(vec![15.0])
        .with_bounds(vec![[0.0, 9.969e36]])
        .num_vars(1)
        .write(&engine, history.join("bad.hf.00000.nc"))
        .unwrap();

    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    let report = files.pull_metadata();
    assert_eq!(report.pulled, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, broken);
    assert!(!files.get(&broken).unwrap().is_pulled());

    let series = SeriesCollection::new(&files, &output).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series.tasks()[0].members().len(), 2);
}

#[test]
fn test_generated_outputs_are_not_history_files() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    let paths = write_monthly_files(&engine, &history, "testing.hf", 2, 1).unwrap();
    let mut dataset = engine.dataset(&paths[1]).unwrap();
    dataset = dataset.with_attribute(tseries::COMPLETION_ATTR, true);
    engine.insert(&paths[1], dataset);

    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    let report = files.pull_metadata();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(files.pulled().len(), 1);
}

#[test]
fn test_grouping_is_a_partition() {
    let (_guard, history, _output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_structured_tree(&engine, &history, 3, 2, 4).unwrap();
    write_monthly_files(&engine, &history.join("0_dir/0_subdir"), "other.h1", 3, 1).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let grouping = files.groups();
    assert!(grouping.rejected.is_empty());
    assert_eq!(grouping.groups.len(), 3 * 2 + 1);

    let mut seen = BTreeSet::new();
    for group in &grouping.groups {
        for member in &group.members {
            assert!(seen.insert(member.path().to_path_buf()), "file in two groups");
            assert_eq!(member.path().parent().unwrap(), group.key.dir);
        }
    }
    assert_eq!(seen, paths(&files));
}

#[test]
fn test_unorderable_group_is_rejected() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    HistoryFileSpec::monthly(0)
        .write(&engine, history.join("foo.h0.2000-01.nc"))
        .unwrap();
    HistoryFileSpec::monthly(1)
        .write(&engine, history.join("foo.h0.final.nc"))
        .unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let grouping = files.groups();
    assert!(grouping.groups.is_empty());
    assert_eq!(grouping.rejected.len(), 1);
    assert!(matches!(
        grouping.rejected[0].error,
        TseriesError::AmbiguousOrder { .. }
    ));

    let series = SeriesCollection::new(&files, &output).unwrap();
    assert!(series.is_empty());
    assert!(series.warnings().iter().any(|w| w.contains("rejected group")));
}

#[test]
fn test_six_digit_counters_form_one_task() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    for index in 0..14 {
        HistoryFileSpec::monthly(index)
            .num_vars(1)
            .write(&engine, history.join(format!("x.h.{:06}.nc", index + 1)))
            .unwrap();
    }
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let series = SeriesCollection::new(&files, &output).unwrap();
    assert!(series.warnings().is_empty());
    assert_eq!(series.len(), 1);
    let members = series.tasks()[0].member_paths();
    assert_eq!(members.len(), 14);
    assert_eq!(members[0], history.join("x.h.000001.nc"));
    assert_eq!(members[13], history.join("x.h.000014.nc"));
}

#[test]
fn test_inconsistent_members_limit_variables() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    for index in 0..3 {
        let vars = if index == 2 { 1 } else { 3 };
        HistoryFileSpec::monthly(index)
            .num_vars(vars)
            .write(&engine, history.join(format!("testing.hf.{:05}.nc", index)))
            .unwrap();
    }
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let series = SeriesCollection::new(&files, &output).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series.tasks()[0].variable(), "VAR0");
    assert!(series
        .warnings()
        .iter()
        .any(|w| w.contains("testing.hf.00002.nc")));
}

// ============================================================================
// Slicing
// ============================================================================

#[test]
fn test_slices_reconstruct_members() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history, "testing.hf", 40, 1).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();
    let series = SeriesCollection::new(&files, &output).unwrap();
    let original: Vec<PathBuf> = series.tasks()[0]
        .member_paths()
        .into_iter()
        .map(PathBuf::from)
        .collect();

    for size in [1, 2, 5] {
        let sliced = series.slice_groups(size, None).unwrap();
        let rebuilt: Vec<PathBuf> = sliced
            .tasks()
            .iter()
            .flat_map(|t| t.member_paths())
            .map(PathBuf::from)
            .collect();
        assert_eq!(rebuilt, original, "slice size {}", size);

        let outputs: BTreeSet<PathBuf> =
            sliced.output_paths().into_iter().map(PathBuf::from).collect();
        assert_eq!(outputs.len(), sliced.len());
    }

    let yearly = series.slice_groups(1, None).unwrap();
    let sizes: Vec<usize> = yearly.tasks().iter().map(|t| t.members().len()).collect();
    assert_eq!(sizes, vec![12, 12, 12, 4]);
    assert_eq!(yearly.tasks()[3].id().slice, Some((1853, 1853)));
}

#[test]
fn test_single_member_task_is_not_sliced() {
    let (_guard, history, output) = history_and_output_dirs().unwrap();
    let engine = MemoryEngine::new();
    write_monthly_files(&engine, &history, "testing.hf", 1, 1).unwrap();
    let files = FileCollection::discover(&history, context(&engine)).unwrap();

    let sliced = SeriesCollection::new(&files, &output)
        .unwrap()
        .slice_groups(1, None)
        .unwrap();
    assert_eq!(sliced.len(), 1);
    assert_eq!(sliced.tasks()[0].id().slice, None);
}
