//! Driver tests against a real temporary store and a scripted one.

use super::*;
use crate::config::PlaceholderSize;
use crate::cutoff::MismatchPolicy;
use crate::error::{DecodeError, StoreError, StoreOp};
use crate::store::FsContentStore;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn config(root: &std::path::Path, cutoff: &str) -> ReconcileConfig {
    ReconcileConfig::new(&root.to_string_lossy(), cutoff)
        .unwrap()
        .with_placeholder_size(PlaceholderSize::Fixed(1000))
}

fn touch(root: &std::path::Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"real content").unwrap();
}

/// Filesystem store that refuses to materialize one path, can stall the
/// existence check of another, and remembers what it was asked to create.
struct ScriptedStore {
    inner: FsContentStore,
    refuse: Option<String>,
    slow: Option<(String, Duration)>,
    materialized: Mutex<Vec<String>>,
}

impl ScriptedStore {
    fn new(root: &std::path::Path, refuse: Option<&str>) -> Self {
        Self {
            inner: FsContentStore::new(root),
            refuse: refuse.map(str::to_string),
            slow: None,
            materialized: Mutex::new(Vec::new()),
        }
    }

    fn with_slow_exists(mut self, relative: &str, delay: Duration) -> Self {
        self.slow = Some((relative.to_string(), delay));
        self
    }
}

impl ContentStore for ScriptedStore {
    fn exists(&self, relative: &str) -> Result<bool, StoreError> {
        if let Some((path, delay)) = &self.slow {
            if path == relative {
                thread::sleep(*delay);
            }
        }
        self.inner.exists(relative)
    }

    fn materialize(&self, relative: &str, size: u64) -> Result<PathBuf, StoreError> {
        self.materialized.lock().push(relative.to_string());
        if self.refuse.as_deref() == Some(relative) {
            return Err(StoreError::new(
                StoreOp::CreateFile,
                self.inner.resolve(relative),
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only store"),
            ));
        }
        self.inner.materialize(relative, size)
    }
}

#[test]
fn creates_placeholder_for_missing_eligible_record() {
    let dir = tempdir().unwrap();
    let records = vec![CatalogRecord::new("2023/05/01/0/abc.bin", 42)];
    let ctx = RunContext::new(
        records,
        config(dir.path(), "2023/05/01/0"),
        FsContentStore::new(dir.path()),
    );

    let report = ctx.reconcile(true).unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(report.existing_count, 0);
    assert_eq!(report.skipped_count, 0);

    let written = dir.path().join("2023/05/01/0/abc.bin");
    assert_eq!(fs::metadata(written).unwrap().len(), 1000);
}

#[test]
fn expected_size_policy_uses_catalog_size() {
    let dir = tempdir().unwrap();
    let records = vec![CatalogRecord::new("2023/05/01/0/abc.bin", 42)];
    let cfg = config(dir.path(), "2023/05/01/0").with_placeholder_size(PlaceholderSize::Expected);
    let ctx = RunContext::new(records, cfg, FsContentStore::new(dir.path()));

    ctx.reconcile(true).unwrap();
    let written = dir.path().join("2023/05/01/0/abc.bin");
    assert_eq!(fs::metadata(written).unwrap().len(), 42);
}

#[test]
fn records_before_cutoff_are_skipped_without_writes() {
    let dir = tempdir().unwrap();
    let records = vec![CatalogRecord::new("2023/04/30/9/abc.bin", 10)];
    let ctx = RunContext::new(
        records,
        config(dir.path(), "2023/05/01/0"),
        FsContentStore::new(dir.path()),
    );

    let report = ctx.reconcile(true).unwrap();
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.created_count, 0);
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn existing_files_are_counted_and_untouched() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "2023/06/01/0/abc.bin");
    let records = vec![CatalogRecord::new("2023/06/01/0/abc.bin", 10)];
    let ctx = RunContext::new(
        records,
        config(dir.path(), "2023/05/01/0"),
        FsContentStore::new(dir.path()),
    );

    let report = ctx.reconcile(true).unwrap();
    assert_eq!(report.existing_count, 1);
    assert_eq!(
        fs::read(dir.path().join("2023/06/01/0/abc.bin")).unwrap(),
        b"real content"
    );
}

#[test]
fn decode_failure_aborts_with_partial_counts() {
    let dir = tempdir().unwrap();
    let records = vec![
        CatalogRecord::new("2023/04/01/0/old.bin", 1),
        CatalogRecord::new("2023/06/01/0/new.bin", 1),
        CatalogRecord::new("abc/def/xyz.bin", 1),
        CatalogRecord::new("2023/07/01/0/never.bin", 1),
    ];
    let ctx = RunContext::new(
        records,
        config(dir.path(), "2023/05/01/0"),
        FsContentStore::new(dir.path()),
    );

    let aborted = ctx.reconcile(true).unwrap_err();
    assert_eq!(aborted.record_index, 2);
    assert_eq!(aborted.path, "abc/def/xyz.bin");
    assert!(matches!(
        aborted.source,
        ReconcileError::Decode(DecodeError::NonNumericSegment { .. })
    ));
    assert_eq!(aborted.report.skipped_count, 1);
    assert_eq!(aborted.report.created_count, 1);
    assert!(!dir.path().join("2023/07/01/0/never.bin").exists());
}

#[test]
fn component_mismatch_aborts_under_fatal_policy() {
    let dir = tempdir().unwrap();
    let records = vec![CatalogRecord::new("2023/06/01/abc.bin", 1)];
    let ctx = RunContext::new(
        records,
        config(dir.path(), "2023/05/01/0"),
        FsContentStore::new(dir.path()),
    );

    let aborted = ctx.reconcile(true).unwrap_err();
    assert!(matches!(aborted.source, ReconcileError::ConfigMismatch(_)));
}

#[test]
fn component_mismatch_tolerated_under_truncate_policy() {
    let dir = tempdir().unwrap();
    let records = vec![
        CatalogRecord::new("2023/06/01/abc.bin", 1),
        CatalogRecord::new("2023/04/01/abc.bin", 1),
    ];
    let cfg = config(dir.path(), "2023/05/01/0").with_mismatch_policy(MismatchPolicy::Truncate);
    let ctx = RunContext::new(records, cfg, FsContentStore::new(dir.path()));

    let report = ctx.reconcile(true).unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(report.skipped_count, 1);
}

#[test]
fn store_failure_aborts_and_stops_further_materialization() {
    let dir = tempdir().unwrap();
    let records = vec![
        CatalogRecord::new("2023/06/01/0/a.bin", 1),
        CatalogRecord::new("2023/06/01/0/b.bin", 1),
        CatalogRecord::new("2023/06/01/0/c.bin", 1),
    ];
    let store = ScriptedStore::new(dir.path(), Some("2023/06/01/0/b.bin"));
    let ctx = RunContext::new(records, config(dir.path(), "2023/05/01/0"), store);

    let aborted = ctx.reconcile(true).unwrap_err();
    assert_eq!(aborted.record_index, 1);
    assert!(matches!(aborted.source, ReconcileError::Io(_)));
    assert_eq!(aborted.report.created_count, 1);
    assert_eq!(
        *ctx.store().materialized.lock(),
        vec!["2023/06/01/0/a.bin".to_string(), "2023/06/01/0/b.bin".to_string()]
    );
}

#[test]
fn report_only_lists_missing_without_writing() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "2023/06/01/0/present.bin");
    let records = vec![
        CatalogRecord::new("2023/06/01/0/present.bin", 1),
        CatalogRecord::new("2023/06/02/0/absent.bin", 1),
        CatalogRecord::new("2023/04/02/0/old.bin", 1),
    ];
    let store = ScriptedStore::new(dir.path(), None);
    let ctx = RunContext::new(records, config(dir.path(), "2023/05/01/0"), store);

    let report = ctx.reconcile(false).unwrap();
    assert_eq!(report.existing_count, 1);
    assert_eq!(report.created_count, 0);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(
        report.missing,
        vec![MissingRecord {
            record_index: 1,
            path: "2023/06/02/0/absent.bin".to_string(),
        }]
    );
    assert!(ctx.store().materialized.lock().is_empty());
    assert!(!dir.path().join("2023/06/02").exists());
}

#[test]
fn second_apply_run_sees_placeholders_as_existing() {
    let dir = tempdir().unwrap();
    let records = vec![CatalogRecord::new("2023/05/01/0/abc.bin", 1)];
    let store = ScriptedStore::new(dir.path(), None);
    let ctx = RunContext::new(records, config(dir.path(), "2023/05/01/0"), store);

    let first = ctx.reconcile(true).unwrap();
    let second = ctx.reconcile(true).unwrap();
    assert_eq!(first.created_count, 1);
    assert_eq!(second.created_count, 0);
    assert_eq!(second.existing_count, 1);
    assert_eq!(ctx.store().materialized.lock().len(), 1);
}

#[test]
fn parallel_run_matches_sequential_counts() {
    let seq_dir = tempdir().unwrap();
    let par_dir = tempdir().unwrap();
    let records: Vec<CatalogRecord> = (0..64)
        .map(|i| {
            let month = 3 + (i % 6);
            CatalogRecord::new(format!("2023/{month}/{}/{}/f{i}.bin", 1 + i % 28, i % 3), 8)
        })
        .collect();
    touch(seq_dir.path(), &records[40].path);
    touch(par_dir.path(), &records[40].path);

    let seq = RunContext::new(
        records.clone(),
        config(seq_dir.path(), "2023/05/01/1"),
        FsContentStore::new(seq_dir.path()),
    )
    .reconcile(true)
    .unwrap();
    let par = RunContext::new(
        records,
        config(par_dir.path(), "2023/05/01/1"),
        FsContentStore::new(par_dir.path()),
    )
    .reconcile_parallel(true, 4)
    .unwrap();

    assert_eq!(seq, par);
}

fn lowest_failure_records() -> Vec<CatalogRecord> {
    let mut records: Vec<CatalogRecord> = (0..12)
        .map(|i| CatalogRecord::new(format!("2023/06/01/0/f{i}.bin"), 1))
        .collect();
    records[1] = CatalogRecord::new("bad/path/x.bin", 1);
    records[9] = CatalogRecord::new("also/bad/x.bin", 1);
    records
}

#[test]
fn parallel_run_reports_lowest_failing_record() {
    let dir = tempdir().unwrap();
    // Record 0 is still being checked while the workers reach both bad records.
    let store = ScriptedStore::new(dir.path(), None)
        .with_slow_exists("2023/06/01/0/f0.bin", Duration::from_millis(300));
    let ctx = RunContext::new(
        lowest_failure_records(),
        config(dir.path(), "2023/05/01/0"),
        store,
    );

    let aborted = ctx.reconcile_parallel(false, 2).unwrap_err();
    assert_eq!(aborted.record_index, 1);
    assert_eq!(aborted.path, "bad/path/x.bin");
    assert!(matches!(aborted.source, ReconcileError::Decode(_)));

    let sequential = ctx.reconcile(false).unwrap_err();
    assert_eq!(sequential.record_index, 1);
    assert_eq!(aborted.report, sequential.report);
    assert_eq!(aborted.report.processed(), 1);
    assert_eq!(aborted.report.missing[0].record_index, 0);
}

#[test]
fn parallel_abort_counts_only_records_before_the_failure() {
    let dir = tempdir().unwrap();
    let ctx = RunContext::new(
        lowest_failure_records(),
        config(dir.path(), "2023/05/01/0"),
        ScriptedStore::new(dir.path(), None),
    );

    let aborted = ctx.reconcile_parallel(false, 4).unwrap_err();
    assert_eq!(aborted.record_index, 1);
    assert!(aborted.report.missing.iter().all(|m| m.record_index < 1));
    assert_eq!(aborted.report.processed(), 1);
}

#[test]
fn parallel_run_materializes_shared_path_once() {
    let seq_dir = tempdir().unwrap();
    let par_dir = tempdir().unwrap();
    let records: Vec<CatalogRecord> = (0..8)
        .map(|_| CatalogRecord::new("2023/06/01/0/dup.bin", 4))
        .collect();

    let seq = RunContext::new(
        records.clone(),
        config(seq_dir.path(), "2023/05/01/0"),
        ScriptedStore::new(seq_dir.path(), None),
    );
    let par = RunContext::new(
        records,
        config(par_dir.path(), "2023/05/01/0"),
        ScriptedStore::new(par_dir.path(), None),
    );

    let seq_report = seq.reconcile(true).unwrap();
    let par_report = par.reconcile_parallel(true, 4).unwrap();
    assert_eq!((seq_report.created_count, seq_report.existing_count), (1, 7));
    assert_eq!(par_report, seq_report);
    assert_eq!(par.store().materialized.lock().len(), 1);
}

#[test]
fn stat_failure_aborts_before_any_write() {
    let dir = tempdir().unwrap();
    // `2023/06/01` is a regular file, so a stat below it fails with ENOTDIR.
    touch(dir.path(), "2023/06/01");
    let records = vec![
        CatalogRecord::new("2023/06/02/0/a.bin", 1),
        CatalogRecord::new("2023/06/01/0/abc.bin", 1),
        CatalogRecord::new("2023/06/03/0/c.bin", 1),
    ];
    let store = ScriptedStore::new(dir.path(), None);
    let ctx = RunContext::new(records, config(dir.path(), "2023/05/01/0"), store);

    let aborted = ctx.reconcile(true).unwrap_err();
    assert_eq!(aborted.record_index, 1);
    assert!(matches!(
        aborted.source,
        ReconcileError::Io(ref err) if err.op == StoreOp::Probe
    ));
    assert_eq!(aborted.report.created_count, 1);
    assert_eq!(
        *ctx.store().materialized.lock(),
        vec!["2023/06/02/0/a.bin".to_string()]
    );
    assert!(!dir.path().join("2023/06/03").exists());
}

#[test]
fn from_catalog_fetches_everything_up_front() {
    let dir = tempdir().unwrap();
    let catalog = vec![
        CatalogRecord::new("2023/06/01/0/a.bin", 1),
        CatalogRecord::new("2023/06/01/0/b.bin", 1),
    ];
    let ctx = RunContext::from_catalog(
        &catalog,
        config(dir.path(), "2023/05/01/0"),
        FsContentStore::new(dir.path()),
    )
    .unwrap();
    assert_eq!(ctx.records().len(), 2);
}

#[test]
fn tally_counts_created_as_missing_too() {
    let mut report = ReconciliationReport::default();
    report.tally(0, "a", RecordOutcome::Exists);
    report.tally(1, "b", RecordOutcome::CreatedPlaceholder);
    report.tally(2, "c", RecordOutcome::SkippedBeforeCutoff);
    assert_eq!(report.processed(), 3);
    assert_eq!(report.missing.len(), 1);
}
