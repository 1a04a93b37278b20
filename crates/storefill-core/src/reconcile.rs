//! Reconciliation driver.
//!
//! Walks the catalog in order and, per record:
//!
//! ```text
//! decode ──► classify ──► Before ─────────────────────► SkippedBeforeCutoff
//!   │           │
//!   │           └──► OnOrAfter ──► exists? ── yes ──► Exists
//!   │                                 │
//!   │                                 └─ no ── apply ──► materialize ──► CreatedPlaceholder
//!   │                                    └──── report-only ───────────► Missing
//!   └──► error (decode / mismatch / store) ──► run aborted
//! ```
//!
//! The first fatal error stops the run; the caller gets the counts accumulated
//! up to that point in [`RunAborted`].

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::catalog::{CatalogReader, CatalogRecord};
use crate::config::ReconcileConfig;
use crate::cutoff::{classify_with, Classification};
use crate::date_path::{decode_path, DatePath};
use crate::error::{CatalogFetchError, ReconcileError, RunAborted};
use crate::store::ContentStore;

/// Terminal state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Exists,
    CreatedPlaceholder,
    SkippedBeforeCutoff,
    /// Missing and eligible, left alone because the run is report-only.
    Missing,
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RecordOutcome::Exists => "exists",
            RecordOutcome::CreatedPlaceholder => "created_placeholder",
            RecordOutcome::SkippedBeforeCutoff => "skipped_before_cutoff",
            RecordOutcome::Missing => "missing",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRecord {
    pub record_index: usize,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub existing_count: usize,
    pub created_count: usize,
    pub skipped_count: usize,
    /// Missing, date-eligible records in catalog order. In apply mode these
    /// are the records that received a placeholder.
    pub missing: Vec<MissingRecord>,
}

impl ReconciliationReport {
    pub fn tally(&mut self, record_index: usize, path: &str, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Exists => self.existing_count += 1,
            RecordOutcome::SkippedBeforeCutoff => self.skipped_count += 1,
            RecordOutcome::CreatedPlaceholder => {
                self.created_count += 1;
                self.push_missing(record_index, path);
            }
            RecordOutcome::Missing => self.push_missing(record_index, path),
        }
    }

    pub fn processed(&self) -> usize {
        self.existing_count + self.skipped_count + self.missing.len()
    }

    fn push_missing(&mut self, record_index: usize, path: &str) {
        self.missing.push(MissingRecord {
            record_index,
            path: path.to_string(),
        });
    }
}

/// Where a record stands once everything short of materialization is known.
/// In a report-only run a missing record settles as [`RecordOutcome::Missing`].
enum Verdict {
    Settled(RecordOutcome),
    NeedsPlaceholder,
}

/// Everything a single run needs, passed explicitly.
pub struct RunContext<S> {
    records: Vec<CatalogRecord>,
    config: ReconcileConfig,
    store: S,
}

impl<S: ContentStore> RunContext<S> {
    pub fn new(records: Vec<CatalogRecord>, config: ReconcileConfig, store: S) -> Self {
        Self {
            records,
            config,
            store,
        }
    }

    /// Fetch the complete record list up front, then build the context.
    pub fn from_catalog<C: CatalogReader + ?Sized>(
        catalog: &C,
        config: ReconcileConfig,
        store: S,
    ) -> Result<Self, CatalogFetchError> {
        let records = catalog.fetch_all()?;
        tracing::info!(records = records.len(), "catalog loaded");
        Ok(Self::new(records, config, store))
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decode a catalog path and classify it against the configured cutoff.
    pub fn classify_path(&self, path: &str) -> Result<(DatePath, Classification), ReconcileError> {
        let decoded = decode_path(path)?;
        let class = classify_with(&decoded, &self.config.cutoff, self.config.mismatch_policy)?;
        tracing::debug!(path, decoded = %decoded, cutoff = %self.config.cutoff, ?class, "classified");
        Ok((decoded, class))
    }

    /// Run every record in catalog order. `apply = false` only reports what is
    /// missing; nothing is written.
    pub fn reconcile(&self, apply: bool) -> Result<ReconciliationReport, RunAborted> {
        tracing::info!(records = self.records.len(), apply, "reconciliation started");
        let mut report = ReconciliationReport::default();

        for (index, record) in self.records.iter().enumerate() {
            match self.reconcile_record(index, record, apply) {
                Ok(outcome) => report.tally(index, &record.path, outcome),
                Err(source) => return Err(self.abort(index, record, report, source)),
            }
        }

        log_summary(&report);
        Ok(report)
    }

    /// Like [`reconcile`](Self::reconcile) but spreads records over `jobs`
    /// worker threads.
    ///
    /// Records sharing a path form one group and are handled in catalog order
    /// by a single worker, so counts match a sequential run. Once any record
    /// has failed no new placeholder is started, and records after the lowest
    /// failing index are not processed. The partial report only covers
    /// completed records before that index.
    pub fn reconcile_parallel(
        &self,
        apply: bool,
        jobs: usize,
    ) -> Result<ReconciliationReport, RunAborted> {
        if jobs <= 1 {
            return self.reconcile(apply);
        }
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(error = %err, "worker pool unavailable; running sequentially");
                return self.reconcile(apply);
            }
        };
        let groups = group_by_path(&self.records);
        tracing::info!(
            records = self.records.len(),
            groups = groups.len(),
            apply,
            jobs,
            "reconciliation started"
        );

        let halt = Halt::default();
        let mut settled: Vec<(usize, RecordOutcome)> = pool.install(|| {
            groups
                .par_iter()
                .flat_map_iter(|group| self.reconcile_group(group, apply, &halt))
                .collect()
        });
        settled.sort_unstable_by_key(|(index, _)| *index);

        let failure = halt.failure.into_inner();
        let limit = failure.as_ref().map_or(usize::MAX, |(index, _)| *index);
        let mut report = ReconciliationReport::default();
        for (index, outcome) in settled.into_iter().filter(|(index, _)| *index < limit) {
            report.tally(index, &self.records[index].path, outcome);
        }

        match failure {
            Some((index, source)) => Err(self.abort(index, &self.records[index], report, source)),
            None => {
                log_summary(&report);
                Ok(report)
            }
        }
    }

    /// Work through one group of record indices in order, stopping at the
    /// first failure or once an earlier record elsewhere has failed.
    fn reconcile_group(
        &self,
        group: &[usize],
        apply: bool,
        halt: &Halt,
    ) -> Vec<(usize, RecordOutcome)> {
        let mut settled = Vec::with_capacity(group.len());
        for &index in group {
            if index > halt.lowest.load(Ordering::SeqCst) {
                break;
            }
            let record = &self.records[index];
            let result = match self.evaluate(index, record, apply) {
                Ok(Verdict::Settled(outcome)) => Ok(outcome),
                Ok(Verdict::NeedsPlaceholder) => {
                    if halt.raised() {
                        break;
                    }
                    self.place(index, record)
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(outcome) => settled.push((index, outcome)),
                Err(err) => {
                    halt.raise(index, err);
                    break;
                }
            }
        }
        settled
    }

    /// Drive one record to its terminal state.
    pub fn reconcile_record(
        &self,
        index: usize,
        record: &CatalogRecord,
        apply: bool,
    ) -> Result<RecordOutcome, ReconcileError> {
        match self.evaluate(index, record, apply)? {
            Verdict::Settled(outcome) => Ok(outcome),
            Verdict::NeedsPlaceholder => self.place(index, record),
        }
    }

    fn evaluate(
        &self,
        index: usize,
        record: &CatalogRecord,
        apply: bool,
    ) -> Result<Verdict, ReconcileError> {
        let (_, class) = self.classify_path(&record.path)?;
        if class == Classification::Before {
            tracing::info!(
                record_index = index,
                path = %record.path,
                outcome = %RecordOutcome::SkippedBeforeCutoff,
                "record before cutoff"
            );
            return Ok(Verdict::Settled(RecordOutcome::SkippedBeforeCutoff));
        }

        if self.store.exists(&record.path)? {
            tracing::info!(
                record_index = index,
                path = %record.path,
                outcome = %RecordOutcome::Exists,
                "record exists"
            );
            return Ok(Verdict::Settled(RecordOutcome::Exists));
        }

        if !apply {
            tracing::warn!(
                record_index = index,
                path = %record.path,
                outcome = %RecordOutcome::Missing,
                expected_size = record.expected_size,
                "record missing from store"
            );
            return Ok(Verdict::Settled(RecordOutcome::Missing));
        }
        tracing::warn!(
            record_index = index,
            path = %record.path,
            expected_size = record.expected_size,
            "record missing from store; creating placeholder"
        );
        Ok(Verdict::NeedsPlaceholder)
    }

    fn place(&self, index: usize, record: &CatalogRecord) -> Result<RecordOutcome, ReconcileError> {
        let size = self.config.placeholder_size.for_record(record.expected_size);
        let written = self.store.materialize(&record.path, size)?;
        tracing::info!(
            record_index = index,
            path = %record.path,
            outcome = %RecordOutcome::CreatedPlaceholder,
            size,
            file = %written.display(),
            "placeholder created"
        );
        Ok(RecordOutcome::CreatedPlaceholder)
    }

    fn abort(
        &self,
        index: usize,
        record: &CatalogRecord,
        report: ReconciliationReport,
        source: ReconcileError,
    ) -> RunAborted {
        tracing::error!(
            record_index = index,
            path = %record.path,
            error = %source,
            existing = report.existing_count,
            created = report.created_count,
            skipped = report.skipped_count,
            "reconciliation aborted"
        );
        RunAborted {
            record_index: index,
            path: record.path.clone(),
            report,
            source,
        }
    }
}

/// Shared abort state of a parallel run.
struct Halt {
    /// Lowest failing record index seen so far, `usize::MAX` while clean.
    lowest: AtomicUsize,
    failure: Mutex<Option<(usize, ReconcileError)>>,
}

impl Default for Halt {
    fn default() -> Self {
        Self {
            lowest: AtomicUsize::new(usize::MAX),
            failure: Mutex::new(None),
        }
    }
}

impl Halt {
    fn raised(&self) -> bool {
        self.lowest.load(Ordering::SeqCst) != usize::MAX
    }

    fn raise(&self, index: usize, err: ReconcileError) {
        self.lowest.fetch_min(index, Ordering::SeqCst);
        let mut slot = self.failure.lock();
        if slot.as_ref().map_or(true, |(first, _)| index < *first) {
            *slot = Some((index, err));
        }
    }
}

/// Record indices grouped by path, each group in catalog order. Paths that
/// decode never contain empty segments, so equal files have equal paths.
fn group_by_path(records: &[CatalogRecord]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let slot = *slots.entry(record.path.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(index);
    }
    groups
}

fn log_summary(report: &ReconciliationReport) {
    tracing::info!(
        existing = report.existing_count,
        created = report.created_count,
        skipped = report.skipped_count,
        missing = report.missing.len(),
        "reconciliation finished"
    );
}

#[cfg(test)]
mod tests;
