//! Error taxonomy for a reconciliation run.
//!
//! Every kind is fatal to the run; the driver wraps the first one it sees in
//! [`RunAborted`] together with the counts accumulated so far.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::reconcile::ReconciliationReport;

/// A catalog path (or the configured cutoff) does not encode a usable date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("non-numeric date segment `{segment}` in `{path}`")]
    NonNumericSegment { path: String, segment: String },

    #[error("`{path}` encodes {count} date components (expected 3 or 4)")]
    ComponentCount { path: String, count: usize },

    #[error("`{path}` does not encode a calendar date ({year}/{month}/{day})")]
    InvalidCalendarDate {
        path: String,
        year: u64,
        month: u64,
        day: u64,
    },

    #[error("`{path}` has no filename segment")]
    MissingFilename { path: String },
}

/// Record and cutoff were encoded with a different number of date components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "date component count mismatch: record has {record_components}, cutoff has {cutoff_components}"
)]
pub struct ComponentMismatch {
    pub record_components: usize,
    pub cutoff_components: usize,
}

/// Filesystem operation that failed against the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Probe,
    CreateDir,
    CreateFile,
    Extend,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StoreOp::Probe => "probe",
            StoreOp::CreateDir => "create directory",
            StoreOp::CreateFile => "create file",
            StoreOp::Extend => "extend file",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
#[error("failed to {op} {}: {source}", .path.display())]
pub struct StoreError {
    pub op: StoreOp,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StoreError {
    pub fn new(op: StoreOp, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

/// The catalog could not be fetched; raised before any record is processed.
#[derive(Debug, Error)]
pub enum CatalogFetchError {
    #[error("failed to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed catalog entry at {location}: {message}")]
    Malformed { location: String, message: String },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    ConfigMismatch(#[from] ComponentMismatch),

    #[error(transparent)]
    Io(#[from] StoreError),
}

/// A run stopped on its first fatal error.
#[derive(Debug, Error)]
#[error("reconciliation aborted at record {record_index} (`{path}`): {source}")]
pub struct RunAborted {
    pub record_index: usize,
    pub path: String,
    /// Counts accumulated before the failing record.
    pub report: ReconciliationReport,
    #[source]
    pub source: ReconcileError,
}

/// Invalid resolved configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("store root must not be empty")]
    EmptyStoreRoot,

    #[error("invalid cutoff date: {0}")]
    Cutoff(#[from] DecodeError),
}
