//! Storefill date-path reconciliation engine
//!
//! Reconciles a date-bucketed content store against a catalog of expected
//! artifacts:
//!
//! ```text
//! catalog records ──► date_path::decode_path ──► cutoff::classify_with
//!                                                      │
//!                         ┌────────────────────────────┘
//!                         ▼
//!                  store::ContentStore::exists ──► store::ContentStore::materialize
//!                         │
//!                         ▼
//!              reconcile::ReconciliationReport
//! ```
//!
//! Paths such as `2023/05/01/7/abc.bin` carry their creation date in the
//! directory segments. Only records dated on/after the configured cutoff are
//! eligible for a zero-filled placeholder.

pub mod catalog;
pub mod config;
pub mod cutoff;
pub mod date_path;
pub mod error;
pub mod reconcile;
pub mod store;

pub use catalog::{CatalogReader, CatalogRecord};
pub use config::{normalize_store_root, PlaceholderSize, ReconcileConfig};
pub use cutoff::{classify, classify_with, Classification, MismatchPolicy};
pub use date_path::{decode_path, parse_cutoff, DatePath};
pub use error::{
    CatalogFetchError, ComponentMismatch, ConfigError, DecodeError, ReconcileError, RunAborted,
    StoreError, StoreOp,
};
pub use reconcile::{MissingRecord, ReconciliationReport, RecordOutcome, RunContext};
pub use store::{ContentStore, FsContentStore};
