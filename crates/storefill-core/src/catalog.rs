//! Catalog records and the reader interface the driver consumes.

use serde::{Deserialize, Serialize};

use crate::error::CatalogFetchError;

/// One artifact the catalog expects to find in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Store-relative, `/`-delimited, date-bucketed path.
    pub path: String,
    pub expected_size: i64,
}

impl CatalogRecord {
    pub fn new(path: impl Into<String>, expected_size: i64) -> Self {
        Self {
            path: path.into(),
            expected_size,
        }
    }
}

/// Source of the full record list for a run.
///
/// Records are fetched completely before reconciliation starts; a failure
/// here aborts the run before any record is touched.
pub trait CatalogReader {
    fn fetch_all(&self) -> Result<Vec<CatalogRecord>, CatalogFetchError>;
}

/// An already-materialized record list.
impl CatalogReader for Vec<CatalogRecord> {
    fn fetch_all(&self) -> Result<Vec<CatalogRecord>, CatalogFetchError> {
        Ok(self.clone())
    }
}
