//! Resolved, validated run configuration.

use serde::Serialize;
use std::path::{PathBuf, MAIN_SEPARATOR};

use crate::cutoff::MismatchPolicy;
use crate::date_path::{parse_cutoff, DatePath};
use crate::error::ConfigError;

/// How large a materialized placeholder should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderSize {
    /// Use the record's expected size from the catalog.
    #[default]
    Expected,
    Fixed(u64),
}

impl PlaceholderSize {
    pub fn for_record(&self, expected_size: i64) -> u64 {
        match self {
            PlaceholderSize::Fixed(size) => *size,
            PlaceholderSize::Expected => u64::try_from(expected_size).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileConfig {
    /// Always ends with a path separator.
    pub store_root: PathBuf,
    pub cutoff: DatePath,
    pub placeholder_size: PlaceholderSize,
    pub mismatch_policy: MismatchPolicy,
}

impl ReconcileConfig {
    /// Validate raw values into a config; the cutoff uses the catalog path
    /// format without a filename (e.g. `2023/05/01/0`).
    pub fn new(store_root: &str, cutoff: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            store_root: normalize_store_root(store_root)?,
            cutoff: parse_cutoff(cutoff)?,
            placeholder_size: PlaceholderSize::default(),
            mismatch_policy: MismatchPolicy::default(),
        })
    }

    pub fn with_placeholder_size(mut self, size: PlaceholderSize) -> Self {
        self.placeholder_size = size;
        self
    }

    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }
}

/// Trim and make sure the root ends with a separator.
pub fn normalize_store_root(raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyStoreRoot);
    }
    if trimmed.ends_with('/') || trimmed.ends_with(MAIN_SEPARATOR) {
        Ok(PathBuf::from(trimmed))
    } else {
        Ok(PathBuf::from(format!("{trimmed}{MAIN_SEPARATOR}")))
    }
}
