//! Cutoff comparison for decoded date paths.

use serde::{Deserialize, Serialize};

use crate::date_path::DatePath;
use crate::error::ComponentMismatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Before,
    OnOrAfter,
}

/// What to do when a record and the cutoff carry a different number of
/// date components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Abort the run.
    #[default]
    Fatal,
    /// Compare only the components both sides carry.
    Truncate,
}

impl MismatchPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" => Some(Self::Fatal),
            "truncate" => Some(Self::Truncate),
            _ => None,
        }
    }
}

/// Classify `decoded` against `cutoff` under the fatal mismatch policy.
pub fn classify(decoded: &DatePath, cutoff: &DatePath) -> Result<Classification, ComponentMismatch> {
    classify_with(decoded, cutoff, MismatchPolicy::Fatal)
}

/// Calendar dates decide first; on the same day the disambiguators break the
/// tie (`decoded < cutoff` is `Before`, equal is `OnOrAfter`).
pub fn classify_with(
    decoded: &DatePath,
    cutoff: &DatePath,
    policy: MismatchPolicy,
) -> Result<Classification, ComponentMismatch> {
    if policy == MismatchPolicy::Fatal && decoded.component_count() != cutoff.component_count() {
        return Err(ComponentMismatch {
            record_components: decoded.component_count(),
            cutoff_components: cutoff.component_count(),
        });
    }

    if decoded.date < cutoff.date {
        return Ok(Classification::Before);
    }
    if decoded.date > cutoff.date {
        return Ok(Classification::OnOrAfter);
    }

    match (decoded.disambiguator, cutoff.disambiguator) {
        (Some(d), Some(c)) if d < c => Ok(Classification::Before),
        _ => Ok(Classification::OnOrAfter),
    }
}
