//! Date-bucketed path codec.
//!
//! Catalog paths look like `2023/05/01/7/1a2b-3c4d.bin`: every segment but the
//! last is a numeric date component (year, month, day and an optional
//! disambiguator), the last one is an opaque filename.
//!
//! Decoding is positional and strict. Components must be plain ASCII digits
//! (no sign, no whitespace) and the first three must form a real calendar date.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

use crate::error::DecodeError;

/// A decoded date: calendar date plus the optional 4th-segment disambiguator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DatePath {
    pub date: NaiveDate,
    pub disambiguator: Option<u64>,
}

impl DatePath {
    pub fn new(date: NaiveDate, disambiguator: Option<u64>) -> Self {
        Self {
            date,
            disambiguator,
        }
    }

    /// Number of path segments this date was encoded with (3 or 4).
    pub fn component_count(&self) -> usize {
        if self.disambiguator.is_some() {
            4
        } else {
            3
        }
    }

    /// The raw integer components in path order.
    pub fn components(&self) -> Vec<u64> {
        let mut out = vec![
            self.date.year() as u64,
            u64::from(self.date.month()),
            u64::from(self.date.day()),
        ];
        out.extend(self.disambiguator);
        out
    }
}

impl fmt::Display for DatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.date.year(),
            self.date.month(),
            self.date.day()
        )?;
        if let Some(d) = self.disambiguator {
            write!(f, "/{d}")?;
        }
        Ok(())
    }
}

/// Decode the date encoded in the directory segments of a catalog path.
///
/// The last segment is the filename and is not part of the date.
pub fn decode_path(path: &str) -> Result<DatePath, DecodeError> {
    let segments: Vec<&str> = path.split('/').collect();
    let (filename, dirs) = match segments.split_last() {
        Some(parts) => parts,
        None => {
            return Err(DecodeError::MissingFilename {
                path: path.to_string(),
            })
        }
    };
    if filename.is_empty() || *filename == "." || *filename == ".." {
        return Err(DecodeError::MissingFilename {
            path: path.to_string(),
        });
    }
    decode_components(path, dirs)
}

/// Parse a cutoff such as `2023/05/01/0`. Every segment is a date component;
/// a single trailing `/` is tolerated.
pub fn parse_cutoff(text: &str) -> Result<DatePath, DecodeError> {
    let trimmed = text.trim();
    let body = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let segments: Vec<&str> = body.split('/').collect();
    decode_components(text, &segments)
}

fn decode_components(path: &str, segments: &[&str]) -> Result<DatePath, DecodeError> {
    let mut components = Vec::with_capacity(segments.len());
    for segment in segments {
        components.push(parse_component(path, segment)?);
    }

    if components.len() != 3 && components.len() != 4 {
        return Err(DecodeError::ComponentCount {
            path: path.to_string(),
            count: components.len(),
        });
    }

    let (year, month, day) = (components[0], components[1], components[2]);
    let date = calendar_date(year, month, day).ok_or_else(|| DecodeError::InvalidCalendarDate {
        path: path.to_string(),
        year,
        month,
        day,
    })?;

    Ok(DatePath {
        date,
        disambiguator: components.get(3).copied(),
    })
}

fn parse_component(path: &str, segment: &str) -> Result<u64, DecodeError> {
    let non_numeric = || DecodeError::NonNumericSegment {
        path: path.to_string(),
        segment: segment.to_string(),
    };
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(non_numeric());
    }
    // All-digit strings only fail on overflow.
    segment.parse::<u64>().map_err(|_| non_numeric())
}

fn calendar_date(year: u64, month: u64, day: u64) -> Option<NaiveDate> {
    let year = i32::try_from(year).ok()?;
    let month = u32::try_from(month).ok()?;
    let day = u32::try_from(day).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
