//! Catalog exports for Storefill
//!
//! Reads dumps of the content-url table (`content_url`, `content_size`) and
//! turns them into [`CatalogRecord`]s:
//! - JSON array: `[{"content_url": "store://2023/5/1/0/abc.bin", "content_size": 12}, ...]`
//! - JSON Lines: one such object per line (blank lines ignored)
//!
//! The `store://` scheme is stripped so the remaining path is relative to the
//! content store root.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use storefill_core::{CatalogFetchError, CatalogReader, CatalogRecord};

pub const STORE_SCHEME: &str = "store://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    Json,
    #[serde(alias = "ndjson")]
    Jsonl,
}

impl CatalogFormat {
    /// `.jsonl` / `.ndjson` are JSON Lines; anything else is a JSON array.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                Self::Jsonl
            }
            _ => Self::Json,
        }
    }
}

/// One exported row of the content-url table.
#[derive(Debug, Clone, Deserialize)]
struct ContentUrlRow {
    #[serde(alias = "contentUrl", alias = "ContentURL")]
    content_url: String,
    #[serde(alias = "contentSize", alias = "ContentSize")]
    content_size: i64,
}

/// A catalog export on disk.
#[derive(Debug, Clone)]
pub struct ExportCatalog {
    path: PathBuf,
    format: CatalogFormat,
}

impl ExportCatalog {
    pub fn new(path: impl Into<PathBuf>, format: Option<CatalogFormat>) -> Self {
        let path = path.into();
        let format = format.unwrap_or_else(|| CatalogFormat::from_path(&path));
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> CatalogFormat {
        self.format
    }
}

impl CatalogReader for ExportCatalog {
    fn fetch_all(&self) -> Result<Vec<CatalogRecord>, CatalogFetchError> {
        let text = fs::read_to_string(&self.path).map_err(|source| CatalogFetchError::Io {
            path: self.path.clone(),
            source,
        })?;
        let records = match self.format {
            CatalogFormat::Json => parse_json_export(&text)?,
            CatalogFormat::Jsonl => parse_jsonl_export(&text)?,
        };
        tracing::debug!(
            catalog = %self.path.display(),
            format = ?self.format,
            records = records.len(),
            "catalog export parsed"
        );
        Ok(records)
    }
}

pub fn parse_json_export(text: &str) -> Result<Vec<CatalogRecord>, CatalogFetchError> {
    let rows: Vec<ContentUrlRow> =
        serde_json::from_str(text).map_err(|err| CatalogFetchError::Malformed {
            location: format!("line {} column {}", err.line(), err.column()),
            message: err.to_string(),
        })?;
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| to_record(row, || format!("entry {}", i + 1)))
        .collect()
}

pub fn parse_jsonl_export(text: &str) -> Result<Vec<CatalogRecord>, CatalogFetchError> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let location = || format!("line {}", i + 1);
        let row: ContentUrlRow =
            serde_json::from_str(line).map_err(|err| CatalogFetchError::Malformed {
                location: location(),
                message: err.to_string(),
            })?;
        out.push(to_record(row, location)?);
    }
    Ok(out)
}

/// Strip `store://`; other schemes cannot be mapped onto the store.
pub fn strip_store_scheme(url: &str) -> Result<&str, String> {
    if let Some(rest) = url.strip_prefix(STORE_SCHEME) {
        return Ok(rest);
    }
    match url.find("://") {
        Some(idx) => Err(format!("unsupported content url scheme `{}`", &url[..idx])),
        None => Ok(url),
    }
}

fn to_record(
    row: ContentUrlRow,
    location: impl Fn() -> String,
) -> Result<CatalogRecord, CatalogFetchError> {
    let path = strip_store_scheme(&row.content_url).map_err(|message| {
        CatalogFetchError::Malformed {
            location: location(),
            message,
        }
    })?;
    if row.content_size < 0 {
        return Err(CatalogFetchError::Malformed {
            location: location(),
            message: format!("negative content size {}", row.content_size),
        });
    }
    Ok(CatalogRecord::new(path, row.content_size))
}
