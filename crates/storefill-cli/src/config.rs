//! `config.json` loading.
//!
//! The file keeps the keys of the legacy tool (`contentstorePath`,
//! `generateFromThisDate`); its database keys (`host`, `port`, ...) are
//! accepted and ignored. Command-line flags override file values.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use storefill_catalog::{CatalogFormat, ExportCatalog};
use storefill_core::{MismatchPolicy, PlaceholderSize, ReconcileConfig};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file.
    #[arg(long, default_value = "config.json", global = true)]
    pub config: PathBuf,

    /// Content store root (overrides `contentstorePath`).
    #[arg(long, global = true)]
    pub store_root: Option<String>,

    /// Cutoff date such as `2023/05/01/0` (overrides `generateFromThisDate`).
    #[arg(long, global = true)]
    pub cutoff: Option<String>,

    /// Catalog export, `.json` or `.jsonl` (overrides `catalog.path`).
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Placeholder size in bytes (overrides `placeholderSize`; default: catalog size).
    #[arg(long, global = true)]
    pub placeholder_size: Option<u64>,

    /// Component-count mismatch policy: fatal|truncate (overrides `onComponentMismatch`).
    #[arg(long, global = true)]
    pub on_mismatch: Option<String>,

    /// Worker threads; 1 processes records sequentially in catalog order.
    #[arg(long, default_value_t = 1, global = true)]
    pub jobs: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub contentstore_path: Option<String>,
    #[serde(default)]
    pub generate_from_this_date: Option<String>,
    #[serde(default)]
    pub catalog: Option<CatalogSection>,
    #[serde(default)]
    pub placeholder_size: Option<u64>,
    #[serde(default)]
    pub on_component_mismatch: Option<MismatchPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    pub path: PathBuf,
    #[serde(default)]
    pub format: Option<CatalogFormat>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Everything a command needs, validated.
#[derive(Debug)]
pub struct Settings {
    pub reconcile: ReconcileConfig,
    pub catalog: Option<ExportCatalog>,
}

impl Settings {
    pub fn require_catalog(&self) -> Result<&ExportCatalog> {
        self.catalog
            .as_ref()
            .ok_or_else(|| anyhow!("no catalog configured (set `catalog.path` or pass --catalog)"))
    }
}

/// Load the config file (optional when flags provide store root and cutoff)
/// and apply overrides.
pub fn resolve(args: &RunArgs) -> Result<Settings> {
    let flags_suffice = args.store_root.is_some() && args.cutoff.is_some();
    let file = if args.config.exists() || !flags_suffice {
        ConfigFile::load(&args.config)?
    } else {
        ConfigFile::default()
    };
    let base_dir = args
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    merge(file, args, &base_dir)
}

/// Relative catalog paths in the file resolve against the config's directory;
/// `--catalog` resolves against the working directory.
pub fn merge(file: ConfigFile, args: &RunArgs, base_dir: &Path) -> Result<Settings> {
    let store_root = args
        .store_root
        .clone()
        .or(file.contentstore_path)
        .ok_or_else(|| anyhow!("missing `contentstorePath` (or --store-root)"))?;
    let cutoff = args
        .cutoff
        .clone()
        .or(file.generate_from_this_date)
        .ok_or_else(|| anyhow!("missing `generateFromThisDate` (or --cutoff)"))?;

    let mismatch_policy = match &args.on_mismatch {
        Some(raw) => MismatchPolicy::parse(raw)
            .ok_or_else(|| anyhow!("unknown --on-mismatch `{raw}` (expected fatal|truncate)"))?,
        None => file.on_component_mismatch.unwrap_or_default(),
    };
    let placeholder_size = match args.placeholder_size.or(file.placeholder_size) {
        Some(bytes) => PlaceholderSize::Fixed(bytes),
        None => PlaceholderSize::Expected,
    };

    let reconcile = ReconcileConfig::new(&store_root, &cutoff)?
        .with_placeholder_size(placeholder_size)
        .with_mismatch_policy(mismatch_policy);

    let catalog = match (&args.catalog, file.catalog) {
        (Some(path), section) => Some(ExportCatalog::new(
            path.clone(),
            section.and_then(|s| s.format),
        )),
        (None, Some(section)) => {
            let path = if section.path.is_absolute() {
                section.path
            } else {
                base_dir.join(section.path)
            };
            Some(ExportCatalog::new(path, section.format))
        }
        (None, None) => None,
    };

    Ok(Settings { reconcile, catalog })
}
