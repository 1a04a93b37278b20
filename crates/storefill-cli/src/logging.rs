//! Tracing subscriber setup: console, log file, or both.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Console,
    File,
    Both,
}

impl LogTarget {
    fn console(self) -> bool {
        matches!(self, LogTarget::Console | LogTarget::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogTarget::File | LogTarget::Both)
    }
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Where log events go.
    #[arg(long = "log", value_enum, default_value_t = LogTarget::Console, global = true)]
    pub target: LogTarget,

    /// Log file (appended to) for `--log file|both`.
    #[arg(long, default_value = "log.txt", global = true)]
    pub log_file: PathBuf,

    /// Include per-record decode/classify details.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl LogArgs {
    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        }
    }
}

pub fn init(args: &LogArgs) -> Result<()> {
    let console = args
        .target
        .console()
        .then(|| fmt::layer().with_writer(io::stderr).with_target(false));

    let file = if args.target.file() {
        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&args.log_file)
            .with_context(|| format!("failed to open log file {}", args.log_file.display()))?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(handle))
                .with_ansi(false)
                .with_target(false),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(args.level())
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
