//! Storefill CLI
//!
//! Reconciles a date-bucketed content store against a catalog export:
//! - `report`: list catalog records that are missing from the store and dated
//!   on/after the cutoff (nothing is written)
//! - `apply`: create zero-filled placeholders for those records
//! - `classify`: decode paths and compare them with the cutoff

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use storefill_core::{
    classify_with, decode_path, Classification, FsContentStore, ReconciliationReport, RunContext,
};

mod config;
mod logging;

#[derive(Parser)]
#[command(name = "storefill")]
#[command(
    author,
    version,
    about = "Storefill: fill gaps in a date-bucketed content store with placeholders"
)]
struct Cli {
    #[command(flatten)]
    log: logging::LogArgs,
    #[command(flatten)]
    run: config::RunArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report missing, date-eligible records without touching the store.
    Report {
        /// Print the report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Create placeholder files for missing, date-eligible records.
    Apply {
        /// Print the report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Decode catalog paths and classify them against the cutoff.
    Classify {
        /// Store-relative paths, e.g. `2023/05/01/0/abc.bin`.
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log)?;

    match cli.command {
        Commands::Report { json } => cmd_reconcile(&cli.run, false, json),
        Commands::Apply { json } => cmd_reconcile(&cli.run, true, json),
        Commands::Classify { paths } => cmd_classify(&cli.run, &paths),
    }
}

fn cmd_reconcile(args: &config::RunArgs, apply: bool, json: bool) -> Result<()> {
    let settings = config::resolve(args)?;
    let catalog = settings.require_catalog()?;
    let store = FsContentStore::new(&settings.reconcile.store_root);

    let ctx = RunContext::from_catalog(catalog, settings.reconcile.clone(), store)
        .with_context(|| format!("failed to fetch catalog {}", catalog.path().display()))?;

    match ctx.reconcile_parallel(apply, args.jobs) {
        Ok(report) => print_report(&report, apply, json),
        Err(aborted) => {
            eprintln!("{} {}", "error".red().bold(), aborted);
            print_report(&aborted.report, apply, json)?;
            Err(aborted.into())
        }
    }
}

fn print_report(report: &ReconciliationReport, apply: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let label = if apply { "created" } else { "missing" };
    for missing in &report.missing {
        println!(
            "{}.- {} {}",
            missing.record_index + 1,
            label.yellow(),
            missing.path
        );
    }
    println!(
        "{} existing={} created={} skipped={} missing={}",
        "summary".green().bold(),
        report.existing_count,
        report.created_count,
        report.skipped_count,
        report.missing.len()
    );
    Ok(())
}

fn cmd_classify(args: &config::RunArgs, paths: &[String]) -> Result<()> {
    let settings = config::resolve(args)?;
    let cutoff = settings.reconcile.cutoff;
    let policy = settings.reconcile.mismatch_policy;

    let mut failures = 0usize;
    for path in paths {
        let verdict = decode_path(path)
            .map_err(anyhow::Error::from)
            .and_then(|decoded| {
                let class = classify_with(&decoded, &cutoff, policy)?;
                Ok((decoded, class))
            });
        match verdict {
            Ok((decoded, Classification::Before)) => {
                println!("{path}\t{decoded}\t{}", "before".dimmed());
            }
            Ok((decoded, Classification::OnOrAfter)) => {
                println!("{path}\t{decoded}\t{}", "on_or_after".green());
            }
            Err(err) => {
                failures += 1;
                println!("{path}\t-\t{} {err}", "error".red().bold());
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!(
            "{failures} of {} path(s) could not be classified against cutoff {cutoff}",
            paths.len()
        ));
    }
    Ok(())
}
