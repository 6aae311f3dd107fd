use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use num_format::{Locale, ToFormattedString};
use rust_decimal::Decimal;
use tracing::warn;

use crate::models::{catalog::ReferenceCatalogs, raw::RawDocument};
use crate::services::{
    pipeline::{self, PipelineConfig, RunOutput},
    shared::env::get_env_variable,
};

#[derive(Parser, Debug)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a ledger / broker-summary document pair and write every
    /// derived table plus the reconciliation report as JSON
    Reconcile {
        ledger: PathBuf,
        summary: PathBuf,
        #[arg(long)]
        instruments: Option<PathBuf>,
        #[arg(long)]
        fallback_instruments: Option<PathBuf>,
        #[arg(long)]
        initial_prices: Option<PathBuf>,
        #[arg(long)]
        quotes: Option<PathBuf>,
        #[arg(short, long)]
        tolerance: Option<Decimal>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the same pipeline but only print the reconciliation report
    Validate {
        ledger: PathBuf,
        summary: PathBuf,
        #[arg(long)]
        instruments: Option<PathBuf>,
        #[arg(short, long)]
        tolerance: Option<Decimal>,
    },
}

pub fn cli() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        Command::Reconcile {
            ledger,
            summary,
            instruments,
            fallback_instruments,
            initial_prices,
            quotes,
            tolerance,
            output,
        } => {
            let result = execute(
                &ledger,
                &summary,
                instruments,
                fallback_instruments,
                initial_prices,
                quotes,
                tolerance,
            )?;
            print_run_summary(&result);

            let output_path = output.unwrap_or_else(|| PathBuf::from("reconciliation.json"));
            let serialized = serde_json::to_string_pretty(&result)?;
            fs::write(&output_path, serialized)
                .with_context(|| format!("Unable to write {}", output_path.display()))?;
            println!("Wrote {}", output_path.display());
        }
        Command::Validate {
            ledger,
            summary,
            instruments,
            tolerance,
        } => {
            let result = execute(&ledger, &summary, instruments, None, None, None, tolerance)?;
            print_run_summary(&result);
        }
    }
    Ok(())
}

fn execute(
    ledger_path: &Path,
    summary_path: &Path,
    instruments: Option<PathBuf>,
    fallback_instruments: Option<PathBuf>,
    initial_prices: Option<PathBuf>,
    quotes: Option<PathBuf>,
    tolerance: Option<Decimal>,
) -> anyhow::Result<RunOutput> {
    let instruments = instruments.or_else(|| env_path("INSTRUMENT_CATALOG"));
    let fallback_instruments = fallback_instruments.or_else(|| env_path("FALLBACK_CATALOG"));
    let initial_prices = initial_prices.or_else(|| env_path("INITIAL_PRICES"));
    let quotes = quotes.or_else(|| env_path("CURRENCY_QUOTES"));

    let catalogs = match instruments {
        Some(path) => ReferenceCatalogs::load(
            &path,
            fallback_instruments.as_deref(),
            initial_prices.as_deref(),
            quotes.as_deref(),
        )?,
        None => ReferenceCatalogs::default(),
    };

    let tolerance = tolerance
        .or_else(|| get_env_variable("TOLERANCE").and_then(|value| value.parse().ok()));
    let mut config = PipelineConfig::default();
    if let Some(tolerance) = tolerance {
        config.tolerance = tolerance;
    }

    let ledger = read_document(ledger_path)?;
    let summary = read_document(summary_path)?;
    pipeline::run(ledger, summary, &catalogs, &config)
}

fn env_path(variable: &str) -> Option<PathBuf> {
    get_env_variable(variable).map(PathBuf::from)
}

fn read_document(path: &Path) -> anyhow::Result<RawDocument> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Malformed document structure in {}", path.display()))
}

fn print_run_summary(result: &RunOutput) {
    result.report.print_report();
    println!(
        "{} transactions, {} realized results",
        result.tables.transactions.len().to_formatted_string(&Locale::en),
        (result.tables.results_ars.len() + result.tables.results_usd.len())
            .to_formatted_string(&Locale::en)
    );

    for label in &result.unmapped_labels {
        warn!(target: "cli", "Unmapped section label '{}'", label);
    }
    for flag in &result.manual_review {
        warn!(
            target: "cli",
            "Manual review needed for '{}' (candidates: {:?})", flag.name, flag.candidates
        );
    }
}
