//! Kinodata CLI - offline evaluation of recorded regression outputs.
//!
//! Provides the `kinodata` command, which replays recorded batch outputs
//! through the evaluation aggregator and merges JSONL records into tables.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use commands::types::{EvaluateArgs, MergeArgs};
use commands::{evaluate, merge};

/// Kinodata CLI - evaluation tooling for kinase activity regression models
#[derive(Parser, Debug)]
#[command(name = "kinodata", author, version, about = "Kinodata regression evaluation")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Configuration file (defaults to ~/.kinodata/eval.toml then ./kinodata-eval.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded batch outputs as one evaluation pass
    ///
    /// Reads one JSON record per line (`prediction`, `target`, `identifier`),
    /// computes MAE and correlation for the pass and writes the run artifacts.
    Evaluate(EvaluateArgs),

    /// Merge JSONL records field by field and print the result as CSV
    Merge(MergeArgs),
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    match args.command {
        Command::Evaluate(cmd) => evaluate::execute(cmd, args.config.as_deref()),
        Command::Merge(cmd) => merge::execute(&cmd),
    }
}
