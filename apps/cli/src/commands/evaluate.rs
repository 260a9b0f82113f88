//! Evaluate command implementation.

use crate::commands::types::EvaluateArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use kinodata_eval::{
    read_jsonl, replay_pass, BatchRecord, EpochMetrics, EvalConfig, EvaluationAggregator, FsSink,
    PassKind, TracingMetricsSink,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn execute(args: EvaluateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, args.output_dir)?;
    let records: Vec<BatchRecord> = read_jsonl(&args.input)
        .with_context(|| format!("Failed to read records from {}", args.input.display()))?;
    let kind = PassKind::from(args.kind);
    tracing::info!(
        input = %args.input.display(),
        batches = records.len(),
        pass = %kind,
        "replaying records"
    );

    let (metrics, run) = if args.no_save {
        let sink = Arc::new(TracingMetricsSink);
        let mut aggregator = EvaluationAggregator::new(sink.clone(), sink, config)?;
        (replay_pass(&mut aggregator, kind, &records)?, None)
    } else {
        let root = config.output_root();
        let sink = Arc::new(
            FsSink::create(root.clone()).with_context(|| {
                format!("Failed to create run directory under {}", root.display())
            })?,
        );
        let mut aggregator = EvaluationAggregator::new(sink.clone(), sink.clone(), config)?;
        let metrics = replay_pass(&mut aggregator, kind, &records)?;
        (metrics, Some((sink.run_id().to_string(), sink.run_dir())))
    };

    if args.json {
        let (run_id, run_dir) = run.unzip();
        let out = json!({
            "run_id": run_id,
            "run_dir": run_dir,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_summary(&metrics, run.as_ref());
    Ok(())
}

fn load_config(path: Option<&Path>, output_dir: Option<PathBuf>) -> Result<EvalConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = EvalConfig::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => EvalConfig::discover_and_load(),
    };
    if output_dir.is_some() {
        config.output_dir = output_dir;
    }
    Ok(config)
}

fn print_summary(metrics: &EpochMetrics, run: Option<&(String, PathBuf)>) {
    println!();
    let heading = format!("Evaluation ({} pass, {} samples)", metrics.kind, metrics.num_samples);
    println!("{}", heading.bold().cyan());
    println!("  MAE:   {:.4}", metrics.mae);
    match metrics.corr {
        Some(corr) => println!("  Corr:  {corr:.4}"),
        None => println!("  Corr:  {}", "undefined".yellow()),
    }
    println!("  Range: [{}, {}]", metrics.y_min, metrics.y_max);
    if let Some((run_id, run_dir)) = run {
        println!("  Run:   {}", run_id.cyan());
        println!("  Dir:   {}", run_dir.display().to_string().dimmed());
    }
    println!();
}
