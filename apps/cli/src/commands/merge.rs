//! Merge command implementation.

use crate::commands::types::MergeArgs;
use anyhow::{Context, Result};
use kinodata_abstraction::FieldValue;
use kinodata_eval::{merge_records, read_jsonl, PredictionTable};
use std::collections::BTreeMap;

pub fn execute(args: &MergeArgs) -> Result<()> {
    let records: Vec<BTreeMap<String, FieldValue>> = read_jsonl(&args.input)
        .with_context(|| format!("Failed to read records from {}", args.input.display()))?;

    let subset: Vec<&str> = args.fields.iter().map(String::as_str).collect();
    let merged = merge_records(&records, (!subset.is_empty()).then_some(subset.as_slice()))?;
    let table = PredictionTable::from_merged(merged)
        .context("Merged fields must have equal lengths to form a table")?;
    tracing::info!(
        records = records.len(),
        columns = table.columns().len(),
        rows = table.num_rows(),
        "merged"
    );

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            table.write_csv(file)?;
        }
        None => table.write_csv(std::io::stdout().lock())?,
    }
    Ok(())
}
