//! Command argument definitions shared between main.rs and the command modules.

use clap::{Args, ValueEnum};
use kinodata_eval::PassKind;
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassArg {
    #[value(alias = "val")]
    Validation,
    Test,
}

impl From<PassArg> for PassKind {
    fn from(arg: PassArg) -> Self {
        match arg {
            PassArg::Validation => Self::Validation,
            PassArg::Test => Self::Test,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// JSONL file with one recorded batch per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Pass kind: validation emits a scatter plot, test a prediction table
    #[arg(short, long, value_enum, default_value_t = PassArg::Validation)]
    pub kind: PassArg,

    /// Artifact root (overrides config and KINODATA_OUTPUT_DIR)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Only log metrics, do not write a run directory
    #[arg(long)]
    pub no_save: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// JSONL file with one record (field name -> list) per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Comma-separated fields to merge (defaults to every field of the first record)
    #[arg(short, long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Write the CSV to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
