use kinodata_abstraction::ModelError;
use thiserror::Error;

pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("record {record}: field '{field}' cannot be converted to a numeric sequence")]
    UnsupportedFieldType { record: usize, field: String },

    #[error("degenerate statistic: {0}")]
    DegenerateStatistic(String),

    #[error("{operation} is not allowed while the aggregator is {state}")]
    InvalidState { operation: &'static str, state: String },

    #[error("misaligned record: {0}")]
    MisalignedRecord(String),

    #[error("non-finite value: {0}")]
    NonFinite(String),

    #[error("evaluation pass recorded no batches")]
    EmptyPass,

    #[error("sink error: {0}")]
    Sink(String),

    #[error("plot error: {0}")]
    Plot(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EvalError {
    /// Whether the pass may still publish its remaining metrics after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DegenerateStatistic(_))
    }
}
