//! Kinodata Eval
//!
//! Evaluation side of the kinodata regression models:
//! - Merging heterogeneous per-batch records (`merge_records`)
//! - Correlation and MAE statistics
//! - Per-pass aggregation and metric emission (`EvaluationAggregator`)
//! - Metric/persistence sinks, run artifacts and scatter plots
//! - The reference heterogeneous readout and regression model glue

pub mod aggregator;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod fs_sink;
pub mod layout;
pub mod merge;
pub mod model;
pub mod plot;
pub mod readout;
pub mod record;
pub mod replay;
pub mod sink;
pub mod stats;

pub use aggregator::{
    correlation_from_eval_outputs, AggregatorState, AlignedEpochView, EpochMetrics,
    EvaluationAggregator, PassKind,
};
pub use artifacts::{ArtifactKind, PredictionTable, RunArtifact, RunManifest};
pub use config::{EvalConfig, EvalConfigError, MetricNames};
pub use error::{EvalError, EvalResult};
pub use fs_sink::FsSink;
pub use layout::{RunId, RunLayout};
pub use merge::{merge_records, MergedFields};
pub use model::{PassthroughEncoder, PredictOutput, RegressionModel};
pub use plot::{PlotStyle, ScatterPlot};
pub use readout::{Aggregation, LinearHead, PooledReadout, Pooling, ReadoutConfig};
pub use record::{BatchRecord, FieldSource, IDENTIFIER, PREDICTION, TARGET};
pub use replay::{read_jsonl, replay_pass, write_jsonl};
pub use sink::{
    ImageArtifact, ImageFormat, MemorySink, MetricStep, MetricsSink, PersistenceSink, ScalarRecord,
    SinkEvent, Summary, TracingMetricsSink,
};
pub use stats::{
    correlation, first_non_finite, joint_bounds, mean_absolute_error, Correlation,
};
