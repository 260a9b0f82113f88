//! Per-pass accumulation of batch outputs and epoch-level metric emission.

use crate::artifacts::PredictionTable;
use crate::config::EvalConfig;
use crate::error::{EvalError, EvalResult};
use crate::merge::{merge_records, MergedFields};
use crate::plot::ScatterPlot;
use crate::record::{BatchRecord, IDENTIFIER, PREDICTION, TARGET};
use crate::sink::{ImageArtifact, MetricStep, MetricsSink, PersistenceSink, ScalarRecord, Summary};
use crate::stats::{
    correlation, first_non_finite, joint_bounds, mean_absolute_error, Correlation,
};
use kinodata_abstraction::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Validation,
    Test,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => f.write_str("validation"),
            Self::Test => f.write_str("test"),
        }
    }
}

impl FromStr for PassKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "validation" | "val" => Ok(Self::Validation),
            "test" => Ok(Self::Test),
            other => Err(EvalError::Config(format!("unknown pass kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Accumulating(PassKind),
    Finalizing(PassKind),
}

impl fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Accumulating(kind) => write!(f, "accumulating a {kind} pass"),
            Self::Finalizing(kind) => write!(f, "finalizing a {kind} pass"),
        }
    }
}

/// Fields of a whole pass, concatenated in submission order.
///
/// `all_identifiers` is only merged when the pass exports a prediction table.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedEpochView {
    pub all_predictions: Vec<f64>,
    pub all_targets: Vec<f64>,
    pub all_identifiers: Option<Vec<f64>>,
}

impl AlignedEpochView {
    /// Merges predictions, targets and identifiers.
    pub fn from_records(records: &[BatchRecord]) -> EvalResult<Self> {
        let mut merged = merge_records(records, Some(&[PREDICTION, TARGET, IDENTIFIER][..]))?;
        let all_identifiers = merged.take(IDENTIFIER).unwrap_or_default();
        Self::from_merged(&mut merged, Some(all_identifiers))
    }

    /// Merges predictions and targets only.
    pub fn predictions_and_targets(records: &[BatchRecord]) -> EvalResult<Self> {
        let mut merged = merge_records(records, Some(&[PREDICTION, TARGET][..]))?;
        Self::from_merged(&mut merged, None)
    }

    fn from_merged(
        merged: &mut MergedFields,
        all_identifiers: Option<Vec<f64>>,
    ) -> EvalResult<Self> {
        let all_predictions = merged.take(PREDICTION).unwrap_or_default();
        let all_targets = merged.take(TARGET).unwrap_or_default();
        let n = all_predictions.len();
        if all_targets.len() != n || all_identifiers.as_ref().is_some_and(|ids| ids.len() != n) {
            return Err(EvalError::MisalignedRecord(format!(
                "{n} predictions, {} targets and {:?} identifiers after merging",
                all_targets.len(),
                all_identifiers.as_ref().map(Vec::len)
            )));
        }
        Ok(Self { all_predictions, all_targets, all_identifiers })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all_predictions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_predictions.is_empty()
    }

    /// The `[prediction, identifier]` table, one row per sample.
    pub fn prediction_table(&self) -> EvalResult<PredictionTable> {
        let identifiers = self.all_identifiers.clone().ok_or_else(|| {
            EvalError::SchemaMismatch("identifiers were not merged for this pass".to_string())
        })?;
        PredictionTable::from_columns(vec![
            (PREDICTION.to_string(), self.all_predictions.clone()),
            (IDENTIFIER.to_string(), identifiers),
        ])
    }
}

/// Metrics of one finished pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub kind: PassKind,
    pub num_samples: usize,
    pub mae: f64,
    /// `None` when the correlation is undefined for this pass.
    pub corr: Option<f64>,
    pub y_min: f64,
    pub y_max: f64,
}

impl EpochMetrics {
    /// Computes the metrics of a merged pass. Only fatal errors are returned;
    /// a degenerate correlation leaves `corr` empty.
    pub fn compute(kind: PassKind, view: &AlignedEpochView) -> EvalResult<Self> {
        let mae = mean_absolute_error(&view.all_predictions, &view.all_targets)?;
        let (y_min, y_max) =
            joint_bounds(&view.all_predictions, &view.all_targets).unwrap_or((0.0, 0.0));
        let corr = match correlation(&view.all_predictions, &view.all_targets) {
            Ok(c) => Some(c.corr),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(pass = %kind, error = %err, "correlation skipped");
                None
            }
            Err(err) => return Err(err),
        };
        Ok(Self { kind, num_samples: view.len(), mae, corr, y_min, y_max })
    }
}

/// Concatenates the predictions and targets of a pass and correlates them.
pub fn correlation_from_eval_outputs(
    records: &[BatchRecord],
) -> EvalResult<(Vec<f64>, Vec<f64>, Correlation)> {
    let view = AlignedEpochView::predictions_and_targets(records)?;
    let corr = correlation(&view.all_predictions, &view.all_targets)?;
    Ok((view.all_predictions, view.all_targets, corr))
}

enum Emission {
    Image(ImageArtifact),
    Table(PredictionTable),
}

/// Owns the batch buffer of one evaluation pass at a time.
///
/// `begin_pass` -> `record_step`* -> `end_pass`. Sinks are only touched by the
/// per-batch MAE in `record_step` and by `end_pass`.
pub struct EvaluationAggregator {
    metrics: Arc<dyn MetricsSink>,
    persistence: Arc<dyn PersistenceSink>,
    config: EvalConfig,
    state: AggregatorState,
    buffer: Vec<BatchRecord>,
}

impl fmt::Debug for EvaluationAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationAggregator")
            .field("state", &self.state)
            .field("buffered_batches", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl EvaluationAggregator {
    /// Creates an idle aggregator and declares the run summaries of its metrics
    /// (`mae` tracked by minimum, `corr` by maximum).
    pub fn new(
        metrics: Arc<dyn MetricsSink>,
        persistence: Arc<dyn PersistenceSink>,
        config: EvalConfig,
    ) -> EvalResult<Self> {
        config.validate()?;
        for kind in [PassKind::Validation, PassKind::Test] {
            metrics.define_metric(&config.metrics.mae_key(kind), Summary::Min)?;
            metrics.define_metric(&config.metrics.corr_key(kind), Summary::Max)?;
        }
        Ok(Self { metrics, persistence, config, state: AggregatorState::Idle, buffer: Vec::new() })
    }

    #[must_use]
    pub fn state(&self) -> AggregatorState {
        self.state
    }

    #[must_use]
    pub fn buffered_batches(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn begin_pass(&mut self, kind: PassKind) {
        if let AggregatorState::Accumulating(previous) = self.state {
            if !self.buffer.is_empty() {
                tracing::warn!(
                    pass = %previous,
                    batches = self.buffer.len(),
                    "discarding unfinished pass"
                );
            }
        }
        self.buffer.clear();
        self.state = AggregatorState::Accumulating(kind);
        tracing::debug!(pass = %kind, "pass started");
    }

    /// Buffers one batch and returns its mean absolute error.
    pub fn record_step(
        &mut self,
        prediction: Vec<f64>,
        target: Vec<f64>,
        identifier: impl Into<FieldValue>,
    ) -> EvalResult<f64> {
        let AggregatorState::Accumulating(kind) = self.state else {
            return Err(EvalError::InvalidState {
                operation: "record_step",
                state: self.state.to_string(),
            });
        };

        for (field, values) in [(PREDICTION, &prediction), (TARGET, &target)] {
            if let Some((idx, value)) = first_non_finite(values) {
                return Err(EvalError::NonFinite(format!("{field}[{idx}] is {value}")));
            }
        }

        let batch_size = prediction.len();
        let mae = mean_absolute_error(&prediction, &target)?;
        let record = BatchRecord::new(prediction, target, identifier.into())?;

        self.metrics.log_scalar(&ScalarRecord {
            name: self.config.metrics.mae_step_key(kind),
            value: mae,
            step: MetricStep::Batch { index: self.buffer.len(), batch_size },
            summary: None,
        })?;
        tracing::debug!(pass = %kind, batch = self.buffer.len(), batch_size, mae, "recorded batch");

        self.buffer.push(record);
        Ok(mae)
    }

    /// Drops the current pass without publishing anything. No-op when idle.
    pub fn abort_pass(&mut self) {
        if self.state == AggregatorState::Idle {
            return;
        }
        tracing::warn!(
            state = %self.state,
            batches = self.buffer.len(),
            "aborting pass, buffered batches discarded"
        );
        self.buffer.clear();
        self.state = AggregatorState::Idle;
    }

    /// Finishes the pass: merges the buffer, computes and publishes the epoch
    /// metrics plus the scatter plot (validation) or prediction table (test).
    ///
    /// The aggregator is idle afterwards whether or not this succeeds.
    pub fn end_pass(&mut self) -> EvalResult<EpochMetrics> {
        let AggregatorState::Accumulating(kind) = self.state else {
            return Err(EvalError::InvalidState {
                operation: "end_pass",
                state: self.state.to_string(),
            });
        };

        self.state = AggregatorState::Finalizing(kind);
        let records = std::mem::take(&mut self.buffer);
        let result = self.finalize(kind, &records);
        self.state = AggregatorState::Idle;

        if let Err(err) = &result {
            tracing::error!(pass = %kind, error = %err, "pass aborted");
        }
        result
    }

    fn finalize(&self, kind: PassKind, records: &[BatchRecord]) -> EvalResult<EpochMetrics> {
        if records.is_empty() {
            return Err(EvalError::EmptyPass);
        }

        let view = match kind {
            PassKind::Validation => AlignedEpochView::predictions_and_targets(records)?,
            PassKind::Test => AlignedEpochView::from_records(records)?,
        };
        let metrics = EpochMetrics::compute(kind, &view)?;

        // Everything fallible is prepared before the first sink call.
        let emission = match kind {
            PassKind::Validation => Emission::Image(
                ScatterPlot::new(
                    &view.all_targets,
                    &view.all_predictions,
                    metrics.y_min,
                    metrics.y_max,
                    metrics.corr,
                )
                .render_svg(&self.config.plot)?,
            ),
            PassKind::Test => Emission::Table(view.prediction_table()?),
        };

        self.publish(&metrics, &emission)?;
        tracing::info!(
            pass = %kind,
            samples = metrics.num_samples,
            mae = metrics.mae,
            corr = ?metrics.corr,
            "pass finished"
        );
        Ok(metrics)
    }

    fn publish(&self, metrics: &EpochMetrics, emission: &Emission) -> EvalResult<()> {
        let names = &self.config.metrics;
        self.metrics.log_scalar(&ScalarRecord {
            name: names.mae_key(metrics.kind),
            value: metrics.mae,
            step: MetricStep::Epoch,
            summary: Some(Summary::Min),
        })?;
        if let Some(corr) = metrics.corr {
            self.metrics.log_scalar(&ScalarRecord {
                name: names.corr_key(metrics.kind),
                value: corr,
                step: MetricStep::Epoch,
                summary: Some(Summary::Max),
            })?;
        }

        match emission {
            Emission::Image(image) => self.metrics.log_image(&names.scatter_image, image),
            Emission::Table(table) => self.persistence.log_table(&names.prediction_table, table),
        }
    }
}
