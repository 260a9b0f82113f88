//! Regression model glue: encoder, readout and the evaluation hooks.

use crate::aggregator::{AggregatorState, EvaluationAggregator, PassKind};
use crate::error::{EvalError, EvalResult};
use kinodata_abstraction::{Encoder, GraphBatch, ModelError, ModelResult, NodeEmbeddings, Readout};
use serde::{Deserialize, Serialize};

/// Encoder that hands the batch's precomputed node features straight to the readout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEncoder;

impl Encoder for PassthroughEncoder {
    fn encode(&self, batch: &GraphBatch) -> ModelResult<NodeEmbeddings> {
        Ok(batch.features.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Output of `predict_step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictOutput {
    pub prediction: Vec<f64>,
    pub target: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RegressionModel<E: Encoder, R: Readout> {
    encoder: E,
    readout: R,
}

impl<E: Encoder, R: Readout> RegressionModel<E, R> {
    pub fn new(encoder: E, readout: R) -> Self {
        Self { encoder, readout }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn readout(&self) -> &R {
        &self.readout
    }

    /// One prediction per graph of the batch, in graph order.
    pub fn forward(&self, batch: &GraphBatch) -> EvalResult<Vec<f64>> {
        batch.validate()?;
        let embeddings = self.encoder.encode(batch)?;
        let prediction = self.readout.readout(&embeddings, batch)?;
        if prediction.len() != batch.num_graphs {
            return Err(ModelError::Readout(format!(
                "readout produced {} values for {} graphs",
                prediction.len(),
                batch.num_graphs
            ))
            .into());
        }
        Ok(prediction)
    }

    pub fn validation_step(
        &self,
        aggregator: &mut EvaluationAggregator,
        batch: &GraphBatch,
    ) -> EvalResult<f64> {
        self.eval_step(aggregator, batch, PassKind::Validation)
    }

    pub fn test_step(
        &self,
        aggregator: &mut EvaluationAggregator,
        batch: &GraphBatch,
    ) -> EvalResult<f64> {
        self.eval_step(aggregator, batch, PassKind::Test)
    }

    pub fn predict_step(&self, batch: &GraphBatch) -> EvalResult<PredictOutput> {
        let prediction = self.forward(batch)?;
        Ok(PredictOutput { prediction, target: batch.y.clone() })
    }

    fn eval_step(
        &self,
        aggregator: &mut EvaluationAggregator,
        batch: &GraphBatch,
        kind: PassKind,
    ) -> EvalResult<f64> {
        let state = aggregator.state();
        if state != AggregatorState::Accumulating(kind) {
            let operation = match kind {
                PassKind::Validation => "validation_step",
                PassKind::Test => "test_step",
            };
            return Err(EvalError::InvalidState { operation, state: state.to_string() });
        }
        let prediction = self.forward(batch)?;
        aggregator.record_step(prediction, batch.y.clone(), batch.ident.clone())
    }
}
