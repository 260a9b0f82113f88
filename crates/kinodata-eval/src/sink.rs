use crate::artifacts::PredictionTable;
use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// How a tracking backend summarizes a metric over the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Summary {
    Min,
    Max,
    Mean,
    Last,
}

/// Granularity a scalar was logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricStep {
    /// One evaluation batch; `index` counts batches within the pass.
    Batch { index: usize, batch_size: usize },
    /// End of an evaluation pass.
    Epoch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub name: String,
    pub value: f64,
    pub step: MetricStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Svg,
}

impl ImageFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
        }
    }
}

/// A rendered figure, ready to hand to a tracking backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub format: ImageFormat,
    pub data: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Receives scalar metrics and images from the evaluation pipeline.
pub trait MetricsSink: Send + Sync {
    /// Declares how a metric is summarized over the run.
    fn define_metric(&self, _name: &str, _summary: Summary) -> EvalResult<()> {
        Ok(())
    }

    fn log_scalar(&self, record: &ScalarRecord) -> EvalResult<()>;

    fn log_image(&self, name: &str, image: &ImageArtifact) -> EvalResult<()>;
}

/// Durable storage for tables produced by a test pass.
pub trait PersistenceSink: Send + Sync {
    fn log_table(&self, name: &str, table: &PredictionTable) -> EvalResult<()>;
}

/// Sink that only writes to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn define_metric(&self, name: &str, summary: Summary) -> EvalResult<()> {
        tracing::debug!(metric = name, ?summary, "defined metric");
        Ok(())
    }

    fn log_scalar(&self, record: &ScalarRecord) -> EvalResult<()> {
        match record.step {
            MetricStep::Batch { index, batch_size } => {
                tracing::debug!(
                    metric = %record.name,
                    value = record.value,
                    batch = index,
                    batch_size,
                    "batch metric"
                );
            }
            MetricStep::Epoch => {
                tracing::info!(metric = %record.name, value = record.value, "epoch metric");
            }
        }
        Ok(())
    }

    fn log_image(&self, name: &str, image: &ImageArtifact) -> EvalResult<()> {
        tracing::info!(
            image = name,
            format = image.format.extension(),
            bytes = image.data.len(),
            "image"
        );
        Ok(())
    }
}

impl PersistenceSink for TracingMetricsSink {
    fn log_table(&self, name: &str, table: &PredictionTable) -> EvalResult<()> {
        tracing::info!(table = name, columns = ?table.columns(), rows = table.num_rows(), "table");
        Ok(())
    }
}

/// Everything a sink has been asked to record, in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    Defined { name: String, summary: Summary },
    Scalar(ScalarRecord),
    Image { name: String, image: ImageArtifact },
    Table { name: String, table: PredictionTable },
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) -> EvalResult<()> {
        self.events
            .lock()
            .map_err(|_| EvalError::Sink("memory sink lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }

    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Epoch-level scalars in logging order.
    #[must_use]
    pub fn epoch_scalars(&self) -> Vec<ScalarRecord> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Scalar(record) if record.step == MetricStep::Epoch => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Latest epoch value of a metric.
    #[must_use]
    pub fn last_epoch_value(&self, name: &str) -> Option<f64> {
        self.epoch_scalars().into_iter().rev().find(|r| r.name == name).map(|r| r.value)
    }

    #[must_use]
    pub fn images(&self) -> Vec<(String, ImageArtifact)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Image { name, image } => Some((name, image)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn tables(&self) -> Vec<(String, PredictionTable)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Table { name, table } => Some((name, table)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl MetricsSink for MemorySink {
    fn define_metric(&self, name: &str, summary: Summary) -> EvalResult<()> {
        self.push(SinkEvent::Defined { name: name.to_string(), summary })
    }

    fn log_scalar(&self, record: &ScalarRecord) -> EvalResult<()> {
        self.push(SinkEvent::Scalar(record.clone()))
    }

    fn log_image(&self, name: &str, image: &ImageArtifact) -> EvalResult<()> {
        self.push(SinkEvent::Image { name: name.to_string(), image: image.clone() })
    }
}

impl PersistenceSink for MemorySink {
    fn log_table(&self, name: &str, table: &PredictionTable) -> EvalResult<()> {
        self.push(SinkEvent::Table { name: name.to_string(), table: table.clone() })
    }
}
