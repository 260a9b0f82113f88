//! Model abstraction layer for Kinodata.
//!
//! This module defines the contracts between the evaluation pipeline and the
//! graph model: heterogeneous batches, per node type embeddings, and the
//! `Encoder` / `Readout` traits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Represents an error raised by an encoder or a readout.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The batch or the embeddings violate the input contract.
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// The encoder failed to produce embeddings.
    #[error("Encoder Error: {0}")]
    Encoder(String),

    /// The readout failed to reduce embeddings to per-graph scalars.
    #[error("Readout Error: {0}")]
    Readout(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Storage representation of one per-sample field of a batch.
///
/// Datasets hand out identifiers either as native numbers or as string labels,
/// so both forms are accepted here and normalized later by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Native numeric sequence.
    Numeric(Vec<f64>),
    /// Discrete labels, each convertible to an integer.
    Labels(Vec<String>),
    /// Anything else seen at a deserialization boundary.
    Unsupported(serde_json::Value),
}

impl FieldValue {
    /// Number of samples, or `None` when the representation is unsupported.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Numeric(values) => Some(values.len()),
            Self::Labels(labels) => Some(labels.len()),
            Self::Unsupported(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Numeric(values)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(labels: Vec<String>) -> Self {
        Self::Labels(labels)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(labels: Vec<&str>) -> Self {
        Self::Labels(labels.into_iter().map(str::to_string).collect())
    }
}

/// Node embeddings for one batch, keyed by node type.
///
/// Row `i` of a node type belongs to node `i` of that type in the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeEmbeddings(BTreeMap<String, Vec<Vec<f32>>>);

impl NodeEmbeddings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_type: impl Into<String>, rows: Vec<Vec<f32>>) {
        self.0.insert(node_type.into(), rows);
    }

    #[must_use]
    pub fn get(&self, node_type: &str) -> Option<&[Vec<f32>]> {
        self.0.get(node_type).map(Vec::as_slice)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Embedding width of a node type, validated across all of its rows.
    pub fn width(&self, node_type: &str) -> ModelResult<usize> {
        let rows = self.get(node_type).ok_or_else(|| {
            ModelError::InvalidInput(format!("no embeddings for node type '{node_type}'"))
        })?;
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let width = first.len();
        if let Some(idx) = rows.iter().position(|row| row.len() != width) {
            return Err(ModelError::InvalidInput(format!(
                "node type '{node_type}' row {idx} has width {}, expected {width}",
                rows[idx].len()
            )));
        }
        Ok(width)
    }
}

impl FromIterator<(String, Vec<Vec<f32>>)> for NodeEmbeddings {
    fn from_iter<T: IntoIterator<Item = (String, Vec<Vec<f32>>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A batch of heterogeneous molecular graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphBatch {
    /// Number of graphs in the batch.
    pub num_graphs: usize,

    /// Graph index of every node, per node type.
    pub membership: BTreeMap<String, Vec<usize>>,

    /// Raw node features per node type, if the batch carries them.
    #[serde(default)]
    pub features: BTreeMap<String, Vec<Vec<f32>>>,

    /// Regression target, one per graph.
    pub y: Vec<f64>,

    /// Sample identifier, one per graph.
    pub ident: FieldValue,
}

impl GraphBatch {
    /// Number of nodes of a type in the batch.
    #[must_use]
    pub fn node_count(&self, node_type: &str) -> usize {
        self.membership.get(node_type).map_or(0, Vec::len)
    }

    /// Check that per-graph fields and node memberships agree with `num_graphs`.
    pub fn validate(&self) -> ModelResult<()> {
        if self.y.len() != self.num_graphs {
            return Err(ModelError::InvalidInput(format!(
                "batch has {} graphs but {} targets",
                self.num_graphs,
                self.y.len()
            )));
        }
        if let Some(len) = self.ident.len() {
            if len != self.num_graphs {
                return Err(ModelError::InvalidInput(format!(
                    "batch has {} graphs but {len} identifiers",
                    self.num_graphs
                )));
            }
        }
        for (node_type, graphs) in &self.membership {
            if let Some(graph) = graphs.iter().find(|g| **g >= self.num_graphs) {
                return Err(ModelError::InvalidInput(format!(
                    "node type '{node_type}' references graph {graph} of {}",
                    self.num_graphs
                )));
            }
        }
        Ok(())
    }
}

/// Produces node embeddings for a batch.
pub trait Encoder: Send + Sync {
    /// Encodes every node of the batch, grouped by node type.
    ///
    /// # Errors
    /// Returns a `ModelError` if the batch cannot be encoded.
    fn encode(&self, batch: &GraphBatch) -> ModelResult<NodeEmbeddings>;
}

/// Reduces per node type embeddings to one scalar per graph.
///
/// The output is ordered by graph index, so entry `g` is the prediction for
/// graph `g` of the batch and aligns with `batch.y[g]` and `batch.ident[g]`.
pub trait Readout: Send + Sync {
    /// # Errors
    /// Returns a `ModelError` if the embeddings and the batch membership disagree.
    fn readout(&self, embeddings: &NodeEmbeddings, batch: &GraphBatch) -> ModelResult<Vec<f64>>;
}
