//! Reference heterogeneous readout.
//!
//! Pools every configured node type per graph, combines the pooled vectors
//! across node types and projects the result to one scalar per graph.

use kinodata_abstraction::{GraphBatch, ModelError, ModelResult, NodeEmbeddings, Readout};
use serde::{Deserialize, Serialize};

/// Reduction of one node type's rows into a per-graph vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    Mean,
    #[default]
    Sum,
    Max,
}

/// Combination of pooled vectors across node types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    #[default]
    Sum,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadoutConfig {
    #[serde(default = "default_node_types")]
    pub node_types: Vec<String>,
    #[serde(default)]
    pub pooling: Pooling,
    #[serde(default)]
    pub aggregation: Aggregation,
}

fn default_node_types() -> Vec<String> {
    vec!["ligand".to_string(), "pocket_residue".to_string()]
}

impl Default for ReadoutConfig {
    fn default() -> Self {
        Self {
            node_types: default_node_types(),
            pooling: Pooling::default(),
            aggregation: Aggregation::default(),
        }
    }
}

impl ReadoutConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.node_types.is_empty() {
            return Err(ModelError::InvalidInput(
                "readout.node_types must not be empty".to_string(),
            ));
        }
        if let Some(empty) = self.node_types.iter().find(|t| t.trim().is_empty()) {
            return Err(ModelError::InvalidInput(format!("invalid node type name '{empty}'")));
        }
        Ok(())
    }
}

/// Final linear projection to a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearHead {
    pub weights: Vec<f32>,
    #[serde(default)]
    pub bias: f32,
}

impl LinearHead {
    fn apply(&self, x: &[f32]) -> ModelResult<f64> {
        if x.len() != self.weights.len() {
            return Err(ModelError::Readout(format!(
                "head expects width {}, got {}",
                self.weights.len(),
                x.len()
            )));
        }
        let dot: f64 =
            x.iter().zip(&self.weights).map(|(a, w)| f64::from(*a) * f64::from(*w)).sum();
        Ok(dot + f64::from(self.bias))
    }
}

#[derive(Debug, Clone)]
pub struct PooledReadout {
    config: ReadoutConfig,
    head: LinearHead,
}

impl PooledReadout {
    pub fn new(config: ReadoutConfig, head: LinearHead) -> ModelResult<Self> {
        config.validate()?;
        Ok(Self { config, head })
    }

    #[must_use]
    pub fn config(&self) -> &ReadoutConfig {
        &self.config
    }

    fn pool_node_type(
        &self,
        node_type: &str,
        embeddings: &NodeEmbeddings,
        batch: &GraphBatch,
        width: usize,
    ) -> ModelResult<Vec<Vec<f32>>> {
        let rows = embeddings.get(node_type).unwrap_or_default();
        let membership = batch.membership.get(node_type).map_or(&[][..], Vec::as_slice);
        if rows.len() != membership.len() {
            return Err(ModelError::InvalidInput(format!(
                "node type '{node_type}' has {} embeddings but {} membership entries",
                rows.len(),
                membership.len()
            )));
        }

        let mut pooled = vec![vec![0.0f32; width]; batch.num_graphs];
        let mut counts = vec![0usize; batch.num_graphs];
        for (row, &graph) in rows.iter().zip(membership) {
            let slot = pooled.get_mut(graph).ok_or_else(|| {
                ModelError::InvalidInput(format!(
                    "node type '{node_type}' references graph {graph} of {}",
                    batch.num_graphs
                ))
            })?;
            let first = counts[graph] == 0;
            for (acc, v) in slot.iter_mut().zip(row) {
                *acc = match self.config.pooling {
                    Pooling::Sum | Pooling::Mean => *acc + v,
                    Pooling::Max if first => *v,
                    Pooling::Max => acc.max(*v),
                };
            }
            counts[graph] += 1;
        }

        if self.config.pooling == Pooling::Mean {
            for (slot, count) in pooled.iter_mut().zip(&counts) {
                if *count > 0 {
                    slot.iter_mut().for_each(|v| *v /= *count as f32);
                }
            }
        }
        Ok(pooled)
    }
}

impl Readout for PooledReadout {
    fn readout(&self, embeddings: &NodeEmbeddings, batch: &GraphBatch) -> ModelResult<Vec<f64>> {
        batch.validate()?;

        let width = self.head.weights.len();
        let mut per_type = Vec::with_capacity(self.config.node_types.len());
        for node_type in &self.config.node_types {
            if embeddings.get(node_type).is_some() {
                let type_width = embeddings.width(node_type)?;
                if type_width != width && batch.node_count(node_type) > 0 {
                    return Err(ModelError::InvalidInput(format!(
                        "node type '{node_type}' has width {type_width}, readout expects {width}"
                    )));
                }
            } else if batch.node_count(node_type) > 0 {
                return Err(ModelError::InvalidInput(format!(
                    "batch has '{node_type}' nodes but no embeddings for them"
                )));
            }
            per_type.push(self.pool_node_type(node_type, embeddings, batch, width)?);
        }

        (0..batch.num_graphs)
            .map(|graph| {
                let mut combined = per_type[0][graph].clone();
                for pooled in &per_type[1..] {
                    for (acc, v) in combined.iter_mut().zip(&pooled[graph]) {
                        *acc = match self.config.aggregation {
                            Aggregation::Sum | Aggregation::Mean => *acc + v,
                            Aggregation::Max => acc.max(*v),
                        };
                    }
                }
                if self.config.aggregation == Aggregation::Mean {
                    let n = per_type.len() as f32;
                    combined.iter_mut().for_each(|v| *v /= n);
                }
                self.head.apply(&combined)
            })
            .collect()
    }
}
