use crate::error::{EvalError, EvalResult};
use crate::layout::RunId;
use crate::merge::MergedFields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Row-major numeric table with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl PredictionTable {
    /// Stacks merged columns side by side; every column must have the same length.
    pub fn from_merged(merged: MergedFields) -> EvalResult<Self> {
        Self::from_columns(merged.into_columns())
    }

    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> EvalResult<Self> {
        let num_rows = columns.first().map_or(0, |(_, values)| values.len());
        if let Some((name, values)) = columns.iter().find(|(_, values)| values.len() != num_rows) {
            return Err(EvalError::MisalignedRecord(format!(
                "column '{name}' has {} rows, expected {num_rows}",
                values.len()
            )));
        }

        let rows = (0..num_rows)
            .map(|row| columns.iter().map(|(_, values)| values[row]).collect())
            .collect();
        Ok(Self { columns: columns.into_iter().map(|(name, _)| name).collect(), rows })
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> EvalResult<()> {
        let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(f64::to_string))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Metrics,
    Image,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Index of everything an evaluation run has written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    /// Latest epoch value of every scalar metric.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<RunArtifact>,
}

impl RunManifest {
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self { run_id, created_at: Utc::now(), metrics: BTreeMap::new(), artifacts: Vec::new() }
    }

    /// Adds an artifact, replacing any earlier one with the same name and kind.
    pub fn upsert(&mut self, artifact: RunArtifact) {
        self.artifacts.retain(|a| !(a.name == artifact.name && a.kind == artifact.kind));
        self.artifacts.push(artifact);
    }
}

pub fn sha256_file(path: &Path) -> EvalResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(name: &str, kind: ArtifactKind, path: PathBuf) -> EvalResult<RunArtifact> {
    if !path.exists() {
        return Err(EvalError::Sink(format!("artifact path does not exist: {}", path.display())));
    }

    let hash = sha256_file(&path)?;
    Ok(RunArtifact { name: name.to_string(), kind, path, sha256: hash })
}
