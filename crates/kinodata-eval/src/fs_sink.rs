//! Sink that persists metrics, images and tables under a run directory.

use crate::artifacts::{make_artifact, ArtifactKind, PredictionTable, RunManifest};
use crate::error::{EvalError, EvalResult};
use crate::layout::{RunId, RunLayout};
use crate::sink::{ImageArtifact, MetricStep, MetricsSink, PersistenceSink, ScalarRecord, Summary};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writes `metrics.jsonl`, `images/*.svg`, `tables/*.csv` and keeps
/// `run_manifest.json` current after every epoch scalar, image and table.
#[derive(Debug)]
pub struct FsSink {
    layout: RunLayout,
    run_id: RunId,
    manifest: Mutex<RunManifest>,
}

#[derive(Serialize)]
struct MetricDefinition<'a> {
    define: &'a str,
    summary: Summary,
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> EvalResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

impl FsSink {
    /// Starts a new run with a fresh id under `root`.
    pub fn create(root: PathBuf) -> EvalResult<Self> {
        Self::with_run_id(root, RunId::new())
    }

    pub fn with_run_id(root: PathBuf, run_id: RunId) -> EvalResult<Self> {
        let layout = RunLayout::new(root);
        layout.ensure_run_dirs(&run_id)?;
        let manifest = RunManifest::new(run_id.clone());
        write_json(layout.manifest_path(&run_id), &manifest)?;
        tracing::debug!(
            run_id = %run_id,
            dir = %layout.run_dir(&run_id).display(),
            "created run directory"
        );
        Ok(Self { layout, run_id, manifest: Mutex::new(manifest) })
    }

    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.layout.run_dir(&self.run_id)
    }

    #[must_use]
    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn manifest(&self) -> EvalResult<RunManifest> {
        self.manifest
            .lock()
            .map(|m| m.clone())
            .map_err(|_| EvalError::Sink("manifest lock poisoned".to_string()))
    }

    fn update_manifest(
        &self,
        update: impl FnOnce(&mut RunManifest) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let mut manifest = self
            .manifest
            .lock()
            .map_err(|_| EvalError::Sink("manifest lock poisoned".to_string()))?;
        update(&mut manifest)?;
        write_json(self.layout.manifest_path(&self.run_id), &*manifest)
    }

    fn append_metrics_line<T: Serialize>(&self, line: &T) -> EvalResult<()> {
        let path = self.layout.metrics_path(&self.run_id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(line)?)?;
        Ok(())
    }
}

impl MetricsSink for FsSink {
    fn define_metric(&self, name: &str, summary: Summary) -> EvalResult<()> {
        self.append_metrics_line(&MetricDefinition { define: name, summary })
    }

    /// Batch scalars are only appended. The manifest, including the digest of
    /// `metrics.jsonl`, is refreshed on epoch scalars.
    fn log_scalar(&self, record: &ScalarRecord) -> EvalResult<()> {
        self.append_metrics_line(record)?;
        if record.step != MetricStep::Epoch {
            return Ok(());
        }
        let path = self.layout.metrics_path(&self.run_id);
        self.update_manifest(|manifest| {
            manifest.metrics.insert(record.name.clone(), record.value);
            manifest.upsert(make_artifact("metrics", ArtifactKind::Metrics, path)?);
            Ok(())
        })
    }

    fn log_image(&self, name: &str, image: &ImageArtifact) -> EvalResult<()> {
        let path = self
            .layout
            .images_dir(&self.run_id)
            .join(format!("{}.{}", file_stem(name), image.format.extension()));
        std::fs::write(&path, &image.data)?;
        self.update_manifest(|manifest| {
            manifest.upsert(make_artifact(name, ArtifactKind::Image, path)?);
            Ok(())
        })
    }
}

impl PersistenceSink for FsSink {
    fn log_table(&self, name: &str, table: &PredictionTable) -> EvalResult<()> {
        let path =
            self.layout.tables_dir(&self.run_id).join(format!("{}.csv", file_stem(name)));
        table.write_csv(std::fs::File::create(&path)?)?;
        tracing::info!(
            table = name,
            rows = table.num_rows(),
            path = %path.display(),
            "wrote table"
        );
        self.update_manifest(|manifest| {
            manifest.upsert(make_artifact(name, ArtifactKind::Table, path)?);
            Ok(())
        })
    }
}
