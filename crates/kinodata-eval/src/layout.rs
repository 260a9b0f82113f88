use crate::error::EvalResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifier for an evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Filesystem layout for evaluation artifacts.
///
/// Every run lives under `<root>/<run_id>/...`
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.0.as_str())
    }

    #[must_use]
    pub fn manifest_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("run_manifest.json")
    }

    #[must_use]
    pub fn metrics_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("metrics.jsonl")
    }

    #[must_use]
    pub fn images_dir(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("images")
    }

    #[must_use]
    pub fn tables_dir(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("tables")
    }

    pub fn ensure_run_dirs(&self, run_id: &RunId) -> EvalResult<()> {
        std::fs::create_dir_all(self.run_dir(run_id))?;
        std::fs::create_dir_all(self.images_dir(run_id))?;
        std::fs::create_dir_all(self.tables_dir(run_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = RunLayout::new(temp.path().join("eval"));
        let id = RunId("run-1".to_string());

        assert!(layout.run_dir(&id).ends_with("eval/run-1"));
        assert!(layout.manifest_path(&id).ends_with("run-1/run_manifest.json"));
        assert!(layout.tables_dir(&id).ends_with("run-1/tables"));

        layout.ensure_run_dirs(&id).unwrap();
        assert!(layout.images_dir(&id).is_dir());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
