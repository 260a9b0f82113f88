//! Evaluation configuration file support.

use crate::aggregator::PassKind;
use crate::error::EvalError;
use crate::plot::PlotStyle;
use crate::readout::ReadoutConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `output_dir`.
pub const OUTPUT_DIR_ENV: &str = "KINODATA_OUTPUT_DIR";

/// Names under which metrics and artifacts are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNames {
    #[serde(default = "default_validation_prefix")]
    pub validation_prefix: String,
    #[serde(default = "default_test_prefix")]
    pub test_prefix: String,
    #[serde(default = "default_mae")]
    pub mae: String,
    #[serde(default = "default_corr")]
    pub corr: String,
    /// Appended to the MAE name for per-batch values.
    #[serde(default = "default_step_suffix")]
    pub step_suffix: String,
    #[serde(default = "default_scatter_image")]
    pub scatter_image: String,
    #[serde(default = "default_prediction_table")]
    pub prediction_table: String,
}

fn default_validation_prefix() -> String {
    "val".to_string()
}

fn default_test_prefix() -> String {
    "test".to_string()
}

fn default_mae() -> String {
    "mae".to_string()
}

fn default_corr() -> String {
    "corr".to_string()
}

fn default_step_suffix() -> String {
    "_step".to_string()
}

fn default_scatter_image() -> String {
    "scatter_val".to_string()
}

fn default_prediction_table() -> String {
    "test_predictions".to_string()
}

impl Default for MetricNames {
    fn default() -> Self {
        Self {
            validation_prefix: default_validation_prefix(),
            test_prefix: default_test_prefix(),
            mae: default_mae(),
            corr: default_corr(),
            step_suffix: default_step_suffix(),
            scatter_image: default_scatter_image(),
            prediction_table: default_prediction_table(),
        }
    }
}

impl MetricNames {
    #[must_use]
    pub fn prefix(&self, kind: PassKind) -> &str {
        match kind {
            PassKind::Validation => &self.validation_prefix,
            PassKind::Test => &self.test_prefix,
        }
    }

    /// Epoch-level MAE key, e.g. `val/mae`.
    #[must_use]
    pub fn mae_key(&self, kind: PassKind) -> String {
        format!("{}/{}", self.prefix(kind), self.mae)
    }

    /// Batch-level MAE key, e.g. `val/mae_step`.
    #[must_use]
    pub fn mae_step_key(&self, kind: PassKind) -> String {
        format!("{}/{}{}", self.prefix(kind), self.mae, self.step_suffix)
    }

    #[must_use]
    pub fn corr_key(&self, kind: PassKind) -> String {
        format!("{}/{}", self.prefix(kind), self.corr)
    }
}

/// Evaluation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Root directory for run artifacts.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub metrics: MetricNames,

    #[serde(default)]
    pub plot: PlotStyle,

    #[serde(default)]
    pub readout: ReadoutConfig,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum EvalConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<EvalConfigError> for EvalError {
    fn from(err: EvalConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type EvalConfigResult<T> = std::result::Result<T, EvalConfigError>;

impl EvalConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> EvalConfigResult<Self> {
        if !path.exists() {
            return Err(EvalConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EvalConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| EvalConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> EvalConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EvalConfigError::ParseError(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EvalConfigError::ReadError(format!("Failed to create directory: {}", e))
            })?;
        }

        std::fs::write(path, content)
            .map_err(|e| EvalConfigError::ReadError(format!("Failed to write file: {}", e)))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".kinodata")
            .join("eval.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("kinodata-eval.toml")
    }

    /// Discover and load configuration files.
    ///
    /// Loads the global config, then the local config on top of it, then
    /// applies environment overrides. Missing or unreadable files are skipped.
    pub fn discover_and_load() -> Self {
        let mut config = Self::default();

        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(file_config) => config.merge(&file_config),
                Err(EvalConfigError::NotFound(_)) => {}
                Err(e) => tracing::warn!(error = %e, "ignoring configuration file"),
            }
        }

        config.apply_env_overrides();
        config
    }

    /// Merge another configuration into this one.
    ///
    /// Sections of `other` that differ from their defaults replace ours.
    pub fn merge(&mut self, other: &Self) {
        if other.metrics != MetricNames::default() {
            self.metrics = other.metrics.clone();
        }
        if other.plot != PlotStyle::default() {
            self.plot = other.plot.clone();
        }
        if other.readout != ReadoutConfig::default() {
            self.readout = other.readout.clone();
        }
        if let Some(ref output_dir) = other.output_dir {
            self.output_dir = Some(output_dir.clone());
        }
    }

    /// Apply `KINODATA_OUTPUT_DIR` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.output_dir = Some(PathBuf::from(dir));
            }
        }
    }

    /// Output root, falling back to `./kinodata-runs`.
    #[must_use]
    pub fn output_root(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("kinodata-runs"))
    }

    pub fn validate(&self) -> EvalConfigResult<()> {
        let names = &self.metrics;
        for (key, value) in [
            ("metrics.validation_prefix", &names.validation_prefix),
            ("metrics.test_prefix", &names.test_prefix),
            ("metrics.mae", &names.mae),
            ("metrics.corr", &names.corr),
            ("metrics.scatter_image", &names.scatter_image),
            ("metrics.prediction_table", &names.prediction_table),
        ] {
            if value.trim().is_empty() {
                return Err(EvalConfigError::InvalidValue(format!("{key} must not be empty")));
            }
        }
        if names.validation_prefix == names.test_prefix {
            return Err(EvalConfigError::InvalidValue(
                "metrics.validation_prefix and metrics.test_prefix must differ".to_string(),
            ));
        }
        if self.plot.width == 0 || self.plot.height == 0 {
            return Err(EvalConfigError::InvalidValue(
                "plot width and height must be >= 1".to_string(),
            ));
        }
        self.readout.validate().map_err(|e| EvalConfigError::InvalidValue(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readout::{Aggregation, Pooling};
    use tempfile::TempDir;

    #[test]
    fn test_default_metric_keys() {
        let names = MetricNames::default();
        assert_eq!(names.mae_key(PassKind::Validation), "val/mae");
        assert_eq!(names.corr_key(PassKind::Test), "test/corr");
        assert_eq!(names.mae_step_key(PassKind::Validation), "val/mae_step");
        assert_eq!(names.scatter_image, "scatter_val");
        assert_eq!(names.prediction_table, "test_predictions");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EvalConfig = toml::from_str(
            r#"
            output_dir = "runs"

            [plot]
            width = 800

            [readout]
            node_types = ["ligand"]
            aggregation = "max"
            "#,
        )
        .unwrap();
        assert_eq!(config.plot.width, 800);
        assert_eq!(config.plot.height, 480);
        assert_eq!(config.metrics, MetricNames::default());
        assert_eq!(config.readout.aggregation, Aggregation::Max);
        assert_eq!(config.readout.pooling, Pooling::default());
        assert_eq!(config.output_root(), PathBuf::from("runs"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("eval.toml");
        let mut config = EvalConfig::default();
        config.metrics.validation_prefix = "valid".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = EvalConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_reports_missing_and_invalid_files() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.toml");
        assert!(matches!(EvalConfig::load_from_file(&missing), Err(EvalConfigError::NotFound(_))));

        let bad = temp.path().join("bad.toml");
        std::fs::write(&bad, "[plot]\nwidth = \"wide\"\n").unwrap();
        assert!(matches!(EvalConfig::load_from_file(&bad), Err(EvalConfigError::ParseError(_))));

        let zero = temp.path().join("zero.toml");
        std::fs::write(&zero, "[plot]\nheight = 0\n").unwrap();
        assert!(matches!(EvalConfig::load_from_file(&zero), Err(EvalConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_validate_rejects_shared_prefix() {
        let mut config = EvalConfig::default();
        config.metrics.test_prefix = "val".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_overrides_non_default_sections() {
        let mut base = EvalConfig::default();
        let mut other = EvalConfig::default();
        other.plot.point_radius = 4;
        other.output_dir = Some(PathBuf::from("/tmp/runs"));

        base.merge(&other);
        assert_eq!(base.plot.point_radius, 4);
        assert_eq!(base.metrics, MetricNames::default());
        assert_eq!(base.output_dir, Some(PathBuf::from("/tmp/runs")));
    }
}
