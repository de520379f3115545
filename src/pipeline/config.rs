//! Pipeline configuration

use crate::error::{GenderError, Result};
use crate::features::{TablePaths, TimeZoneMode};
use crate::training::{Criterion, MaxFeatures, RandomForest};
use crate::utils::{DataLoader, DEFAULT_DELIMITER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth, unlimited when `None`
    pub max_depth: Option<usize>,
    /// Minimum samples to split a node
    pub min_samples_split: usize,
    /// Minimum samples in a leaf
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: MaxFeatures,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Base seed; tree `i` uses `random_state + i`
    pub random_state: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: 42,
        }
    }
}

impl ForestConfig {
    /// Unfitted forest with these hyperparameters
    pub fn build(&self) -> RandomForest {
        RandomForest::new(self.n_estimators)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_bootstrap(self.bootstrap)
            .with_criterion(self.criterion)
            .with_random_state(self.random_state)
    }

    /// Hyperparameters as printable key/value pairs
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("n_estimators", self.n_estimators.to_string()),
            (
                "max_depth",
                self.max_depth.map_or_else(|| "none".to_string(), |d| d.to_string()),
            ),
            ("min_samples_split", self.min_samples_split.to_string()),
            ("min_samples_leaf", self.min_samples_leaf.to_string()),
            ("max_features", format!("{:?}", self.max_features)),
            ("bootstrap", self.bootstrap.to_string()),
            ("criterion", format!("{:?}", self.criterion)),
            ("random_state", self.random_state.to_string()),
        ]
    }
}

/// Configuration shared by the training and inference pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Field separator of every input and output table
    pub delimiter: char,
    /// Time zone used for hour and weekday
    pub time_zone: TimeZoneMode,
    /// Classifier hyperparameters
    pub forest: ForestConfig,
    /// Share of labeled users held out for validation
    pub validation_split: f64,
    /// Seed of the holdout shuffle
    pub split_seed: u64,
    /// Directory holding the input tables
    pub data_dir: PathBuf,
    /// Model file
    pub model_path: PathBuf,
    /// Predictions file
    pub predictions_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER as char,
            time_zone: TimeZoneMode::Local,
            forest: ForestConfig::default(),
            validation_split: 0.2,
            split_seed: 42,
            data_dir: PathBuf::from("."),
            model_path: PathBuf::from("random_forest_model.bin"),
            predictions_path: PathBuf::from("preds.csv"),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GenderError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            GenderError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_time_zone(mut self, time_zone: TimeZoneMode) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    pub fn with_validation_split(mut self, fraction: f64) -> Self {
        self.validation_split = fraction;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_predictions_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.predictions_path = path.into();
        self
    }

    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(invalid("delimiter", self.delimiter, "must be a single ASCII character"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(invalid("validation_split", self.validation_split, "must be in [0, 1)"));
        }
        if self.forest.n_estimators == 0 {
            return Err(invalid("forest.n_estimators", 0, "must be at least 1"));
        }
        if self.forest.min_samples_split == 0 {
            return Err(invalid("forest.min_samples_split", 0, "must be at least 1"));
        }
        if self.forest.min_samples_leaf == 0 {
            return Err(invalid("forest.min_samples_leaf", 0, "must be at least 1"));
        }
        if let MaxFeatures::Fraction(f) = self.forest.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(invalid("forest.max_features", f, "fraction must be in (0, 1]"));
            }
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(DEFAULT_DELIMITER)
    }

    /// CSV loader honoring the configured delimiter
    pub fn loader(&self) -> DataLoader {
        DataLoader::new().with_delimiter(self.delimiter_byte())
    }

    /// Training tables inside `data_dir`
    pub fn training_tables(&self) -> TablePaths {
        TablePaths::training(&self.data_dir)
    }

    /// Inference tables inside `data_dir`
    pub fn inference_tables(&self) -> TablePaths {
        TablePaths::inference(&self.data_dir)
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> GenderError {
    GenderError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.delimiter_byte(), b';');
        assert_eq!(config.forest.n_estimators, 100);
        assert_eq!(config.forest.random_state, 42);
        assert_eq!(config.validation_split, 0.2);
        assert_eq!(config.time_zone, TimeZoneMode::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        assert!(PipelineConfig::new().with_validation_split(1.0).validate().is_err());
        assert!(PipelineConfig::new().with_delimiter('é').validate().is_err());

        let mut config = PipelineConfig::new();
        config.forest.n_estimators = 0;
        assert!(matches!(
            config.validate(),
            Err(GenderError::InvalidParameter { .. })
        ));

        let mut config = PipelineConfig::new();
        config.forest.min_samples_split = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"delimiter": ",", "time_zone": "Utc", "forest": {{"n_estimators": 10}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.delimiter_byte(), b',');
        assert_eq!(config.time_zone, TimeZoneMode::Utc);
        assert_eq!(config.forest.n_estimators, 10);
        assert_eq!(config.forest.random_state, 42);
        assert_eq!(config.split_seed, 42);
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, GenderError::ConfigError(_)));
    }

    #[test]
    fn test_forest_build() {
        let forest = ForestConfig {
            n_estimators: 7,
            max_depth: Some(3),
            ..Default::default()
        }
        .build();
        assert_eq!(forest.n_estimators, 7);
        assert_eq!(forest.max_depth, Some(3));
        assert_eq!(forest.random_state, 42);
    }

    #[test]
    fn test_table_layout() {
        let config = PipelineConfig::new().with_data_dir("/data");
        assert_eq!(config.training_tables().events, PathBuf::from("/data/train.csv"));
        assert_eq!(config.inference_tables().events, PathBuf::from("/data/test.csv"));
        assert_eq!(config.inference_tables().target_users, PathBuf::from("/data/test_users.csv"));
    }
}
