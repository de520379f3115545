//! Model file format
//!
//! A model file is a bincode-encoded [`SerializedModel`]: magic bytes,
//! format version, [`ModelMetadata`], the bincode payload of the model
//! itself and an FNV-1a checksum of that payload.

use crate::error::{GenderError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,
    /// Crate version that wrote the file
    pub version: String,
    /// Training timestamp (RFC 3339)
    pub trained_at: String,
    /// Feature names, in matrix column order
    pub feature_names: Vec<String>,
    /// Target name
    pub target_name: String,
    /// Model type
    pub model_type: String,
    /// Rows the model was fitted on
    pub n_training_samples: usize,
    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
    /// Validation metrics
    pub metrics: BTreeMap<String, f64>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: String::new(),
            feature_names: Vec::new(),
            target_name: "target".to_string(),
            model_type: "unknown".to_string(),
            n_training_samples: 0,
            hyperparameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = model_type.into();
        self
    }

    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.feature_names = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = target.into();
        self
    }

    pub fn with_training_samples(mut self, n: usize) -> Self {
        self.n_training_samples = n;
        self
    }

    pub fn with_trained_at(mut self, at: DateTime<Utc>) -> Self {
        self.trained_at = at.to_rfc3339();
        self
    }

    pub fn add_hyperparameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.hyperparameters.insert(key.into(), value.to_string());
        self
    }

    pub fn with_metrics(mut self, metrics: BTreeMap<String, f64>) -> Self {
        self.metrics.extend(metrics);
        self
    }
}

/// On-disk envelope around a serialized model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModel {
    /// Magic bytes for format detection
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Model metadata
    pub metadata: ModelMetadata,
    /// Bincode payload of the model
    pub model_data: Vec<u8>,
    /// FNV-1a hash of `model_data`
    pub checksum: u64,
}

impl SerializedModel {
    pub const MAGIC: [u8; 4] = *b"GNDR";
    pub const VERSION: u32 = 1;

    pub fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    fn compute_checksum(data: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        data.iter().fold(FNV_OFFSET, |hash, &byte| {
            (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
        })
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.model_data) == self.checksum
    }

    /// Check magic, version and checksum
    pub fn validate(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(GenderError::ModelFormatError(format!(
                "unexpected magic bytes {:?}",
                self.magic
            )));
        }
        if self.format_version != Self::VERSION {
            return Err(GenderError::ModelFormatError(format!(
                "unsupported format version {} (expected {})",
                self.format_version,
                Self::VERSION
            )));
        }
        if !self.verify_checksum() {
            return Err(GenderError::ModelFormatError(
                "checksum mismatch, file may be corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Save a model with its metadata, creating parent directories as needed
pub fn save_model<M: Serialize>(model: &M, path: impl AsRef<Path>, metadata: ModelMetadata) -> Result<()> {
    let path = path.as_ref();
    let model_data = bincode::serialize(model)?;
    let serialized = SerializedModel::new(metadata, model_data);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bincode::serialize(&serialized)?)?;

    info!(
        path = %path.display(),
        bytes = serialized.model_data.len(),
        "Model saved"
    );
    Ok(())
}

/// Read and validate the envelope without decoding the model
pub fn read_envelope(path: impl AsRef<Path>) -> Result<SerializedModel> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;

    let serialized: SerializedModel = bincode::deserialize(&bytes)
        .map_err(|e| GenderError::ModelFormatError(format!("{}: {}", path.display(), e)))?;
    serialized.validate()?;

    debug!(path = %path.display(), model = %serialized.metadata.name, "Model envelope read");
    Ok(serialized)
}

/// Load a model and its metadata
pub fn load_model<M: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<(M, ModelMetadata)> {
    let serialized = read_envelope(path)?;
    let model: M = bincode::deserialize(&serialized.model_data)
        .map_err(|e| GenderError::ModelFormatError(format!("cannot decode model payload: {}", e)))?;
    Ok((model, serialized.metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestModel {
        weights: Vec<f64>,
        bias: f64,
    }

    fn sample() -> TestModel {
        TestModel {
            weights: vec![0.5, -1.25],
            bias: 3.0,
        }
    }

    #[test]
    fn test_checksum() {
        let mut serialized = SerializedModel::new(ModelMetadata::new("test"), vec![1, 2, 3, 4, 5]);
        assert!(serialized.verify_checksum());

        serialized.model_data[0] = 99;
        assert!(!serialized.verify_checksum());
        assert!(matches!(serialized.validate(), Err(GenderError::ModelFormatError(_))));
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = ModelMetadata::new("gender")
            .with_model_type("random_forest")
            .with_features(["x1", "x2"])
            .with_target("target")
            .add_hyperparameter("n_estimators", 100)
            .with_metrics(BTreeMap::from([("accuracy".to_string(), 0.9)]));

        assert_eq!(metadata.feature_names, vec!["x1", "x2"]);
        assert_eq!(metadata.hyperparameters["n_estimators"], "100");
        assert_eq!(metadata.metrics["accuracy"], 0.9);
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let metadata = ModelMetadata::new("test").with_features(["a", "b"]);

        save_model(&sample(), &path, metadata.clone()).unwrap();
        let (loaded, loaded_meta): (TestModel, _) = load_model(&path).unwrap();

        assert_eq!(loaded, sample());
        assert_eq!(loaded_meta, metadata);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"definitely not a model").unwrap();

        let err = load_model::<TestModel>(&path).unwrap_err();
        assert!(matches!(err, GenderError::ModelFormatError(_)));
    }

    #[test]
    fn test_load_rejects_wrong_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut serialized = SerializedModel::new(ModelMetadata::default(), vec![0; 4]);
        serialized.magic = *b"ZZZZ";
        fs::write(&path, bincode::serialize(&serialized).unwrap()).unwrap();

        let err = read_envelope(&path).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_model::<TestModel>("/nonexistent/model.bin").unwrap_err();
        assert!(matches!(err, GenderError::IoError(_)));
    }
}
