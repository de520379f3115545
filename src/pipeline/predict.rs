//! Inference pipeline

use super::{build_user_features, PipelineConfig, StageCounts};
use crate::error::{GenderError, Result};
use crate::export::{load_model, ModelMetadata};
use crate::features::{FeatureEncoder, TableSource, UserFeatures, FEATURE_NAMES};
use crate::training::RandomForest;
use crate::utils::DataSaver;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

/// Summary of an inference run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictReport {
    pub stages: StageCounts,
    /// Entries in the target-user list, duplicates included
    pub target_users: usize,
    /// Target entries with no events, hence no prediction
    pub missing_users: usize,
    /// `(user_id, predicted class)` in target-list order
    pub predictions: Vec<(String, f64)>,
    /// Where predictions were written, if they were
    pub output_path: Option<PathBuf>,
}

/// Scores target users with a previously trained model
pub struct PredictPipeline {
    config: PipelineConfig,
}

impl PredictPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Score and write `user_id;target` rows to `config.predictions_path`
    pub fn run(&self, source: &dyn TableSource) -> Result<PredictReport> {
        let mut report = self.predict(source)?;

        let mut frame = predictions_frame(&report.predictions)?;
        DataSaver::save_csv(&mut frame, &self.config.predictions_path, self.config.delimiter_byte())?;
        info!(
            rows = frame.height(),
            path = %self.config.predictions_path.display(),
            "Predictions written"
        );

        report.output_path = Some(self.config.predictions_path.clone());
        Ok(report)
    }

    /// Score without writing anything to disk
    pub fn predict(&self, source: &dyn TableSource) -> Result<PredictReport> {
        self.config.validate()?;

        let events = source.events()?;
        let referers = source.referer_vectors()?;
        let geo = source.geo_info()?;
        let targets = source.target_users()?;
        info!(
            events = events.len(),
            target_users = targets.len(),
            "Loaded inference tables"
        );

        let (users, stages) =
            build_user_features(events, None, &referers, &geo, self.config.time_zone);

        let wanted: HashSet<&str> = targets.iter().map(String::as_str).collect();
        let users: Vec<UserFeatures> = users
            .into_iter()
            .filter(|u| wanted.contains(u.user_id.as_str()))
            .collect();
        info!(users = users.len(), "Restricted to target users");

        // Codes come from this dataset alone, see the encoder docs
        let x = FeatureEncoder::new().fit_encode(&users)?;

        let (forest, metadata): (RandomForest, ModelMetadata) = load_model(&self.config.model_path)?;
        check_features(&metadata, &forest)?;
        info!(
            model = %metadata.name,
            trained_at = %metadata.trained_at,
            trees = forest.n_trees(),
            "Model loaded"
        );

        let scores = forest.predict(&x)?;
        let by_user: HashMap<&str, f64> = users
            .iter()
            .map(|u| u.user_id.as_str())
            .zip(scores.iter().copied())
            .collect();

        let mut predictions = Vec::with_capacity(targets.len());
        let mut missing_users = 0usize;
        for user_id in &targets {
            match by_user.get(user_id.as_str()) {
                Some(&score) => predictions.push((user_id.clone(), score)),
                None => missing_users += 1,
            }
        }
        if missing_users > 0 {
            warn!(missing_users, "Target users without events get no prediction");
        }

        Ok(PredictReport {
            stages,
            target_users: targets.len(),
            missing_users,
            predictions,
            output_path: None,
        })
    }
}

/// The model must expect exactly the columns the encoder produces
fn check_features(metadata: &ModelMetadata, forest: &RandomForest) -> Result<()> {
    let expected = FEATURE_NAMES.len();
    if metadata.feature_names.len() != expected || forest.n_features() != expected {
        return Err(GenderError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!(
                "{} in metadata, {} in model",
                metadata.feature_names.len(),
                forest.n_features()
            ),
        });
    }
    Ok(())
}

/// Two-column `user_id`, `target` frame; classes are always written as integers
fn predictions_frame(predictions: &[(String, f64)]) -> Result<DataFrame> {
    let ids: Vec<&str> = predictions.iter().map(|(id, _)| id.as_str()).collect();
    let classes: Vec<i64> = predictions.iter().map(|(_, p)| p.round() as i64).collect();

    Ok(DataFrame::new(vec![
        Series::new("user_id".into(), ids).into(),
        Series::new("target".into(), classes).into(),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predictions_frame_integral() {
        let frame = predictions_frame(&[("a".to_string(), 1.0), ("b".to_string(), 0.0)]).unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.column("target").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_predictions_frame_non_integral_is_int64() {
        let frame = predictions_frame(&[("a".to_string(), 0.9), ("b".to_string(), 2.0)]).unwrap();
        let target = frame.column("target").unwrap();
        assert_eq!(target.dtype(), &DataType::Int64);
        let values: Vec<Option<i64>> = target.i64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_predictions_frame_empty() {
        let frame = predictions_frame(&[]).unwrap();
        assert_eq!(frame.height(), 0);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.column("target").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_check_features() {
        let metadata = ModelMetadata::new("m").with_features(["only_one"]);
        let err = check_features(&metadata, &RandomForest::new(1)).unwrap_err();
        assert!(matches!(err, GenderError::ShapeError { .. }));
    }
}
