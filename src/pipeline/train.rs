//! Training pipeline

use super::{build_user_features, PipelineConfig, StageCounts};
use crate::error::{GenderError, Result};
use crate::export::{save_model, ModelMetadata};
use crate::features::{FeatureEncoder, TableSource, UserFeatures, FEATURE_NAMES};
use crate::training::{train_test_split, ModelMetrics, RandomForest};
use chrono::Utc;
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Summary of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub stages: StageCounts,
    /// Users with a defined target
    pub labeled_users: usize,
    /// Users dropped for lacking a target
    pub dropped_users: usize,
    pub n_train: usize,
    pub n_validation: usize,
    /// Scores on the held-out partition
    pub metrics: ModelMetrics,
    /// Features ranked by importance, highest first
    pub feature_importances: Vec<(String, f64)>,
    /// Where the model was written, if it was
    pub model_path: Option<PathBuf>,
}

/// Fitted forest with the metadata that goes into the model file
pub struct TrainedModel {
    pub forest: RandomForest,
    pub metadata: ModelMetadata,
    pub report: TrainReport,
}

/// Fits the gender classifier on labeled event logs
pub struct TrainPipeline {
    config: PipelineConfig,
}

impl TrainPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fit and persist the model to `config.model_path`
    pub fn run(&self, source: &dyn TableSource) -> Result<TrainReport> {
        let TrainedModel {
            forest,
            metadata,
            mut report,
        } = self.fit(source)?;

        save_model(&forest, &self.config.model_path, metadata)?;
        report.model_path = Some(self.config.model_path.clone());
        Ok(report)
    }

    /// Fit without writing anything to disk
    pub fn fit(&self, source: &dyn TableSource) -> Result<TrainedModel> {
        self.config.validate()?;

        let events = source.events()?;
        let labels = source.labels()?;
        let referers = source.referer_vectors()?;
        let geo = source.geo_info()?;
        info!(
            events = events.len(),
            labels = labels.len(),
            referers = referers.len(),
            geo = geo.len(),
            "Loaded training tables"
        );

        let (users, stages) =
            build_user_features(events, Some(&labels), &referers, &geo, self.config.time_zone);

        let labeled: Vec<UserFeatures> = users.into_iter().filter(|u| u.target.is_some()).collect();
        let dropped_users = stages.users - labeled.len();
        info!(
            labeled_users = labeled.len(),
            dropped_users,
            "Dropped users without a target"
        );
        if labeled.is_empty() {
            return Err(GenderError::ValidationError(
                "No user has a target label, nothing to train on".to_string(),
            ));
        }

        let x = FeatureEncoder::new().fit_encode(&labeled)?;
        let y: Array1<f64> = labeled.iter().filter_map(|u| u.target).collect();

        let split = train_test_split(labeled.len(), self.config.validation_split, self.config.split_seed)?;
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_val = x.select(Axis(0), &split.test_indices);
        let y_val = y.select(Axis(0), &split.test_indices);
        info!(
            train = split.train_indices.len(),
            validation = split.test_indices.len(),
            "Split labeled users"
        );

        let mut forest = self.config.forest.build();
        let started = Instant::now();
        forest.fit(&x_train, &y_train)?;
        let elapsed = started.elapsed().as_secs_f64();
        info!(
            trees = forest.n_trees(),
            classes = forest.classes().len(),
            secs = elapsed,
            "Random forest fitted"
        );

        let mut metrics = if split.test_indices.is_empty() {
            ModelMetrics::new()
        } else {
            ModelMetrics::compute_classification(&y_val, &forest.predict(&x_val)?)
        };
        metrics.training_time_secs = elapsed;
        metrics.n_features = x.ncols();
        info!(
            accuracy = ?metrics.accuracy,
            precision = ?metrics.precision,
            recall = ?metrics.recall,
            f1 = ?metrics.f1_score,
            "Validation metrics"
        );

        let feature_importances = ranked_importances(&forest);
        for (name, score) in feature_importances.iter().take(5) {
            debug!(feature = %name, importance = score, "Top feature");
        }

        let metadata = self
            .config
            .forest
            .to_pairs()
            .into_iter()
            .fold(ModelMetadata::new("visitor_gender"), |meta, (k, v)| {
                meta.add_hyperparameter(k, v)
            })
            .with_model_type("random_forest")
            .with_features(FEATURE_NAMES)
            .with_target("target")
            .with_training_samples(x_train.nrows())
            .with_trained_at(Utc::now())
            .with_metrics(metrics.to_map());

        let report = TrainReport {
            stages,
            labeled_users: labeled.len(),
            dropped_users,
            n_train: split.train_indices.len(),
            n_validation: split.test_indices.len(),
            metrics,
            feature_importances,
            model_path: None,
        };

        Ok(TrainedModel {
            forest,
            metadata,
            report,
        })
    }
}

fn ranked_importances(forest: &RandomForest) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = forest
        .feature_importances()
        .map(|imp| {
            FEATURE_NAMES
                .iter()
                .zip(imp.iter())
                .map(|(name, &score)| (name.to_string(), score))
                .collect()
        })
        .unwrap_or_default();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
