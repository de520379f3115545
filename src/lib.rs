//! Visitor gender - predict a visitor's gender from ad-request logs
//!
//! Event-level request logs are joined with referer embeddings and geo
//! metadata, enriched with browser, os and time-of-day fields, reduced to
//! one row per user and fed to a random forest classifier.
//!
//! # Modules
//!
//! - [`features`] - table records, joins, per-event extraction, per-user
//!   aggregation and categorical encoding
//! - [`training`] - decision trees, random forests, holdout split, metrics
//! - [`export`] - checksummed model files
//! - [`pipeline`] - training and inference orchestrators and their config
//! - [`utils`] - CSV loading and saving
//! - [`cli`] - command-line interface

pub mod error;

pub mod features;
pub mod training;
pub mod export;
pub mod pipeline;
pub mod utils;
pub mod cli;

pub use error::{GenderError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{GenderError, Result};
    pub use crate::features::{
        CsvTableSource, FeatureEncoder, InMemoryTableSource, TablePaths, TableSource,
        TimeZoneMode, UserFeatures, FEATURE_NAMES,
    };
    pub use crate::pipeline::{
        ForestConfig, PipelineConfig, PredictPipeline, PredictReport, TrainPipeline, TrainReport,
    };
    pub use crate::training::{ModelMetrics, RandomForest};
}
