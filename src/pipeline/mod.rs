//! Training and inference orchestrators
//!
//! Both pipelines share the feature stages (join, extract, aggregate);
//! they differ in whether labels are attached and in what happens after
//! the per-user rows are encoded.

pub mod config;
pub mod predict;
pub mod train;

pub use config::{ForestConfig, PipelineConfig};
pub use predict::{PredictPipeline, PredictReport};
pub use train::{TrainPipeline, TrainReport};

use crate::features::{
    aggregate_users, attach_labels, enrich_events, join_events, EventRecord, ExtractionStats,
    GeoInfo, LabelRecord, ReferrerVector, TimeZoneMode, UserFeatures,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Row counts of the shared feature stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub events: usize,
    pub joined_rows: usize,
    pub users: usize,
    pub extraction: ExtractionStats,
}

/// Join, extract and aggregate; `labels` is `None` at inference time
pub(crate) fn build_user_features(
    events: Vec<EventRecord>,
    labels: Option<&[LabelRecord]>,
    referers: &[ReferrerVector],
    geo: &[GeoInfo],
    time_zone: TimeZoneMode,
) -> (Vec<UserFeatures>, StageCounts) {
    let n_events = events.len();

    let labeled = match labels {
        Some(labels) => attach_labels(events, labels),
        None => events.into_iter().map(|e| (e, None)).collect(),
    };

    let joined = join_events(labeled, referers, geo);
    let joined_rows = joined.len();
    info!(events = n_events, joined_rows, "Merged side tables");

    let (enriched, extraction) = enrich_events(joined, time_zone);
    let users = aggregate_users(&enriched);

    let counts = StageCounts {
        events: n_events,
        joined_rows,
        users: users.len(),
        extraction,
    };
    (users, counts)
}
