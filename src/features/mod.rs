//! Feature engineering for visitor gender prediction
//!
//! Stages, in pipeline order:
//! - [`tables`] - typed records loaded from the five input tables
//! - [`join`] - left joins against referer vectors and geo info
//! - [`extract`] - browser, os, hour, weekday and region fill per event
//! - [`aggregate`] - one row per user
//! - [`encoder`] - categorical codes and the dense feature matrix

pub mod agent;
pub mod aggregate;
pub mod encoder;
pub mod extract;
pub mod join;
pub mod tables;
pub mod types;

pub use agent::{parse_literal, parse_user_agent, Literal, LiteralError};
pub use aggregate::{aggregate_users, mean_present, safe_mode};
pub use encoder::{
    CategoricalColumn, CategoryCodebook, FeatureEncoder, FEATURE_NAMES, MISSING_CODE, N_FEATURES,
};
pub use extract::{
    day_of_week, enrich_events, fill_region, hour_of_day, ExtractionStats, TimeZoneMode,
    INVALID_TIME,
};
pub use join::{attach_labels, join_events};
pub use tables::{CsvTableSource, InMemoryTableSource, TablePaths, TableSource};
pub use types::{
    CategoryValue, EnrichedEvent, EventRecord, GeoInfo, JoinedEvent, LabelRecord, ReferrerVector,
    UserFeatures, N_COMPONENTS, UNKNOWN,
};
