//! Record types flowing through the feature pipeline

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Number of referer embedding components
pub const N_COMPONENTS: usize = 10;

/// Placeholder for missing categorical values
pub const UNKNOWN: &str = "unknown";

/// A categorical cell
///
/// Integer-looking cells keep their numeric identity so that ordering is
/// numeric (`9 < 10`). Every integer orders before every text value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryValue {
    Int(i64),
    Text(String),
}

impl CategoryValue {
    /// Parse a raw cell; empty cells are missing
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Some(CategoryValue::Int(v));
        }
        // "12.0" style cells come from float-typed exports of integer ids
        if let Ok(v) = raw.parse::<f64>() {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                return Some(CategoryValue::Int(v as i64));
            }
        }
        Some(CategoryValue::Text(raw.to_string()))
    }

    pub fn text(s: impl Into<String>) -> Self {
        CategoryValue::Text(s.into())
    }

    pub fn unknown() -> Self {
        CategoryValue::Text(UNKNOWN.to_string())
    }
}

impl Ord for CategoryValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CategoryValue::Int(a), CategoryValue::Int(b)) => a.cmp(b),
            (CategoryValue::Int(_), CategoryValue::Text(_)) => Ordering::Less,
            (CategoryValue::Text(_), CategoryValue::Int(_)) => Ordering::Greater,
            (CategoryValue::Text(a), CategoryValue::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for CategoryValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CategoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryValue::Int(v) => write!(f, "{}", v),
            CategoryValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CategoryValue {
    fn from(s: &str) -> Self {
        CategoryValue::Text(s.to_string())
    }
}

impl From<String> for CategoryValue {
    fn from(s: String) -> Self {
        CategoryValue::Text(s)
    }
}

impl From<i64> for CategoryValue {
    fn from(v: i64) -> Self {
        CategoryValue::Int(v)
    }
}

/// One ad-request as loaded from the event table
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub user_id: String,
    pub referer: Option<CategoryValue>,
    pub geo_id: Option<CategoryValue>,
    pub user_agent: Option<String>,
    pub request_ts: Option<i64>,
}

impl EventRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            referer: None,
            geo_id: None,
            user_agent: None,
            request_ts: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<CategoryValue>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_geo(mut self, geo_id: impl Into<CategoryValue>) -> Self {
        self.geo_id = Some(geo_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timestamp(mut self, ts: i64) -> Self {
        self.request_ts = Some(ts);
        self
    }
}

/// Embedding of a referer URL
#[derive(Debug, Clone, PartialEq)]
pub struct ReferrerVector {
    pub referer: CategoryValue,
    pub components: [Option<f64>; N_COMPONENTS],
}

impl ReferrerVector {
    pub fn new(referer: impl Into<CategoryValue>, components: [f64; N_COMPONENTS]) -> Self {
        Self {
            referer: referer.into(),
            components: components.map(Some),
        }
    }
}

/// Geo metadata keyed by `geo_id`
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub geo_id: CategoryValue,
    pub country_id: Option<CategoryValue>,
    pub region_id: Option<CategoryValue>,
    pub timezone_id: Option<CategoryValue>,
}

impl GeoInfo {
    pub fn new(
        geo_id: impl Into<CategoryValue>,
        country_id: Option<CategoryValue>,
        region_id: Option<CategoryValue>,
        timezone_id: Option<CategoryValue>,
    ) -> Self {
        Self {
            geo_id: geo_id.into(),
            country_id,
            region_id,
            timezone_id,
        }
    }
}

/// Training label for a user
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub user_id: String,
    pub target: Option<f64>,
}

impl LabelRecord {
    pub fn new(user_id: impl Into<String>, target: f64) -> Self {
        Self {
            user_id: user_id.into(),
            target: Some(target),
        }
    }
}

/// Event after the side-table joins
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedEvent {
    pub event: EventRecord,
    pub target: Option<f64>,
    pub components: [Option<f64>; N_COMPONENTS],
    pub country_id: Option<CategoryValue>,
    pub region_id: Option<CategoryValue>,
    pub timezone_id: Option<CategoryValue>,
}

impl JoinedEvent {
    /// An event with no side-table matches
    pub fn unmatched(event: EventRecord, target: Option<f64>) -> Self {
        Self {
            event,
            target,
            components: [None; N_COMPONENTS],
            country_id: None,
            region_id: None,
            timezone_id: None,
        }
    }
}

/// Joined event with the derived per-row fields
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub joined: JoinedEvent,
    /// `None` when the descriptor holds `None` for the field
    pub browser: Option<CategoryValue>,
    pub os: Option<CategoryValue>,
    pub hour: i32,
    pub day_of_week: i32,
    /// Region after filling missing values with "unknown"
    pub region_id: CategoryValue,
}

impl EnrichedEvent {
    pub fn user_id(&self) -> &str {
        &self.joined.event.user_id
    }
}

/// One aggregated feature row per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeatures {
    pub user_id: String,
    pub components: [Option<f64>; N_COMPONENTS],
    pub request_count: usize,
    pub referer: Option<CategoryValue>,
    pub geo_id: Option<CategoryValue>,
    pub hour: f64,
    pub day_of_week: f64,
    pub browser: Option<CategoryValue>,
    pub os: Option<CategoryValue>,
    pub country_id: Option<CategoryValue>,
    pub region_id: Option<CategoryValue>,
    pub timezone_id: Option<CategoryValue>,
    /// First observed label; only populated by the training pipeline
    pub target: Option<f64>,
}
