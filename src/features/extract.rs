//! Per-event field extraction
//!
//! Every extractor is a pure function that substitutes a sentinel instead of
//! failing. [`enrich_events`] applies them row by row and counts how often a
//! fallback was needed.

use super::agent::parse_user_agent;
use super::types::{CategoryValue, EnrichedEvent, JoinedEvent};
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Sentinel for hour/weekday when the timestamp cannot be converted
pub const INVALID_TIME: i32 = -1;

/// Latest calendar year a timestamp may map to
const MAX_YEAR: i32 = 9999;

/// Time zone used to derive wall-clock fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeZoneMode {
    /// Time zone of the machine running the pipeline
    #[default]
    Local,
    /// Coordinated universal time
    Utc,
    /// Fixed offset east of UTC, in seconds
    FixedOffset(i32),
}

impl TimeZoneMode {
    /// Wall-clock time of an epoch timestamp, `None` when out of range
    pub fn wall_clock(&self, ts: i64) -> Option<NaiveDateTime> {
        if ts < 0 {
            return None;
        }
        let utc = DateTime::from_timestamp(ts, 0)?;
        let naive = match self {
            TimeZoneMode::Local => utc.with_timezone(&Local).naive_local(),
            TimeZoneMode::Utc => utc.naive_utc(),
            TimeZoneMode::FixedOffset(secs) => {
                utc.with_timezone(&FixedOffset::east_opt(*secs)?).naive_local()
            }
        };
        (naive.year() <= MAX_YEAR).then_some(naive)
    }
}

/// Hour of day (0-23), or -1
pub fn hour_of_day(ts: Option<i64>, tz: TimeZoneMode) -> i32 {
    ts.and_then(|ts| tz.wall_clock(ts))
        .map(|dt| dt.hour() as i32)
        .unwrap_or(INVALID_TIME)
}

/// Day of week with Monday = 0 and Sunday = 6, or -1
pub fn day_of_week(ts: Option<i64>, tz: TimeZoneMode) -> i32 {
    ts.and_then(|ts| tz.wall_clock(ts))
        .map(|dt| dt.weekday().num_days_from_monday() as i32)
        .unwrap_or(INVALID_TIME)
}

/// Replace a missing region with "unknown"
pub fn fill_region(region: Option<CategoryValue>) -> CategoryValue {
    region.unwrap_or_else(CategoryValue::unknown)
}

/// Counts of rows that needed a fallback value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub rows: usize,
    pub unparsed_agents: usize,
    pub invalid_timestamps: usize,
    pub filled_regions: usize,
}

/// Derive browser, os, hour, weekday and filled region for every row
pub fn enrich_events(rows: Vec<JoinedEvent>, tz: TimeZoneMode) -> (Vec<EnrichedEvent>, ExtractionStats) {
    let mut stats = ExtractionStats {
        rows: rows.len(),
        ..Default::default()
    };

    let enriched = rows
        .into_iter()
        .map(|joined| {
            let (browser, os) = match joined.event.user_agent.as_deref() {
                Some(raw) => parse_user_agent(raw),
                None => (Some(CategoryValue::unknown()), Some(CategoryValue::unknown())),
            };
            let unknown = Some(CategoryValue::unknown());
            if browser == unknown && os == unknown {
                stats.unparsed_agents += 1;
            }

            let hour = hour_of_day(joined.event.request_ts, tz);
            let day_of_week = day_of_week(joined.event.request_ts, tz);
            if hour == INVALID_TIME {
                stats.invalid_timestamps += 1;
            }

            if joined.region_id.is_none() {
                stats.filled_regions += 1;
            }
            let region_id = fill_region(joined.region_id.clone());

            EnrichedEvent {
                joined,
                browser,
                os,
                hour,
                day_of_week,
                region_id,
            }
        })
        .collect();

    info!(
        rows = stats.rows,
        unparsed_agents = stats.unparsed_agents,
        invalid_timestamps = stats.invalid_timestamps,
        filled_regions = stats.filled_regions,
        "Feature extraction complete"
    );

    (enriched, stats)
}
