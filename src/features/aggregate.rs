//! Per-user aggregation
//!
//! Reduces enriched events to one [`UserFeatures`] row per `user_id`:
//!
//! | column | reduction |
//! |---|---|
//! | component0..9 | mean, ignoring missing values |
//! | request count | number of non-null timestamps |
//! | referer, geo, browser, os, country, region, timezone | [`safe_mode`] |
//! | hour, day of week | mean |
//! | target | first non-null value |

use super::types::{CategoryValue, EnrichedEvent, UserFeatures};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::info;

/// Most frequent non-null value
///
/// Ties resolve to the lowest value under the type's ordering. A column
/// with no non-null values yields `None`.
pub fn safe_mode<'a, T, I>(values: I) -> Option<T>
where
    T: Ord + Clone + 'a,
    I: IntoIterator<Item = Option<&'a T>>,
{
    let mut counts: BTreeMap<&T, usize> = BTreeMap::new();
    for value in values.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut best: Option<(&T, usize)> = None;
    // ascending key order, so only a strictly larger count replaces the leader
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.clone())
}

/// Arithmetic mean of the present values, `None` if there are none
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn mean_i32<I>(values: I) -> f64
where
    I: IntoIterator<Item = i32>,
{
    let (sum, n) = values
        .into_iter()
        .fold((0i64, 0usize), |(s, n), v| (s + v as i64, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum as f64 / n as f64
    }
}

fn mode_by<F>(rows: &[&EnrichedEvent], field: F) -> Option<CategoryValue>
where
    F: Fn(&EnrichedEvent) -> Option<&CategoryValue>,
{
    safe_mode(rows.iter().map(|&r| field(r)))
}

fn reduce_user(user_id: &str, rows: &[&EnrichedEvent]) -> UserFeatures {
    let components = std::array::from_fn(|i| {
        mean_present(rows.iter().map(|r| r.joined.components[i]))
    });

    UserFeatures {
        user_id: user_id.to_string(),
        components,
        request_count: rows.iter().filter(|r| r.joined.event.request_ts.is_some()).count(),
        referer: mode_by(rows, |r| r.joined.event.referer.as_ref()),
        geo_id: mode_by(rows, |r| r.joined.event.geo_id.as_ref()),
        hour: mean_i32(rows.iter().map(|r| r.hour)),
        day_of_week: mean_i32(rows.iter().map(|r| r.day_of_week)),
        browser: mode_by(rows, |r| r.browser.as_ref()),
        os: mode_by(rows, |r| r.os.as_ref()),
        country_id: mode_by(rows, |r| r.joined.country_id.as_ref()),
        region_id: mode_by(rows, |r| Some(&r.region_id)),
        timezone_id: mode_by(rows, |r| r.joined.timezone_id.as_ref()),
        target: rows.iter().find_map(|r| r.joined.target),
    }
}

/// Group events by user and reduce each group to one feature row
///
/// Output is sorted by `user_id`. Groups are reduced in parallel; the
/// result does not depend on scheduling.
pub fn aggregate_users(events: &[EnrichedEvent]) -> Vec<UserFeatures> {
    let mut groups: BTreeMap<&str, Vec<&EnrichedEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(event.user_id()).or_default().push(event);
    }

    let groups: Vec<(&str, Vec<&EnrichedEvent>)> = groups.into_iter().collect();

    let features: Vec<UserFeatures> = groups
        .par_iter()
        .map(|(user_id, rows)| reduce_user(user_id, rows))
        .collect();

    info!(events = events.len(), users = features.len(), "Aggregated events per user");

    features
}
