//! Record joiner: left joins of events against the side tables

use super::types::{CategoryValue, EventRecord, GeoInfo, JoinedEvent, LabelRecord, ReferrerVector};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

/// Index a side table by key, keeping every row per key in table order
fn index_by<K, T, F>(rows: &[T], key: F) -> HashMap<K, Vec<&T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, Vec<&T>> = HashMap::with_capacity(rows.len());
    for row in rows {
        index.entry(key(row)).or_default().push(row);
    }
    index
}

fn duplicated_keys<K, T>(index: &HashMap<K, Vec<T>>) -> usize {
    index.values().filter(|rows| rows.len() > 1).count()
}

/// Left join labels onto events by `user_id`
///
/// A user with several label rows fans out into one event per label row.
pub fn attach_labels(events: Vec<EventRecord>, labels: &[LabelRecord]) -> Vec<(EventRecord, Option<f64>)> {
    let index = index_by(labels, |l| l.user_id.clone());
    let dups = duplicated_keys(&index);
    if dups > 0 {
        warn!(duplicated_users = dups, "Label table has repeated user ids, events will fan out");
    }

    let mut out = Vec::with_capacity(events.len());
    for event in events {
        match index.get(&event.user_id) {
            Some(matches) => {
                for label in matches {
                    out.push((event.clone(), label.target));
                }
            }
            None => out.push((event, None)),
        }
    }
    out
}

/// Left join events with referer vectors on `referer`, then with geo info on `geo_id`
///
/// Row count equals the event count when both side tables have unique keys.
/// Duplicated side-table keys fan out like a relational join.
pub fn join_events(
    events: Vec<(EventRecord, Option<f64>)>,
    referers: &[ReferrerVector],
    geo: &[GeoInfo],
) -> Vec<JoinedEvent> {
    let referer_index = index_by(referers, |r| r.referer.clone());
    let geo_index = index_by(geo, |g| g.geo_id.clone());

    let ref_dups = duplicated_keys(&referer_index);
    let geo_dups = duplicated_keys(&geo_index);
    if ref_dups > 0 || geo_dups > 0 {
        warn!(
            duplicated_referers = ref_dups,
            duplicated_geo_ids = geo_dups,
            "Side tables have repeated keys, joined rows will fan out"
        );
    }

    let n_events = events.len();
    let mut with_referer = Vec::with_capacity(n_events);
    let mut referer_misses = 0usize;

    for (event, target) in events {
        match lookup(&referer_index, event.referer.as_ref()) {
            Some(matches) => {
                for vector in matches {
                    let mut row = JoinedEvent::unmatched(event.clone(), target);
                    row.components = vector.components;
                    with_referer.push(row);
                }
            }
            None => {
                referer_misses += 1;
                with_referer.push(JoinedEvent::unmatched(event, target));
            }
        }
    }

    let mut joined = Vec::with_capacity(with_referer.len());
    let mut geo_misses = 0usize;

    for row in with_referer {
        match lookup(&geo_index, row.event.geo_id.as_ref()) {
            Some(matches) => {
                for info in matches {
                    let mut out = row.clone();
                    out.country_id = info.country_id.clone();
                    out.region_id = info.region_id.clone();
                    out.timezone_id = info.timezone_id.clone();
                    joined.push(out);
                }
            }
            None => {
                geo_misses += 1;
                joined.push(row);
            }
        }
    }

    debug!(
        events = n_events,
        joined = joined.len(),
        referer_misses,
        geo_misses,
        "Joined side tables"
    );

    joined
}

fn lookup<'a, T>(
    index: &'a HashMap<CategoryValue, Vec<&'a T>>,
    key: Option<&CategoryValue>,
) -> Option<&'a Vec<&'a T>> {
    key.and_then(|k| index.get(k))
}
