//! Integration test: feature stages (frames → records → join → extract → aggregate → encode)

use polars::prelude::*;
use visitor_gender::features::tables::{
    events_from_frame, geo_info_from_frame, labels_from_frame, referer_vectors_from_frame,
};
use visitor_gender::features::{
    aggregate_users, attach_labels, day_of_week, enrich_events, hour_of_day, join_events,
    parse_user_agent, safe_mode, CategoryValue, FeatureEncoder, TimeZoneMode, FEATURE_NAMES,
    INVALID_TIME, N_COMPONENTS,
};

fn events_frame() -> DataFrame {
    df!(
        "user_id" => &["u1", "u1", "u1", "u2"],
        "referer" => &["r1", "r2", "r1", "r3"],
        "geo_id" => &["10", "10", "10", "20"],
        "user_agent" => &[
            "{'browser': 'Chrome', 'os': 'Android'}",
            "{'browser': 'Chrome', 'os': 'Android'}",
            "not a dict",
            "{'browser': 'Safari', 'os': 'iOS'}",
        ],
        "request_ts" => &["1700000000", "1700003600", "1700007200", "-1"]
    )
    .unwrap()
}

fn referer_frame() -> DataFrame {
    let mut columns: Vec<Column> = vec![Series::new("referer".into(), &["r1", "r2"]).into()];
    for i in 0..N_COMPONENTS {
        let values = [format!("{}", i), format!("{}", i + 10)];
        columns.push(Series::new(format!("component{}", i).into(), &values).into());
    }
    DataFrame::new(columns).unwrap()
}

fn geo_frame() -> DataFrame {
    df!(
        "geo_id" => &["10"],
        "country_id" => &["1"],
        "region_id" => &[None::<&str>],
        "timezone_id" => &["3"]
    )
    .unwrap()
}

#[test]
fn test_stages_end_to_end() {
    let events = events_from_frame(&events_frame()).unwrap();
    let labels = labels_from_frame(&df!("user_id" => &["u1"], "target" => &["1"]).unwrap()).unwrap();
    let referers = referer_vectors_from_frame(&referer_frame()).unwrap();
    let geo = geo_info_from_frame(&geo_frame()).unwrap();

    let joined = join_events(attach_labels(events, &labels), &referers, &geo);
    assert_eq!(joined.len(), 4);

    let (enriched, stats) = enrich_events(joined, TimeZoneMode::Utc);
    assert_eq!(stats.unparsed_agents, 1);
    assert_eq!(stats.invalid_timestamps, 1);
    assert_eq!(stats.filled_regions, 4);

    let users = aggregate_users(&enriched);
    assert_eq!(users.len(), 2);

    let u1 = &users[0];
    assert_eq!(u1.user_id, "u1");
    assert_eq!(u1.referer, Some(CategoryValue::text("r1")));
    assert_eq!(u1.request_count, 3);
    assert_eq!(u1.browser, Some(CategoryValue::text("Chrome")));
    assert_eq!(u1.geo_id, Some(CategoryValue::Int(10)));
    assert_eq!(u1.region_id, Some(CategoryValue::unknown()));
    assert_eq!(u1.target, Some(1.0));
    // r1, r2, r1 -> component0 = (0 + 10 + 0) / 3
    assert!((u1.components[0].unwrap() - 10.0 / 3.0).abs() < 1e-12);
    // 22h, 23h, 0h UTC
    assert!((u1.hour - 15.0).abs() < 1e-12);

    let u2 = &users[1];
    assert_eq!(u2.components, [None; N_COMPONENTS]);
    assert_eq!(u2.hour, INVALID_TIME as f64);
    assert_eq!(u2.country_id, None);
    assert_eq!(u2.target, None);

    let x = FeatureEncoder::new().fit_encode(&users).unwrap();
    assert_eq!(x.dim(), (2, FEATURE_NAMES.len()));
    assert!(x[[1, 0]].is_nan());
    // country: u1 -> code 0, u2 missing -> -1
    assert_eq!(x[[0, 17]], 0.0);
    assert_eq!(x[[1, 17]], -1.0);
}

#[test]
fn test_agent_never_fails() {
    for raw in ["not a dict", "", "{", "{'browser': }", "\u{0}\u{1}", "[[[[", "{'os': 'Linux'}"] {
        let (browser, os) = parse_user_agent(raw);
        assert!(browser.is_some() && os.is_some());
    }
    assert_eq!(
        parse_user_agent("not a dict"),
        (Some(CategoryValue::unknown()), Some(CategoryValue::unknown()))
    );
}

#[test]
fn test_none_browser_encodes_as_missing() {
    let events = events_from_frame(
        &df!(
            "user_id" => &["a", "a", "b"],
            "referer" => &["r", "r", "r"],
            "geo_id" => &["1", "1", "1"],
            "user_agent" => &[
                "{'browser': None, 'os': 'Android'}",
                "{'browser': None, 'os': 'Android'}",
                "{'browser': 'Chrome', 'os': 'iOS'}",
            ],
            "request_ts" => &["0", "60", "120"]
        )
        .unwrap(),
    )
    .unwrap();
    let joined = join_events(events.into_iter().map(|e| (e, None)).collect(), &[], &[]);
    let (enriched, _) = enrich_events(joined, TimeZoneMode::Utc);
    let users = aggregate_users(&enriched);
    assert_eq!(users[0].browser, None);

    let x = FeatureEncoder::new().fit_encode(&users).unwrap();
    // browser column: "a" is missing, "Chrome" is the only category
    assert_eq!(x[[0, 15]], -1.0);
    assert_eq!(x[[1, 15]], 0.0);
}

#[test]
fn test_invalid_timestamps_give_sentinel() {
    for ts in [-1, i64::MAX] {
        assert_eq!(hour_of_day(Some(ts), TimeZoneMode::Local), -1);
        assert_eq!(day_of_week(Some(ts), TimeZoneMode::Local), -1);
    }
}

#[test]
fn test_aggregation_row_count() {
    let (empty, _) = enrich_events(Vec::new(), TimeZoneMode::Utc);
    assert!(aggregate_users(&empty).is_empty());

    let single = events_from_frame(
        &df!(
            "user_id" => &["only", "only"],
            "referer" => &["r", "r"],
            "geo_id" => &["1", "1"],
            "request_ts" => &["0", "60"]
        )
        .unwrap(),
    )
    .unwrap();
    let joined = join_events(single.into_iter().map(|e| (e, None)).collect(), &[], &[]);
    let (enriched, _) = enrich_events(joined, TimeZoneMode::Utc);
    assert_eq!(aggregate_users(&enriched).len(), 1);
}

#[test]
fn test_safe_mode_properties() {
    let a = CategoryValue::text("A");
    let b = CategoryValue::text("B");
    assert_eq!(safe_mode([Some(&a), Some(&a), Some(&b)]), Some(a.clone()));
    assert_eq!(safe_mode::<CategoryValue, _>([None, None, None]), None);
    assert_eq!(safe_mode([Some(&b), Some(&a), Some(&b), Some(&a)]), Some(a));
}
