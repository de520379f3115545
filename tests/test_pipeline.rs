//! Integration test: full pipeline (CSV tables → train → model file → predict → preds.csv)

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use visitor_gender::export::read_envelope;
use visitor_gender::features::{
    CsvTableSource, EventRecord, InMemoryTableSource, LabelRecord, TimeZoneMode, FEATURE_NAMES,
};
use visitor_gender::pipeline::{ForestConfig, PipelineConfig, PredictPipeline, TrainPipeline};
use visitor_gender::GenderError;

const BASE_TS: i64 = 1_700_000_000;

fn write_table(dir: &Path, name: &str, header: &str, rows: &[String]) {
    let mut text = String::from(header);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(dir.join(name), text).unwrap();
}

fn event_rows(prefix: &str, n_users: usize) -> Vec<String> {
    let mut rows = Vec::new();
    for i in 0..n_users {
        let browser = if i % 2 == 0 { "Chrome" } else { "Firefox" };
        let os = if i % 3 == 0 { "Android" } else { "Windows" };
        for k in 0..(2 + i % 3) {
            rows.push(format!(
                "{}{};https://site{}.ru/page;{};{{'browser': '{}', 'os': '{}'}};{}",
                prefix,
                i,
                (i + k) % 4,
                1 + i % 3,
                browser,
                os,
                BASE_TS + (i * 5400 + k * 600) as i64
            ));
        }
    }
    rows
}

/// Writes every input table into a fresh directory
fn dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    let path = dir.path();

    let mut train_events = event_rows("u", 40);
    // a row without a user id is skipped, not fatal
    train_events.insert(3, format!(";https://site0.ru/page;1;{{'browser': 'Chrome'}};{}", BASE_TS));
    write_table(path, "train.csv", "user_id;referer;geo_id;user_agent;request_ts", &train_events);

    let mut labels: Vec<String> = (0..40).map(|i| format!("u{};{}", i, (i + 1) % 2)).collect();
    // a label row for a user with no events, and an event user with no label
    labels.push("nobody;1".to_string());
    labels.retain(|row| !row.starts_with("u39;"));
    write_table(path, "train_labels.csv", "user_id;target", &labels);

    let header = format!(
        "referer;{}",
        (0..10).map(|i| format!("component{}", i)).collect::<Vec<_>>().join(";")
    );
    let vectors: Vec<String> = (0..3)
        .map(|s| {
            let comps: Vec<String> = (0..10).map(|c| format!("{:.3}", (s * 10 + c) as f64 / 7.0)).collect();
            format!("https://site{}.ru/page;{}", s, comps.join(";"))
        })
        .collect();
    write_table(path, "referer_vectors.csv", &header, &vectors);

    write_table(
        path,
        "geo_info.csv",
        "geo_id;country_id;region_id;timezone_id",
        &["1;100;5;3".to_string(), "2;100;;3".to_string()],
    );

    write_table(path, "test.csv", "user_id;referer;geo_id;user_agent;request_ts", &event_rows("t", 6));
    write_table(
        path,
        "test_users.csv",
        "user_id",
        &["t3", "t1", "ghost", "t2", "t1", "t0"].map(String::from),
    );

    dir
}

fn config(dir: &Path, model: &str) -> PipelineConfig {
    PipelineConfig::new()
        .with_data_dir(dir)
        .with_model_path(dir.join(model))
        .with_predictions_path(dir.join("preds.csv"))
        .with_time_zone(TimeZoneMode::Utc)
        .with_forest(ForestConfig {
            n_estimators: 20,
            ..Default::default()
        })
}

fn train(config: &PipelineConfig) {
    let source = CsvTableSource::new(config.training_tables(), config.loader());
    TrainPipeline::new(config.clone()).run(&source).unwrap();
}

#[test]
fn test_train_then_predict() {
    let dir = dataset();
    let config = config(dir.path(), "model.bin");

    let source = CsvTableSource::new(config.training_tables(), config.loader());
    let report = TrainPipeline::new(config.clone()).run(&source).unwrap();

    assert_eq!(report.stages.events, event_rows("u", 40).len());
    assert_eq!(report.stages.users, 40);
    assert_eq!(report.labeled_users, 39);
    assert_eq!(report.dropped_users, 1);
    assert_eq!(report.n_validation, 8);
    assert_eq!(report.n_train, 31);
    assert!(report.metrics.accuracy.is_some());
    assert!(config.model_path.exists());

    let envelope = read_envelope(&config.model_path).unwrap();
    assert_eq!(envelope.metadata.feature_names, FEATURE_NAMES.to_vec());
    assert_eq!(envelope.metadata.n_training_samples, 31);
    assert!(envelope.metadata.metrics.contains_key("accuracy"));

    let source = CsvTableSource::new(config.inference_tables(), config.loader());
    let report = PredictPipeline::new(config.clone()).run(&source).unwrap();

    assert_eq!(report.target_users, 6);
    assert_eq!(report.missing_users, 1);
    let ids: Vec<&str> = report.predictions.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["t3", "t1", "t2", "t1", "t0"]);
    assert!(report.predictions.iter().all(|(_, p)| *p == 0.0 || *p == 1.0));
    // duplicated target ids repeat the same prediction
    assert_eq!(report.predictions[1].1, report.predictions[3].1);

    let written = fs::read_to_string(dir.path().join("preds.csv")).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines[0], "user_id;target");
    assert_eq!(lines.len(), 6);
    assert!(lines[1].starts_with("t3;"));
    assert!(lines[5].starts_with("t0;"));
    assert!(!written.contains("ghost"));
}

#[test]
fn test_same_seed_same_model_and_predictions() {
    let dir = dataset();
    let first = config(dir.path(), "first.bin");
    let second = config(dir.path(), "second.bin");

    train(&first);
    train(&second);

    let a = read_envelope(&first.model_path).unwrap();
    let b = read_envelope(&second.model_path).unwrap();
    assert_eq!(a.model_data, b.model_data);
    assert_eq!(a.checksum, b.checksum);

    let predict = |config: &PipelineConfig| {
        let source = CsvTableSource::new(config.inference_tables(), config.loader());
        PredictPipeline::new(config.clone()).predict(&source).unwrap().predictions
    };
    assert_eq!(predict(&first), predict(&second));
}

#[test]
fn test_predict_without_model_fails() {
    let dir = dataset();
    let config = config(dir.path(), "missing.bin");
    let source = CsvTableSource::new(config.inference_tables(), config.loader());

    let err = PredictPipeline::new(config).run(&source).unwrap_err();
    assert!(matches!(err, GenderError::IoError(_)));
    assert!(!dir.path().join("preds.csv").exists());
}

#[test]
fn test_missing_table_is_fatal() {
    let dir = dataset();
    fs::remove_file(dir.path().join("geo_info.csv")).unwrap();
    let config = config(dir.path(), "model.bin");
    let source = CsvTableSource::new(config.training_tables(), config.loader());

    assert!(TrainPipeline::new(config).run(&source).is_err());
}

#[test]
fn test_in_memory_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), "model.bin");

    let mut events = Vec::new();
    let mut labels = Vec::new();
    for i in 0..12 {
        let user = format!("u{}", i);
        let browser = if i % 2 == 0 { "Chrome" } else { "Opera" };
        events.push(
            EventRecord::new(user.as_str())
                .with_referer("r")
                .with_geo(1i64)
                .with_user_agent(format!("{{'browser': '{}', 'os': 'Linux'}}", browser))
                .with_timestamp(BASE_TS + i * 60),
        );
        labels.push(LabelRecord::new(user.as_str(), (i % 2) as f64));
    }

    let training = InMemoryTableSource::new()
        .with_events(events.clone())
        .with_labels(labels);
    TrainPipeline::new(config.clone()).run(&training).unwrap();

    let inference = InMemoryTableSource::new()
        .with_events(events)
        .with_target_users(["u5", "u0", "absent"]);
    let report = PredictPipeline::new(config).predict(&inference).unwrap();

    assert_eq!(report.predictions.len(), 2);
    assert_eq!(report.predictions[0].0, "u5");
    assert_eq!(report.predictions[1].0, "u0");
    assert_eq!(report.missing_users, 1);
    assert!(report.output_path.is_none());
}
