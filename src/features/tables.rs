//! Input tables: frame-to-record conversion and table sources
//!
//! Pipelines never open files themselves. They pull typed records from a
//! [`TableSource`], which is either backed by CSV files on disk or by
//! in-memory vectors in tests.

use super::types::{CategoryValue, EventRecord, GeoInfo, LabelRecord, ReferrerVector, N_COMPONENTS};
use crate::error::{GenderError, Result};
use crate::utils::DataLoader;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Provider of the raw input tables
pub trait TableSource {
    /// Event-level ad requests
    fn events(&self) -> Result<Vec<EventRecord>>;

    /// Training labels
    fn labels(&self) -> Result<Vec<LabelRecord>>;

    /// Referer embedding table
    fn referer_vectors(&self) -> Result<Vec<ReferrerVector>>;

    /// Geo metadata table
    fn geo_info(&self) -> Result<Vec<GeoInfo>>;

    /// Users to score, in output order
    fn target_users(&self) -> Result<Vec<String>>;
}

/// File locations of the input tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePaths {
    pub events: PathBuf,
    pub labels: PathBuf,
    pub referer_vectors: PathBuf,
    pub geo_info: PathBuf,
    pub target_users: PathBuf,
}

impl TablePaths {
    /// Training layout inside a data directory
    pub fn training(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            events: dir.join("train.csv"),
            labels: dir.join("train_labels.csv"),
            referer_vectors: dir.join("referer_vectors.csv"),
            geo_info: dir.join("geo_info.csv"),
            target_users: dir.join("test_users.csv"),
        }
    }

    /// Inference layout inside a data directory
    pub fn inference(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            events: dir.join("test.csv"),
            ..Self::training(dir)
        }
    }
}

impl Default for TablePaths {
    fn default() -> Self {
        Self::training(".")
    }
}

/// Table source reading delimiter-separated files
#[derive(Debug, Clone)]
pub struct CsvTableSource {
    paths: TablePaths,
    loader: DataLoader,
}

impl CsvTableSource {
    pub fn new(paths: TablePaths, loader: DataLoader) -> Self {
        Self { paths, loader }
    }

    pub fn paths(&self) -> &TablePaths {
        &self.paths
    }
}

impl TableSource for CsvTableSource {
    fn events(&self) -> Result<Vec<EventRecord>> {
        events_from_frame(&self.loader.load_csv(&self.paths.events)?)
    }

    fn labels(&self) -> Result<Vec<LabelRecord>> {
        labels_from_frame(&self.loader.load_csv(&self.paths.labels)?)
    }

    fn referer_vectors(&self) -> Result<Vec<ReferrerVector>> {
        referer_vectors_from_frame(&self.loader.load_csv(&self.paths.referer_vectors)?)
    }

    fn geo_info(&self) -> Result<Vec<GeoInfo>> {
        geo_info_from_frame(&self.loader.load_csv(&self.paths.geo_info)?)
    }

    fn target_users(&self) -> Result<Vec<String>> {
        target_users_from_frame(&self.loader.load_csv(&self.paths.target_users)?)
    }
}

/// Table source over records already in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableSource {
    pub events: Vec<EventRecord>,
    pub labels: Vec<LabelRecord>,
    pub referer_vectors: Vec<ReferrerVector>,
    pub geo_info: Vec<GeoInfo>,
    pub target_users: Vec<String>,
}

impl InMemoryTableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: Vec<EventRecord>) -> Self {
        self.events = events;
        self
    }

    pub fn with_labels(mut self, labels: Vec<LabelRecord>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_referer_vectors(mut self, vectors: Vec<ReferrerVector>) -> Self {
        self.referer_vectors = vectors;
        self
    }

    pub fn with_geo_info(mut self, geo: Vec<GeoInfo>) -> Self {
        self.geo_info = geo;
        self
    }

    pub fn with_target_users<S: Into<String>>(mut self, users: impl IntoIterator<Item = S>) -> Self {
        self.target_users = users.into_iter().map(Into::into).collect();
        self
    }
}

impl TableSource for InMemoryTableSource {
    fn events(&self) -> Result<Vec<EventRecord>> {
        Ok(self.events.clone())
    }

    fn labels(&self) -> Result<Vec<LabelRecord>> {
        Ok(self.labels.clone())
    }

    fn referer_vectors(&self) -> Result<Vec<ReferrerVector>> {
        Ok(self.referer_vectors.clone())
    }

    fn geo_info(&self) -> Result<Vec<GeoInfo>> {
        Ok(self.geo_info.clone())
    }

    fn target_users(&self) -> Result<Vec<String>> {
        Ok(self.target_users.clone())
    }
}

// ─── Frame conversion ──────────────────────────────────────────────────────────

/// Read a column as optional text cells, whatever its dtype
fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| GenderError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;

    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect();

    Ok(values)
}

/// Same as [`text_column`] but a missing column reads as all-null
fn optional_text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if df.get_column_index(name).is_some() {
        text_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

fn category_column(df: &DataFrame, name: &str) -> Result<Vec<Option<CategoryValue>>> {
    Ok(text_column(df, name)?
        .into_iter()
        .map(|v| v.as_deref().and_then(CategoryValue::parse))
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(text_column(df, name)?
        .into_iter()
        .map(|v| v.and_then(|s| s.parse::<f64>().ok()).filter(|f| !f.is_nan()))
        .collect())
}

/// Epoch seconds; fractional seconds are truncated, unparsable cells are missing
fn parse_timestamp(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
            .map(|f| f.trunc() as i64)
    })
}

/// Keep rows that carry a user id; blank ids are counted and skipped
fn with_user_ids<T>(
    table: &str,
    rows: impl IntoIterator<Item = (Option<String>, T)>,
) -> Vec<(String, T)> {
    let mut skipped = 0usize;
    let kept: Vec<(String, T)> = rows
        .into_iter()
        .filter_map(|(user_id, row)| match user_id {
            Some(user_id) => Some((user_id, row)),
            None => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!(table, skipped, "Skipped rows without a user_id");
    }
    kept
}

/// Convert an event frame into records; rows without a user id are skipped
pub fn events_from_frame(df: &DataFrame) -> Result<Vec<EventRecord>> {
    let user_ids = text_column(df, "user_id")?;
    let referers = category_column(df, "referer")?;
    let geo_ids = category_column(df, "geo_id")?;
    let agents = optional_text_column(df, "user_agent")?;
    let timestamps = text_column(df, "request_ts")?;

    let rows = user_ids
        .into_iter()
        .zip(referers.into_iter().zip(geo_ids).zip(agents).zip(timestamps));

    Ok(with_user_ids("events", rows)
        .into_iter()
        .map(|(user_id, (((referer, geo_id), user_agent), ts))| EventRecord {
            user_id,
            referer,
            geo_id,
            user_agent,
            request_ts: ts.as_deref().and_then(parse_timestamp),
        })
        .collect())
}

/// Convert a label frame into records; rows without a user id are skipped
pub fn labels_from_frame(df: &DataFrame) -> Result<Vec<LabelRecord>> {
    let user_ids = text_column(df, "user_id")?;
    let targets = float_column(df, "target")?;

    Ok(with_user_ids("labels", user_ids.into_iter().zip(targets))
        .into_iter()
        .map(|(user_id, target)| LabelRecord { user_id, target })
        .collect())
}

/// Convert a referer-vector frame into records; rows without a referer are skipped
pub fn referer_vectors_from_frame(df: &DataFrame) -> Result<Vec<ReferrerVector>> {
    let referers = category_column(df, "referer")?;
    let components = (0..N_COMPONENTS)
        .map(|i| float_column(df, &format!("component{}", i)))
        .collect::<Result<Vec<_>>>()?;

    Ok(referers
        .into_iter()
        .enumerate()
        .filter_map(|(row, referer)| {
            referer.map(|referer| ReferrerVector {
                referer,
                components: std::array::from_fn(|i| components[i][row]),
            })
        })
        .collect())
}

/// Convert a geo frame into records; rows without a geo id are skipped
pub fn geo_info_from_frame(df: &DataFrame) -> Result<Vec<GeoInfo>> {
    let geo_ids = category_column(df, "geo_id")?;
    let countries = category_column(df, "country_id")?;
    let regions = category_column(df, "region_id")?;
    let timezones = category_column(df, "timezone_id")?;

    Ok(geo_ids
        .into_iter()
        .zip(countries)
        .zip(regions)
        .zip(timezones)
        .filter_map(|(((geo_id, country_id), region_id), timezone_id)| {
            geo_id.map(|geo_id| GeoInfo {
                geo_id,
                country_id,
                region_id,
                timezone_id,
            })
        })
        .collect())
}

/// Read the ordered target-user list, skipping blank entries
pub fn target_users_from_frame(df: &DataFrame) -> Result<Vec<String>> {
    let user_ids = text_column(df, "user_id")?;
    Ok(with_user_ids("target users", user_ids.into_iter().map(|id| (id, ())))
        .into_iter()
        .map(|(user_id, ())| user_id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_from_frame() {
        let df = df!(
            "user_id" => &["u1", "u2"],
            "referer" => &["https://a.ru/1", "https://b.ru/2"],
            "geo_id" => &["12", "7"],
            "user_agent" => &[Some("{'browser': 'Chrome'}"), None],
            "request_ts" => &[Some("1700000000"), Some("bad")]
        ).unwrap();

        let events = events_from_frame(&df).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].geo_id, Some(CategoryValue::Int(12)));
        assert_eq!(events[0].request_ts, Some(1_700_000_000));
        assert_eq!(events[1].user_agent, None);
        assert_eq!(events[1].request_ts, None);
    }

    #[test]
    fn test_numeric_frame_columns_are_accepted() {
        let df = df!(
            "user_id" => &[10i64, 11],
            "referer" => &["r1", "r2"],
            "geo_id" => &[1i64, 2],
            "request_ts" => &[1_700_000_000i64, 1_700_000_100]
        ).unwrap();

        let events = events_from_frame(&df).unwrap();
        assert_eq!(events[0].user_id, "10");
        assert!(events.iter().all(|e| e.user_agent.is_none()));
    }

    #[test]
    fn test_blank_user_ids_are_skipped() {
        let df = df!(
            "user_id" => &[Some("u1"), None, Some(" "), Some("u2")],
            "referer" => &["r1", "r2", "r3", "r4"],
            "geo_id" => &["1", "2", "3", "4"],
            "request_ts" => &["0", "1", "2", "3"]
        ).unwrap();

        let events = events_from_frame(&df).unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert_eq!(events[1].referer, Some(CategoryValue::text("r4")));

        let labels = df!("user_id" => &[None, Some("u1")], "target" => &["0", "1"]).unwrap();
        let labels = labels_from_frame(&labels).unwrap();
        assert_eq!(labels, vec![LabelRecord::new("u1", 1.0)]);

        let targets = df!("user_id" => &[Some("t2"), None, Some("t1")]).unwrap();
        assert_eq!(target_users_from_frame(&targets).unwrap(), vec!["t2", "t1"]);
    }

    #[test]
    fn test_missing_required_column() {
        let df = df!("referer" => &["r1"]).unwrap();
        let err = events_from_frame(&df).unwrap_err();
        assert!(matches!(err, GenderError::FeatureNotFound(ref c) if c == "user_id"));
    }

    #[test]
    fn test_referer_vectors_from_frame() {
        let mut columns: Vec<Column> = vec![Series::new("referer".into(), &["r1"]).into()];
        for i in 0..N_COMPONENTS {
            columns.push(Series::new(format!("component{}", i).into(), &[format!("{}.5", i)]).into());
        }
        let df = DataFrame::new(columns).unwrap();

        let vectors = referer_vectors_from_frame(&df).unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].components[3], Some(3.5));
    }

    #[test]
    fn test_geo_and_labels_from_frame() {
        let geo = df!(
            "geo_id" => &["1", "2"],
            "country_id" => &["5", "5"],
            "region_id" => &[Some("9"), None],
            "timezone_id" => &["3", "3"]
        ).unwrap();
        let geo = geo_info_from_frame(&geo).unwrap();
        assert_eq!(geo[1].region_id, None);

        let labels = df!("user_id" => &["u1", "u2"], "target" => &["1", ""]).unwrap();
        let labels = labels_from_frame(&labels).unwrap();
        assert_eq!(labels[0].target, Some(1.0));
        assert_eq!(labels[1].target, None);
    }
}
