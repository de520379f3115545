//! Categorical encoding of aggregated user rows
//!
//! Each categorical column gets a [`CategoryCodebook`] built from the
//! distinct values of the dataset being encoded: codes follow the sorted
//! order of those values and a missing cell encodes as `-1`.
//!
//! Codebooks are fitted per dataset. The training and inference pipelines
//! each fit their own, so the same category value may receive different
//! codes in the two runs whenever the set of observed values differs. This is
//! a known correctness risk: it can silently degrade predictions without
//! raising any error.

use super::types::{CategoryValue, UserFeatures, N_COMPONENTS};
use crate::error::{GenderError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Code assigned to a missing category
pub const MISSING_CODE: i64 = -1;

/// Categorical feature columns, in matrix order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoricalColumn {
    Referer,
    GeoId,
    Browser,
    Os,
    CountryId,
    RegionId,
    TimezoneId,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 7] = [
        CategoricalColumn::Referer,
        CategoricalColumn::GeoId,
        CategoricalColumn::Browser,
        CategoricalColumn::Os,
        CategoricalColumn::CountryId,
        CategoricalColumn::RegionId,
        CategoricalColumn::TimezoneId,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CategoricalColumn::Referer => "referer",
            CategoricalColumn::GeoId => "geo_id",
            CategoricalColumn::Browser => "browser",
            CategoricalColumn::Os => "os",
            CategoricalColumn::CountryId => "country_id",
            CategoricalColumn::RegionId => "region_id",
            CategoricalColumn::TimezoneId => "timezone_id",
        }
    }

    /// Cell of this column in a feature row
    pub fn value<'a>(&self, row: &'a UserFeatures) -> Option<&'a CategoryValue> {
        match self {
            CategoricalColumn::Referer => row.referer.as_ref(),
            CategoricalColumn::GeoId => row.geo_id.as_ref(),
            CategoricalColumn::Browser => row.browser.as_ref(),
            CategoricalColumn::Os => row.os.as_ref(),
            CategoricalColumn::CountryId => row.country_id.as_ref(),
            CategoricalColumn::RegionId => row.region_id.as_ref(),
            CategoricalColumn::TimezoneId => row.timezone_id.as_ref(),
        }
    }
}

/// Feature matrix columns, in order
pub const FEATURE_NAMES: [&str; 20] = [
    "component0",
    "component1",
    "component2",
    "component3",
    "component4",
    "component5",
    "component6",
    "component7",
    "component8",
    "component9",
    "request_count",
    "referer",
    "geo_id",
    "hour",
    "day_of_week",
    "browser",
    "os",
    "country_id",
    "region_id",
    "timezone_id",
];

/// Number of feature columns
pub const N_FEATURES: usize = FEATURE_NAMES.len();

/// Mapping from category value to dense integer code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryCodebook {
    codes: BTreeMap<CategoryValue, i64>,
}

impl CategoryCodebook {
    /// Build codes `0..n` over the sorted distinct values
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a CategoryValue>>,
    {
        let distinct: BTreeSet<&CategoryValue> = values.into_iter().flatten().collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.clone(), code as i64))
            .collect();
        Self { codes }
    }

    /// Code of a value; missing or unseen values map to `-1`
    pub fn code(&self, value: Option<&CategoryValue>) -> i64 {
        value
            .and_then(|v| self.codes.get(v).copied())
            .unwrap_or(MISSING_CODE)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Encoder turning feature rows into a dense numeric matrix
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureEncoder {
    codebooks: BTreeMap<CategoricalColumn, CategoryCodebook>,
    is_fitted: bool,
}

impl FeatureEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one codebook per categorical column from `rows`
    pub fn fit(&mut self, rows: &[UserFeatures]) -> &mut Self {
        self.codebooks = CategoricalColumn::ALL
            .iter()
            .map(|col| (*col, CategoryCodebook::fit(rows.iter().map(|r| col.value(r)))))
            .collect();
        self.is_fitted = true;
        self
    }

    /// Encode rows in [`FEATURE_NAMES`] order; missing component means become NaN
    pub fn encode(&self, rows: &[UserFeatures]) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(GenderError::ModelNotFitted);
        }

        let mut data = Vec::with_capacity(rows.len() * N_FEATURES);
        for row in rows {
            data.extend(row.components.iter().map(|c| c.unwrap_or(f64::NAN)));
            data.push(row.request_count as f64);
            data.push(self.code(CategoricalColumn::Referer, row));
            data.push(self.code(CategoricalColumn::GeoId, row));
            data.push(row.hour);
            data.push(row.day_of_week);
            data.push(self.code(CategoricalColumn::Browser, row));
            data.push(self.code(CategoricalColumn::Os, row));
            data.push(self.code(CategoricalColumn::CountryId, row));
            data.push(self.code(CategoricalColumn::RegionId, row));
            data.push(self.code(CategoricalColumn::TimezoneId, row));
        }

        Ok(Array2::from_shape_vec((rows.len(), N_FEATURES), data)?)
    }

    /// Fit on `rows` and encode them in one step
    pub fn fit_encode(&mut self, rows: &[UserFeatures]) -> Result<Array2<f64>> {
        self.fit(rows);
        self.encode(rows)
    }

    fn code(&self, column: CategoricalColumn, row: &UserFeatures) -> f64 {
        self.codebooks
            .get(&column)
            .map_or(MISSING_CODE, |book| book.code(column.value(row))) as f64
    }
}

const _: () = assert!(N_FEATURES == N_COMPONENTS + 3 + CategoricalColumn::ALL.len());

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user: &str, referer: Option<&str>, geo: i64) -> UserFeatures {
        UserFeatures {
            user_id: user.to_string(),
            components: [Some(0.25); N_COMPONENTS],
            request_count: 3,
            referer: referer.map(CategoryValue::text),
            geo_id: Some(CategoryValue::Int(geo)),
            hour: 12.5,
            day_of_week: 3.0,
            browser: Some(CategoryValue::text("Chrome")),
            os: Some(CategoryValue::text("Android")),
            country_id: None,
            region_id: Some(CategoryValue::unknown()),
            timezone_id: Some(CategoryValue::Int(4)),
            target: None,
        }
    }

    #[test]
    fn test_codebook_sorted_codes() {
        let values = [
            CategoryValue::text("zeta"),
            CategoryValue::text("alpha"),
            CategoryValue::text("zeta"),
        ];
        let book = CategoryCodebook::fit(values.iter().map(Some).chain([None]));
        assert_eq!(book.len(), 2);
        assert_eq!(book.code(Some(&CategoryValue::text("alpha"))), 0);
        assert_eq!(book.code(Some(&CategoryValue::text("zeta"))), 1);
        assert_eq!(book.code(None), MISSING_CODE);
        assert_eq!(book.code(Some(&CategoryValue::text("unseen"))), MISSING_CODE);
    }

    #[test]
    fn test_encode_layout() {
        let rows = vec![row("a", Some("r2"), 10), row("b", Some("r1"), 9), row("c", None, 10)];
        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_encode(&rows).unwrap();

        assert_eq!(x.dim(), (3, N_FEATURES));
        assert_eq!(x[[0, 0]], 0.25);
        assert_eq!(x[[0, 10]], 3.0);
        // referer: r1 -> 0, r2 -> 1, missing -> -1
        assert_eq!(x[[0, 11]], 1.0);
        assert_eq!(x[[1, 11]], 0.0);
        assert_eq!(x[[2, 11]], -1.0);
        // geo ids sort numerically: 9 -> 0, 10 -> 1
        assert_eq!(x[[0, 12]], 1.0);
        assert_eq!(x[[1, 12]], 0.0);
        assert_eq!(x[[0, 13]], 12.5);
        assert_eq!(x[[0, 14]], 3.0);
        // country is entirely missing
        assert_eq!(x[[0, 17]], -1.0);
    }

    #[test]
    fn test_missing_components_are_nan() {
        let mut r = row("a", Some("r1"), 1);
        r.components[4] = None;
        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_encode(&[r]).unwrap();
        assert!(x[[0, 4]].is_nan());
    }

    #[test]
    fn test_codes_depend_on_dataset() {
        let train = vec![row("a", Some("r1"), 1), row("b", Some("r2"), 1)];
        let test = vec![row("c", Some("r2"), 1)];

        let x_train = FeatureEncoder::new().fit_encode(&train).unwrap();
        let x_test = FeatureEncoder::new().fit_encode(&test).unwrap();

        // the same referer gets a different code once the category set changes
        assert_eq!(x_train[[1, 11]], 1.0);
        assert_eq!(x_test[[0, 11]], 0.0);
    }

    #[test]
    fn test_encode_requires_fit() {
        let err = FeatureEncoder::new().encode(&[]).unwrap_err();
        assert!(matches!(err, GenderError::ModelNotFitted));
    }

    #[test]
    fn test_encode_empty() {
        let x = FeatureEncoder::new().fit_encode(&[]).unwrap();
        assert_eq!(x.dim(), (0, N_FEATURES));
    }
}
