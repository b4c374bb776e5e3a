//! Feature construction from raw catalog rows
//!
//! Each item becomes `G` genre flags (0.0/1.0) followed by its release year
//! min-max scaled into `[0, year_weight]`. A small weight keeps genre overlap
//! dominant in every similarity metric.

use crate::constants::{DEFAULT_GENRES, DEFAULT_YEAR_WEIGHT, YEAR_FEATURE_NAME};
use crate::error::RecsysError;
use crate::models::{ItemRecord, RawItem};
use crate::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Min-max scaler for the release year, fitted once per corpus
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct YearScaler {
    pub min: f32,
    pub max: f32,

    /// Median of the known years, used to impute missing ones
    pub median: f32,
}

impl YearScaler {
    fn fit(known_years: &[i32]) -> Option<Self> {
        if known_years.is_empty() {
            return None;
        }

        let mut sorted = known_years.to_vec();
        sorted.sort_unstable();

        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] as f32 + sorted[mid] as f32) / 2.0
        } else {
            sorted[mid] as f32
        };

        Some(Self {
            min: sorted[0] as f32,
            max: sorted[sorted.len() - 1] as f32,
            median,
        })
    }

    /// Imputed year for items without one
    pub fn imputed_year(&self) -> i32 {
        self.median.round() as i32
    }

    /// Scale a year into `[0, weight]`. Years outside the fitted range are
    /// clamped; a constant fitted range maps everything to 0.
    pub fn scale(&self, year: i32, weight: f32) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        ((year as f32 - self.min) / range).clamp(0.0, 1.0) * weight
    }
}

/// Converts raw catalog rows into fixed-dimension feature vectors
///
/// Genre order and `year_weight` are fixed at construction; the year scaler
/// is fixed by `fit` and reused unchanged by every later `transform`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureEngineer {
    genre_columns: Vec<String>,
    year_weight: f32,
    scaler: Option<YearScaler>,
}

impl FeatureEngineer {
    pub fn new(genre_columns: Vec<String>, year_weight: f32) -> Result<Self> {
        if genre_columns.is_empty() {
            return Err(RecsysError::invalid_input("genre vocabulary must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = genre_columns.iter().find(|g| !seen.insert(g.as_str())) {
            return Err(RecsysError::invalid_input(format!("duplicate genre column: {dup}")));
        }
        if !year_weight.is_finite() || year_weight <= 0.0 {
            return Err(RecsysError::invalid_input(format!(
                "year_weight must be a positive number, got {year_weight}"
            )));
        }

        tracing::info!("Initialized FeatureEngineer with year_weight={}", year_weight);
        Ok(Self {
            genre_columns,
            year_weight,
            scaler: None,
        })
    }

    /// Engineer over the MovieLens genre vocabulary with the default weight
    pub fn with_defaults() -> Self {
        Self {
            genre_columns: DEFAULT_GENRES.iter().map(|g| g.to_string()).collect(),
            year_weight: DEFAULT_YEAR_WEIGHT,
            scaler: None,
        }
    }

    pub fn genre_columns(&self) -> &[String] {
        &self.genre_columns
    }

    pub fn year_weight(&self) -> f32 {
        self.year_weight
    }

    pub fn scaler(&self) -> Option<&YearScaler> {
        self.scaler.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.scaler.is_some()
    }

    /// Dimension of every feature vector: genres plus the year column
    pub fn feature_dim(&self) -> usize {
        self.genre_columns.len() + 1
    }

    /// Genre labels followed by the year column name
    pub fn feature_names(&self) -> Vec<String> {
        self.genre_columns
            .iter()
            .cloned()
            .chain(std::iter::once(YEAR_FEATURE_NAME.to_string()))
            .collect()
    }

    /// Fit the year scaler on a corpus
    pub fn fit(&mut self, items: &[RawItem]) -> Result<()> {
        self.check_rows(items)?;

        let known: Vec<i32> = items.iter().filter_map(|item| item.release_year).collect();
        let scaler = YearScaler::fit(&known).ok_or_else(|| {
            RecsysError::invalid_input("cannot fit year scaler: no item has a release year")
        })?;

        let missing = items.len() - known.len();
        if missing > 0 {
            tracing::warn!("Found {} items with missing year", missing);
            tracing::info!("Filling missing years with median: {}", scaler.median);
        }
        tracing::info!("Fitted year scaler on range [{}, {}]", scaler.min, scaler.max);

        self.scaler = Some(scaler);
        Ok(())
    }

    /// Fit on a corpus and transform it in one step
    pub fn fit_transform(&mut self, items: &[RawItem]) -> Result<(Vec<ItemRecord>, Array2<f32>)> {
        tracing::info!("Fitting and transforming features");
        self.fit(items)?;
        self.transform(items)
    }

    /// Apply the fitted scaler to (possibly out-of-sample) items
    pub fn transform(&self, items: &[RawItem]) -> Result<(Vec<ItemRecord>, Array2<f32>)> {
        let scaler = self.scaler.as_ref().ok_or_else(|| {
            RecsysError::uninitialized("FeatureEngineer must be fitted before transform")
        })?;
        self.check_rows(items)?;

        let records: Vec<ItemRecord> = items
            .iter()
            .map(|item| {
                let (year, year_imputed) = match item.release_year {
                    Some(year) => (year, false),
                    None => (scaler.imputed_year(), true),
                };
                ItemRecord {
                    item_id: item.item_id,
                    title: item.title.clone(),
                    year,
                    year_imputed,
                    genres: item.genres.clone(),
                    year_normalized: scaler.scale(year, self.year_weight),
                    imdb_url: item.imdb_url.clone(),
                }
            })
            .collect();

        let matrix = feature_matrix(&records, self.feature_dim())?;

        tracing::info!("Feature matrix created: shape=({}, {})", matrix.nrows(), matrix.ncols());
        tracing::debug!(
            "  Genre features: {} (weight: 1.0 each), year feature weight: {}",
            self.genre_columns.len(),
            self.year_weight
        );

        Ok((records, matrix))
    }

    fn check_rows(&self, items: &[RawItem]) -> Result<()> {
        if items.is_empty() {
            return Err(RecsysError::invalid_input("corpus is empty"));
        }
        let expected = self.genre_columns.len();
        if let Some(bad) = items.iter().find(|item| item.genres.len() != expected) {
            return Err(RecsysError::invalid_input(format!(
                "item {} has {} genre flags, expected {}",
                bad.item_id,
                bad.genres.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// Stack the feature vectors of a table into an `(items, dim)` matrix
pub fn feature_matrix(records: &[ItemRecord], dim: usize) -> Result<Array2<f32>> {
    let flat: Vec<f32> = records.iter().flat_map(|r| r.feature_vector()).collect();
    Array2::from_shape_vec((records.len(), dim), flat).map_err(|e| {
        RecsysError::invalid_input(format!("feature rows do not match dimension {dim}: {e}"))
    })
}

/// Genre-only 0/1 membership matrix, one row per item
pub fn genre_membership(records: &[ItemRecord]) -> Vec<Vec<bool>> {
    records.iter().map(|r| r.genres.clone()).collect()
}
