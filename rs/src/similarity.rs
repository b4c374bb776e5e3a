//! Pairwise similarity matrices over the feature table
//!
//! Two metrics are supported:
//! - **cosine** over the full feature vectors (genres + scaled year)
//! - **jaccard** over genre membership only
//!
//! Both produce dense, symmetric `items x items` matrices with values in
//! `[0, 1]` and a unit diagonal. Matrices are built as an upper triangle and
//! mirrored, so symmetry holds exactly rather than within rounding.
//!
//! Jaccard is `O(items^2 x genres / 64)` here: genre sets are packed into
//! bitsets and compared with popcounts, one row per rayon task. Memory is
//! `items^2` floats per metric, which bounds the catalog size to what fits
//! in RAM as a dense matrix.

use crate::constants::{MATRIX_FILE_SUFFIX, SIMILARITY_TOLERANCE};
use crate::error::RecsysError;
use crate::features::genre_membership;
use crate::models::ItemRecord;
use crate::Result;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Closed set of similarity metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Jaccard,
}

/// Name lookup table; the only place metric names are spelled out
const METRIC_NAMES: [(&str, Metric); 2] = [("cosine", Metric::Cosine), ("jaccard", Metric::Jaccard)];

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Cosine, Metric::Jaccard];

    pub fn as_str(self) -> &'static str {
        METRIC_NAMES
            .iter()
            .find(|(_, metric)| *metric == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Case-insensitive lookup of a metric by name
    pub fn lookup(name: &str) -> Option<Metric> {
        let name = name.trim();
        METRIC_NAMES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, metric)| *metric)
    }

    /// File name of this metric's matrix inside an artifact directory
    pub fn file_name(self) -> String {
        format!("{}{}", self.as_str(), MATRIX_FILE_SUFFIX)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RecsysError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Metric::lookup(s).ok_or_else(|| {
            RecsysError::invalid_input(format!("unsupported similarity metric: {s}"))
        })
    }
}

/// Dense square similarity matrix, indexed by feature-table row position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityMatrix {
    metric: Metric,
    values: Array2<f32>,
}

impl SimilarityMatrix {
    /// Wrap precomputed values; the matrix must be square
    pub fn from_values(metric: Metric, values: Array2<f32>) -> Result<Self> {
        if values.nrows() != values.ncols() {
            return Err(RecsysError::invalid_input(format!(
                "{metric} similarity matrix must be square, got {:?}",
                values.dim()
            )));
        }
        Ok(Self { metric, values })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of items (rows == columns)
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[[row, col]]
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f32> {
        self.values.row(row)
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn mean(&self) -> f32 {
        self.values.mean().unwrap_or(0.0)
    }

    pub fn memory_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f32>()
    }

    /// Check squareness, symmetry, unit diagonal and the `[0, 1]` range.
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self, tolerance: f32) -> std::result::Result<(), String> {
        let (rows, cols) = self.values.dim();
        if rows != cols {
            return Err(format!("{} matrix is not square: {}x{}", self.metric, rows, cols));
        }
        // Every cell, so NaN cannot slip past the comparisons below
        let in_range = -tolerance..=1.0 + tolerance;
        if let Some(((i, j), value)) = self.values.indexed_iter().find(|(_, v)| !in_range.contains(*v)) {
            return Err(format!("{} value at ({}, {}) out of range: {}", self.metric, i, j, value));
        }

        for i in 0..rows {
            let diagonal = self.values[[i, i]];
            if (diagonal - 1.0).abs() > tolerance {
                return Err(format!("{} diagonal at {} is {}", self.metric, i, diagonal));
            }
            for j in (i + 1)..cols {
                if (self.values[[i, j]] - self.values[[j, i]]).abs() > tolerance {
                    return Err(format!("{} asymmetric at ({}, {})", self.metric, i, j));
                }
            }
        }
        Ok(())
    }

    fn log_summary(&self, started: Instant) {
        tracing::info!("{} similarity computed in {:?}", self.metric, started.elapsed());
        tracing::info!("  Matrix shape: ({}, {})", self.len(), self.len());
        tracing::info!("  Value range: [{:.4}, {:.4}]", self.min(), self.max());
        tracing::info!("  Mean similarity: {:.4}", self.mean());
        tracing::debug!("  Memory size: {:.2} MB", self.memory_bytes() as f64 / (1024.0 * 1024.0));
    }
}

/// Builds similarity matrices from feature data
pub struct SimilarityEngine;

impl SimilarityEngine {
    /// Cosine similarity between every pair of feature rows
    ///
    /// Features are non-negative, so results fall in `[0, 1]`. An all-zero
    /// row has similarity 0 to every other row and 1 to itself.
    pub fn cosine(features: &Array2<f32>) -> SimilarityMatrix {
        tracing::info!("Computing cosine similarity matrix...");
        let started = Instant::now();

        let mut normalized = features.clone();
        for mut row in normalized.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|x| x / norm);
            }
        }
        let gram = normalized.dot(&normalized.t());

        let n = features.nrows();
        let mut values = Array2::<f32>::zeros((n, n));
        for i in 0..n {
            values[[i, i]] = 1.0;
            for j in (i + 1)..n {
                let similarity = gram[[i, j]].clamp(0.0, 1.0);
                values[[i, j]] = similarity;
                values[[j, i]] = similarity;
            }
        }

        let matrix = SimilarityMatrix {
            metric: Metric::Cosine,
            values,
        };
        matrix.log_summary(started);
        matrix
    }

    /// Jaccard similarity between genre-membership sets
    ///
    /// Two distinct items with no genres at all have similarity 0. Every
    /// item has similarity 1 to itself.
    pub fn jaccard(genres: &[Vec<bool>]) -> SimilarityMatrix {
        tracing::info!("Computing Jaccard similarity matrix (genre-only)...");
        let started = Instant::now();

        let bitsets: Vec<Vec<u64>> = genres.iter().map(|row| pack_bits(row)).collect();
        let n = bitsets.len();

        let upper: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| jaccard_bits(&bitsets[i], &bitsets[j]))
                    .collect()
            })
            .collect();

        let mut values = Array2::<f32>::zeros((n, n));
        for (i, row) in upper.iter().enumerate() {
            values[[i, i]] = 1.0;
            for (offset, &similarity) in row.iter().enumerate() {
                let j = i + 1 + offset;
                values[[i, j]] = similarity;
                values[[j, i]] = similarity;
            }
        }

        let matrix = SimilarityMatrix {
            metric: Metric::Jaccard,
            values,
        };
        matrix.log_summary(started);
        matrix
    }

    /// Compute one metric
    pub fn compute_metric(metric: Metric, features: &Array2<f32>, table: &[ItemRecord]) -> SimilarityMatrix {
        match metric {
            Metric::Cosine => Self::cosine(features),
            Metric::Jaccard => Self::jaccard(&genre_membership(table)),
        }
    }

    /// Compute every requested metric by name
    ///
    /// Unrecognized names are skipped with a warning; duplicates are
    /// computed once.
    pub fn compute(
        features: &Array2<f32>,
        genre_columns: &[String],
        table: &[ItemRecord],
        metrics: &[String],
    ) -> Result<BTreeMap<Metric, SimilarityMatrix>> {
        if features.nrows() != table.len() {
            return Err(RecsysError::invalid_input(format!(
                "feature matrix has {} rows but the table has {} items",
                features.nrows(),
                table.len()
            )));
        }
        if features.ncols() != genre_columns.len() + 1 {
            return Err(RecsysError::invalid_input(format!(
                "feature matrix has {} columns, expected {} genres + year",
                features.ncols(),
                genre_columns.len()
            )));
        }
        if let Some(bad) = table.iter().find(|r| r.genres.len() != genre_columns.len()) {
            return Err(RecsysError::invalid_input(format!(
                "item {} has {} genre flags, expected {}",
                bad.item_id,
                bad.genres.len(),
                genre_columns.len()
            )));
        }

        tracing::info!("Computing similarity matrices for methods: {:?}", metrics);

        let mut matrices = BTreeMap::new();
        for name in metrics {
            let Some(metric) = Metric::lookup(name) else {
                tracing::warn!("Unknown similarity method: {}", name);
                continue;
            };
            if matrices.contains_key(&metric) {
                continue;
            }
            matrices.insert(metric, Self::compute_metric(metric, features, table));
        }

        tracing::info!("Computed {} similarity matrices", matrices.len());
        Ok(matrices)
    }
}

fn pack_bits(flags: &[bool]) -> Vec<u64> {
    let mut words = vec![0u64; flags.len().div_ceil(64)];
    for (bit, &flag) in flags.iter().enumerate() {
        if flag {
            words[bit / 64] |= 1u64 << (bit % 64);
        }
    }
    words
}

fn jaccard_bits(a: &[u64], b: &[u64]) -> f32 {
    let (intersection, union) = a.iter().zip(b).fold((0u32, 0u32), |(inter, uni), (x, y)| {
        (inter + (x & y).count_ones(), uni + (x | y).count_ones())
    });
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureEngineer;
    use crate::models::RawItem;
    use proptest::prelude::*;

    /// A = {Action, 1995}, B = {Action, 1995}, C = {Comedy, 1980}
    fn abc_table() -> (Vec<ItemRecord>, Array2<f32>) {
        let items = vec![
            RawItem::new(1, "A (1995)", Some(1995), vec![true, false]),
            RawItem::new(2, "B (1995)", Some(1995), vec![true, false]),
            RawItem::new(3, "C (1980)", Some(1980), vec![false, true]),
        ];
        let mut engineer = FeatureEngineer::new(vec!["Action".into(), "Comedy".into()], 0.1).unwrap();
        engineer.fit_transform(&items).unwrap()
    }

    #[test]
    fn test_hand_constructed_example() {
        let (table, features) = abc_table();

        let cosine = SimilarityEngine::cosine(&features);
        assert!(cosine.get(0, 1) > cosine.get(0, 2));
        assert!((cosine.get(0, 1) - 1.0).abs() < 1e-6);

        let jaccard = SimilarityEngine::jaccard(&genre_membership(&table));
        assert_eq!(jaccard.get(0, 1), 1.0);
        assert_eq!(jaccard.get(0, 2), 0.0);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        let genres = vec![vec![true, true, false], vec![true, false, true]];
        let matrix = SimilarityEngine::jaccard(&genres);
        assert!((matrix.get(0, 1) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_jaccard_empty_sets() {
        let genres = vec![vec![false, false], vec![false, false], vec![true, false]];
        let matrix = SimilarityEngine::jaccard(&genres);

        assert_eq!(matrix.get(0, 1), 0.0);
        assert_eq!(matrix.get(0, 2), 0.0);
        assert_eq!(matrix.get(0, 0), 1.0);
        assert!(matrix.check_invariants(SIMILARITY_TOLERANCE).is_ok());
    }

    #[test]
    fn test_jaccard_wide_vocabulary() {
        let mut a = vec![false; 130];
        let mut b = vec![false; 130];
        a[3] = true;
        a[129] = true;
        b[129] = true;
        let matrix = SimilarityEngine::jaccard(&[a, b]);
        assert!((matrix.get(0, 1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_row() {
        let features = Array2::from_shape_vec((2, 2), vec![0.0, 0.0, 1.0, 0.0]).unwrap();
        let matrix = SimilarityEngine::cosine(&features);
        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.get(0, 1), 0.0);
    }

    #[test]
    fn test_compute_skips_unknown_metric() {
        let (table, features) = abc_table();
        let genres = vec!["Action".to_string(), "Comedy".to_string()];
        let metrics = vec!["cosine".to_string(), "euclidean".to_string(), "Jaccard".to_string()];

        let matrices = SimilarityEngine::compute(&features, &genres, &table, &metrics).unwrap();
        assert_eq!(matrices.len(), 2);
        assert!(matrices.contains_key(&Metric::Cosine));
        assert!(matrices.contains_key(&Metric::Jaccard));
    }

    #[test]
    fn test_compute_rejects_mismatched_table() {
        let (table, features) = abc_table();
        let genres = vec!["Action".to_string(), "Comedy".to_string()];
        let result = SimilarityEngine::compute(&features, &genres, &table[..2], &["cosine".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_metric_lookup() {
        assert_eq!(Metric::lookup("cosine"), Some(Metric::Cosine));
        assert_eq!(Metric::lookup(" JACCARD "), Some(Metric::Jaccard));
        assert_eq!(Metric::lookup("pearson"), None);
        assert!("pearson".parse::<Metric>().is_err());
        assert_eq!(Metric::Jaccard.file_name(), "jaccard_similarity.bin");
        assert_eq!(Metric::Cosine.to_string(), "cosine");
        assert_eq!(serde_json::to_string(&Metric::Cosine).unwrap(), "\"cosine\"");
    }

    #[test]
    fn test_from_values_requires_square() {
        let values = Array2::<f32>::zeros((2, 3));
        assert!(SimilarityMatrix::from_values(Metric::Cosine, values).is_err());
    }

    #[test]
    fn test_check_invariants_detects_asymmetry() {
        let values = Array2::from_shape_vec((2, 2), vec![1.0, 0.3, 0.4, 1.0]).unwrap();
        let matrix = SimilarityMatrix::from_values(Metric::Cosine, values).unwrap();
        assert!(matrix.check_invariants(SIMILARITY_TOLERANCE).is_err());
    }

    #[test]
    fn test_check_invariants_rejects_nan_anywhere() {
        let cells = [(0, 0), (1, 1), (1, 0), (0, 1)];
        for (i, j) in cells {
            let mut values = Array2::from_shape_vec((2, 2), vec![1.0, 0.3, 0.3, 1.0]).unwrap();
            values[[i, j]] = f32::NAN;
            let matrix = SimilarityMatrix::from_values(Metric::Cosine, values).unwrap();
            assert!(matrix.check_invariants(SIMILARITY_TOLERANCE).is_err(), "NaN at ({i}, {j})");
        }
    }

    fn naive_jaccard(a: &[bool], b: &[bool]) -> f32 {
        let inter = a.iter().zip(b).filter(|(x, y)| **x && **y).count();
        let union = a.iter().zip(b).filter(|(x, y)| **x || **y).count();
        if union == 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }

    fn arb_catalog() -> impl Strategy<Value = Vec<RawItem>> {
        prop::collection::vec(
            (prop::collection::vec(any::<bool>(), 5), prop::option::of(1920i32..2000)),
            2..24,
        )
        .prop_filter("at least one known year", |rows| rows.iter().any(|(_, y)| y.is_some()))
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (genres, year))| RawItem::new(i as u32 + 1, format!("Item {i}"), year, genres))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every metric yields a symmetric matrix in [0, 1] with a unit diagonal
        #[test]
        fn prop_matrices_hold_invariants(items in arb_catalog()) {
            let genres: Vec<String> = (0..5).map(|g| format!("g{g}")).collect();
            let mut engineer = FeatureEngineer::new(genres.clone(), 0.1).unwrap();
            let (table, features) = engineer.fit_transform(&items).unwrap();
            let names: Vec<String> = Metric::ALL.iter().map(|m| m.to_string()).collect();

            let matrices = SimilarityEngine::compute(&features, &genres, &table, &names).unwrap();
            for matrix in matrices.values() {
                prop_assert_eq!(matrix.len(), items.len());
                prop_assert!(matrix.check_invariants(SIMILARITY_TOLERANCE).is_ok());
                for i in 0..matrix.len() {
                    for j in 0..matrix.len() {
                        prop_assert_eq!(matrix.get(i, j), matrix.get(j, i));
                    }
                }
            }
        }

        /// The bitset formulation matches the set-based definition
        #[test]
        fn prop_bitset_jaccard_matches_naive(
            a in prop::collection::vec(any::<bool>(), 70),
            b in prop::collection::vec(any::<bool>(), 70),
        ) {
            let matrix = SimilarityEngine::jaccard(&[a.clone(), b.clone()]);
            prop_assert!((matrix.get(0, 1) - naive_jaccard(&a, &b)).abs() < 1e-6);
        }
    }
}
