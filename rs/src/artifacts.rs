//! Versioned artifact bundle produced offline and served online
//!
//! A `ModelArtifactSet` can only be obtained through a constructor that
//! validates it, and exposes no mutation afterwards. Replacing a model means
//! loading a different version wholesale.

use crate::constants::SIMILARITY_TOLERANCE;
use crate::error::RecsysError;
use crate::features::FeatureEngineer;
use crate::models::ItemRecord;
use crate::similarity::{Metric, SimilarityMatrix};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Range of (imputed) release years in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

/// Metadata descriptor written alongside every artifact version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMetadata {
    pub version: String,

    /// Unique id of the training run that produced this version
    pub build_id: Uuid,

    pub built_at: DateTime<Utc>,
    pub item_count: usize,

    /// Genre count plus the year column
    pub feature_dim: usize,

    pub year_weight: f32,

    /// Genre column order shared by the feature table and the engineer
    pub genre_columns: Vec<String>,

    /// Metrics with a stored similarity matrix
    pub metrics: Vec<Metric>,

    pub default_metric: Metric,
    pub year_range: YearRange,
}

/// Immutable bundle of feature table, similarity matrices and metadata
#[derive(Debug, Clone)]
pub struct ModelArtifactSet {
    metadata: ArtifactMetadata,
    items: Vec<ItemRecord>,
    matrices: BTreeMap<Metric, SimilarityMatrix>,
    feature_engineer: FeatureEngineer,
}

impl ModelArtifactSet {
    /// Assemble a fresh bundle from the outputs of a training run
    pub fn build(
        version: impl Into<String>,
        feature_engineer: FeatureEngineer,
        items: Vec<ItemRecord>,
        matrices: BTreeMap<Metric, SimilarityMatrix>,
        default_metric: Metric,
    ) -> Result<Self> {
        let year_range = YearRange {
            min: items.iter().map(|item| item.year).min().unwrap_or_default(),
            max: items.iter().map(|item| item.year).max().unwrap_or_default(),
        };

        let metadata = ArtifactMetadata {
            version: version.into(),
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            item_count: items.len(),
            feature_dim: feature_engineer.feature_dim(),
            year_weight: feature_engineer.year_weight(),
            genre_columns: feature_engineer.genre_columns().to_vec(),
            metrics: matrices.keys().copied().collect(),
            default_metric,
            year_range,
        };

        Self::from_parts(metadata, items, matrices, feature_engineer)
    }

    /// Reassemble a bundle from its stored parts, rejecting any inconsistency
    pub fn from_parts(
        metadata: ArtifactMetadata,
        items: Vec<ItemRecord>,
        matrices: BTreeMap<Metric, SimilarityMatrix>,
        feature_engineer: FeatureEngineer,
    ) -> Result<Self> {
        let set = Self {
            metadata,
            items,
            matrices,
            feature_engineer,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Feature table in row-index order
    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn matrices(&self) -> &BTreeMap<Metric, SimilarityMatrix> {
        &self.matrices
    }

    pub fn matrix(&self, metric: Metric) -> Option<&SimilarityMatrix> {
        self.matrices.get(&metric)
    }

    pub fn feature_engineer(&self) -> &FeatureEngineer {
        &self.feature_engineer
    }

    /// Check every cross-file invariant of the bundle
    pub fn validate(&self) -> Result<()> {
        let meta = &self.metadata;
        let genre_count = meta.genre_columns.len();

        if meta.version.trim().is_empty() {
            return Err(RecsysError::corruption("metadata has an empty version id"));
        }
        if meta.item_count == 0 {
            return Err(RecsysError::corruption("artifact bundle contains no items"));
        }
        if self.items.len() != meta.item_count {
            return Err(RecsysError::corruption(format!(
                "feature table has {} rows but metadata declares {} items",
                self.items.len(),
                meta.item_count
            )));
        }
        if meta.feature_dim != genre_count + 1 {
            return Err(RecsysError::corruption(format!(
                "feature_dim {} does not match {} genre columns + year",
                meta.feature_dim, genre_count
            )));
        }
        if self.feature_engineer.genre_columns() != meta.genre_columns.as_slice() {
            return Err(RecsysError::corruption(
                "feature scaler genre order differs from metadata genre order",
            ));
        }
        if (self.feature_engineer.year_weight() - meta.year_weight).abs() > f32::EPSILON {
            return Err(RecsysError::corruption(format!(
                "feature scaler year_weight {} differs from metadata year_weight {}",
                self.feature_engineer.year_weight(),
                meta.year_weight
            )));
        }
        if !self.feature_engineer.is_fitted() {
            return Err(RecsysError::corruption("feature scaler was saved unfitted"));
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if item.item_id == 0 {
                return Err(RecsysError::corruption("feature table contains item id 0"));
            }
            if !seen.insert(item.item_id) {
                return Err(RecsysError::corruption(format!(
                    "feature table contains duplicate item id {}",
                    item.item_id
                )));
            }
            if item.genres.len() != genre_count {
                return Err(RecsysError::corruption(format!(
                    "item {} has {} genre flags, metadata declares {}",
                    item.item_id,
                    item.genres.len(),
                    genre_count
                )));
            }
            if !(0.0..=meta.year_weight + SIMILARITY_TOLERANCE).contains(&item.year_normalized) {
                return Err(RecsysError::corruption(format!(
                    "item {} has scaled year {} outside [0, {}]",
                    item.item_id, item.year_normalized, meta.year_weight
                )));
            }
        }

        let mut declared = meta.metrics.clone();
        declared.sort();
        declared.dedup();
        let present: Vec<Metric> = self.matrices.keys().copied().collect();
        if declared != present {
            return Err(RecsysError::corruption(format!(
                "metadata lists metrics {:?} but matrices exist for {:?}",
                declared, present
            )));
        }
        if !self.matrices.contains_key(&meta.default_metric) {
            return Err(RecsysError::corruption(format!(
                "default metric {} has no similarity matrix",
                meta.default_metric
            )));
        }

        for (metric, matrix) in &self.matrices {
            if matrix.metric() != *metric {
                return Err(RecsysError::corruption(format!(
                    "{} matrix is stored under {}",
                    matrix.metric(),
                    metric
                )));
            }
            if matrix.len() != meta.item_count {
                return Err(RecsysError::corruption(format!(
                    "{} matrix dimension {} does not match {} feature table rows",
                    metric,
                    matrix.len(),
                    meta.item_count
                )));
            }
            matrix
                .check_invariants(SIMILARITY_TOLERANCE)
                .map_err(RecsysError::corruption)?;
        }

        Ok(())
    }
}
