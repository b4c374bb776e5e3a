//! Core data models for the cinematch engine
//!
//! Raw catalog rows, the feature-table rows persisted with every artifact
//! version, query results, and the request parameter structs handed over by
//! the serving layer.

use crate::constants::{DEFAULT_RESULT_COUNT, DEFAULT_SEARCH_LIMIT};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable catalog identifier. Zero is never a valid id.
pub type ItemId = u32;

/// A user's ratings keyed by item id. Transient, never persisted.
pub type UserRatings = HashMap<ItemId, f32>;

/// Catalog item as read from the raw source, before feature engineering
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub item_id: ItemId,
    pub title: String,

    /// Release year if known; missing years are imputed at fit time
    pub release_year: Option<i32>,

    /// Genre membership in the vocabulary's fixed order
    pub genres: Vec<bool>,

    pub imdb_url: Option<String>,
}

impl RawItem {
    pub fn new(item_id: ItemId, title: impl Into<String>, release_year: Option<i32>, genres: Vec<bool>) -> Self {
        Self {
            item_id,
            title: title.into(),
            release_year,
            genres,
            imdb_url: None,
        }
    }
}

/// One row of the augmented feature table
///
/// The row position inside the table is the row/column index of every
/// similarity matrix built from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub item_id: ItemId,
    pub title: String,

    /// Release year after imputation
    pub year: i32,

    /// Whether `year` was imputed rather than read from the source
    pub year_imputed: bool,

    pub genres: Vec<bool>,

    /// Scaled year in `[0, year_weight]`
    pub year_normalized: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_url: Option<String>,
}

impl ItemRecord {
    /// Feature vector: genre flags as 0.0/1.0 followed by the scaled year
    pub fn feature_vector(&self) -> Vec<f32> {
        self.genres
            .iter()
            .map(|&flag| if flag { 1.0 } else { 0.0 })
            .chain(std::iter::once(self.year_normalized))
            .collect()
    }

    pub fn has_genres(&self) -> bool {
        self.genres.iter().any(|&flag| flag)
    }

    /// Year as shown to callers; imputed years are hidden
    pub fn display_year(&self) -> Option<i32> {
        if self.year_imputed {
            None
        } else {
            Some(self.year)
        }
    }
}

/// Item returned by a similar-items query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarItem {
    pub item_id: ItemId,
    pub title: String,
    pub year: Option<i32>,

    /// Similarity to the query item, in `[0, 1]`
    pub similarity: f32,
}

/// Item returned by a personalized recommendation query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub title: String,
    pub year: Option<i32>,

    /// Rating-weighted mean similarity to the user's liked items
    pub predicted_score: f32,
}

/// Short item description used by title search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSummary {
    pub item_id: ItemId,
    pub title: String,
    pub year: Option<i32>,
}

/// Full item description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemInfo {
    pub item_id: ItemId,
    pub title: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub imdb_url: Option<String>,
}

// Request parameter structs for the serving boundary

/// Parameters for a similar-items query
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SimilarParams {
    /// Item to find neighbours of
    pub item_id: ItemId,
    /// Number of similar items to return
    #[serde(default = "default_count")]
    pub n: usize,
    /// Similarity metric ("cosine" or "jaccard"); the engine default if absent
    #[serde(default)]
    pub metric: Option<String>,
}

/// Parameters for a personalized recommendation query
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecommendParams {
    /// The user's ratings as {item_id: rating}, ratings in 0.5..=5.0
    pub user_ratings: UserRatings,
    /// Number of recommendations to return; the configured default if absent
    #[serde(default)]
    pub n: Option<usize>,
    /// Minimum rating for an item to count as liked; the configured default if absent
    #[serde(default)]
    pub min_rating: Option<f32>,
    /// Similarity metric; the engine default if absent
    #[serde(default)]
    pub metric: Option<String>,
}

/// Parameters for a title search
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Case-insensitive title fragment
    pub query: String,
    /// Maximum number of results
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_count() -> usize {
    DEFAULT_RESULT_COUNT
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(genres: Vec<bool>, year_normalized: f32, year_imputed: bool) -> ItemRecord {
        ItemRecord {
            item_id: 1,
            title: "Toy Story (1995)".to_string(),
            year: 1995,
            year_imputed,
            genres,
            year_normalized,
            imdb_url: None,
        }
    }

    #[test]
    fn test_feature_vector_layout() {
        let item = record(vec![false, true, true], 0.05, false);
        assert_eq!(item.feature_vector(), vec![0.0, 1.0, 1.0, 0.05]);
        assert!(item.has_genres());
    }

    #[test]
    fn test_display_year_hides_imputed() {
        assert_eq!(record(vec![true], 0.0, false).display_year(), Some(1995));
        assert_eq!(record(vec![true], 0.0, true).display_year(), None);
    }

    #[test]
    fn test_recommend_params_defaults() {
        let params: RecommendParams =
            serde_json::from_str(r#"{"user_ratings": {"1": 5.0, "50": 4.0}}"#).unwrap();

        assert_eq!(params.user_ratings.len(), 2);
        assert_eq!(params.user_ratings[&50], 4.0);
        assert_eq!(params.n, None);
        assert_eq!(params.min_rating, None);
        assert!(params.metric.is_none());
    }

    #[test]
    fn test_item_record_json_omits_missing_url() {
        let json = serde_json::to_string(&record(vec![true], 0.1, false)).unwrap();
        assert!(!json.contains("imdb_url"));

        let back: ItemRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.imdb_url, None);
    }
}
