//! Online query engine
//!
//! Holds one loaded artifact version in memory and answers similar-item,
//! personalized recommendation, title search and item info queries.
//!
//! Lifecycle: `Unloaded -> Loading -> Ready`, and `Ready -> Loading -> Ready`
//! on an explicit reload. A load either installs a fully validated bundle or
//! leaves the engine exactly as it was; there is no partially loaded state.
//! While a reload is in flight the previous version keeps answering.
//!
//! Loaded artifacts are immutable and shared through an `Arc`, so queries
//! never block each other. The query cache is the only mutable shared
//! structure.

use crate::artifacts::{ArtifactMetadata, ModelArtifactSet};
use crate::cache::{CacheStats, QueryCache};
use crate::constants::{DEFAULT_CACHE_CAPACITY, RATING_MAX, RATING_MIN};
use crate::error::RecsysError;
use crate::models::{ItemId, ItemInfo, ItemSummary, Recommendation, SimilarItem, UserRatings};
use crate::search::TitleIndex;
use crate::similarity::{Metric, SimilarityMatrix};
use crate::storage::ArtifactStore;
use crate::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Engine construction options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Metric used when a query names none; the artifact's default if `None`
    pub default_metric: Option<Metric>,
    pub cache_capacity: NonZeroUsize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_metric: None,
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

/// Lifecycle state plus the version currently answering queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub version: Option<String>,
}

/// Cache key: query kind plus every parameter that shapes the answer.
/// `generation` ties an entry to the artifact load that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Similar {
        generation: u64,
        item_id: ItemId,
        n: usize,
        metric: Metric,
    },
    Recommend {
        generation: u64,
        ratings: Vec<(ItemId, u32)>,
        n: usize,
        min_rating: u32,
        metric: Metric,
    },
}

/// Ranked `(row, score)` pairs
type Ranking = Arc<Vec<(usize, f32)>>;

/// An artifact version prepared for querying
struct LoadedModel {
    artifacts: ModelArtifactSet,
    rows: HashMap<ItemId, usize>,
    titles: TitleIndex,
    default_metric: Metric,
    generation: u64,
}

impl LoadedModel {
    fn row_of(&self, item_id: ItemId) -> Result<usize> {
        self.rows
            .get(&item_id)
            .copied()
            .ok_or(RecsysError::NotFound { item_id })
    }

    fn matrix(&self, metric: Option<Metric>) -> Result<(Metric, &SimilarityMatrix)> {
        let metric = metric.unwrap_or(self.default_metric);
        let matrix = self.artifacts.matrix(metric).ok_or_else(|| {
            RecsysError::invalid_input(format!(
                "metric {} is not available in artifact version {}",
                metric,
                self.artifacts.version()
            ))
        })?;
        Ok((metric, matrix))
    }

    fn item_id(&self, row: usize) -> ItemId {
        self.artifacts.items()[row].item_id
    }

    /// Top `n` of `scored` by descending score, ties by ascending item id
    fn top_n(&self, mut scored: Vec<(usize, f32)>, n: usize) -> Vec<(usize, f32)> {
        let compare = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            b.1.total_cmp(&a.1)
                .then_with(|| self.item_id(a.0).cmp(&self.item_id(b.0)))
        };
        if scored.len() > n {
            scored.select_nth_unstable_by(n, compare);
            scored.truncate(n);
        }
        scored.sort_by(compare);
        scored
    }

    fn rank_similar(&self, row: usize, n: usize, matrix: &SimilarityMatrix) -> Vec<(usize, f32)> {
        let scored = matrix
            .row(row)
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != row)
            .map(|(other, &similarity)| (other, similarity))
            .collect();
        self.top_n(scored, n)
    }

    /// Rating-weighted mean similarity of every unrated row to the liked rows
    fn rank_recommendations(
        &self,
        liked: &[(usize, f32)],
        rated: &HashSet<usize>,
        n: usize,
        matrix: &SimilarityMatrix,
    ) -> Vec<(usize, f32)> {
        let mut totals = vec![0.0f32; matrix.len()];
        let mut weight_sum = 0.0f32;
        for &(row, rating) in liked {
            weight_sum += rating;
            for (total, &similarity) in totals.iter_mut().zip(matrix.row(row).iter()) {
                *total += rating * similarity;
            }
        }

        let scored = totals
            .into_iter()
            .enumerate()
            .filter(|(row, _)| !rated.contains(row))
            .map(|(row, total)| (row, (total / weight_sum).clamp(0.0, 1.0)))
            .collect();
        self.top_n(scored, n)
    }
}

/// Content-based similarity and recommendation engine
pub struct RecommendationEngine {
    config: EngineConfig,
    state: RwLock<EngineState>,
    model: RwLock<Option<Arc<LoadedModel>>>,

    /// Serializes loads so two reloads never interleave
    load_guard: tokio::sync::Mutex<()>,

    generation: AtomicU64,
    cache: QueryCache<CacheKey, Ranking>,
}

impl RecommendationEngine {
    /// Create an engine with nothing loaded
    pub fn new(config: EngineConfig) -> Self {
        let cache = QueryCache::new(config.cache_capacity);
        Self {
            config,
            state: RwLock::new(EngineState::Unloaded),
            model: RwLock::new(None),
            load_guard: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            cache,
        }
    }

    /// Create an engine and load `version` from `store`
    pub async fn open<S: ArtifactStore + ?Sized>(store: &S, version: &str, config: EngineConfig) -> Result<Self> {
        let engine = Self::new(config);
        engine.load(store, version).await?;
        Ok(engine)
    }

    /// Load (or reload) an artifact version
    ///
    /// On failure the engine returns to its previous state: `Unloaded`, or
    /// `Ready` on the version it was serving before.
    pub async fn load<S: ArtifactStore + ?Sized>(&self, store: &S, version: &str) -> Result<()> {
        let _guard = self.load_guard.lock().await;

        let previous = self.status();
        tracing::info!("Engine {:?} -> Loading artifact version {}", previous.state, version);
        *self.state.write() = EngineState::Loading;

        let loaded = match store.load(version).await {
            Ok(artifacts) => self.prepare(artifacts),
            Err(e) => Err(e),
        };

        match loaded {
            Ok(model) => {
                *self.model.write() = Some(Arc::new(model));
                *self.state.write() = EngineState::Ready;
                let dropped = self.cache.clear();
                tracing::info!(
                    "Engine ready on artifact version {} ({} cached results dropped)",
                    version,
                    dropped.size
                );
                Ok(())
            }
            Err(e) => {
                let restored = if previous.version.is_some() {
                    EngineState::Ready
                } else {
                    EngineState::Unloaded
                };
                *self.state.write() = restored;
                tracing::error!("Failed to load artifact version {}: {}", version, e);
                Err(e)
            }
        }
    }

    fn prepare(&self, artifacts: ModelArtifactSet) -> Result<LoadedModel> {
        let default_metric = self
            .config
            .default_metric
            .unwrap_or(artifacts.metadata().default_metric);
        if artifacts.matrix(default_metric).is_none() {
            return Err(RecsysError::corruption(format!(
                "default metric {} is not available in artifact version {}",
                default_metric,
                artifacts.version()
            )));
        }

        let rows = artifacts
            .items()
            .iter()
            .enumerate()
            .map(|(row, item)| (item.item_id, row))
            .collect();
        let titles = TitleIndex::new(artifacts.items());
        let generation = self.generation.fetch_add(1, AtomicOrdering::Relaxed) + 1;

        Ok(LoadedModel {
            artifacts,
            rows,
            titles,
            default_metric,
            generation,
        })
    }

    fn model(&self) -> Result<Arc<LoadedModel>> {
        self.model
            .read()
            .clone()
            .ok_or_else(|| RecsysError::uninitialized("no artifact version is loaded"))
    }

    pub fn status(&self) -> EngineStatus {
        let state = *self.state.read();
        let version = self
            .model
            .read()
            .as_ref()
            .map(|model| model.artifacts.version().to_string());
        EngineStatus { state, version }
    }

    /// Metadata of the loaded artifact version
    pub fn metadata(&self) -> Result<ArtifactMetadata> {
        Ok(self.model()?.artifacts.metadata().clone())
    }

    /// Metric used when a query names none
    pub fn default_metric(&self) -> Result<Metric> {
        Ok(self.model()?.default_metric)
    }

    /// Items most similar to `item_id`, best first, excluding the item itself
    pub fn similar(&self, item_id: ItemId, n: usize, metric: Option<Metric>) -> Result<Vec<SimilarItem>> {
        check_item_id(item_id)?;
        check_count(n)?;

        let model = self.model()?;
        let (metric, matrix) = model.matrix(metric)?;
        let row = model.row_of(item_id)?;

        let key = CacheKey::Similar {
            generation: model.generation,
            item_id,
            n,
            metric,
        };
        let ranking = self
            .cache
            .get_or_try_insert(key, || -> Result<Ranking> { Ok(Arc::new(model.rank_similar(row, n, matrix))) })?;

        let items = model.artifacts.items();
        Ok(ranking
            .iter()
            .map(|&(row, similarity)| SimilarItem {
                item_id: items[row].item_id,
                title: items[row].title.clone(),
                year: items[row].display_year(),
                similarity,
            })
            .collect())
    }

    /// Personalized top-`n` from a user's ratings
    ///
    /// Items rated at least `min_rating` are "liked". Each unrated item is
    /// scored by the rating-weighted mean of its similarity to the liked
    /// items: `sum(r_l * S[l][c]) / sum(r_l)`. Rated ids missing from the
    /// catalog are ignored.
    pub fn recommend(
        &self,
        user_ratings: &UserRatings,
        n: usize,
        min_rating: f32,
        metric: Option<Metric>,
    ) -> Result<Vec<Recommendation>> {
        if user_ratings.is_empty() {
            return Err(RecsysError::invalid_input("user_ratings cannot be empty"));
        }
        for (&item_id, &rating) in user_ratings {
            check_item_id(item_id)?;
            check_rating(rating, "rating")?;
        }
        check_rating(min_rating, "min_rating")?;
        check_count(n)?;

        let model = self.model()?;
        let (metric, matrix) = model.matrix(metric)?;

        let mut rated = HashSet::with_capacity(user_ratings.len());
        let mut liked = Vec::new();
        let mut unknown = 0usize;
        for (&item_id, &rating) in user_ratings {
            match model.rows.get(&item_id) {
                Some(&row) => {
                    rated.insert(row);
                    if rating >= min_rating {
                        liked.push((row, rating));
                    }
                }
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            tracing::debug!("Ignoring {} rated items missing from the catalog", unknown);
        }
        if liked.is_empty() {
            return Err(RecsysError::invalid_input(format!(
                "no rated catalog item has a rating >= {min_rating}"
            )));
        }
        // Fixed order keeps the floating-point sums identical across calls
        liked.sort_by_key(|&(row, _)| row);

        let mut key_ratings: Vec<(ItemId, u32)> = user_ratings
            .iter()
            .map(|(&item_id, &rating)| (item_id, rating.to_bits()))
            .collect();
        key_ratings.sort_unstable();
        let key = CacheKey::Recommend {
            generation: model.generation,
            ratings: key_ratings,
            n,
            min_rating: min_rating.to_bits(),
            metric,
        };

        let ranking = self.cache.get_or_try_insert(key, || -> Result<Ranking> {
            Ok(Arc::new(model.rank_recommendations(&liked, &rated, n, matrix)))
        })?;

        let items = model.artifacts.items();
        Ok(ranking
            .iter()
            .map(|&(row, score)| Recommendation {
                item_id: items[row].item_id,
                title: items[row].title.clone(),
                year: items[row].display_year(),
                predicted_score: score,
            })
            .collect())
    }

    /// Case-insensitive title search, prefix matches first
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ItemSummary>> {
        if query.trim().is_empty() {
            return Err(RecsysError::invalid_input("search query cannot be empty"));
        }
        check_count(limit)?;

        let model = self.model()?;
        let items = model.artifacts.items();
        Ok(model
            .titles
            .search(query, limit)
            .into_iter()
            .map(|row| ItemSummary {
                item_id: items[row].item_id,
                title: items[row].title.clone(),
                year: items[row].display_year(),
            })
            .collect())
    }

    /// Details of one item, `None` if it is not in the catalog
    pub fn info(&self, item_id: ItemId) -> Result<Option<ItemInfo>> {
        let model = self.model()?;
        let Some(&row) = model.rows.get(&item_id) else {
            return Ok(None);
        };

        let item = &model.artifacts.items()[row];
        let genre_columns = &model.artifacts.metadata().genre_columns;
        let genres = item
            .genres
            .iter()
            .zip(genre_columns)
            .filter(|(flag, _)| **flag)
            .map(|(_, name)| name.clone())
            .collect();

        Ok(Some(ItemInfo {
            item_id: item.item_id,
            title: item.title.clone(),
            year: item.display_year(),
            genres,
            imdb_url: item.imdb_url.clone(),
        }))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached result. Loaded artifacts are untouched.
    pub fn invalidate_cache(&self) -> CacheStats {
        let previous = self.cache.clear();
        tracing::info!(
            "Query cache cleared ({} entries, {} hits, {} misses)",
            previous.size,
            previous.hits,
            previous.misses
        );
        previous
    }
}

fn check_item_id(item_id: ItemId) -> Result<()> {
    if item_id == 0 {
        return Err(RecsysError::invalid_input("item ids are positive integers, got 0"));
    }
    Ok(())
}

fn check_count(n: usize) -> Result<()> {
    if n == 0 {
        return Err(RecsysError::invalid_input("result count must be at least 1"));
    }
    Ok(())
}

fn check_rating(rating: f32, what: &str) -> Result<()> {
    if !rating.is_finite() || !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(RecsysError::invalid_input(format!(
            "{what} must be between {RATING_MIN} and {RATING_MAX}, got {rating}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::tests::{sample_artifacts, sample_genres, sample_items};
    use crate::features::FeatureEngineer;
    use crate::similarity::SimilarityEngine;
    use crate::storage::InMemoryArtifactStore;

    async fn store_with(versions: &[&str]) -> InMemoryArtifactStore {
        let store = InMemoryArtifactStore::new();
        for version in versions {
            store.save(&sample_artifacts(version)).await.unwrap();
        }
        store
    }

    async fn ready_engine() -> RecommendationEngine {
        let store = store_with(&["v1"]).await;
        RecommendationEngine::open(&store, "v1", EngineConfig::default())
            .await
            .unwrap()
    }

    fn ratings(pairs: &[(ItemId, f32)]) -> UserRatings {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_unloaded_engine_rejects_queries() {
        let engine = RecommendationEngine::new(EngineConfig::default());

        assert_eq!(engine.status().state, EngineState::Unloaded);
        assert!(matches!(
            engine.similar(1, 5, None),
            Err(RecsysError::UninitializedState { .. })
        ));
        assert!(matches!(engine.info(1), Err(RecsysError::UninitializedState { .. })));
        assert!(matches!(engine.metadata(), Err(RecsysError::UninitializedState { .. })));
    }

    #[tokio::test]
    async fn test_load_reaches_ready() {
        let engine = ready_engine().await;
        let status = engine.status();

        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(status.version.as_deref(), Some("v1"));
        assert_eq!(engine.default_metric().unwrap(), Metric::Cosine);
        assert_eq!(engine.metadata().unwrap().item_count, 8);
    }

    #[tokio::test]
    async fn test_similar_excludes_self_and_is_sorted() {
        let engine = ready_engine().await;
        let results = engine.similar(1, 5, None).unwrap();

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.item_id != 1));
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_similar_ties_broken_by_item_id() {
        let engine = ready_engine().await;
        let results = engine.similar(2, 7, Some(Metric::Jaccard)).unwrap();

        for pair in results.windows(2) {
            if pair[0].similarity == pair[1].similarity {
                assert!(pair[0].item_id < pair[1].item_id);
            }
        }
        // GoldenEye and Die Hard share the exact genre set
        assert_eq!(results[0].item_id, 7);
        assert_eq!(results[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn test_similar_n_larger_than_catalog() {
        let engine = ready_engine().await;
        assert_eq!(engine.similar(3, 100, None).unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_similar_errors() {
        let engine = ready_engine().await;

        assert!(matches!(engine.similar(0, 5, None), Err(RecsysError::InvalidInput { .. })));
        assert!(matches!(engine.similar(1, 0, None), Err(RecsysError::InvalidInput { .. })));
        assert!(matches!(
            engine.similar(999, 5, None),
            Err(RecsysError::NotFound { item_id: 999 })
        ));
    }

    #[tokio::test]
    async fn test_cached_results_match_fresh_results() {
        let engine = ready_engine().await;

        let first = engine.similar(4, 3, None).unwrap();
        let second = engine.similar(4, 3, None).unwrap();
        assert_eq!(first, second);

        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);

        let previous = engine.invalidate_cache();
        assert_eq!(previous.size, 1);
        assert_eq!(engine.cache_stats().size, 0);

        assert_eq!(engine.similar(4, 3, None).unwrap(), first);
        assert_eq!(engine.status().state, EngineState::Ready);
    }

    #[tokio::test]
    async fn test_recommend_excludes_rated_items() {
        let engine = ready_engine().await;
        let user = ratings(&[(2, 5.0), (4, 4.0), (3, 1.0)]);

        let results = engine.recommend(&user, 10, 3.5, None).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| !user.contains_key(&r.item_id)));
        for pair in results.windows(2) {
            assert!(pair[0].predicted_score >= pair[1].predicted_score);
        }
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.predicted_score)));
        // Die Hard matches GoldenEye exactly on genres
        assert_eq!(results[0].item_id, 7);
    }

    #[tokio::test]
    async fn test_recommend_is_deterministic_across_cache() {
        let engine = ready_engine().await;
        let user = ratings(&[(1, 4.5), (7, 5.0)]);

        let first = engine.recommend(&user, 3, 3.5, Some(Metric::Jaccard)).unwrap();
        let cached = engine.recommend(&user, 3, 3.5, Some(Metric::Jaccard)).unwrap();
        engine.invalidate_cache();
        let fresh = engine.recommend(&user, 3, 3.5, Some(Metric::Jaccard)).unwrap();

        assert_eq!(first, cached);
        assert_eq!(first, fresh);
    }

    #[tokio::test]
    async fn test_recommend_errors() {
        let engine = ready_engine().await;

        let empty = UserRatings::new();
        assert!(matches!(
            engine.recommend(&empty, 5, 3.5, None),
            Err(RecsysError::InvalidInput { .. })
        ));

        let all_low = ratings(&[(1, 2.0), (2, 1.0)]);
        assert!(matches!(
            engine.recommend(&all_low, 5, 3.5, None),
            Err(RecsysError::InvalidInput { .. })
        ));

        let out_of_range = ratings(&[(1, 6.0)]);
        assert!(engine.recommend(&out_of_range, 5, 3.5, None).is_err());

        let zero_id = ratings(&[(0, 4.0)]);
        assert!(engine.recommend(&zero_id, 5, 3.5, None).is_err());

        let unknown_only = ratings(&[(500, 5.0)]);
        assert!(matches!(
            engine.recommend(&unknown_only, 5, 3.5, None),
            Err(RecsysError::InvalidInput { .. })
        ));

        let fine = ratings(&[(1, 5.0)]);
        assert!(engine.recommend(&fine, 5, 9.0, None).is_err());
    }

    #[tokio::test]
    async fn test_search_and_info() {
        let engine = ready_engine().await;

        let results = engine.search("toy", 10).unwrap();
        let ids: Vec<ItemId> = results.iter().map(|r| r.item_id).collect();
        assert_eq!(ids, vec![1, 8]);
        assert_eq!(results[0].year, Some(1995));
        assert_eq!(results[1].year, None); // imputed

        assert!(engine.search("  ", 10).is_err());

        let info = engine.info(4).unwrap().unwrap();
        assert_eq!(info.title, "Get Shorty (1995)");
        assert_eq!(info.genres, vec!["Action", "Comedy"]);
        assert!(engine.info(999).unwrap().is_none());
        assert!(engine.info(0).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_first_load_stays_unloaded() {
        let store = store_with(&[]).await;
        let engine = RecommendationEngine::new(EngineConfig::default());

        let result = engine.load(&store, "v1").await;
        assert!(matches!(result, Err(RecsysError::ArtifactCorruption { .. })));
        assert_eq!(
            engine.status(),
            EngineStatus {
                state: EngineState::Unloaded,
                version: None
            }
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_version() {
        let store = store_with(&["v1"]).await;
        let engine = RecommendationEngine::open(&store, "v1", EngineConfig::default())
            .await
            .unwrap();
        let before = engine.similar(1, 3, None).unwrap();

        assert!(engine.load(&store, "v2").await.is_err());

        let status = engine.status();
        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(status.version.as_deref(), Some("v1"));
        assert_eq!(engine.similar(1, 3, None).unwrap(), before);
    }

    #[tokio::test]
    async fn test_reload_switches_version_and_clears_cache() {
        let store = store_with(&["v1", "v2"]).await;
        let engine = RecommendationEngine::open(&store, "v1", EngineConfig::default())
            .await
            .unwrap();
        engine.similar(1, 3, None).unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        engine.load(&store, "v2").await.unwrap();
        assert_eq!(engine.status().version.as_deref(), Some("v2"));
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_configured_default_metric() {
        let store = store_with(&["v1"]).await;
        let config = EngineConfig {
            default_metric: Some(Metric::Jaccard),
            ..EngineConfig::default()
        };
        let engine = RecommendationEngine::open(&store, "v1", config).await.unwrap();

        assert_eq!(engine.default_metric().unwrap(), Metric::Jaccard);
        assert_eq!(
            engine.similar(2, 3, None).unwrap(),
            engine.similar(2, 3, Some(Metric::Jaccard)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_default_metric_fails_load() {
        let mut engineer = FeatureEngineer::new(sample_genres(), 0.1).unwrap();
        let (items, features) = engineer.fit_transform(&sample_items()).unwrap();
        let matrices = SimilarityEngine::compute(
            &features,
            engineer.genre_columns(),
            &items,
            &["jaccard".to_string()],
        )
        .unwrap();
        let jaccard_only = ModelArtifactSet::build("jaccard-only", engineer, items, matrices, Metric::Jaccard).unwrap();

        let store = InMemoryArtifactStore::new();
        store.save(&jaccard_only).await.unwrap();

        let config = EngineConfig {
            default_metric: Some(Metric::Cosine),
            ..EngineConfig::default()
        };
        let engine = RecommendationEngine::new(config);
        let err = engine.load(&store, "jaccard-only").await.unwrap_err();

        assert!(matches!(err, RecsysError::ArtifactCorruption { .. }));
        assert!(!err.is_recoverable());
        assert_eq!(engine.status().state, EngineState::Unloaded);

        // Without an override the bundle's own default applies
        let engine = RecommendationEngine::open(&store, "jaccard-only", EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(engine.default_metric().unwrap(), Metric::Jaccard);
    }

    #[tokio::test]
    async fn test_concurrent_queries() {
        let engine = Arc::new(ready_engine().await);
        let expected = engine.similar(1, 4, None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let mut answers = Vec::new();
                    for id in 1..=8 {
                        answers.push(engine.similar(id, 4, None).unwrap());
                    }
                    answers
                })
            })
            .collect();

        for handle in handles {
            let answers = handle.join().unwrap();
            assert_eq!(answers[0], expected);
        }
    }
}
