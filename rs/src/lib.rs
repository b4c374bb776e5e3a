//! Cinematch: content-based movie similarity and recommendation
//!
//! Training turns a movie catalog into a versioned artifact bundle
//! (feature table, pairwise similarity matrices, fitted scaler, metadata).
//! The [`RecommendationEngine`] loads one bundle and answers similar-item,
//! personalized recommendation and title search queries from memory.

pub mod artifacts;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod features;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod similarity;
pub mod storage;

// Re-export main types for convenience
pub use artifacts::{ArtifactMetadata, ModelArtifactSet};
pub use cache::CacheStats;
pub use config::Settings;
pub use engine::{EngineConfig, EngineState, EngineStatus, RecommendationEngine};
pub use error::RecsysError;
pub use features::FeatureEngineer;
pub use models::{
    ItemId, ItemInfo, ItemSummary, RawItem, RecommendParams, Recommendation, SearchParams, SimilarItem,
    SimilarParams, UserRatings,
};
pub use pipeline::TrainingPipeline;
pub use similarity::{Metric, SimilarityEngine, SimilarityMatrix};
pub use storage::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, RecsysError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
