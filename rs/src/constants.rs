//! Constants for the cinematch recommendation engine
//!
//! Defaults here match the MovieLens-100k catalog the engine was built around.

// Feature engineering

/// Weight of the scaled release year relative to a single genre flag.
pub const DEFAULT_YEAR_WEIGHT: f32 = 0.1;

/// Name of the trailing year column in the feature table.
pub const YEAR_FEATURE_NAME: &str = "year_normalized";

/// Genre vocabulary of MovieLens-100k, in `u.item` column order.
pub const DEFAULT_GENRES: [&str; 19] = [
    "unknown",
    "Action",
    "Adventure",
    "Animation",
    "Children",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

// Similarity invariants

/// Tolerance used when checking symmetry and the unit diagonal.
pub const SIMILARITY_TOLERANCE: f32 = 1e-5;

// Rating bounds

/// Lowest rating a user may give.
pub const RATING_MIN: f32 = 0.5;

/// Highest rating a user may give.
pub const RATING_MAX: f32 = 5.0;

/// Ratings at or above this count as "liked" unless the caller overrides it.
pub const DEFAULT_MIN_RATING: f32 = 3.5;

// Query defaults

/// Default number of results for similar/recommend queries.
pub const DEFAULT_RESULT_COUNT: usize = 10;

/// Default number of results for title search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Default capacity of the per-engine query cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

// Artifact layout

/// Metadata descriptor file name.
pub const METADATA_FILE: &str = "metadata.json";

/// Feature table file name.
pub const ITEMS_FILE: &str = "items.json";

/// Fitted feature engineer file name.
pub const SCALER_FILE: &str = "feature_scaler.json";

/// Suffix of per-metric similarity matrix files (`<metric>_similarity.bin`).
pub const MATRIX_FILE_SUFFIX: &str = "_similarity.bin";
