//! TOML settings shared by the training and query binaries

use crate::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_GENRES, DEFAULT_MIN_RATING, DEFAULT_RESULT_COUNT, DEFAULT_YEAR_WEIGHT,
};
use crate::error::RecsysError;
use crate::models::RecommendParams;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable selecting the deployment profile
pub const ENV_VAR: &str = "CINEMATCH_ENV";

/// Profile whose `<stem>.prod.toml` overlay is merged over the base file
pub const PRODUCTION_PROFILE: &str = "production";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSettings {
    pub raw_data_dir: PathBuf,
    pub movies_file: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            raw_data_dir: PathBuf::from("ml-100k"),
            movies_file: "u.item".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub artifacts_dir: PathBuf,
    pub version: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("models"),
            version: "v1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureSettings {
    pub year_weight: f32,
    pub genre_columns: Vec<String>,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            year_weight: DEFAULT_YEAR_WEIGHT,
            genre_columns: DEFAULT_GENRES.iter().map(|g| g.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimilaritySettings {
    pub methods: Vec<String>,
    pub default_method: String,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            methods: vec!["cosine".to_string(), "jaccard".to_string()],
            default_method: "cosine".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendSettings {
    pub default_n: usize,
    pub min_rating: f32,
}

impl Default for RecommendSettings {
    fn default() -> Self {
        Self {
            default_n: DEFAULT_RESULT_COUNT,
            min_rating: DEFAULT_MIN_RATING,
        }
    }
}

impl RecommendSettings {
    /// `(n, min_rating)` for a request, filling absent fields from these settings
    pub fn resolve(&self, params: &RecommendParams) -> (usize, f32) {
        (
            params.n.unwrap_or(self.default_n),
            params.min_rating.unwrap_or(self.min_rating),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete configuration; every section and key is optional in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub model: ModelSettings,
    pub features: FeatureSettings,
    pub similarity: SimilaritySettings,
    pub cache: CacheSettings,
    pub recommend: RecommendSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given
    ///
    /// A missing file falls back to defaults with a warning. With
    /// `CINEMATCH_ENV=production` the sibling `<stem>.prod.toml`, if present,
    /// is merged over the base file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let production = std::env::var(ENV_VAR)
            .map(|profile| profile.eq_ignore_ascii_case(PRODUCTION_PROFILE))
            .unwrap_or(false);
        match path {
            Some(path) => Self::load_profile(path, production),
            None => Ok(Self::default()),
        }
    }

    fn load_profile(path: &Path, production: bool) -> Result<Self> {
        let Some(mut merged) = read_table(path)? else {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        };

        if production {
            let overlay_path = overlay_path(path);
            if let Some(overlay) = read_table(&overlay_path)? {
                tracing::info!("Applying production overrides from {}", overlay_path.display());
                merge(&mut merged, overlay);
            }
        }

        let settings: Settings = merged
            .try_into()
            .map_err(|e| RecsysError::invalid_input(format!("Invalid config {}: {e}", path.display())))?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Directory holding one subdirectory per artifact version
    pub fn artifact_root(&self) -> &Path {
        &self.model.artifacts_dir
    }

    /// Location of the MovieLens `u.item` file
    pub fn movies_path(&self) -> PathBuf {
        self.data.raw_data_dir.join(&self.data.movies_file)
    }
}

fn overlay_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("config");
    path.with_file_name(format!("{stem}.prod.toml"))
}

fn read_table(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)
        .map_err(|e| RecsysError::invalid_input(format!("Failed to parse TOML in {}: {e}", path.display())))?;
    Ok(Some(value))
}

/// Tables merge key-wise; any other value in `overlay` replaces the base
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
