//! Artifact storage
//!
//! The engine depends only on the `ArtifactStore` contract. The file-based
//! store keeps one directory per version:
//!
//! ```text
//! <root>/<version>/metadata.json
//! <root>/<version>/items.json
//! <root>/<version>/feature_scaler.json
//! <root>/<version>/<metric>_similarity.bin
//! ```
//!
//! Row order of `items.json` is the row/column order of every matrix file.

use crate::artifacts::{ArtifactMetadata, ModelArtifactSet};
use crate::constants::{ITEMS_FILE, METADATA_FILE, SCALER_FILE};
use crate::error::RecsysError;
use crate::features::FeatureEngineer;
use crate::models::ItemRecord;
use crate::similarity::SimilarityMatrix;
use crate::Result;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Read/write contract for versioned artifact bundles
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new version. Existing versions are never overwritten.
    async fn save(&self, artifacts: &ModelArtifactSet) -> Result<()>;

    /// Load and validate one version. Any missing or inconsistent part is
    /// reported as `ArtifactCorruption`.
    async fn load(&self, version: &str) -> Result<ModelArtifactSet>;

    /// All stored versions, sorted
    async fn list_versions(&self) -> Result<Vec<String>>;
}

/// Directory-backed artifact store
pub struct FileArtifactStore {
    /// Directory holding one subdirectory per version
    root: PathBuf,
}

impl FileArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).await?;
        }

        let metadata = fs::metadata(&root).await?;
        if !metadata.is_dir() {
            return Err(RecsysError::invalid_input(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one version
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    async fn write_version(&self, dir: &Path, artifacts: &ModelArtifactSet) -> Result<()> {
        let metadata = serde_json::to_vec_pretty(artifacts.metadata())?;
        fs::write(dir.join(METADATA_FILE), metadata).await?;

        let items = serde_json::to_vec(artifacts.items())?;
        fs::write(dir.join(ITEMS_FILE), items).await?;

        let scaler = serde_json::to_vec_pretty(artifacts.feature_engineer())?;
        fs::write(dir.join(SCALER_FILE), scaler).await?;

        for (metric, matrix) in artifacts.matrices() {
            let bytes = bincode::serialize(matrix)
                .map_err(|e| RecsysError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            fs::write(dir.join(metric.file_name()), bytes).await?;
            tracing::info!("  Saved {} similarity matrix: {}", metric, metric.file_name());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save(&self, artifacts: &ModelArtifactSet) -> Result<()> {
        let version = artifacts.version();
        check_version_name(version)?;

        let target = self.version_dir(version);
        if target.exists() {
            return Err(RecsysError::invalid_input(format!(
                "artifact version {version} already exists at {}",
                target.display()
            )));
        }

        tracing::info!("Saving artifacts to: {}", target.display());
        let start = std::time::Instant::now();

        // Write into a hidden sibling and rename, so a version directory is
        // either complete or absent.
        let staging = self.root.join(format!(".{version}.tmp-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging).await?;

        let written = match self.write_version(&staging, artifacts).await {
            Ok(()) => fs::rename(&staging, &target).await.map_err(RecsysError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                tracing::warn!("Failed to remove staging dir {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        tracing::info!("Saved artifact version {} in {:?}", version, start.elapsed());
        Ok(())
    }

    async fn load(&self, version: &str) -> Result<ModelArtifactSet> {
        check_version_name(version)?;

        let dir = self.version_dir(version);
        if !dir.is_dir() {
            return Err(RecsysError::corruption(format!(
                "artifact version {version} not found at {}",
                dir.display()
            )));
        }

        tracing::info!("Loading artifacts from {}", dir.display());
        let start = std::time::Instant::now();

        let metadata: ArtifactMetadata = read_json(&dir.join(METADATA_FILE)).await?;
        if metadata.version != version {
            return Err(RecsysError::corruption(format!(
                "directory {version} holds metadata for version {}",
                metadata.version
            )));
        }

        let items: Vec<ItemRecord> = read_json(&dir.join(ITEMS_FILE)).await?;
        let feature_engineer: FeatureEngineer = read_json(&dir.join(SCALER_FILE)).await?;

        let mut matrices = BTreeMap::new();
        for metric in &metadata.metrics {
            let path = dir.join(metric.file_name());
            let bytes = read_required(&path).await?;
            let matrix: SimilarityMatrix = bincode::deserialize(&bytes).map_err(|e| {
                RecsysError::corruption(format!("malformed matrix file {}: {}", path.display(), e))
            })?;
            matrices.insert(*metric, matrix);
        }

        let artifacts = ModelArtifactSet::from_parts(metadata, items, matrices, feature_engineer)?;

        tracing::info!(
            "Loaded {} items and {} similarity matrices in {:?}",
            artifacts.items().len(),
            artifacts.matrices().len(),
            start.elapsed()
        );
        Ok(artifacts)
    }

    async fn list_versions(&self) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };

            // Skip staging directories and anything that is not a bundle
            if name.starts_with('.') || !path.join(METADATA_FILE).is_file() {
                continue;
            }
            versions.push(name.to_string());
        }

        versions.sort();
        tracing::debug!("Found {} artifact versions in {}", versions.len(), self.root.display());
        Ok(versions)
    }
}

/// In-memory artifact store, for tests and embedding
#[derive(Default)]
pub struct InMemoryArtifactStore {
    versions: RwLock<HashMap<String, ModelArtifactSet>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, artifacts: &ModelArtifactSet) -> Result<()> {
        check_version_name(artifacts.version())?;
        artifacts.validate()?;

        let mut versions = self.versions.write().await;
        if versions.contains_key(artifacts.version()) {
            return Err(RecsysError::invalid_input(format!(
                "artifact version {} already exists",
                artifacts.version()
            )));
        }
        versions.insert(artifacts.version().to_string(), artifacts.clone());
        Ok(())
    }

    async fn load(&self, version: &str) -> Result<ModelArtifactSet> {
        let versions = self.versions.read().await;
        versions
            .get(version)
            .cloned()
            .ok_or_else(|| RecsysError::corruption(format!("artifact version {version} not found")))
    }

    async fn list_versions(&self) -> Result<Vec<String>> {
        let versions = self.versions.read().await;
        let mut names: Vec<String> = versions.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Version ids name a single directory component
fn check_version_name(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && !version.starts_with('.')
        && !version.contains(['/', '\\'])
        && version != "..";
    if valid {
        Ok(())
    } else {
        Err(RecsysError::invalid_input(format!("invalid artifact version id: {version:?}")))
    }
}

async fn read_required(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RecsysError::corruption(format!("missing required artifact file {}", path.display()))
        } else {
            RecsysError::corruption(format!("failed to read {}: {}", path.display(), e))
        }
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read_required(path).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RecsysError::corruption(format!("malformed {}: {}", path.display(), e)))
}
