//! Offline training: catalog -> features -> similarity matrices -> stored bundle

use crate::artifacts::ModelArtifactSet;
use crate::catalog::load_movielens_items;
use crate::config::Settings;
use crate::error::RecsysError;
use crate::features::FeatureEngineer;
use crate::models::RawItem;
use crate::similarity::{Metric, SimilarityEngine};
use crate::storage::ArtifactStore;
use crate::Result;
use std::time::Instant;

pub struct TrainingPipeline {
    settings: Settings,
}

impl TrainingPipeline {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Train from the configured catalog file and save the bundle to `store`
    pub async fn run<S: ArtifactStore + ?Sized>(&self, store: &S) -> Result<ModelArtifactSet> {
        let total = Instant::now();
        tracing::info!("Training artifact version {}", self.settings.model.version);

        let start = Instant::now();
        let items = load_movielens_items(self.settings.movies_path(), &self.settings.features.genre_columns).await?;
        tracing::info!("Catalog loaded in {:?}", start.elapsed());

        let artifacts = self.build_artifacts(&items)?;

        let start = Instant::now();
        store.save(&artifacts).await?;
        tracing::info!("Artifacts saved in {:?}", start.elapsed());

        tracing::info!(
            "Training of {} finished in {:?}",
            artifacts.version(),
            total.elapsed()
        );
        Ok(artifacts)
    }

    /// Feature engineering and similarity computation, fully in memory
    pub fn build_artifacts(&self, items: &[RawItem]) -> Result<ModelArtifactSet> {
        let features = &self.settings.features;
        let similarity = &self.settings.similarity;

        let default_metric = Metric::lookup(&similarity.default_method).ok_or_else(|| {
            RecsysError::invalid_input(format!(
                "unknown default similarity method {:?}",
                similarity.default_method
            ))
        })?;

        let start = Instant::now();
        let mut engineer = FeatureEngineer::new(features.genre_columns.clone(), features.year_weight)?;
        let (table, matrix) = engineer.fit_transform(items)?;
        let without_genres = table.iter().filter(|record| !record.has_genres()).count();
        if without_genres > 0 {
            tracing::warn!("{} items have no genres assigned", without_genres);
        }
        tracing::info!(
            "Feature matrix {}x{} built in {:?}",
            matrix.nrows(),
            matrix.ncols(),
            start.elapsed()
        );

        let start = Instant::now();
        let matrices = SimilarityEngine::compute(&matrix, engineer.genre_columns(), &table, &similarity.methods)?;
        if !matrices.contains_key(&default_metric) {
            return Err(RecsysError::invalid_input(format!(
                "default similarity method {} is not among the computed methods {:?}",
                default_metric, similarity.methods
            )));
        }
        tracing::info!("Similarity matrices computed in {:?}", start.elapsed());

        ModelArtifactSet::build(
            self.settings.model.version.clone(),
            engineer,
            table,
            matrices,
            default_metric,
        )
    }
}
