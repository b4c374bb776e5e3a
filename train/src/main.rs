//! Cinematch training tool
//!
//! Reads the MovieLens catalog, builds the feature table and similarity
//! matrices, and saves them as a new immutable artifact version.

use anyhow::{Context, Result};
use cinematch::{logging, FileArtifactStore, Settings, TrainingPipeline};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cinematch-train",
    about = "Train a cinematch artifact version from a MovieLens catalog",
    long_about = r#"
Train a cinematch artifact version from a MovieLens catalog

Examples:
  cinematch-train --config config/config.toml
  cinematch-train --version v1.1.0
  CINEMATCH_ENV=production cinematch-train --config config/config.toml
"#
)]
struct Args {
    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Version id of the new artifact bundle (overrides the config file)
    #[arg(long = "version")]
    model_version: Option<String>,

    /// Directory containing the MovieLens files (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding artifact versions (overrides the config file)
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = logging::init(args.debug);

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    log_level.apply(&settings.logging.level)?;
    if let Some(version) = args.model_version {
        settings.model.version = version;
    }
    if let Some(dir) = args.data_dir {
        settings.data.raw_data_dir = dir;
    }
    if let Some(dir) = args.artifacts_dir {
        settings.model.artifacts_dir = dir;
    }

    tracing::info!("Cinematch version: {}", cinematch::VERSION);
    tracing::info!("Catalog: {}", settings.movies_path().display());
    tracing::info!("Artifact directory: {}", settings.artifact_root().display());

    let store = FileArtifactStore::new(settings.artifact_root())
        .await
        .with_context(|| format!("Failed to open artifact store {}", settings.artifact_root().display()))?;

    let pipeline = TrainingPipeline::new(settings);
    let artifacts = pipeline
        .run(&store)
        .await
        .with_context(|| format!("Training of version {} failed", pipeline.settings().model.version))?;

    let metadata = artifacts.metadata();
    println!("Saved artifact version {}", metadata.version);
    println!("  Build id: {}", metadata.build_id);
    println!("  Items: {}", metadata.item_count);
    println!("  Feature dimension: {}", metadata.feature_dim);
    println!("  Metrics: {:?} (default {})", metadata.metrics, metadata.default_metric);

    Ok(())
}
