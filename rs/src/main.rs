//! Cinematch query tool
//!
//! Loads one artifact version and answers a single query, printing JSON.

use anyhow::{Context, Result};
use cinematch::{
    logging, EngineConfig, FileArtifactStore, ArtifactStore, Metric, RecommendParams, RecommendationEngine, SearchParams,
    Settings, SimilarParams,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cinematch-query")]
#[command(about = "Query a trained cinematch artifact version")]
struct Args {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding artifact versions (overrides the config file)
    #[arg(long, global = true)]
    artifacts_dir: Option<PathBuf>,

    /// Artifact version to load (overrides the config file)
    #[arg(long = "version", global = true)]
    model_version: Option<String>,

    /// Similarity metric used when a query names none
    #[arg(long, global = true)]
    metric: Option<Metric>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Items most similar to one item
    Similar {
        item_id: u32,
        #[arg(short, long)]
        n: Option<usize>,
    },
    /// Personalized recommendations from a JSON ratings document
    Recommend {
        /// File holding {"user_ratings": {"<id>": <rating>}, "n": .., "min_rating": .., "metric": ..}
        ratings: PathBuf,
    },
    /// Case-insensitive title search
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Details of one item
    Info { item_id: u32 },
    /// List stored artifact versions
    Versions,
    /// Engine status, artifact metadata and cache counters
    Stats,
    /// JSON schemas of the query parameter documents
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging before settings so config warnings are shown
    let log_level = logging::init(args.debug);

    let mut settings = Settings::load(args.config.as_deref())?;
    log_level.apply(&settings.logging.level)?;
    if let Some(dir) = &args.artifacts_dir {
        settings.model.artifacts_dir = dir.clone();
    }
    if let Some(version) = &args.model_version {
        settings.model.version = version.clone();
    }

    tracing::debug!("Cinematch version: {}", cinematch::VERSION);

    if let Command::Schema = args.command {
        let schemas = serde_json::json!({
            "similar": schemars::schema_for!(SimilarParams),
            "recommend": schemars::schema_for!(RecommendParams),
            "search": schemars::schema_for!(SearchParams),
        });
        return print_json(&schemas);
    }

    let store = FileArtifactStore::new(settings.artifact_root())
        .await
        .with_context(|| format!("Failed to open artifact store {}", settings.artifact_root().display()))?;

    if let Command::Versions = args.command {
        return print_json(&store.list_versions().await?);
    }

    let config = EngineConfig {
        // The artifact's own default applies unless --metric is given
        default_metric: args.metric,
        cache_capacity: NonZeroUsize::new(settings.cache.capacity).context("cache capacity must be at least 1")?,
    };
    let engine = RecommendationEngine::open(&store, &settings.model.version, config)
        .await
        .with_context(|| format!("Failed to load artifact version {}", settings.model.version))?;

    match args.command {
        Command::Similar { item_id, n } => {
            let n = n.unwrap_or(settings.recommend.default_n);
            print_json(&engine.similar(item_id, n, None)?)
        }
        Command::Recommend { ratings } => {
            let content = std::fs::read_to_string(&ratings)
                .with_context(|| format!("Failed to read {}", ratings.display()))?;
            let params: RecommendParams = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", ratings.display()))?;
            let metric = params.metric.as_deref().map(str::parse::<Metric>).transpose()?;
            let (n, min_rating) = settings.recommend.resolve(&params);
            print_json(&engine.recommend(&params.user_ratings, n, min_rating, metric)?)
        }
        Command::Search { query, limit } => {
            let limit = limit.unwrap_or(settings.recommend.default_n);
            print_json(&engine.search(&query, limit)?)
        }
        Command::Info { item_id } => print_json(&engine.info(item_id)?),
        Command::Stats => print_json(&serde_json::json!({
            "status": engine.status(),
            "metadata": engine.metadata()?,
            "cache": engine.cache_stats(),
        })),
        Command::Versions | Command::Schema => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
