//! semgraph application binary - composition root.
//!
//! Ties together all semgraph crates into a single executable:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Open the SQLite database backing the content and graph stores
//! 3. Create the vector index and rebuild it from stored embeddings
//! 4. Build the ingestion pipeline around the HTTP embedding client
//! 5. Start the axum REST API server

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use semgraph_core::config::SemgraphConfig;
use semgraph_storage::{Database, SqliteContentStore, SqliteGraphStore};
use semgraph_vector::{
    HnswBackend, HttpEmbeddingClient, IndexDefinition, IngestionPipeline, VectorIndex,
};

use semgraph_api::routes;
use semgraph_api::state::AppState;

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let loaded = SemgraphConfig::load_if_exists(&config_file);

    // Logging starts before the load outcome is reported. --log-level wins
    // over RUST_LOG, which wins over the config file.
    let file_level = match &loaded {
        Ok(Some(config)) => config.general.log_level.clone(),
        _ => SemgraphConfig::default().general.log_level,
    };
    let filter = match args.log_level {
        Some(ref level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(file_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match loaded {
        Ok(Some(config)) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Ok(None) => {
            tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
            SemgraphConfig::default()
        }
        Err(e) => {
            tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration file");
            return Err(e.into());
        }
    };
    args.apply(&mut config);
    config.validate()?;

    // === Storage ===

    let data_dir = cli::resolve_data_dir(&config.general.data_dir);
    let db_path = cli::database_path(&data_dir);
    let db = Arc::new(Database::new(&db_path)?);

    // === Vector index ===

    let backend = Arc::new(HnswBackend::new(config.vector.reply_shape));
    let index = VectorIndex::new(backend, IndexDefinition::from_config(&config.vector));
    index.ensure_index().await?;

    // === Pipeline ===

    let embedder = HttpEmbeddingClient::new(&config.embedding, config.vector.dimension)?;
    tracing::info!(url = %embedder.url(), "Embedding service configured");

    let pipeline = IngestionPipeline::new(
        Arc::new(SqliteContentStore::new(Arc::clone(&db))),
        index,
        Arc::new(SqliteGraphStore::new(db)),
        Box::new(embedder),
        config.pipeline.clone(),
    );
    let restored = pipeline.hydrate_index().await?;
    tracing::info!(restored, "Stored documents loaded into the vector index");

    // === API server ===

    let port = config.general.port;
    let state = AppState::new(config, pipeline);
    routes::start_server(port, state).await?;

    Ok(())
}
