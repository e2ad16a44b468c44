//! Shared application state for axum handlers.

use std::sync::Arc;
use std::time::Instant;

use semgraph_core::config::SemgraphConfig;
use semgraph_vector::IngestionPipeline;

/// Shared state passed to all route handlers via axum's State extractor.
///
/// Cloned per request; everything behind it is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SemgraphConfig>,
    pub pipeline: Arc<IngestionPipeline>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: SemgraphConfig, pipeline: IngestionPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
        }
    }
}
