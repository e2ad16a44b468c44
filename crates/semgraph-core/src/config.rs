use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SemgraphError};
use crate::types::Metric;

/// Top-level configuration for semgraph.
///
/// Loaded from `~/.semgraph/config.toml` by default. Every section and field
/// has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemgraphConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl SemgraphConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SemgraphConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file if one exists.
    ///
    /// A missing file is `Ok(None)`. A file that exists but cannot be read,
    /// parsed or validated is an error; it never falls back to defaults.
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the index or pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.vector.dimension == 0 {
            return Err(SemgraphError::Config(
                "vector.dimension must be greater than 0".to_string(),
            ));
        }
        if self.vector.m < 2 {
            return Err(SemgraphError::Config("vector.m must be at least 2".to_string()));
        }
        if self.vector.ef_construction == 0 {
            return Err(SemgraphError::Config(
                "vector.ef_construction must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.k == 0 {
            return Err(SemgraphError::Config("pipeline.k must be greater than 0".to_string()));
        }
        if self.pipeline.embed_timeout_ms == 0 || self.pipeline.backend_timeout_ms == 0 {
            return Err(SemgraphError::Config(
                "pipeline timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port for the submit/search API.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.semgraph/data".to_string(),
            log_level: "info".to_string(),
            port: 8080,
        }
    }
}

/// Embedding service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `POST` endpoint accepting `{"text": "..."}`.
    pub url: String,
    /// Per-request HTTP timeout.
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8009/embed".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Shape of the k-NN reply produced by the index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyShape {
    /// `{"total_results": n, "results": [{"id", "extra_attributes"}]}`.
    #[default]
    Map,
    /// `[n, id, [field, value, ...], id, [...], ...]`.
    Flat,
}

/// Vector index definition and HNSW parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Index name.
    pub index_name: String,
    /// Embedding dimension for the text index.
    pub dimension: usize,
    /// Distance metric.
    pub metric: Metric,
    /// HNSW graph degree (max neighbors per node per layer).
    pub m: usize,
    /// HNSW construction beam width.
    pub ef_construction: usize,
    /// Initial capacity reserved for vectors.
    pub initial_cap: usize,
    /// Reply encoding emitted by the backend.
    pub reply_shape: ReplyShape,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            index_name: "idx:text:vector".to_string(),
            dimension: 512,
            metric: Metric::Cosine,
            m: 16,
            ef_construction: 200,
            initial_cap: 1000,
            reply_shape: ReplyShape::Map,
        }
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Neighbors linked per submission.
    pub k: usize,
    /// Upper bound on one embedding call.
    pub embed_timeout_ms: u64,
    /// Upper bound on one content store, index or graph call.
    pub backend_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k: 5,
            embed_timeout_ms: 15_000,
            backend_timeout_ms: 5_000,
        }
    }
}
