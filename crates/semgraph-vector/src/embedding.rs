//! Embedding service trait and implementations.
//!
//! - `HttpEmbeddingClient` posts `{"text": ...}` to an external embedding
//!   model over HTTP. This is the production embedding backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use semgraph_core::config::EmbeddingConfig;
use semgraph_core::error::SemgraphError;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors that capture
/// semantic meaning. Used for both ingestion (indexing) and search (query).
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, SemgraphError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Box<dyn DynEmbeddingService>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, SemgraphError>> + Send + 'a>,
    >;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Blanket impl: any `EmbeddingService` automatically implements `DynEmbeddingService`.
impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, SemgraphError>> + Send + 'a>,
    > {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// HttpEmbeddingClient - external embedding model over HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

/// The service answers with either a batch of one (`[[...]]`) or a bare vector.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Batch(Vec<Vec<f32>>),
    Single(Vec<f32>),
}

impl EmbedResponse {
    fn into_vector(self) -> Vec<f32> {
        match self {
            EmbedResponse::Batch(batch) => batch.into_iter().next().unwrap_or_default(),
            EmbedResponse::Single(vector) => vector,
        }
    }
}

/// Embedding client for a model served at `POST {url}`.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    url: String,
    dimensions: usize,
}

impl HttpEmbeddingClient {
    /// Build a client from the `[embedding]` config section. `dimensions` is
    /// the index dimension the model is expected to produce.
    pub fn new(config: &EmbeddingConfig, dimensions: usize) -> Result<Self, SemgraphError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SemgraphError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            dimensions,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SemgraphError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| SemgraphError::EmbeddingFailed {
                status: e.status().map(|s| s.as_u16()),
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SemgraphError::EmbeddingFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: EmbedResponse =
            response
                .json()
                .await
                .map_err(|e| SemgraphError::EmbeddingFailed {
                    status: Some(status.as_u16()),
                    body: format!("Malformed embedding response: {}", e),
                })?;

        let vector = parsed.into_vector();
        if vector.is_empty() {
            return Err(SemgraphError::EmptyEmbedding);
        }

        debug!(url = %self.url, dimensions = vector.len(), "Embedding received");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs. This allows testing deduplication and
/// search without a real model.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(512)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SemgraphError> {
        if text.is_empty() {
            return Err(SemgraphError::EmbeddingFailed {
                status: None,
                body: "Cannot embed empty text".to_string(),
            });
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    /// Serve `router` on an ephemeral local port and return its `/embed` URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/embed", addr)
    }

    fn client(url: String) -> HttpEmbeddingClient {
        let config = EmbeddingConfig {
            url,
            timeout_ms: 2_000,
        };
        HttpEmbeddingClient::new(&config, 3).unwrap()
    }

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 512);

        let small = MockEmbedding::with_dimensions(8);
        assert_eq!(small.embed("hello world").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_different_inputs() {
        let service = MockEmbedding::new();
        let v1 = service.embed("text one").await.unwrap();
        let v2 = service.embed("text two").await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        let result = service.embed("").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let service = MockEmbedding::with_dimensions(64);
        let vec = service.embed("test range").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_dyn_embedding_dispatch() {
        let service: Box<dyn DynEmbeddingService> = Box::new(MockEmbedding::with_dimensions(16));
        assert_eq!(service.dimensions(), 16);
        assert_eq!(service.embed_boxed("boxed").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_http_client_batch_response() {
        let router = Router::new().route(
            "/embed",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["text"], "hello world");
                Json(serde_json::json!([[0.1, 0.2, 0.3]]))
            }),
        );
        let embedder = client(serve(router).await);

        let vector = embedder.embed("hello world").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(EmbeddingService::dimensions(&embedder), 3);
    }

    #[tokio::test]
    async fn test_http_client_flat_response() {
        let router = Router::new().route(
            "/embed",
            post(|| async { Json(serde_json::json!([1.0, 0.0, 0.0])) }),
        );
        let embedder = client(serve(router).await);
        assert_eq!(embedder.embed("cat").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_http_client_non_success_status() {
        let router = Router::new().route(
            "/embed",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading") }),
        );
        let embedder = client(serve(router).await);

        match embedder.embed("cat").await.unwrap_err() {
            SemgraphError::EmbeddingFailed { status, body } => {
                assert_eq!(status, Some(503));
                assert_eq!(body, "model loading");
            }
            other => panic!("Expected EmbeddingFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_client_empty_vector() {
        let router = Router::new().route("/embed", post(|| async { Json(serde_json::json!([])) }));
        let embedder = client(serve(router).await);
        assert!(matches!(
            embedder.embed("cat").await.unwrap_err(),
            SemgraphError::EmptyEmbedding
        ));
    }

    #[tokio::test]
    async fn test_http_client_empty_batch() {
        let router =
            Router::new().route("/embed", post(|| async { Json(serde_json::json!([[]])) }));
        let embedder = client(serve(router).await);
        assert!(matches!(
            embedder.embed("cat").await.unwrap_err(),
            SemgraphError::EmptyEmbedding
        ));
    }

    #[tokio::test]
    async fn test_http_client_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let embedder = client(format!("http://{}/embed", addr));
        assert!(matches!(
            embedder.embed("cat").await.unwrap_err(),
            SemgraphError::EmbeddingFailed { status: None, .. }
        ));
    }
}
