//! Semgraph ingestion pipeline.
//!
//! `IngestionPipeline` takes a submitted text through content-addressed
//! dedup, embedding, vector indexing, k-NN retrieval and the similarity graph
//! upsert. Every stage error short-circuits and is returned as is; nothing is
//! retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use semgraph_core::config::PipelineConfig;
use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::hash;
use semgraph_core::types::{
    ContentType, Document, DocumentId, DocumentPayload, Neighbor, SearchRequest, SubmitOutcome,
    SubmitRequest, Timestamp,
};
use semgraph_storage::{ContentStore, GraphStore};

use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;

/// The main Semgraph ingestion pipeline.
///
/// Processes a submission through:
/// 1. Validation and normalization
/// 2. Content-addressed existence check
/// 3. Embedding (first sighting only) and vector index insertion
/// 4. k-NN retrieval excluding the document itself
/// 5. Graph upsert of the query node and its weighted edges
pub struct IngestionPipeline {
    content: Arc<dyn ContentStore>,
    index: VectorIndex,
    graph: Arc<dyn GraphStore>,
    embedder: Box<dyn DynEmbeddingService>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        content: Arc<dyn ContentStore>,
        index: VectorIndex,
        graph: Arc<dyn GraphStore>,
        embedder: Box<dyn DynEmbeddingService>,
        config: PipelineConfig,
    ) -> Self {
        if embedder.dimensions() != index.dimension() {
            warn!(
                embedder = embedder.dimensions(),
                index = index.dimension(),
                "Embedder and index dimensions differ; submissions will be rejected"
            );
        }
        Self {
            content,
            index,
            graph,
            embedder,
            config,
        }
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ingest one document and link it to its nearest neighbors.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome> {
        let content_type = parse_content_type(&request.content_type)?;
        let content = normalize_query(&request.query)?;
        let id = hash::document_id(content_type, &content);
        let k = self.config.k;

        let exists = self.timed("content exists", self.content.exists(&id)).await?;

        let (embedding, created) = if exists {
            (self.stored_embedding(&id, content_type, &content).await?, false)
        } else {
            let embedding = self.embed(&content).await?;
            self.check_dimension(&embedding)?;

            let payload = DocumentPayload {
                content_type,
                content: content.clone(),
            };
            self.timed("index insert", self.index.insert(&id, &embedding, &payload))
                .await?;

            let document = Document {
                id: id.clone(),
                content_type,
                content,
                embedding,
                created_at: Timestamp::now(),
            };
            self.timed("content put", self.content.put(&document)).await?;
            (document.embedding, true)
        };

        // One extra slot: the document itself is usually its own nearest hit.
        let neighbors: Vec<Neighbor> = self
            .timed("knn", self.index.knn(&embedding, k + 1))
            .await?
            .into_iter()
            .filter(|n| n.id != id)
            .take(k)
            .collect();

        self.timed(
            "graph upsert",
            self.graph.upsert_query_neighborhood(&id, &neighbors),
        )
        .await?;

        info!(
            id = %id,
            created,
            neighbors = neighbors.len(),
            "Document submitted"
        );

        Ok(SubmitOutcome {
            document_id: id,
            created,
            neighbors,
        })
    }

    /// Read-only similarity search. Nothing is stored or linked.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<Neighbor>> {
        parse_content_type(&request.content_type)?;
        let content = normalize_query(&request.query)?;
        let k = request.k.unwrap_or(self.config.k);
        if k == 0 {
            return Err(SemgraphError::InvalidArgument(
                "k must be greater than 0".to_string(),
            ));
        }

        let embedding = self.embed(&content).await?;
        self.check_dimension(&embedding)?;
        let neighbors = self.timed("knn", self.index.knn(&embedding, k)).await?;

        debug!(k, found = neighbors.len(), "Search completed");
        Ok(neighbors)
    }

    /// Re-insert every stored document into the vector index. Returns the
    /// number of vectors restored.
    pub async fn hydrate_index(&self) -> Result<usize> {
        let documents = self.content.documents().await?;
        let mut restored = 0;

        for document in documents {
            if document.embedding.len() != self.index.dimension() {
                warn!(
                    id = %document.id,
                    dimension = document.embedding.len(),
                    "Skipping stored document with unusable embedding"
                );
                continue;
            }
            let payload = DocumentPayload {
                content_type: document.content_type,
                content: document.content,
            };
            self.index
                .insert(&document.id, &document.embedding, &payload)
                .await?;
            restored += 1;
        }

        info!(restored, "Vector index hydrated from content store");
        Ok(restored)
    }

    /// Embedding for an already stored document. Falls back to embedding the
    /// text again when the row has no vector.
    async fn stored_embedding(
        &self,
        id: &DocumentId,
        content_type: ContentType,
        content: &str,
    ) -> Result<Vec<f32>> {
        let stored = self
            .timed("content embedding", self.content.embedding(id))
            .await?;
        if let Some(embedding) = stored {
            debug!(id = %id, "Document exists; reusing stored embedding");
            return Ok(embedding);
        }

        warn!(id = %id, "Stored document has no embedding; embedding again");
        let embedding = self.embed(content).await?;
        self.check_dimension(&embedding)?;
        let payload = DocumentPayload {
            content_type,
            content: content.to_string(),
        };
        self.timed("index insert", self.index.insert(id, &embedding, &payload))
            .await?;
        Ok(embedding)
    }

    async fn embed(&self, content: &str) -> Result<Vec<f32>> {
        let timeout = self.config.embed_timeout();
        let embedding = tokio::time::timeout(timeout, self.embedder.embed_boxed(content))
            .await
            .map_err(|_| SemgraphError::EmbeddingFailed {
                status: None,
                body: format!("embedding timed out after {}ms", timeout.as_millis()),
            })??;

        if embedding.is_empty() {
            return Err(SemgraphError::EmptyEmbedding);
        }
        Ok(embedding)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.index.dimension() {
            return Err(SemgraphError::InvalidArgument(format!(
                "Embedding has dimension {}, index expects {}",
                embedding.len(),
                self.index.dimension()
            )));
        }
        Ok(())
    }

    /// Run a store, index or graph call under the backend timeout.
    async fn timed<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        with_timeout(self.config.backend_timeout(), operation, fut).await
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        SemgraphError::BackendUnavailable(format!(
            "{} timed out after {}ms",
            operation,
            timeout.as_millis()
        ))
    })?
}

fn parse_content_type(raw: &str) -> Result<ContentType> {
    match raw {
        "text" => Ok(ContentType::Text),
        "file" => Err(SemgraphError::Validation(
            "File uploads are not supported".to_string(),
        )),
        "" => Err(SemgraphError::Validation("type is required".to_string())),
        other => match other.parse::<ContentType>()? {
            ContentType::Text => Ok(ContentType::Text),
            unsupported => Err(SemgraphError::Validation(format!(
                "Content type '{}' is not supported yet",
                unsupported
            ))),
        },
    }
}

fn normalize_query(query: &str) -> Result<String> {
    let normalized = hash::normalize(query);
    if normalized.is_empty() {
        return Err(SemgraphError::Validation("query is required".to_string()));
    }
    Ok(normalized)
}
