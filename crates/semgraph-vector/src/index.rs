//! Vector index facade over a [`SearchBackend`].
//!
//! Owns the index definition, checks dimensions before anything reaches the
//! backend, and decodes k-NN replies into ranked neighbors.

use std::sync::Arc;

use tracing::{debug, error, info};

use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::types::{DocumentId, DocumentPayload, Neighbor};

use crate::backend::{IndexDefinition, SearchBackend};
use crate::reply::parse_reply;

/// A single named ANN index.
#[derive(Clone)]
pub struct VectorIndex {
    backend: Arc<dyn SearchBackend>,
    definition: IndexDefinition,
}

impl VectorIndex {
    pub fn new(backend: Arc<dyn SearchBackend>, definition: IndexDefinition) -> Self {
        Self {
            backend,
            definition,
        }
    }

    pub fn dimension(&self) -> usize {
        self.definition.dimension
    }

    /// Create the index unless it already exists.
    pub async fn ensure_index(&self) -> Result<()> {
        match self.backend.create_index(&self.definition).await {
            Ok(()) => Ok(()),
            Err(SemgraphError::IndexAlreadyExists(name)) => {
                info!(index = %name, "Vector index already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Add one vector with its payload. Replaces any vector already stored
    /// under `id`.
    pub async fn insert(
        &self,
        id: &DocumentId,
        embedding: &[f32],
        payload: &DocumentPayload,
    ) -> Result<()> {
        self.check_dimension(embedding.len())?;
        self.backend
            .add(&self.definition.name, id.as_str(), embedding, payload)
            .await?;
        debug!(id = %id, "Vector inserted");
        Ok(())
    }

    /// The `k` nearest documents to `query` by ascending distance. Returns
    /// fewer than `k` when the index holds fewer documents.
    pub async fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(SemgraphError::InvalidArgument(
                "k must be greater than 0".to_string(),
            ));
        }
        self.check_dimension(query.len())?;

        let raw = self.backend.search(&self.definition.name, query, k).await?;
        let mut neighbors = parse_reply(&raw).inspect_err(|e| {
            if let SemgraphError::IndexResultParse { reason, raw } = e {
                error!(
                    index = %self.definition.name,
                    reason = %reason,
                    raw = %raw,
                    "Unparseable k-NN reply"
                );
            }
        })?;
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Number of vectors currently searchable.
    pub async fn len(&self) -> Result<usize> {
        self.backend.document_count(&self.definition.name).await
    }

    fn check_dimension(&self, got: usize) -> Result<()> {
        if got != self.definition.dimension {
            return Err(SemgraphError::InvalidArgument(format!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                self.definition.name, self.definition.dimension, got
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("definition", &self.definition)
            .finish()
    }
}
