//! Route handler functions for all API endpoints.
//!
//! Each handler extracts its JSON body via axum extractors, calls the
//! ingestion pipeline or the stores behind it, and returns a JSON response.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use semgraph_core::types::{ContentType, DocumentId, SearchRequest, SubmitRequest};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub document_id: String,
    /// False when the content was already stored.
    pub created: bool,
    /// Neighbor ids, nearest first.
    pub similar_keys: Vec<String>,
    /// Distances aligned with `similar_keys`.
    pub scores: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: Option<String>,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: Option<ContentType>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphResponse {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub documents: u64,
    pub indexed_vectors: u64,
    pub graph_nodes: u64,
    pub graph_edges: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /submit - store a document and link it to its nearest neighbors.
pub async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = body?;
    let outcome = state.pipeline.submit(request).await?;

    Ok(Json(SubmitResponse {
        status: "ok".to_string(),
        document_id: outcome.document_id.to_string(),
        created: outcome.created,
        similar_keys: outcome
            .neighbor_ids()
            .iter()
            .map(DocumentId::to_string)
            .collect(),
        scores: outcome.scores(),
    }))
}

/// POST /search - nearest stored documents to a query, without storing it.
pub async fn search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = body?;
    let neighbors = state.pipeline.search(request).await?;

    let results = neighbors
        .into_iter()
        .map(|n| SearchHit {
            id: n.id.to_string(),
            content: n.content,
            score: n.score,
        })
        .collect();

    Ok(Json(SearchResponse { results }))
}

/// GET /graph - every node with its stored content, and every edge.
pub async fn graph(State(state): State<AppState>) -> Result<Json<GraphResponse>, ApiError> {
    let snapshot = state.pipeline.graph_store().snapshot().await?;
    let documents: HashMap<DocumentId, (ContentType, String)> = state
        .pipeline
        .content_store()
        .documents()
        .await?
        .into_iter()
        .map(|d| (d.id, (d.content_type, d.content)))
        .collect();

    let nodes = snapshot
        .nodes
        .into_iter()
        .map(|id| {
            let stored = documents.get(&id);
            GraphNode {
                content_type: stored.map(|(t, _)| *t),
                content: stored.map(|(_, c)| c.clone()),
                id: id.to_string(),
            }
        })
        .collect();

    let edges = snapshot
        .edges
        .into_iter()
        .map(|e| GraphEdge {
            from: e.from.to_string(),
            to: e.to.to_string(),
            weight: e.weight,
        })
        .collect();

    Ok(Json(GraphResponse { nodes, edges }))
}

/// GET /health - liveness plus store and index counts.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let pipeline = &state.pipeline;
    let documents = pipeline.content_store().count().await?;
    let indexed_vectors = pipeline.index().len().await? as u64;
    let graph_nodes = pipeline.graph_store().node_count().await?;
    let graph_edges = pipeline.graph_store().edge_count().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        documents,
        indexed_vectors,
        graph_nodes,
        graph_edges,
    }))
}
