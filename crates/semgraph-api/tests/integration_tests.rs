//! Integration tests for the Semgraph API.
//!
//! Drives every route through `tower::ServiceExt::oneshot` against an
//! in-memory database, the in-process HNSW backend and a table-driven stub
//! embedder. Each test builds its own state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use semgraph_api::create_router;
use semgraph_api::handlers::{GraphResponse, HealthResponse, SearchResponse, SubmitResponse};
use semgraph_api::state::AppState;
use semgraph_core::config::{ReplyShape, SemgraphConfig};
use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::hash;
use semgraph_core::types::{ContentType, Document, DocumentId};
use semgraph_storage::{ContentStore, Database, SqliteContentStore, SqliteGraphStore};
use semgraph_vector::{
    EmbeddingService, HnswBackend, IndexDefinition, IngestionPipeline, VectorIndex,
};

// =============================================================================
// Helpers
// =============================================================================

const DIM: usize = 3;

/// Embedder answering from a fixed table; unknown text is an upstream 500.
struct StubEmbedding(HashMap<String, Vec<f32>>);

impl EmbeddingService for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.0
            .get(text)
            .cloned()
            .ok_or_else(|| SemgraphError::EmbeddingFailed {
                status: Some(500),
                body: format!("no vector for '{}'", text),
            })
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Content store whose every call fails as unreachable.
struct DownContentStore;

#[async_trait]
impl ContentStore for DownContentStore {
    async fn exists(&self, _: &DocumentId) -> Result<bool> {
        Err(SemgraphError::BackendUnavailable("connection refused".to_string()))
    }
    async fn put(&self, _: &Document) -> Result<()> {
        Err(SemgraphError::BackendUnavailable("connection refused".to_string()))
    }
    async fn get(&self, _: &DocumentId) -> Result<Option<Document>> {
        Err(SemgraphError::BackendUnavailable("connection refused".to_string()))
    }
    async fn embedding(&self, _: &DocumentId) -> Result<Option<Vec<f32>>> {
        Err(SemgraphError::BackendUnavailable("connection refused".to_string()))
    }
    async fn count(&self) -> Result<u64> {
        Err(SemgraphError::BackendUnavailable("connection refused".to_string()))
    }
    async fn documents(&self) -> Result<Vec<Document>> {
        Err(SemgraphError::BackendUnavailable("connection refused".to_string()))
    }
}

fn vectors() -> HashMap<String, Vec<f32>> {
    HashMap::from([
        ("hello world".to_string(), vec![0.0, 0.0, 1.0]),
        ("cat".to_string(), vec![1.0, 0.0, 0.0]),
        ("dog".to_string(), vec![0.0, 1.0, 0.0]),
        ("kitten".to_string(), vec![0.9, 0.2, 0.0]),
        ("puppy".to_string(), vec![0.1, 0.95, 0.0]),
        ("flat".to_string(), vec![0.0, 0.0]),
        ("empty".to_string(), vec![]),
    ])
}

fn config(k: usize, shape: ReplyShape) -> SemgraphConfig {
    let mut config = SemgraphConfig::default();
    config.vector.dimension = DIM;
    config.vector.reply_shape = shape;
    config.pipeline.k = k;
    config
}

async fn make_state_with(
    k: usize,
    shape: ReplyShape,
    content: Option<Arc<dyn ContentStore>>,
) -> AppState {
    let config = config(k, shape);
    let db = Arc::new(Database::in_memory().unwrap());
    let content: Arc<dyn ContentStore> = match content {
        Some(store) => store,
        None => Arc::new(SqliteContentStore::new(Arc::clone(&db))),
    };
    let index = VectorIndex::new(
        Arc::new(HnswBackend::new(shape)),
        IndexDefinition::from_config(&config.vector),
    );
    index.ensure_index().await.unwrap();

    let pipeline = IngestionPipeline::new(
        content,
        index,
        Arc::new(SqliteGraphStore::new(db)),
        Box::new(StubEmbedding(vectors())),
        config.pipeline.clone(),
    );
    AppState::new(config, pipeline)
}

async fn make_app(k: usize) -> axum::Router {
    create_router(make_state_with(k, ReplyShape::Map, None).await)
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn submit(app: &axum::Router, query: &str) -> SubmitResponse {
    let body = format!(r#"{{"type": "text", "query": "{}"}}"#, query);
    let resp = app.clone().oneshot(post_json("/submit", &body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK, "submit '{}'", query);
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

async fn error_of(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let json = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    (status, json)
}

fn text_id(content: &str) -> String {
    hash::document_id(ContentType::Text, content).to_string()
}

// =============================================================================
// POST /submit
// =============================================================================

#[tokio::test]
async fn test_submit_first_document() {
    let app = make_app(5).await;
    let resp = submit(&app, "hello world").await;

    assert_eq!(resp.status, "ok");
    assert!(resp.created);
    assert_eq!(
        resp.document_id,
        "doc:text:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert!(resp.similar_keys.is_empty());
    assert!(resp.scores.is_empty());
}

#[tokio::test]
async fn test_submit_twice_is_deduplicated() {
    let app = make_app(5).await;
    let first = submit(&app, "hello world").await;
    let second = submit(&app, "  Hello World ").await;

    assert!(!second.created);
    assert_eq!(first.document_id, second.document_id);
    assert!(second.similar_keys.is_empty());

    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.documents, 1);
    assert_eq!(health.indexed_vectors, 1);
    assert_eq!(health.graph_nodes, 1);
    assert_eq!(health.graph_edges, 0);
}

#[tokio::test]
async fn test_submit_links_nearest_neighbor() {
    let app = make_app(1).await;
    submit(&app, "cat").await;
    submit(&app, "dog").await;
    let kitten = submit(&app, "kitten").await;

    assert_eq!(kitten.similar_keys, vec![text_id("cat")]);
    assert_eq!(kitten.scores.len(), 1);

    let resp = app.clone().oneshot(get("/graph")).await.unwrap();
    let graph: GraphResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let from_kitten: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.from == text_id("kitten"))
        .collect();
    assert_eq!(from_kitten.len(), 1);
    assert_eq!(from_kitten[0].to, text_id("cat"));
    assert!((from_kitten[0].weight - kitten.scores[0]).abs() < 1e-9);
}

#[tokio::test]
async fn test_submit_scores_are_ascending() {
    let app = make_app(5).await;
    for query in ["cat", "dog", "hello world"] {
        submit(&app, query).await;
    }
    let kitten = submit(&app, "kitten").await;

    assert_eq!(kitten.similar_keys.len(), 3);
    assert!(!kitten.similar_keys.contains(&kitten.document_id));
    assert_eq!(kitten.similar_keys[0], text_id("cat"));
    assert!(kitten.scores.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_submit_with_flat_replies() {
    let app = create_router(make_state_with(1, ReplyShape::Flat, None).await);
    submit(&app, "cat").await;
    submit(&app, "dog").await;
    let puppy = submit(&app, "puppy").await;
    assert_eq!(puppy.similar_keys, vec![text_id("dog")]);
}

#[tokio::test]
async fn test_submit_missing_query_returns_400() {
    let app = make_app(5).await;
    let (status, json) = error_of(&app, post_json("/submit", r#"{"type": "text"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn test_submit_blank_query_returns_400() {
    let app = make_app(5).await;
    let (status, json) =
        error_of(&app, post_json("/submit", r#"{"type": "text", "query": "   "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("query"));
}

#[tokio::test]
async fn test_submit_unsupported_types_return_400() {
    let app = make_app(5).await;
    for kind in ["file", "image", "video", ""] {
        let body = format!(r#"{{"type": "{}", "query": "cat"}}"#, kind);
        let (status, _) = error_of(&app, post_json("/submit", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "type '{}'", kind);
    }
}

#[tokio::test]
async fn test_submit_malformed_json_returns_400() {
    let app = make_app(5).await;
    let (status, json) = error_of(&app, post_json("/submit", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn test_submit_embedding_failure_returns_502() {
    let app = make_app(5).await;
    let (status, json) = error_of(
        &app,
        post_json("/submit", r#"{"type": "text", "query": "unknown words"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["details"]["upstream_status"], 500);
}

#[tokio::test]
async fn test_submit_empty_embedding_returns_502() {
    let app = make_app(5).await;
    let (status, json) =
        error_of(&app, post_json("/submit", r#"{"type": "text", "query": "empty"}"#)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "bad_gateway");
}

#[tokio::test]
async fn test_submit_wrong_dimension_returns_400_and_stores_nothing() {
    let app = make_app(5).await;
    let (status, _) =
        error_of(&app, post_json("/submit", r#"{"type": "text", "query": "flat"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.documents, 0);
    assert_eq!(health.indexed_vectors, 0);
}

#[tokio::test]
async fn test_submit_backend_down_returns_503() {
    let state = make_state_with(5, ReplyShape::Map, Some(Arc::new(DownContentStore))).await;
    let app = create_router(state);
    let (status, json) =
        error_of(&app, post_json("/submit", r#"{"type": "text", "query": "cat"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "service_unavailable");
}

#[tokio::test]
async fn test_concurrent_identical_submits() {
    let app = make_app(5).await;
    let (a, b) = tokio::join!(submit(&app, "cat"), submit(&app, "cat"));
    assert_eq!(a.document_id, b.document_id);

    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.documents, 1);
    assert_eq!(health.indexed_vectors, 1);
}

// =============================================================================
// POST /search
// =============================================================================

#[tokio::test]
async fn test_search_is_read_only() {
    let app = make_app(5).await;
    submit(&app, "cat").await;
    submit(&app, "dog").await;

    let resp = app
        .clone()
        .oneshot(post_json("/search", r#"{"type": "text", "query": "kitten", "k": 1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let search: SearchResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(search.results.len(), 1);
    assert_eq!(search.results[0].id, text_id("cat"));
    assert_eq!(search.results[0].content.as_deref(), Some("cat"));

    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.documents, 2);
    assert_eq!(health.graph_edges, 1);
}

#[tokio::test]
async fn test_search_defaults_to_configured_k() {
    let app = make_app(2).await;
    for query in ["cat", "dog", "hello world"] {
        submit(&app, query).await;
    }
    let resp = app
        .clone()
        .oneshot(post_json("/search", r#"{"type": "text", "query": "kitten"}"#))
        .await
        .unwrap();
    let search: SearchResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(search.results.len(), 2);
}

#[tokio::test]
async fn test_search_empty_index() {
    let app = make_app(5).await;
    let resp = app
        .oneshot(post_json("/search", r#"{"type": "text", "query": "cat"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let search: SearchResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(search.results.is_empty());
}

#[tokio::test]
async fn test_search_zero_k_returns_400() {
    let app = make_app(5).await;
    let (status, _) = error_of(
        &app,
        post_json("/search", r#"{"type": "text", "query": "cat", "k": 0}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// GET /graph and GET /health
// =============================================================================

#[tokio::test]
async fn test_graph_includes_node_content() {
    let app = make_app(5).await;
    submit(&app, "cat").await;
    submit(&app, "kitten").await;

    let resp = app.clone().oneshot(get("/graph")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let graph: GraphResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();

    assert_eq!(graph.nodes.len(), 2);
    let cat = graph.nodes.iter().find(|n| n.id == text_id("cat")).unwrap();
    assert_eq!(cat.content.as_deref(), Some("cat"));
    assert_eq!(cat.content_type, Some(ContentType::Text));
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].from, text_id("kitten"));
}

#[tokio::test]
async fn test_graph_empty() {
    let app = make_app(5).await;
    let resp = app.oneshot(get("/graph")).await.unwrap();
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["nodes"], Value::Array(vec![]));
    assert_eq!(json["edges"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_health_happy_path() {
    let app = make_app(5).await;
    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.documents, 0);
}

#[tokio::test]
async fn test_health_backend_down_returns_503() {
    let state = make_state_with(5, ReplyShape::Map, Some(Arc::new(DownContentStore))).await;
    let (status, _) = error_of(&create_router(state), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = make_app(5).await;
    let resp = app.oneshot(get("/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_get_not_allowed() {
    let app = make_app(5).await;
    let resp = app.oneshot(get("/submit")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_state_survives_restart_with_hydration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("semgraph.db");
    let config = config(1, ReplyShape::Map);

    let build = |db: Arc<Database>| {
        let index = VectorIndex::new(
            Arc::new(HnswBackend::new(ReplyShape::Map)),
            IndexDefinition::from_config(&config.vector),
        );
        IngestionPipeline::new(
            Arc::new(SqliteContentStore::new(Arc::clone(&db))),
            index,
            Arc::new(SqliteGraphStore::new(db)),
            Box::new(StubEmbedding(vectors())),
            config.pipeline.clone(),
        )
    };

    {
        let pipeline = build(Arc::new(Database::new(&path).unwrap()));
        pipeline.index().ensure_index().await.unwrap();
        let app = create_router(AppState::new(config.clone(), pipeline));
        submit(&app, "cat").await;
        submit(&app, "dog").await;
    }

    let pipeline = build(Arc::new(Database::new(&path).unwrap()));
    pipeline.index().ensure_index().await.unwrap();
    assert_eq!(pipeline.hydrate_index().await.unwrap(), 2);
    let app = create_router(AppState::new(config.clone(), pipeline));

    let kitten = submit(&app, "kitten").await;
    assert_eq!(kitten.similar_keys, vec![text_id("cat")]);
}
