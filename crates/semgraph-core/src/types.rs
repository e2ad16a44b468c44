use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::SemgraphError;

// =============================================================================
// Enums
// =============================================================================

/// The kind of content a document was built from.
///
/// Only `Text` runs end-to-end; `Image` is accepted by the type system and the
/// storage schema so the index layout does not change when it is wired up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
}

impl ContentType {
    /// The lowercase tag used in document ids, payloads and SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = SemgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            other => Err(SemgraphError::Validation(format!(
                "Unsupported content type '{}'",
                other
            ))),
        }
    }
}

/// Distance metric used by the vector index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`; 0.0 means identical direction.
    #[default]
    Cosine,
    /// Squared euclidean distance.
    L2,
}

impl Metric {
    /// Backend spelling of the metric (`DISTANCE_METRIC` argument).
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "COSINE",
            Metric::L2 => "L2",
        }
    }
}

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Stable, content-addressed document key: `doc:<content_type>:<sha256 hex>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Key prefix shared by every document; the vector index filters on it.
    pub const PREFIX: &'static str = "doc:";

    /// Build the id from a content type and an already computed fingerprint.
    pub fn new(content_type: ContentType, fingerprint: &str) -> Self {
        Self(format!("{}{}:{}", Self::PREFIX, content_type, fingerprint))
    }

    /// Wrap a raw key, checking the `doc:` prefix.
    pub fn parse(raw: &str) -> Result<Self, SemgraphError> {
        if !raw.starts_with(Self::PREFIX) || raw.len() == Self::PREFIX.len() {
            return Err(SemgraphError::InvalidArgument(format!(
                "Document id '{}' must start with '{}'",
                raw,
                Self::PREFIX
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }
}

// =============================================================================
// Entity Structs
// =============================================================================

/// A stored document: normalized content plus its immutable embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content_type: ContentType,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: Timestamp,
}

/// Payload fields stored next to a vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPayload {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub content: String,
}

/// One ranked k-NN result.
///
/// `score` is the backend's distance for the configured metric, so lower is
/// closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: DocumentId,
    pub content: Option<String>,
    pub score: f64,
}

/// A directed, weighted `SIMILAR` edge from a query document to a neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub from: DocumentId,
    pub to: DocumentId,
    pub weight: f64,
}

/// Read-only view of the whole similarity graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<DocumentId>,
    pub edges: Vec<SimilarityEdge>,
}

// =============================================================================
// Pipeline request / response
// =============================================================================

/// Inbound submission: `{type: "text", query: "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub query: String,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub document_id: DocumentId,
    /// False when the content was already stored and the write was skipped.
    pub created: bool,
    pub neighbors: Vec<Neighbor>,
}

impl SubmitOutcome {
    pub fn neighbor_ids(&self) -> Vec<DocumentId> {
        self.neighbors.iter().map(|n| n.id.clone()).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.neighbors.iter().map(|n| n.score).collect()
    }
}

/// Read-only similarity search over already stored documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

// =============================================================================
// Tests
// =============================================================================
