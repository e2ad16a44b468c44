//! Semgraph Vector crate - embedding service, HNSW index, k-NN reply decoding, and pipeline.
//!
//! Provides an in-process HNSW search backend speaking the map and flat
//! k-NN reply encodings, the `VectorIndex` facade over any backend, an
//! HTTP embedding client with a mock for testing, and the ingestion
//! pipeline that ties content dedup, indexing and the similarity graph together.

pub mod backend;
pub mod embedding;
pub mod hnsw;
pub mod index;
pub mod pipeline;
pub mod reply;

pub use backend::{HnswBackend, IndexDefinition, SearchBackend};
pub use embedding::{DynEmbeddingService, EmbeddingService, HttpEmbeddingClient, MockEmbedding};
pub use index::VectorIndex;
pub use pipeline::IngestionPipeline;
pub use reply::{parse_reply, SearchReply};
