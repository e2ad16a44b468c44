//! ANN search backends.
//!
//! A backend hosts named vector indexes and answers k-NN queries with a
//! loosely typed reply (`serde_json::Value`), the way an external search
//! server would. Decoding that reply is the job of [`crate::reply`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use semgraph_core::config::{ReplyShape, VectorConfig};
use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::types::{DocumentId, DocumentPayload, Metric};

use crate::hnsw::Hnsw;

/// Definition of one vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    /// Only keys with this prefix are indexed.
    pub prefix: String,
    pub dimension: usize,
    pub metric: Metric,
    pub m: usize,
    pub ef_construction: usize,
    pub initial_cap: usize,
}

impl IndexDefinition {
    pub fn from_config(config: &VectorConfig) -> Self {
        Self {
            name: config.index_name.clone(),
            prefix: DocumentId::PREFIX.to_string(),
            dimension: config.dimension,
            metric: config.metric,
            m: config.m,
            ef_construction: config.ef_construction,
            initial_cap: config.initial_cap,
        }
    }
}

/// A vector search engine hosting named indexes.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Create an index. Fails with `IndexAlreadyExists` if the name is taken.
    async fn create_index(&self, definition: &IndexDefinition) -> Result<()>;

    /// Store `vector` and its payload under `key`, replacing any previous
    /// entry for the key.
    async fn add(
        &self,
        index: &str,
        key: &str,
        vector: &[f32],
        payload: &DocumentPayload,
    ) -> Result<()>;

    /// k-NN query. Returns the backend's raw reply.
    async fn search(&self, index: &str, query: &[f32], k: usize) -> Result<Value>;

    /// Number of live entries in the index.
    async fn document_count(&self, index: &str) -> Result<usize>;
}

#[derive(Debug)]
struct Entry {
    key: String,
    payload: DocumentPayload,
}

/// Rebuild a collection once it holds at least this many nodes and more
/// than half of them are replaced vectors.
const COMPACT_MIN_NODES: usize = 64;

#[derive(Debug)]
struct Collection {
    definition: IndexDefinition,
    graph: Hnsw,
    /// Node id by key, for replacement.
    keys: HashMap<String, usize>,
    /// Entry by node id, including entries of soft-deleted nodes.
    entries: Vec<Entry>,
}

impl Collection {
    fn new(definition: &IndexDefinition) -> Self {
        Self {
            definition: definition.clone(),
            graph: Hnsw::new(
                definition.dimension,
                definition.metric,
                definition.m,
                definition.ef_construction,
                definition.initial_cap,
            ),
            keys: HashMap::new(),
            entries: Vec::with_capacity(definition.initial_cap),
        }
    }

    fn needs_compaction(&self) -> bool {
        let total = self.graph.total();
        total >= COMPACT_MIN_NODES && self.graph.len() * 2 < total
    }

    /// Rebuild the graph from live entries only, keeping their relative
    /// insertion order.
    fn compact(&mut self) -> Result<()> {
        let mut live: Vec<(usize, String)> =
            self.keys.iter().map(|(k, &node)| (node, k.clone())).collect();
        live.sort_unstable_by_key(|(node, _)| *node);

        let mut rebuilt = Collection::new(&self.definition);
        for (node, key) in live {
            let (Some(vector), Some(entry)) = (self.graph.vector(node), self.entries.get(node))
            else {
                continue;
            };
            let id = rebuilt.graph.insert(vector.to_vec())?;
            rebuilt.entries.push(Entry {
                key: key.clone(),
                payload: entry.payload.clone(),
            });
            rebuilt.keys.insert(key, id);
        }

        debug!(
            index = %self.definition.name,
            before = self.graph.total(),
            after = rebuilt.graph.total(),
            "Vector index compacted"
        );
        *self = rebuilt;
        Ok(())
    }
}

type Indexes = RwLock<HashMap<String, Collection>>;

/// In-process [`SearchBackend`] built on [`Hnsw`].
///
/// Replies use the encoding selected by [`ReplyShape`]: the map form reports
/// numeric scores, the flat form reports them as strings.
///
/// Re-adding a key soft-deletes its previous vector; the collection is rebuilt
/// from live entries once replaced vectors outnumber live ones. Inserts and
/// searches run on tokio's blocking pool.
#[derive(Debug)]
pub struct HnswBackend {
    shape: ReplyShape,
    indexes: Arc<Indexes>,
}

impl HnswBackend {
    pub fn new(shape: ReplyShape) -> Self {
        Self {
            shape,
            indexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Run graph work against the index map on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Indexes) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let indexes = Arc::clone(&self.indexes);
        tokio::task::spawn_blocking(move || f(&indexes))
            .await
            .map_err(|e| SemgraphError::BackendUnavailable(format!("Index task failed: {}", e)))?
    }
}

impl Default for HnswBackend {
    fn default() -> Self {
        Self::new(ReplyShape::default())
    }
}

fn lock_err(e: impl std::fmt::Display) -> SemgraphError {
    SemgraphError::BackendUnavailable(format!("Index lock poisoned: {}", e))
}

fn unknown_index(name: &str) -> SemgraphError {
    SemgraphError::BackendUnavailable(format!("Unknown index name '{}'", name))
}

/// Encode ranked hits in the map form.
fn map_reply(hits: &[(&Entry, f32)]) -> Value {
    let results: Vec<Value> = hits
        .iter()
        .map(|(entry, score)| {
            json!({
                "id": entry.key,
                "extra_attributes": {
                    "type": entry.payload.content_type.as_str(),
                    "content": entry.payload.content,
                    "vector_score": score,
                }
            })
        })
        .collect();
    json!({ "total_results": hits.len(), "results": results })
}

/// Encode ranked hits in the flat alternating form.
fn flat_reply(hits: &[(&Entry, f32)]) -> Value {
    let mut reply = Vec::with_capacity(1 + hits.len() * 2);
    reply.push(json!(hits.len()));
    for (entry, score) in hits {
        reply.push(json!(entry.key));
        reply.push(json!([
            "type",
            entry.payload.content_type.as_str(),
            "content",
            entry.payload.content,
            "vector_score",
            score.to_string(),
        ]));
    }
    Value::Array(reply)
}

#[async_trait]
impl SearchBackend for HnswBackend {
    async fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        let mut indexes = self.indexes.write().map_err(lock_err)?;
        if indexes.contains_key(&definition.name) {
            return Err(SemgraphError::IndexAlreadyExists(definition.name.clone()));
        }
        indexes.insert(definition.name.clone(), Collection::new(definition));

        info!(
            index = %definition.name,
            dimension = definition.dimension,
            metric = definition.metric.as_str(),
            m = definition.m,
            ef_construction = definition.ef_construction,
            "Vector index created"
        );
        Ok(())
    }

    async fn add(
        &self,
        index: &str,
        key: &str,
        vector: &[f32],
        payload: &DocumentPayload,
    ) -> Result<()> {
        let index = index.to_string();
        let key = key.to_string();
        let vector = vector.to_vec();
        let payload = payload.clone();

        self.blocking(move |indexes| {
            let mut indexes = indexes.write().map_err(lock_err)?;
            let collection = indexes.get_mut(&index).ok_or_else(|| unknown_index(&index))?;

            if !key.starts_with(&collection.definition.prefix) {
                return Err(SemgraphError::InvalidArgument(format!(
                    "Key '{}' does not match index prefix '{}'",
                    key, collection.definition.prefix
                )));
            }

            let node = collection.graph.insert(vector)?;
            debug_assert_eq!(node, collection.entries.len());
            collection.entries.push(Entry {
                key: key.clone(),
                payload,
            });

            if let Some(previous) = collection.keys.insert(key.clone(), node) {
                collection.graph.delete(previous);
                debug!(key = %key, "Replaced existing vector");
                if collection.needs_compaction() {
                    collection.compact()?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn search(&self, index: &str, query: &[f32], k: usize) -> Result<Value> {
        let index = index.to_string();
        let query = query.to_vec();
        let shape = self.shape;

        self.blocking(move |indexes| {
            let indexes = indexes.read().map_err(lock_err)?;
            let collection = indexes.get(&index).ok_or_else(|| unknown_index(&index))?;

            let found = collection.graph.search(&query, k)?;
            let hits: Vec<(&Entry, f32)> = found
                .into_iter()
                .filter_map(|(node, score)| collection.entries.get(node).map(|e| (e, score)))
                .collect();

            Ok(match shape {
                ReplyShape::Map => map_reply(&hits),
                ReplyShape::Flat => flat_reply(&hits),
            })
        })
        .await
    }

    async fn document_count(&self, index: &str) -> Result<usize> {
        let indexes = self.indexes.read().map_err(lock_err)?;
        let collection = indexes.get(index).ok_or_else(|| unknown_index(index))?;
        Ok(collection.graph.len())
    }
}
