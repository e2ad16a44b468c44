//! Content-addressed document store.
//!
//! One row per document id. Writes never overwrite: the id is derived from
//! the content, so a second write for the same id carries nothing new.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::types::{ContentType, Document, DocumentId, Timestamp};

use crate::db::{backend_err, Database};

/// Existence check and idempotent write keyed by content hash.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Whether a document with this id is stored. `false` is a valid answer.
    async fn exists(&self, id: &DocumentId) -> Result<bool>;

    /// Store the document in one atomic write. An existing id is left untouched.
    async fn put(&self, document: &Document) -> Result<()>;

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// The stored embedding, or `None` when the id is unknown or the row has
    /// no vector.
    async fn embedding(&self, id: &DocumentId) -> Result<Option<Vec<f32>>>;

    async fn count(&self) -> Result<u64>;

    /// Every stored document, oldest first.
    async fn documents(&self) -> Result<Vec<Document>>;
}

/// SQLite-backed [`ContentStore`].
#[derive(Debug, Clone)]
pub struct SqliteContentStore {
    db: Arc<Database>,
}

impl SqliteContentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

/// Encode an embedding as little-endian f32 bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes. Trailing bytes that do not form a full
/// value are rejected.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SemgraphError::Serialization(format!(
            "Embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

const SELECT_DOCUMENT: &str =
    "SELECT id, content_type, content, embedding, created_at FROM documents";

struct RawDocument {
    id: String,
    content_type: String,
    content: String,
    embedding: Vec<u8>,
    created_at: i64,
}

impl RawDocument {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content_type: row.get(1)?,
            content: row.get(2)?,
            embedding: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: DocumentId::parse(&self.id)?,
            content_type: self.content_type.parse::<ContentType>()?,
            content: self.content,
            embedding: decode_embedding(&self.embedding)?,
            created_at: Timestamp(self.created_at),
        })
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn exists(&self, id: &DocumentId) -> Result<bool> {
        let id = id.as_str().to_string();
        self.db
            .run(move |conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
                    params![id],
                    |row| row.get::<_, bool>(0),
                )
                .map_err(|e| backend_err("Failed to check document", e))
            })
            .await
    }

    async fn put(&self, document: &Document) -> Result<()> {
        let id = document.id.as_str().to_string();
        let content_type = document.content_type.as_str();
        let content = document.content.clone();
        let blob = encode_embedding(&document.embedding);
        let dimension = document.embedding.len() as i64;
        let created_at = document.created_at.0;

        let inserted = self
            .db
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO documents (id, content_type, content, embedding, dimension, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO NOTHING",
                    params![id, content_type, content, blob, dimension, created_at],
                )
                .map_err(|e| backend_err("Failed to store document", e))
            })
            .await?;

        debug!(id = %document.id, inserted = inserted == 1, "Document put");
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        let id = id.as_str().to_string();
        let raw = self
            .db
            .run(move |conn| {
                conn.query_row(
                    &format!("{} WHERE id = ?1", SELECT_DOCUMENT),
                    params![id],
                    RawDocument::from_row,
                )
                .optional()
                .map_err(|e| backend_err("Failed to load document", e))
            })
            .await?;
        raw.map(RawDocument::into_document).transpose()
    }

    async fn embedding(&self, id: &DocumentId) -> Result<Option<Vec<f32>>> {
        let id = id.as_str().to_string();
        let blob: Option<Vec<u8>> = self
            .db
            .run(move |conn| {
                conn.query_row(
                    "SELECT embedding FROM documents WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| backend_err("Failed to load embedding", e))
            })
            .await?;

        match blob {
            Some(bytes) if !bytes.is_empty() => Ok(Some(decode_embedding(&bytes)?)),
            _ => Ok(None),
        }
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = self
            .db
            .run(|conn| {
                conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                    .map_err(|e| backend_err("Failed to count documents", e))
            })
            .await?;
        Ok(n as u64)
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        let raws = self
            .db
            .run(|conn| {
                let mut stmt = conn
                    .prepare(&format!("{} ORDER BY created_at, rowid", SELECT_DOCUMENT))
                    .map_err(|e| backend_err("Failed to prepare document scan", e))?;
                let rows = stmt
                    .query_map([], RawDocument::from_row)
                    .map_err(|e| backend_err("Failed to scan documents", e))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| backend_err("Failed to read document row", e))
            })
            .await?;
        raws.into_iter().map(RawDocument::into_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semgraph_core::hash;

    fn store() -> SqliteContentStore {
        SqliteContentStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn doc(text: &str, embedding: Vec<f32>) -> Document {
        let content = hash::normalize(text);
        Document {
            id: hash::document_id(ContentType::Text, &content),
            content_type: ContentType::Text,
            content,
            embedding,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_embedding_blob_is_little_endian() {
        let bytes = encode_embedding(&[1.0, -2.5]);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes).unwrap(), vec![1.0, -2.5]);
    }

    #[test]
    fn test_decode_rejects_partial_value() {
        assert!(decode_embedding(&[0, 0, 128]).is_err());
    }

    #[tokio::test]
    async fn test_exists_false_for_unknown_id() {
        let store = store();
        let id = hash::document_id(ContentType::Text, "nothing");
        assert!(!store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = store();
        let d = doc("Hello World", vec![0.1, 0.2, 0.3]);
        store.put(&d).await.unwrap();

        assert!(store.exists(&d.id).await.unwrap());
        let loaded = store.get(&d.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, d.id);
        assert_eq!(loaded.content, "hello world");
        assert_eq!(loaded.content_type, ContentType::Text);
        assert_eq!(loaded.embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let store = store();
        let first = doc("cat", vec![1.0, 0.0]);
        store.put(&first).await.unwrap();

        let mut second = first.clone();
        second.embedding = vec![0.0, 1.0];
        store.put(&second).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.embedding(&first.id).await.unwrap(), Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_embedding_missing_row_or_vector() {
        let store = store();
        let unknown = hash::document_id(ContentType::Text, "ghost");
        assert_eq!(store.embedding(&unknown).await.unwrap(), None);

        let empty = doc("hollow", vec![]);
        store.put(&empty).await.unwrap();
        assert_eq!(store.embedding(&empty.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_documents_lists_all() {
        let store = store();
        store.put(&doc("cat", vec![1.0])).await.unwrap();
        store.put(&doc("dog", vec![2.0])).await.unwrap();

        let docs = store.documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "cat");
        assert_eq!(docs[1].content, "dog");
    }

    #[tokio::test]
    async fn test_concurrent_identical_puts_leave_one_row() {
        let store = Arc::new(store());
        let d = doc("race", vec![0.5]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let d = d.clone();
            handles.push(tokio::spawn(async move { store.put(&d).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
