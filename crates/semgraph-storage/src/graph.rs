//! Similarity graph persistence.
//!
//! Nodes mirror document ids. Edges are directed `SIMILAR` relationships from
//! a query document to each of its neighbors, keyed on `(source, target)`
//! alone so that re-linking the same pair updates the weight in place.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::debug;

use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::types::{DocumentId, GraphSnapshot, Neighbor, SimilarityEdge};

use crate::db::{backend_err, Database};

/// Property graph with idempotent node and edge upserts.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the node if absent.
    async fn upsert_node(&self, id: &DocumentId) -> Result<()>;

    /// Create or update the single `from -> to` edge. Both nodes are created
    /// if missing.
    async fn upsert_edge(&self, from: &DocumentId, to: &DocumentId, weight: f64) -> Result<()>;

    /// Upsert the query node, every neighbor node and one edge per neighbor,
    /// all or nothing.
    async fn upsert_query_neighborhood(
        &self,
        query: &DocumentId,
        neighbors: &[Neighbor],
    ) -> Result<()>;

    async fn edges_from(&self, id: &DocumentId) -> Result<Vec<SimilarityEdge>>;

    async fn node_count(&self) -> Result<u64>;

    async fn edge_count(&self) -> Result<u64>;

    async fn snapshot(&self) -> Result<GraphSnapshot>;
}

/// SQLite-backed [`GraphStore`].
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    db: Arc<Database>,
}

impl SqliteGraphStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

/// An id with nothing after its last `:` separator.
fn is_blank(id: &str) -> bool {
    id.rsplit(':').next().map_or(true, str::is_empty)
}

fn check_edge(from: &str, to: &str, weight: f64) -> Result<()> {
    if is_blank(from) || is_blank(to) {
        return Err(SemgraphError::GraphUpsert(format!(
            "Edge endpoint id is empty ({} -> {})",
            from, to
        )));
    }
    if from == to {
        return Err(SemgraphError::GraphUpsert(format!("Self edge on {}", from)));
    }
    if !weight.is_finite() {
        return Err(SemgraphError::GraphUpsert(format!(
            "Edge {} -> {} has non-finite weight {}",
            from, to, weight
        )));
    }
    Ok(())
}

fn graph_err(context: &str, e: rusqlite::Error) -> SemgraphError {
    SemgraphError::GraphUpsert(format!("{}: {}", context, e))
}

fn insert_node(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO graph_nodes (id) VALUES (?1)", params![id])
        .map_err(|e| graph_err("Failed to upsert node", e))?;
    Ok(())
}

fn insert_edge(conn: &Connection, from: &str, to: &str, weight: f64) -> Result<()> {
    conn.execute(
        "INSERT INTO graph_edges (source, target, relation, weight)
         VALUES (?1, ?2, 'SIMILAR', ?3)
         ON CONFLICT(source, target) DO UPDATE SET
            weight = excluded.weight,
            updated_at = strftime('%s', 'now')",
        params![from, to, weight],
    )
    .map_err(|e| graph_err("Failed to upsert edge", e))?;
    Ok(())
}

fn read_edges(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<SimilarityEdge>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| backend_err("Failed to prepare edge query", e))?;
    let rows = stmt
        .query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })
        .map_err(|e| backend_err("Failed to query edges", e))?;

    let mut edges = Vec::new();
    for row in rows {
        let (from, to, weight) = row.map_err(|e| backend_err("Failed to read edge row", e))?;
        edges.push(SimilarityEdge {
            from: DocumentId::parse(&from)?,
            to: DocumentId::parse(&to)?,
            weight,
        });
    }
    Ok(edges)
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    let n: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .map_err(|e| backend_err("Failed to count graph rows", e))?;
    Ok(n as u64)
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_node(&self, id: &DocumentId) -> Result<()> {
        let id = id.as_str().to_string();
        self.db.run(move |conn| insert_node(conn, &id)).await
    }

    async fn upsert_edge(&self, from: &DocumentId, to: &DocumentId, weight: f64) -> Result<()> {
        check_edge(from.as_str(), to.as_str(), weight)?;
        let from = from.as_str().to_string();
        let to = to.as_str().to_string();

        self.db
            .run(move |conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| graph_err("Failed to begin transaction", e))?;
                insert_node(&tx, &from)?;
                insert_node(&tx, &to)?;
                insert_edge(&tx, &from, &to, weight)?;
                tx.commit().map_err(|e| graph_err("Failed to commit edge", e))
            })
            .await
    }

    async fn upsert_query_neighborhood(
        &self,
        query: &DocumentId,
        neighbors: &[Neighbor],
    ) -> Result<()> {
        let query = query.as_str().to_string();
        let edges: Vec<(String, f64)> = neighbors
            .iter()
            .map(|n| (n.id.as_str().to_string(), n.score))
            .collect();
        let edge_total = edges.len();

        self.db
            .run(move |conn| {
                // Dropping the transaction without commit rolls back.
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| graph_err("Failed to begin transaction", e))?;
                insert_node(&tx, &query)?;
                for (to, weight) in &edges {
                    check_edge(&query, to, *weight)?;
                    insert_node(&tx, to)?;
                    insert_edge(&tx, &query, to, *weight)?;
                }
                tx.commit()
                    .map_err(|e| graph_err("Failed to commit neighborhood", e))
            })
            .await?;

        debug!(edges = edge_total, "Query neighborhood upserted");
        Ok(())
    }

    async fn edges_from(&self, id: &DocumentId) -> Result<Vec<SimilarityEdge>> {
        let id = id.as_str().to_string();
        self.db
            .run(move |conn| {
                read_edges(
                    conn,
                    "SELECT source, target, weight FROM graph_edges
                     WHERE source = ?1 ORDER BY weight, target",
                    &[&id],
                )
            })
            .await
    }

    async fn node_count(&self) -> Result<u64> {
        self.db.run(|conn| count_rows(conn, "graph_nodes")).await
    }

    async fn edge_count(&self) -> Result<u64> {
        self.db.run(|conn| count_rows(conn, "graph_edges")).await
    }

    async fn snapshot(&self) -> Result<GraphSnapshot> {
        self.db
            .run(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id FROM graph_nodes ORDER BY created_at, rowid")
                    .map_err(|e| backend_err("Failed to prepare node query", e))?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(|e| backend_err("Failed to query nodes", e))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| backend_err("Failed to read node row", e))?;
                let nodes = ids
                    .iter()
                    .map(|id| DocumentId::parse(id))
                    .collect::<Result<Vec<_>>>()?;

                let edges = read_edges(
                    conn,
                    "SELECT source, target, weight FROM graph_edges ORDER BY rowid",
                    &[],
                )?;
                Ok(GraphSnapshot { nodes, edges })
            })
            .await
    }
}
