//! Database schema migrations.
//!
//! Applies the initial schema: the content-addressed `documents` table and
//! the `graph_nodes` / `graph_edges` tables backing the similarity graph.

use rusqlite::Connection;
use tracing::info;

use semgraph_core::error::SemgraphError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), SemgraphError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| {
        SemgraphError::BackendUnavailable(format!("Failed to create migrations table: {}", e))
    })?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            SemgraphError::BackendUnavailable(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), SemgraphError> {
    conn.execute_batch(
        "
        -- One row per content fingerprint. The embedding is little-endian f32.
        CREATE TABLE IF NOT EXISTS documents (
            id              TEXT PRIMARY KEY NOT NULL,
            content_type    TEXT NOT NULL
                            CHECK (content_type IN ('text', 'image')),
            content         TEXT NOT NULL,
            embedding       BLOB NOT NULL,
            dimension       INTEGER NOT NULL,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_created_at
            ON documents (created_at);

        -- Graph view of documents; ids match documents.id.
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id              TEXT PRIMARY KEY NOT NULL,
            label           TEXT NOT NULL DEFAULT 'Text',
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        -- Directed SIMILAR edges. Identity is (source, target) only.
        CREATE TABLE IF NOT EXISTS graph_edges (
            source          TEXT NOT NULL REFERENCES graph_nodes(id),
            target          TEXT NOT NULL REFERENCES graph_nodes(id),
            relation        TEXT NOT NULL DEFAULT 'SIMILAR',
            weight          REAL NOT NULL,
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (source, target),
            CHECK (source <> target)
        );

        CREATE INDEX IF NOT EXISTS idx_graph_edges_target
            ON graph_edges (target);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| SemgraphError::BackendUnavailable(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
