//! Semgraph Storage crate - SQLite persistence for documents and the similarity graph.
//!
//! Provides a WAL-mode SQLite database with migrations, the content-addressed
//! `ContentStore` and the `GraphStore` holding weighted `SIMILAR` edges.

pub mod content;
pub mod db;
pub mod graph;
pub mod migrations;

pub use content::{ContentStore, SqliteContentStore};
pub use db::Database;
pub use graph::{GraphStore, SqliteGraphStore};
