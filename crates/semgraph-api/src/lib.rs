//! Semgraph API crate - axum REST server over the ingestion pipeline.
//!
//! Exposes submit, read-only search, a graph dump and a health probe.
//! Every pipeline failure is mapped onto an HTTP status by [`ApiError`].

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
