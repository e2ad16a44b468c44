use thiserror::Error;

/// Top-level error type for the semgraph system.
///
/// Every pipeline stage maps its failure onto one of these variants so the
/// caller can tell a client mistake from an unreachable backend, a bad
/// embedding, or an unparseable index reply. The pipeline never retries;
/// whatever a stage returns is surfaced unmodified.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SemgraphError {
    /// Missing or invalid request fields. Not retried; surfaced as a client error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An argument outside the operation's domain (e.g. `k == 0`, wrong dimension).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// ContentStore, VectorIndex or GraphStore could not be reached or timed out.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The embedding service answered with a failure.
    #[error("Embedding failed (status {status:?}): {body}")]
    EmbeddingFailed { status: Option<u16>, body: String },

    /// The embedding service answered successfully but with no vector.
    #[error("Embedding service returned an empty embedding")]
    EmptyEmbedding,

    /// The ANN backend returned a reply that could not be decoded.
    #[error("Index result parse error: {reason} (raw: {raw})")]
    IndexResultParse { reason: String, raw: String },

    /// The ANN backend already has an index under this name.
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// The graph upsert failed; nothing from the failing call was applied.
    #[error("Graph upsert error: {0}")]
    GraphUpsert(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SemgraphError {
    /// Build an [`SemgraphError::IndexResultParse`], keeping at most
    /// `RAW_PAYLOAD_LIMIT` characters of the offending payload.
    pub fn index_parse(reason: impl Into<String>, raw: &serde_json::Value) -> Self {
        let mut raw = raw.to_string();
        if raw.chars().count() > RAW_PAYLOAD_LIMIT {
            raw = raw.chars().take(RAW_PAYLOAD_LIMIT).collect::<String>() + "...";
        }
        SemgraphError::IndexResultParse {
            reason: reason.into(),
            raw,
        }
    }

    /// True for failures the caller may retry later (transient backend trouble).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SemgraphError::BackendUnavailable(_))
    }
}

/// Upper bound on the raw payload captured in parse errors.
const RAW_PAYLOAD_LIMIT: usize = 2048;

impl From<toml::de::Error> for SemgraphError {
    fn from(err: toml::de::Error) -> Self {
        SemgraphError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SemgraphError {
    fn from(err: toml::ser::Error) -> Self {
        SemgraphError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SemgraphError {
    fn from(err: serde_json::Error) -> Self {
        SemgraphError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for semgraph operations.
pub type Result<T> = std::result::Result<T, SemgraphError>;
