//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping pipeline errors to HTTP status codes.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use semgraph_core::error::SemgraphError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "bad_gateway").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid request fields.
    BadRequest(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 500 with structured details, e.g. an unparseable index reply.
    InternalWithDetails(String, serde_json::Value),
    /// 502 Bad Gateway - the embedding service failed.
    BadGateway(String, Option<u16>),
    /// 503 Service Unavailable - a backend is unreachable or timed out.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
            ApiError::InternalWithDetails(msg, details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg,
                Some(details),
            ),
            ApiError::BadGateway(msg, upstream) => (
                StatusCode::BAD_GATEWAY,
                "bad_gateway",
                msg,
                upstream.map(|status| json!({ "upstream_status": status })),
            ),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, None)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<SemgraphError> for ApiError {
    fn from(err: SemgraphError) -> Self {
        match err {
            SemgraphError::Validation(_) | SemgraphError::InvalidArgument(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ref e if e.is_retryable() => ApiError::ServiceUnavailable(e.to_string()),
            SemgraphError::EmbeddingFailed { status, .. } => {
                ApiError::BadGateway(err.to_string(), status)
            }
            SemgraphError::EmptyEmbedding => ApiError::BadGateway(err.to_string(), None),
            SemgraphError::IndexResultParse { ref reason, ref raw } => {
                let details = json!({ "reason": reason, "raw": raw });
                ApiError::InternalWithDetails(err.to_string(), details)
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
