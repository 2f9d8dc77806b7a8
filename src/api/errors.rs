//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::history::HistoryError;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// BAD_REQUEST, NOT_FOUND, INTERNAL_ERROR, SERVICE_UNAVAILABLE
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message.into()),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message.into()),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message.into()),
            request_id,
        }
    }

    pub fn service_unavailable(request_id: String, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::ServiceUnavailable(message.into()),
            request_id,
        }
    }

    /// History read failures surface as 500 with the storage detail logged
    pub fn from_history(request_id: String, err: HistoryError) -> Self {
        tracing::error!(request_id = %request_id, error = %err, "History query failed");
        Self::internal_error(request_id, "failed to read history")
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, code, message) = self.parts();
        write!(f, "[{}] {}: {}", self.request_id, code, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        });

        (status, body).into_response()
    }
}
