//! Error types shared across the service.
//!
//! `ApiError` is the only type that crosses the HTTP boundary. Tool failures
//! are carried as `ToolError` and folded into tool-result payloads, so they
//! never abort a turn.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

/// Rejections surfaced to the caller before (or instead of) a turn.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "An error occurred while processing your request".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => ApiError::BadRequest(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Failure of a single tool invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("query rejected: {0}")]
    Validation(String),
    #[error("{0}")]
    Provisioning(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("generation failed: {0}")]
    Generation(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Validation(_) => "validation",
            ToolError::Provisioning(_) => "provisioning",
            ToolError::Upstream(_) => "upstream",
            ToolError::Generation(_) => "generation",
        }
    }

    /// Payload stored as the tool result of a failed invocation.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

/// Errors raised by the read-only relational store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlExecutionError {
    #[error("table `{0}` does not exist")]
    MissingTable(String),
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error("data store unavailable: {0}")]
    Unavailable(String),
}

impl From<SqlExecutionError> for ToolError {
    fn from(err: SqlExecutionError) -> Self {
        match err {
            SqlExecutionError::MissingTable(table) => ToolError::Provisioning(format!(
                "schema not provisioned: table `{}` does not exist",
                table
            )),
            other => ToolError::Upstream(other.to_string()),
        }
    }
}

/// Errors raised by the chat store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("chat store error: {0}")]
    Database(String),
    #[error("chat store unavailable: {0}")]
    Unavailable(String),
    /// A row with the same id is already stored
    #[error("{0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}
