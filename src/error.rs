//! Error Taxonomy
//!
//! Two error families cross module boundaries:
//! - **`ServiceError`**: everything that can reach an HTTP caller. Each variant maps to one status
//!   code and renders as `{"error": "..."}`.
//! - **`TransferError`**: object-storage failures raised by the `transfer` module. The worker
//!   pipeline folds these into a job's `error` string; they never reach HTTP directly.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or incomplete request body. Never retried.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Job not found with Id {0}")]
    JobNotFound(String),

    #[error("Job {0} already exists")]
    DuplicateJob(String),

    #[error("No worker available to accept the request")]
    NoWorkerAvailable,

    /// A call to a specific worker failed at the transport level or returned garbage.
    #[error("Call '{call}' to worker {worker} failed: {message}")]
    WorkerCall {
        worker: String,
        call: &'static str,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::DuplicateJob(_) => StatusCode::CONFLICT,
            ServiceError::NoWorkerAvailable
            | ServiceError::WorkerCall { .. }
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    /// The object does not exist. Surfaced as a job failure, never retried.
    #[error("{key} does not exist in the bucket: {bucket}")]
    NotFound { bucket: String, key: String },

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Part {part} failed after {attempts} attempts: {message}")]
    PartFailed {
        part: u32,
        attempts: u32,
        message: String,
    },

    #[error("Transfer task aborted: {0}")]
    Join(String),
}

impl TransferError {
    /// Whether another attempt at the same chunk or part could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Storage(_) | TransferError::Io(_))
    }
}
