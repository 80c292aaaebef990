//! Errors surfaced to HTTP clients.
//!
//! Analyzer failures never reach this type; they are absorbed into the
//! combined result. Only invalid input, storage reads and missing session
//! data produce an error response.

use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("{0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = json!({
            "error": self.to_string(),
            "status": "error",
        });
        (status, Json(body)).into_response()
    }
}
