//! Error taxonomy per the design's §7: validation / not-found / contention /
//! transaction / post-commit / hook failures. Only the first four are ever
//! surfaced to a caller; the rest are logged and swallowed at their origin.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registration payload: {0}")]
    Validation(String),

    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("database contention exceeded retry budget: {0}")]
    Contention(String),

    #[error("transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl RegistryError {
    fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            RegistryError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::Transaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
