use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Errors the public routes can answer with.
///
/// The display text is the exact public message. Store failures keep their
/// cause for the log only; it never reaches the response body.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP 400.
    #[error("Product ID is required")]
    Validation,

    /// HTTP 404.
    #[error("Product not found")]
    NotFound,

    /// HTTP 500.
    #[error("Internal server error")]
    Store(#[from] StoreError),

    /// HTTP 404 for a path no route serves.
    #[error("Not found")]
    UnknownRoute,

    /// HTTP 405.
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::UnknownRoute => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(cause) = &self {
            error!(error = %cause, "Error: store failure");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
