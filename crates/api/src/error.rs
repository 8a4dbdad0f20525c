//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed caller identity.
    #[error("{0}")]
    Unauthenticated(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => match err {
                DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
                DomainError::Unauthorized(_) => StatusCode::FORBIDDEN,
                DomainError::InvalidQuantity { .. }
                | DomainError::EmptyCheckout
                | DomainError::Validation(_) => StatusCode::BAD_REQUEST,
                DomainError::OutOfStock { .. }
                | DomainError::InsufficientStock { .. }
                | DomainError::InvalidTransition { .. }
                | DomainError::Conflict(_) => StatusCode::CONFLICT,
                DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn available_stock(&self) -> Option<u32> {
        match self {
            ApiError::Domain(err) => err.available_stock(),
            _ => None,
        }
    }

    /// Machine-readable kind carried in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Domain(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        metrics::counter!("api_errors_total", "code" => code).increment(1);

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = serde_json::json!({ "error": code, "message": message });
        if let Some(available) = self.available_stock() {
            body["available"] = available.into();
        }
        (status, axum::Json(body)).into_response()
    }
}
