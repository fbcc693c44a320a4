use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::service::{FieldError, ServiceError};
use crate::storage::StorageError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: Vec::new(),
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Gone => StatusCode::GONE,
            ServiceError::DuplicateCode | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Storage(StorageError::Conflict) => StatusCode::CONFLICT,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ServiceError::NotFound => ErrorResponse::new("URL not found"),
            ServiceError::Gone => ErrorResponse::new("URL has expired"),
            ServiceError::DuplicateCode => ErrorResponse::new("Custom code already in use"),
            ServiceError::Validation(details) => ErrorResponse {
                details,
                ..ErrorResponse::new("Validation failed")
            },
            ServiceError::Storage(StorageError::Conflict) => {
                ErrorResponse::new("Link was updated concurrently, please retry")
            }
            ServiceError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                ErrorResponse::new("Internal server error")
            }
        };

        (status, Json(body)).into_response()
    }
}
