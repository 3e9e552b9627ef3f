// SPDX-License-Identifier: GPL-3.0-or-later
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use curatarr_domain::ValidationError;
use curatarr_infrastructure::repositories::RepositoryError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<ValidationError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<Vec<ValidationError>> for ApiError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                errors
                    .iter()
                    .map(|e| FieldError {
                        field: e.field.to_string(),
                        message: e.message.clone(),
                    })
                    .collect(),
            ),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, Vec::new()),
            ApiError::NotFound { .. } => (StatusCode::NOT_FOUND, Vec::new()),
            ApiError::Internal(err) => match err.downcast_ref::<RepositoryError>() {
                Some(conflict @ RepositoryError::NameConflict { .. }) => {
                    let body = ErrorResponse {
                        error: conflict.to_string(),
                        details: Vec::new(),
                    };
                    return (StatusCode::CONFLICT, Json(body)).into_response();
                }
                None => {
                    error!(target: "api", error = %err, "request failed");
                    let body = ErrorResponse {
                        error: "an internal error occurred".to_string(),
                        details: Vec::new(),
                    };
                    return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
                }
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}
