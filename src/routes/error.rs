use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::conversion::ConversionError;

/// Error returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conversion(e) => match e {
                ConversionError::NotFound(_) | ConversionError::ArtifactMissing(_) => {
                    StatusCode::NOT_FOUND
                }
                ConversionError::NotCompleted(_) => StatusCode::BAD_REQUEST,
                ConversionError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ConversionError::Registry(_)
                | ConversionError::Storage(_)
                | ConversionError::Executor(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
