//! Response shaping.
//!
//! Success bodies carry `{id, url, message}` (or `{id, message}` for
//! deletes). Every failure carries `{error, details}` where `error` is one of
//! a handful of fixed summaries and `details` is the human-readable cause.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{StoreError, ValidationError, VariantError};
use crate::variant::{DeletedImage, ImageLocation};

/// Summary used for every validation failure.
pub const VALIDATION_FAILED: &str = "Business validation failed.";

/// Summary used for bad request parameters.
pub const ERROR_OCCURRED: &str = "Error occurred.";

/// Summary used for every server-side failure.
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred.";

/// Message carried by every success body.
pub const SUCCESS: &str = "Success";

// =============================================================================
// Success Bodies
// =============================================================================

/// Body returned by upload, fetch, variation and thumbnail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageResponse {
    pub id: String,
    pub url: String,
    pub message: String,
}

impl From<ImageLocation> for ImageResponse {
    fn from(location: ImageLocation) -> Self {
        Self {
            id: location.id,
            url: location.url,
            message: SUCCESS.to_string(),
        }
    }
}

/// Body returned by delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub id: String,
    pub message: String,
}

impl From<DeletedImage> for DeleteResponse {
    fn from(deleted: DeletedImage) -> Self {
        Self {
            id: deleted.id,
            message: SUCCESS.to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// JSON body returned for all error conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Fixed summary of the failure class
    pub error: String,

    /// Human-readable cause
    pub details: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

/// Status code and summary for an engine error.
pub fn error_status(err: &VariantError) -> (StatusCode, &'static str) {
    match err {
        VariantError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, VALIDATION_FAILED),

        VariantError::TargetHeightExceeded { .. }
        | VariantError::InvalidTargetHeight { .. }
        | VariantError::InvalidQuery { .. } => (StatusCode::BAD_REQUEST, ERROR_OCCURRED),

        VariantError::Cancelled => (StatusCode::REQUEST_TIMEOUT, UNEXPECTED_ERROR),

        VariantError::Store(StoreError::Connection(_)) => {
            (StatusCode::BAD_GATEWAY, UNEXPECTED_ERROR)
        }

        VariantError::Store(_) | VariantError::Codec(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_ERROR)
        }
    }
}

impl IntoResponse for VariantError {
    fn into_response(self) -> Response {
        let (status, summary) = error_status(&self);
        let details = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), "Server error: {}", details);
        } else if matches!(
            self,
            VariantError::Validation(ValidationError::NotFound { .. })
        ) {
            debug!(status = status.as_u16(), "Resource not found: {}", details);
        } else {
            warn!(status = status.as_u16(), "Client error: {}", details);
        }

        (status, Json(ErrorResponse::new(summary, details))).into_response()
    }
}
