//! HTTP request handlers for the image API.
//!
//! Handlers only translate between HTTP and the [`VariantService`]; every
//! rule lives in the engine.
//!
//! # Endpoints
//!
//! - `POST   /api/images/upload` - Store a new original
//! - `GET    /api/images/{id}` - Locate an original
//! - `GET    /api/images/{id}/variation?targetHeight=N` - Locate or build a variant
//! - `GET    /api/images/{id}/thumbnail` - Locate or build the thumbnail
//! - `DELETE /api/images/{id}` - Delete an original and its variants
//! - `GET    /health` - Health check endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, Multipart, Path, Query, State},
    http::header,
    Json,
};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::codec::{ImageCodec, RasterCodec};
use crate::error::{ValidationError, VariantError};
use crate::store::ObjectStore;
use crate::variant::{UploadRequest, VariantService};

use super::response::{DeleteResponse, HealthResponse, ImageResponse};

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "image";

/// Default time budget for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the variant service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ObjectStore, C: ImageCodec = RasterCodec> {
    pub service: Arc<VariantService<S, C>>,

    /// Budget after which a request's cancellation token fires
    pub request_timeout: Duration,
}

impl<S: ObjectStore, C: ImageCodec> AppState<S, C> {
    pub fn new(service: VariantService<S, C>) -> Self {
        Self::from_shared(Arc::new(service))
    }

    /// Create state around a service that is also used elsewhere.
    pub fn from_shared(service: Arc<VariantService<S, C>>) -> Self {
        Self {
            service,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Token for one request.
    ///
    /// It fires when the request timeout elapses, or when the returned guard
    /// is dropped, which happens when the handler finishes or the client
    /// disconnects and the handler future is dropped.
    fn request_scope(&self) -> (CancellationToken, DropGuard) {
        let token = CancellationToken::new();
        let timer = token.clone();
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Request timed out");
                    timer.cancel();
                }
            }
        });

        let guard = token.clone().drop_guard();
        (token, guard)
    }
}

impl<S: ObjectStore, C: ImageCodec> Clone for AppState<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            request_timeout: self.request_timeout,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for variation requests.
#[derive(Debug, Deserialize)]
pub struct VariationQueryParams {
    /// Height of the requested variant in pixels
    #[serde(rename = "targetHeight")]
    pub target_height: u32,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle uploads.
///
/// # Endpoint
///
/// `POST /api/images/upload` with a multipart body whose `image` field holds
/// the file.
///
/// # Response
///
/// - `200 OK`: `{id, url, message}`
/// - `422 Unprocessable Entity`: unsupported extension, file too large, or
///   not an image
pub async fn upload_handler<S, C>(
    State(state): State<AppState<S, C>>,
    mut multipart: Multipart,
) -> Result<Json<ImageResponse>, VariantError>
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    let (cancel, _guard) = state.request_scope();

    while let Some(field) = multipart.next_field().await.map_err(unreadable)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        // Parts rarely declare a length; the engine also bounds the body
        let size = field
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);

        let body = field
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .boxed();

        let request = UploadRequest {
            file_name,
            content_type,
            size,
            body,
        };

        let location = state.service.upload(request, &cancel).await?;
        return Ok(Json(location.into()));
    }

    Err(ValidationError::UnreadableImage {
        message: format!("multipart field '{}' is missing", UPLOAD_FIELD),
    }
    .into())
}

/// Handle original lookups.
///
/// # Endpoint
///
/// `GET /api/images/{id}`
pub async fn original_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<ImageResponse>, VariantError>
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    let (cancel, _guard) = state.request_scope();
    let location = state.service.fetch_original(&id, &cancel).await?;
    Ok(Json(location.into()))
}

/// Handle variant requests.
///
/// # Endpoint
///
/// `GET /api/images/{id}/variation?targetHeight=N`
///
/// # Response
///
/// - `200 OK`: `{id, url, message}` pointing at the variant
/// - `400 Bad Request`: `targetHeight` is missing, not a number, zero or
///   taller than the original
/// - `422 Unprocessable Entity`: no original for `id`
pub async fn variation_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(id): Path<String>,
    query: Result<Query<VariationQueryParams>, QueryRejection>,
) -> Result<Json<ImageResponse>, VariantError>
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    let Query(query) = query.map_err(|e| VariantError::InvalidQuery {
        message: e.body_text(),
    })?;

    let (cancel, _guard) = state.request_scope();
    let location = state
        .service
        .fetch_or_build_variant(&id, query.target_height, &cancel)
        .await?;
    Ok(Json(location.into()))
}

/// Handle thumbnail requests.
///
/// # Endpoint
///
/// `GET /api/images/{id}/thumbnail`
pub async fn thumbnail_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<ImageResponse>, VariantError>
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    let (cancel, _guard) = state.request_scope();
    let location = state.service.fetch_thumbnail(&id, &cancel).await?;
    Ok(Json(location.into()))
}

/// Handle deletes.
///
/// # Endpoint
///
/// `DELETE /api/images/{id}`
pub async fn delete_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, VariantError>
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    let (cancel, _guard) = state.request_scope();
    let deleted = state.service.delete_all(&id, &cancel).await?;
    Ok(Json(deleted.into()))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn unreadable(err: axum::extract::multipart::MultipartError) -> VariantError {
    ValidationError::UnreadableImage {
        message: err.body_text(),
    }
    .into()
}
