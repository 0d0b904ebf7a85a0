//! Variant service orchestrating uploads, lookups, variant builds and deletes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        VariantService                           │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │              fetch_or_build_variant()                   │    │
//! │  │  1. Variant key       4. Check target height            │    │
//! │  │  2. Exists? → hit     5. Resize + encode                │    │
//! │  │  3. Read + decode     6. Write variant key (last)       │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌─────────────┐     ┌──────────────┐    ┌──────────────────┐ │
//! │    │ ObjectStore │     │ SingleFlight │    │    ImageCodec    │ │
//! │    └─────────────┘     └──────────────┘    └──────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation takes a [`CancellationToken`]. When it fires, the
//! operation stops at its current store or codec call and returns
//! [`VariantError::Cancelled`]. Writes are always the last step, so a
//! cancelled or failed operation never leaves an object at its target key.

use std::future::Future;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{stream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec::{DecodedImage, ImageCodec, RasterCodec, FALLBACK_KIND};
use crate::error::{CodecError, ValidationError, VariantError};
use crate::store::ObjectStore;

use super::flight::SingleFlight;
use super::naming::{belongs_to, file_extension, variant_key};
use super::resize::{resize_exact, target_dimensions};

/// Default thumbnail height in pixels.
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 160;

/// Default maximum upload size (10 MiB).
pub const DEFAULT_MAX_IMAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Default allow-listed upload extensions.
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Maximum number of concurrent deletes issued by `delete_all`.
const DELETE_CONCURRENCY: usize = 8;

// =============================================================================
// Engine Configuration
// =============================================================================

/// Read-only engine settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lowercase extensions accepted on upload, without the leading dot
    pub supported_extensions: Vec<String>,

    /// Largest accepted upload in bytes
    pub max_image_size_bytes: u64,

    /// Height used by the thumbnail shortcut
    pub thumbnail_height: u32,
}

impl EngineConfig {
    /// Create a configuration from an extension allow-list and a size limit.
    ///
    /// Extensions are normalized: trimmed, lowercased, leading dot removed.
    pub fn new<I, E>(supported_extensions: I, max_image_size_bytes: u64) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        let supported_extensions = supported_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            supported_extensions,
            max_image_size_bytes,
            thumbnail_height: DEFAULT_THUMBNAIL_HEIGHT,
        }
    }

    /// Set the thumbnail height.
    pub fn with_thumbnail_height(mut self, height: u32) -> Self {
        self.thumbnail_height = height;
        self
    }

    /// Whether uploads with this (lowercase) extension are accepted.
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.supported_extensions.iter().any(|ext| ext == extension)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_EXTENSIONS, DEFAULT_MAX_IMAGE_SIZE_BYTES)
    }
}

// =============================================================================
// Requests and Outcomes
// =============================================================================

/// Stream of upload body chunks.
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes, std::io::Error>>;

/// An already-parsed upload.
pub struct UploadRequest<'a> {
    /// Client-supplied file name, used for the extension check
    pub file_name: String,

    /// Client-supplied content type, stored with the original
    pub content_type: Option<String>,

    /// Declared size in bytes
    pub size: u64,

    /// The file contents
    pub body: ByteStream<'a>,
}

impl<'a> UploadRequest<'a> {
    /// Build a request from an in-memory body.
    pub fn from_bytes(
        file_name: impl Into<String>,
        content_type: Option<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        Self {
            file_name: file_name.into(),
            content_type,
            size: body.len() as u64,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }
}

/// Where an image (original or variant) can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    pub id: String,
    pub url: String,
}

/// Outcome of deleting an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedImage {
    pub id: String,

    /// Every key that was deleted (the original and its variants)
    pub keys: Vec<String>,
}

// =============================================================================
// Variant Service
// =============================================================================

/// Service implementing upload, lookup, on-demand variants and delete.
///
/// # Type Parameters
///
/// * `S` - The object store
/// * `C` - The image codec (the `image`-crate codec by default)
pub struct VariantService<S: ObjectStore, C: ImageCodec = RasterCodec> {
    store: S,
    codec: Arc<C>,
    config: EngineConfig,
    flight: SingleFlight<Result<ImageLocation, VariantError>>,
}

impl<S: ObjectStore> VariantService<S, RasterCodec> {
    /// Create a service using the default codec.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_codec(store, RasterCodec::new(), config)
    }
}

impl<S: ObjectStore, C: ImageCodec> VariantService<S, C> {
    /// Create a service with a custom codec.
    pub fn with_codec(store: S, codec: C, config: EngineConfig) -> Self {
        Self {
            store,
            codec: Arc::new(codec),
            config,
            flight: SingleFlight::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate an upload, store it under a fresh id and return its location.
    ///
    /// Checks run in order: extension allow-list, declared size, actual
    /// size while reading the body, then a full decode to reject files that
    /// only look like images by name.
    pub async fn upload(
        &self,
        request: UploadRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ImageLocation, VariantError> {
        let result = self.upload_inner(request, cancel).await;
        if let Err(ref e) = result {
            log_failure("upload", None, None, e);
        }
        result
    }

    async fn upload_inner(
        &self,
        request: UploadRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ImageLocation, VariantError> {
        let UploadRequest {
            file_name,
            content_type,
            size,
            body,
        } = request;

        let extension = file_extension(&file_name);
        if !self.config.allows_extension(&extension) {
            return Err(ValidationError::UnsupportedExtension { extension }.into());
        }

        let max = self.config.max_image_size_bytes;
        if size > max {
            return Err(ValidationError::FileTooLarge { size, max }.into());
        }

        let body = until_cancelled(cancel, read_bounded(body, max)).await?;

        until_cancelled(cancel, async {
            self.decode(body.clone()).await.map_err(|e| {
                VariantError::from(ValidationError::UnreadableImage {
                    message: e.to_string(),
                })
            })
        })
        .await?;

        let id = Uuid::new_v4().to_string();
        until_cancelled(cancel, async {
            self.store
                .put(&id, body, content_type.as_deref())
                .await
                .map_err(VariantError::from)
        })
        .await?;

        info!(id = %id, file_name = %file_name, size = size, "Stored original");

        Ok(self.location(&id, &id))
    }

    /// Location of the original stored under `id`.
    ///
    /// Never decodes anything.
    pub async fn fetch_original(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageLocation, VariantError> {
        let result = until_cancelled(cancel, self.original_inner(id)).await;
        if let Err(ref e) = result {
            log_failure("fetch_original", Some(id), None, e);
        }
        result
    }

    async fn original_inner(&self, id: &str) -> Result<ImageLocation, VariantError> {
        if id.is_empty() || !self.store.exists(id).await? {
            return Err(VariantError::not_found(id));
        }
        Ok(self.location(id, id))
    }

    /// Location of the `target_height` variant of `id`, building it first if
    /// it does not exist yet.
    pub async fn fetch_or_build_variant(
        &self,
        id: &str,
        target_height: u32,
        cancel: &CancellationToken,
    ) -> Result<ImageLocation, VariantError> {
        let result = until_cancelled(cancel, self.variant_inner(id, target_height)).await;
        if let Err(ref e) = result {
            log_failure("fetch_or_build_variant", Some(id), Some(target_height), e);
        }
        result
    }

    /// Location of the thumbnail of `id` (a variant at the configured height).
    pub async fn fetch_thumbnail(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageLocation, VariantError> {
        self.fetch_or_build_variant(id, self.config.thumbnail_height, cancel)
            .await
    }

    async fn variant_inner(
        &self,
        id: &str,
        target_height: u32,
    ) -> Result<ImageLocation, VariantError> {
        if target_height == 0 {
            return Err(VariantError::InvalidTargetHeight { target_height });
        }
        if id.is_empty() {
            return Err(VariantError::not_found(id));
        }

        let key = variant_key(id, target_height);

        if self.store.exists(&key).await? {
            debug!(key = %key, "Variant cache hit");
            return Ok(self.location(id, &key));
        }

        debug!(key = %key, "Variant cache miss");
        self.flight
            .run(&key, || self.build_variant(id, target_height, &key))
            .await
    }

    async fn build_variant(
        &self,
        id: &str,
        target_height: u32,
        key: &str,
    ) -> Result<ImageLocation, VariantError> {
        // A build that finished between our miss and joining the flight
        if self.store.exists(key).await? {
            return Ok(self.location(id, key));
        }

        let original = match self.store.get(id).await {
            Ok(original) => original,
            Err(e) if e.is_not_found() => return Err(VariantError::not_found(id)),
            Err(e) => return Err(e.into()),
        };

        let decoded = self.decode(original.body).await?;
        let (width, height) = target_dimensions(decoded.width(), decoded.height(), target_height)?;

        let content_type = original
            .content_type
            .unwrap_or_else(|| decoded.kind.unwrap_or(FALLBACK_KIND).mime_type().to_string());

        let codec = Arc::clone(&self.codec);
        let encoded = tokio::task::spawn_blocking(move || {
            let resized = resize_exact(&decoded.image, width, height);
            codec.encode(&resized, decoded.kind)
        })
        .await
        .map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })??;

        self.store
            .put(key, encoded, Some(content_type.as_str()))
            .await?;

        info!(
            key = %key,
            width = width,
            height = height,
            "Stored variant"
        );

        Ok(self.location(id, key))
    }

    /// Delete the original of `id` and every variant derived from it.
    pub async fn delete_all(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeletedImage, VariantError> {
        let result = until_cancelled(cancel, self.delete_inner(id)).await;
        if let Err(ref e) = result {
            log_failure("delete_all", Some(id), None, e);
        }
        result
    }

    async fn delete_inner(&self, id: &str) -> Result<DeletedImage, VariantError> {
        // An empty prefix would match the whole store
        if id.is_empty() {
            return Err(VariantError::not_found(id));
        }

        let keys: Vec<String> = self
            .store
            .list_by_prefix(id)
            .await?
            .into_iter()
            .filter(|key| belongs_to(key, id))
            .collect();

        if keys.is_empty() {
            return Err(VariantError::not_found(id));
        }

        let deletes: Vec<_> = keys.iter().map(|key| self.store.delete(key)).collect();
        stream::iter(deletes)
            .buffer_unordered(DELETE_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        info!(id = %id, deleted = keys.len(), "Deleted image and variants");

        Ok(DeletedImage {
            id: id.to_string(),
            keys,
        })
    }

    async fn decode(&self, body: Bytes) -> Result<DecodedImage, CodecError> {
        let codec = Arc::clone(&self.codec);
        tokio::task::spawn_blocking(move || codec.decode(&body))
            .await
            .map_err(|e| CodecError::Decode {
                message: e.to_string(),
            })?
    }

    fn location(&self, id: &str, key: &str) -> ImageLocation {
        ImageLocation {
            id: id.to_string(),
            url: self.store.url(key),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Race `work` against the cancellation token.
async fn until_cancelled<T, F>(cancel: &CancellationToken, work: F) -> Result<T, VariantError>
where
    F: Future<Output = Result<T, VariantError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VariantError::Cancelled),
        result = work => result,
    }
}

/// Collect an upload body, failing as soon as it grows past `max` bytes.
async fn read_bounded(mut body: ByteStream<'_>, max: u64) -> Result<Bytes, VariantError> {
    let mut buffer = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ValidationError::UnreadableImage {
            message: e.to_string(),
        })?;

        let size = (buffer.len() + chunk.len()) as u64;
        if size > max {
            return Err(ValidationError::FileTooLarge { size, max }.into());
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

fn log_failure(operation: &str, id: Option<&str>, target_height: Option<u32>, err: &VariantError) {
    let id = id.unwrap_or("-");
    match err {
        VariantError::Validation(ValidationError::NotFound { .. }) => {
            debug!(operation, id, target_height, "{}", err)
        }
        VariantError::Cancelled => debug!(operation, id, target_height, "{}", err),
        e if e.is_client_error() => warn!(operation, id, target_height, "{}", err),
        _ => error!(operation, id, target_height, "{}", err),
    }
}
