//! Router configuration for the image API.
//!
//! # Route Structure
//!
//! ```text
//! /health                                   - Health check
//! /api/images/upload                        - POST upload
//! /api/images/{id}                          - GET original, DELETE all
//! /api/images/{id}/variation?targetHeight=N - GET variant
//! /api/images/{id}/thumbnail                - GET thumbnail
//! ```
//!
//! # Example
//!
//! ```ignore
//! use variant_store::server::{create_router, RouterConfig};
//! use variant_store::store::MemoryObjectStore;
//! use variant_store::variant::{EngineConfig, VariantService};
//!
//! let service = VariantService::new(MemoryObjectStore::new(), EngineConfig::default());
//! let router = create_router(service, RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    delete_handler, health_handler, original_handler, thumbnail_handler, upload_handler,
    variation_handler, AppState, DEFAULT_REQUEST_TIMEOUT,
};
use crate::codec::ImageCodec;
use crate::store::ObjectStore;
use crate::variant::{VariantService, DEFAULT_MAX_IMAGE_SIZE_BYTES};

/// Room left in the body limit for multipart boundaries and part headers.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Budget for a single request before its work is cancelled
    pub request_timeout: Duration,

    /// Largest accepted request body in bytes
    pub body_limit: usize,
}

impl RouterConfig {
    /// Create a router configuration with defaults.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Tracing is enabled
    /// - Requests time out after 30 seconds
    /// - The body limit fits the default maximum upload
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            body_limit: body_limit_for(DEFAULT_MAX_IMAGE_SIZE_BYTES),
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Size the body limit for uploads of up to `max_image_size_bytes`.
    pub fn with_max_upload(mut self, max_image_size_bytes: u64) -> Self {
        self.body_limit = body_limit_for(max_image_size_bytes);
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn body_limit_for(max_image_size_bytes: u64) -> usize {
    usize::try_from(max_image_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router<S, C>(service: VariantService<S, C>, config: RouterConfig) -> Router
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    create_shared_router(Arc::new(service), config)
}

/// Create the router around a service shared with other tasks.
pub fn create_shared_router<S, C>(
    service: Arc<VariantService<S, C>>,
    config: RouterConfig,
) -> Router
where
    S: ObjectStore + 'static,
    C: ImageCodec,
{
    let app_state = AppState::from_shared(service).with_request_timeout(config.request_timeout);
    let cors = build_cors_layer(&config);

    let images = Router::new()
        .route("/upload", post(upload_handler::<S, C>))
        .route(
            "/{id}",
            get(original_handler::<S, C>).delete(delete_handler::<S, C>),
        )
        .route("/{id}/variation", get(variation_handler::<S, C>))
        .route("/{id}/thumbnail", get(thumbnail_handler::<S, C>))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .with_state(app_state);

    let router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api/images", images)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
