//! HTTP server layer.
//!
//! A thin axum surface over the [`VariantService`](crate::variant::VariantService).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      /api/images/upload · /api/images/{id}[/variation|...]      │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────────┐  │
//! │  │  handlers   │  │    response     │  │       routes        │  │
//! │  │ (requests)  │  │ (bodies, codes) │  │  (router config)    │  │
//! │  └─────────────┘  └─────────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod response;
pub mod routes;

pub use handlers::{
    delete_handler, health_handler, original_handler, thumbnail_handler, upload_handler,
    variation_handler, AppState, VariationQueryParams, DEFAULT_REQUEST_TIMEOUT, UPLOAD_FIELD,
};
pub use response::{
    error_status, DeleteResponse, ErrorResponse, HealthResponse, ImageResponse, ERROR_OCCURRED,
    SUCCESS, UNEXPECTED_ERROR, VALIDATION_FAILED,
};
pub use routes::{create_router, create_shared_router, RouterConfig, MULTIPART_OVERHEAD_BYTES};
