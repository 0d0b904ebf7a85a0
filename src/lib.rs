//! # Variant Store
//!
//! An image storage service that keeps uploaded originals in S3-compatible
//! object storage and produces height-resized variants on demand.
//!
//! ## Features
//!
//! - **Upload validation**: extension allow-list, size limit and a full decode
//! - **Lazy variants**: a variant is built the first time it is requested and
//!   served from storage afterwards
//! - **Key-as-index**: variants live at `<id>_<height>`, so no metadata table
//!   is needed and deleting an image removes every derived key
//! - **Single-flight builds**: concurrent requests for the same variant share
//!   one decode, resize and write
//!
//! ## Architecture
//!
//! - [`store`] - Object store gateway (S3 and in-memory)
//! - [`codec`] - Image decoding and encoding
//! - [`variant`] - Variant engine
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use variant_store::{create_router, EngineConfig, MemoryObjectStore, RouterConfig, VariantService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = VariantService::new(MemoryObjectStore::new(), EngineConfig::default());
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod variant;

// Re-export commonly used types
pub use codec::{DecodedImage, ImageCodec, ImageKind, RasterCodec, FALLBACK_KIND};
pub use config::{CheckConfig, Cli, Command, ServeConfig};
pub use error::{CodecError, StoreError, ValidationError, VariantError};
pub use server::{
    create_router, create_shared_router, AppState, DeleteResponse, ErrorResponse, HealthResponse,
    ImageResponse, RouterConfig,
};
pub use store::{
    create_s3_client, default_public_url, MemoryObjectStore, ObjectStore, S3ObjectStore,
    StoredObject,
};
pub use variant::{
    belongs_to, file_extension, target_dimensions, variant_height, variant_key, DeletedImage,
    EngineConfig, ImageLocation, SingleFlight, UploadRequest, VariantService,
};
