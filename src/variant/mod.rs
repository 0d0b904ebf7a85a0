//! Variant engine.
//!
//! Originals are stored under a generated id. Height-bounded variants are
//! produced lazily on first request, written back under a derived key and
//! served from the store on every later request:
//!
//! ```text
//! GET variant(id, h)
//!        │
//!        ▼
//!   exists(id_h)? ──yes──▶ url(id_h)
//!        │ no
//!        ▼
//!   get(id) ─▶ decode ─▶ resize to h ─▶ encode ─▶ put(id_h) ─▶ url(id_h)
//! ```
//!
//! Concurrent misses for the same key share one build through
//! [`SingleFlight`].

mod flight;
mod naming;
mod resize;
mod service;

pub use flight::SingleFlight;
pub use naming::{belongs_to, file_extension, variant_height, variant_key, VARIANT_SEPARATOR};
pub use resize::{resize_exact, target_dimensions, RESIZE_FILTER};
pub use service::{
    ByteStream, DeletedImage, EngineConfig, ImageLocation, UploadRequest, VariantService,
    DEFAULT_MAX_IMAGE_SIZE_BYTES, DEFAULT_SUPPORTED_EXTENSIONS, DEFAULT_THUMBNAIL_HEIGHT,
};
