//! Codec adapter.
//!
//! Turns stored bytes into a raster and back. The engine never touches the
//! `image` crate directly; it goes through [`ImageCodec`] so the codec can
//! be swapped or instrumented.
//!
//! # Design Decisions
//!
//! - **Detect by content**: the format comes from the magic bytes, not from
//!   the key or the recorded content type.
//!
//! - **JPEG fallback**: when the format cannot be detected, encoding falls
//!   back to JPEG instead of failing the resize.

mod raster;

pub use raster::{DecodedImage, ImageCodec, ImageKind, RasterCodec, FALLBACK_KIND};
