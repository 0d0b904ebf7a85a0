use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::CodecError;

/// Encoding used when the source format could not be detected.
pub const FALLBACK_KIND: ImageKind = ImageKind::Jpeg;

/// Image encodings the service can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
}

impl ImageKind {
    /// MIME type for this encoding.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::WebP => "image/webp",
            ImageKind::Bmp => "image/bmp",
        }
    }

    /// Map a detected `image` format onto a supported kind.
    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::WebP => Some(ImageKind::WebP),
            ImageFormat::Bmp => Some(ImageKind::Bmp),
            _ => None,
        }
    }

    fn as_format(&self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Gif => ImageFormat::Gif,
            ImageKind::WebP => ImageFormat::WebP,
            ImageKind::Bmp => ImageFormat::Bmp,
        }
    }
}

/// A decoded raster together with the encoding it was read from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,

    /// `None` when the encoding could not be determined
    pub kind: Option<ImageKind>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decode and encode rasters.
///
/// Both calls are CPU-bound; callers on an async runtime should run them on
/// the blocking pool.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decode `source` into a raster and report its detected encoding.
    fn decode(&self, source: &[u8]) -> Result<DecodedImage, CodecError>;

    /// Encode `image` as `kind`, or as [`FALLBACK_KIND`] when `kind` is `None`.
    fn encode(&self, image: &DynamicImage, kind: Option<ImageKind>) -> Result<Bytes, CodecError>;
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for RasterCodec {
    fn decode(&self, source: &[u8]) -> Result<DecodedImage, CodecError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode {
                message: e.to_string(),
            })?;

        let kind = reader.format().and_then(ImageKind::from_format);

        let image = reader.decode().map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })?;

        Ok(DecodedImage { image, kind })
    }

    fn encode(&self, image: &DynamicImage, kind: Option<ImageKind>) -> Result<Bytes, CodecError> {
        let kind = kind.unwrap_or(FALLBACK_KIND);
        let mut output = Cursor::new(Vec::new());

        let written = match kind {
            // JPEG only takes 8-bit gray or RGB, no alpha
            ImageKind::Jpeg
                if !matches!(image, DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_)) =>
            {
                DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut output, kind.as_format())
            }
            _ => image.write_to(&mut output, kind.as_format()),
        };

        written.map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output.into_inner()))
    }
}
