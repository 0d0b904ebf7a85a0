use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::VariantError;

/// Resampling filter used for every variant.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Dimensions of a variant `target_height` pixels tall.
///
/// The height is taken exactly as requested and the width is
/// `floor(original_width * target_height / original_height)`, never below 1.
/// Upscaling is refused.
pub fn target_dimensions(
    original_width: u32,
    original_height: u32,
    target_height: u32,
) -> Result<(u32, u32), VariantError> {
    if target_height == 0 {
        return Err(VariantError::InvalidTargetHeight { target_height });
    }

    if target_height > original_height {
        return Err(VariantError::TargetHeightExceeded {
            target_height,
            original_height,
        });
    }

    let width = u64::from(original_width) * u64::from(target_height) / u64::from(original_height);

    // Fits in u32 since target_height <= original_height
    Ok(((width as u32).max(1), target_height))
}

/// Resize `image` to exactly `width` x `height`.
pub fn resize_exact(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    image.resize_exact(width, height, RESIZE_FILTER)
}
