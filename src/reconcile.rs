use image::{GrayImage, RgbaImage};

use crate::codec::{self, Channel};
use crate::error::{PipelineError, Result};

/// Alpha channel of the source image, one byte per pixel
pub fn extract_alpha(source: &RgbaImage) -> GrayImage {
    codec::extract_channel(source, Channel::Alpha)
}

/// Intersect the mask's alpha with the source image's alpha
///
/// `result.alpha = min(mask.alpha, source_alpha)`. Colour channels come from
/// the mask unchanged. Pixels the source already made transparent stay
/// transparent whatever the mask says.
///
/// # Errors
///
/// * `PipelineError::DimensionMismatch` - mask and alpha sizes differ
pub fn reconcile_alpha(mask: &RgbaImage, source_alpha: &GrayImage) -> Result<RgbaImage> {
    let _span = tracing::debug_span!("reconcile").entered();

    PipelineError::check_dimensions("reconcile", mask.dimensions(), source_alpha.dimensions())?;

    let mut result = mask.clone();
    for (pixel, alpha) in result.pixels_mut().zip(source_alpha.pixels()) {
        pixel[3] = pixel[3].min(alpha[0]);
    }
    Ok(result)
}
