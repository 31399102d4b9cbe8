use std::fmt;

use image::{Rgba, RgbaImage};

use crate::error::{PipelineError, Result};

/// Porter-Duff operator used to layer an overlay onto a base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOperator {
    /// Overlay drawn on top of base
    Over,
    /// Base kept only where overlay is opaque
    DestIn,
    /// Base erased where overlay is opaque
    DestOut,
}

impl fmt::Display for BlendOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Over => f.write_str("over"),
            Self::DestIn => f.write_str("dest-in"),
            Self::DestOut => f.write_str("dest-out"),
        }
    }
}

/// Layer `overlay` onto `base` pixel by pixel
///
/// Both buffers hold straight (non-premultiplied) RGBA. The result has the
/// same dimensions; nothing is cropped, padded or resampled.
///
/// # Errors
///
/// * `PipelineError::DimensionMismatch` - base and overlay sizes differ
pub fn composite(base: &RgbaImage, overlay: &RgbaImage, op: BlendOperator) -> Result<RgbaImage> {
    let _span = tracing::debug_span!("composite", %op).entered();

    PipelineError::check_dimensions("composite", base.dimensions(), overlay.dimensions())?;

    let blend: fn(Rgba<u8>, Rgba<u8>) -> Rgba<u8> = match op {
        BlendOperator::Over => over,
        BlendOperator::DestIn => dest_in,
        BlendOperator::DestOut => dest_out,
    };

    let (width, height) = base.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        blend(*base.get_pixel(x, y), *overlay.get_pixel(x, y))
    }))
}

fn unit(value: u8) -> f32 {
    value as f32 / 255.0
}

fn byte(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

fn over(base: Rgba<u8>, overlay: Rgba<u8>) -> Rgba<u8> {
    if overlay[3] == 0 {
        return base;
    }
    let (ab, ao) = (unit(base[3]), unit(overlay[3]));

    let alpha = ao + ab * (1.0 - ao);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let premultiplied = unit(overlay[c]) * ao + unit(base[c]) * ab * (1.0 - ao);
        out[c] = byte(premultiplied / alpha);
    }
    out[3] = byte(alpha);
    Rgba(out)
}

fn dest_in(base: Rgba<u8>, overlay: Rgba<u8>) -> Rgba<u8> {
    let alpha = unit(base[3]) * unit(overlay[3]);
    Rgba([base[0], base[1], base[2], byte(alpha)])
}

fn dest_out(base: Rgba<u8>, overlay: Rgba<u8>) -> Rgba<u8> {
    let alpha = unit(base[3]) * (1.0 - unit(overlay[3]));
    Rgba([base[0], base[1], base[2], byte(alpha)])
}
