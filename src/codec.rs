use std::io::{BufWriter, Write};
use std::path::Path;

use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma, RgbImage, RgbaImage};

use crate::error::{PipelineError, Result};

/// Read and decode an image file
pub fn decode(path: &Path) -> Result<DynamicImage> {
    let _span = tracing::debug_span!("decode").entered();

    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::io(format!("failed to read {}", path.display()), e))?;
    image::load_from_memory(&bytes).map_err(|source| PipelineError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// RGBA copy of the image; sources without alpha become fully opaque
pub fn ensure_alpha(image: &DynamicImage) -> RgbaImage {
    image.to_rgba8()
}

/// RGB copy of an RGBA buffer with the alpha channel dropped
pub fn remove_alpha(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        image::Rgb([p[0], p[1], p[2]])
    })
}

/// One channel of an RGBA buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Alpha => 3,
        }
    }
}

/// Single channel of an RGBA buffer as a grayscale image
pub fn extract_channel(image: &RgbaImage, channel: Channel) -> GrayImage {
    let n = channel.index();
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[n]])
    })
}

pub fn resize(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Lanczos3)
}

/// Stretch each colour channel linearly to the full 0..=255 range
///
/// Channels that hold a single value are left alone. Alpha is never touched.
pub fn normalize(image: &RgbaImage) -> RgbaImage {
    let _span = tracing::debug_span!("normalize").entered();

    let mut low = [u8::MAX; 3];
    let mut high = [u8::MIN; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            low[c] = low[c].min(pixel[c]);
            high[c] = high[c].max(pixel[c]);
        }
    }

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            if high[c] > low[c] {
                let span = (high[c] - low[c]) as f32;
                let scaled = (pixel[c] - low[c]) as f32 * 255.0 / span;
                pixel[c] = scaled.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Output format for a path, PNG when the extension is missing or unknown
pub fn output_format(path: &Path) -> ImageFormat {
    ImageFormat::from_path(path).unwrap_or(ImageFormat::Png)
}

/// Encode `image` and write it to `path`
///
/// The bytes go to a temporary file next to `path` that is renamed into
/// place only after encoding succeeds, so a failed write never leaves a
/// partial output behind. Returns the number of bytes written.
pub fn write_image(image: &RgbaImage, path: &Path) -> Result<u64> {
    let _span = tracing::debug_span!("encode").entered();

    let format = output_format(path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp = tempfile::Builder::new()
        .prefix(".partcut-")
        .tempfile_in(dir)
        .map_err(|e| PipelineError::io(format!("failed to create temp file in {}", dir.display()), e))?;

    let encode_error = |source| PipelineError::Encode {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::new(temp.as_file());
    let encoded = if format_has_alpha(format) {
        DynamicImage::ImageRgba8(image.clone())
    } else {
        DynamicImage::ImageRgb8(remove_alpha(image))
    };
    encoded.write_to(&mut writer, format).map_err(encode_error)?;
    writer
        .flush()
        .map_err(|e| PipelineError::io(format!("failed to flush {}", path.display()), e))?;
    drop(writer);

    let file = temp
        .persist(path)
        .map_err(|e| PipelineError::io(format!("failed to write {}", path.display()), e.error))?;
    let bytes = file
        .metadata()
        .map_err(|e| PipelineError::io(format!("failed to stat {}", path.display()), e))?
        .len();

    Ok(bytes)
}

fn format_has_alpha(format: ImageFormat) -> bool {
    !matches!(format, ImageFormat::Jpeg | ImageFormat::Pnm)
}
