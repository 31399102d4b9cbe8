use image::RgbImage;
use thiserror::Error;

/// Label for pixels outside any detected person
pub const BACKGROUND: u32 = 0;

/// Label for hair pixels
pub const HAIR: u32 = 1;

/// Per-pixel body-part labels, row-major, one entry per source pixel
///
/// `0` is background, `1` is hair and anything `>= 2` is another body part.
/// The length always equals `width * height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBuffer {
    labels: Vec<u32>,
    width: u32,
    height: u32,
}

impl LabelBuffer {
    pub fn new(labels: Vec<u32>, width: u32, height: u32) -> Result<Self, SegmentError> {
        let expected = width as usize * height as usize;
        if labels.len() != expected {
            return Err(SegmentError::Malformed(format!(
                "{} labels for a {}x{} mask (expected {})",
                labels.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self {
            labels,
            width,
            height,
        })
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn histogram(&self) -> LabelHistogram {
        let mut histogram = LabelHistogram::default();
        for &label in &self.labels {
            match label {
                BACKGROUND => histogram.background += 1,
                HAIR => histogram.hair += 1,
                _ => histogram.body += 1,
            }
        }
        histogram
    }
}

/// Pixel counts per label class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelHistogram {
    pub background: usize,
    pub hair: usize,
    pub body: usize,
}

impl LabelHistogram {
    /// Number of pixels assigned to a person
    pub fn person(&self) -> usize {
        self.hair + self.body
    }
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("no person found in the image")]
    NoPerson,

    #[error("malformed segmentation result: {0}")]
    Malformed(String),

    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

/// Trait for body-part segmentation backends
///
/// Implementations receive the prepared RGB image and must return labels at
/// the same dimensions as that image.
pub trait Segmenter {
    /// Label every pixel of `image`
    ///
    /// `Err(SegmentError::NoPerson)` is the explicit "nothing to segment"
    /// outcome. A returned buffer is never empty of people.
    fn segment(&mut self, image: &RgbImage) -> Result<LabelBuffer, SegmentError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}
