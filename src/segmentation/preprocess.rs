use image::{imageops, GrayImage, Luma, RgbImage};
use ndarray::{Array4, ArrayViewD};

use super::config::Architecture;
use super::types::{LabelBuffer, SegmentError, BACKGROUND};

const RESNET_MEAN: [f32; 3] = [123.15, 115.90, 103.06];

/// Preprocessor for converting RGB images to BodyPix input tensors
pub struct Preprocessor {
    architecture: Architecture,
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(architecture: Architecture, target_width: u32, target_height: u32) -> Self {
        Self {
            architecture,
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into an NHWC tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Normalize per architecture (MobileNet to [-1, 1], ResNet mean-subtracted)
    ///
    /// Returns: Array4<f32> with shape [1, height, width, 3]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32;
                tensor[[0, y as usize, x as usize, c]] = match self.architecture {
                    Architecture::MobileNetV1 => value / 127.5 - 1.0,
                    Architecture::ResNet50 => value - RESNET_MEAN[c],
                };
            }
        }

        tensor
    }

    /// Turn raw model outputs into a label map at model resolution
    ///
    /// * `segments` - person logits, shape [1, h, w, 1]
    /// * `parts` - part heatmaps, shape [1, h, w, P]
    ///
    /// Non-person pixels get label 0, person pixels get `argmax(parts) + 1`.
    pub fn decode_labels(
        segments: &ArrayViewD<f32>,
        parts: &ArrayViewD<f32>,
        score_threshold: f32,
    ) -> Result<GrayImage, SegmentError> {
        let _span = tracing::debug_span!("decode_labels").entered();

        let (seg_shape, part_shape) = (segments.shape(), parts.shape());
        if seg_shape.len() != 4 || part_shape.len() != 4 {
            return Err(SegmentError::Malformed(format!(
                "expected rank-4 outputs, got segments {:?} and parts {:?}",
                seg_shape, part_shape
            )));
        }
        if seg_shape[0] != 1 || part_shape[0] != 1 {
            return Err(SegmentError::Malformed(format!(
                "expected a batch of one, got segments {:?} and parts {:?}",
                seg_shape, part_shape
            )));
        }
        let (height, width, part_count) = (part_shape[1], part_shape[2], part_shape[3]);
        if seg_shape[1] != height || seg_shape[2] != width || seg_shape[3] != 1 {
            return Err(SegmentError::Malformed(format!(
                "segments {:?} do not line up with parts {:?}",
                seg_shape, part_shape
            )));
        }
        if part_count == 0 || part_count >= u8::MAX as usize {
            return Err(SegmentError::Malformed(format!(
                "unsupported part channel count {}",
                part_count
            )));
        }

        // sigmoid(logit) > t  <=>  logit > ln(t / (1 - t))
        let threshold = score_threshold.clamp(1e-6, 1.0 - 1e-6);
        let logit_threshold = (threshold / (1.0 - threshold)).ln();

        let labels = GrayImage::from_fn(width as u32, height as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            if segments[[0, y, x, 0]] <= logit_threshold {
                return Luma([BACKGROUND as u8]);
            }
            let mut best = 0;
            for part in 1..part_count {
                if parts[[0, y, x, part]] > parts[[0, y, x, best]] {
                    best = part;
                }
            }
            Luma([best as u8 + 1])
        });

        Ok(labels)
    }

    /// Scale a model-resolution label map back to the frame dimensions
    ///
    /// Uses nearest-neighbour sampling so every output label is one the
    /// model actually produced.
    pub fn postprocess_labels(
        labels: &GrayImage,
        target_width: u32,
        target_height: u32,
    ) -> Result<LabelBuffer, SegmentError> {
        let _span = tracing::debug_span!("postprocess").entered();

        let resized = if labels.dimensions() == (target_width, target_height) {
            labels.clone()
        } else {
            imageops::resize(
                labels,
                target_width,
                target_height,
                imageops::FilterType::Nearest,
            )
        };

        let flat = resized.pixels().map(|p| p[0] as u32).collect();
        LabelBuffer::new(flat, target_width, target_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, IxDyn};

    #[test]
    fn mobilenet_input_is_scaled_to_unit_range() {
        let image = RgbImage::from_pixel(3, 3, image::Rgb([0, 255, 127]));
        let tensor = Preprocessor::new(Architecture::MobileNetV1, 3, 3).preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 3, 3]);
        assert_eq!(tensor[[0, 1, 1, 0]], -1.0);
        assert_eq!(tensor[[0, 1, 1, 1]], 1.0);
    }

    #[test]
    fn resnet_input_is_mean_subtracted() {
        let image = RgbImage::from_pixel(1, 1, image::Rgb([200, 200, 200]));
        let tensor = Preprocessor::new(Architecture::ResNet50, 1, 1).preprocess(&image);
        assert!((tensor[[0, 0, 0, 0]] - (200.0 - 123.15)).abs() < 1e-4);
    }

    #[test]
    fn decode_labels_thresholds_and_takes_argmax() {
        // 1x2 map: left pixel below threshold, right pixel person with part 2 hottest
        let mut segments = Array4::<f32>::zeros((1, 1, 2, 1));
        segments[[0, 0, 0, 0]] = -5.0;
        segments[[0, 0, 1, 0]] = 5.0;
        let mut parts = Array4::<f32>::zeros((1, 1, 2, 4));
        parts[[0, 0, 1, 2]] = 3.0;

        let segments = segments.into_dyn();
        let parts = parts.into_dyn();
        let labels = Preprocessor::decode_labels(&segments.view(), &parts.view(), 0.3)
            .expect("well-formed outputs");

        assert_eq!(labels.get_pixel(0, 0)[0], 0);
        assert_eq!(labels.get_pixel(1, 0)[0], 3);
    }

    #[test]
    fn decode_labels_rejects_mismatched_outputs() {
        let segments = ndarray::ArrayD::<f32>::zeros(IxDyn(&[1, 2, 2, 1]));
        let parts = ndarray::ArrayD::<f32>::zeros(IxDyn(&[1, 3, 2, 24]));
        let err = Preprocessor::decode_labels(&segments.view(), &parts.view(), 0.3)
            .expect_err("heights differ");
        assert!(matches!(err, SegmentError::Malformed(_)));

        let segments = ndarray::ArrayD::<f32>::zeros(IxDyn(&[0, 1, 1, 1]));
        let parts = ndarray::ArrayD::<f32>::zeros(IxDyn(&[0, 1, 1, 2]));
        let err = Preprocessor::decode_labels(&segments.view(), &parts.view(), 0.3)
            .expect_err("empty batch");
        assert!(matches!(err, SegmentError::Malformed(_)));

        let segments = ndarray::ArrayD::<f32>::zeros(IxDyn(&[1, 1, 1, 1]));
        let parts = ndarray::ArrayD::<f32>::zeros(IxDyn(&[2, 1, 1, 2]));
        let err = Preprocessor::decode_labels(&segments.view(), &parts.view(), 0.3)
            .expect_err("batch sizes differ");
        assert!(matches!(err, SegmentError::Malformed(_)));
    }

    #[test]
    fn postprocess_never_invents_labels() {
        let labels = GrayImage::from_fn(2, 2, |x, _| Luma([if x == 0 { 0 } else { 5 }]));
        let buffer = Preprocessor::postprocess_labels(&labels, 7, 5).expect("upscaled");
        assert_eq!(buffer.dimensions(), (7, 5));
        assert!(buffer.labels().iter().all(|&l| l == 0 || l == 5));
    }
}
