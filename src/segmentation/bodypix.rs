use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::config::SegmenterConfig;
use super::preprocess::Preprocessor;
use super::types::{LabelBuffer, SegmentError, Segmenter};

const SEGMENTS_OUTPUT: &str = "float_segments";
const PARTS_OUTPUT: &str = "float_part_heatmaps";

/// BodyPix part segmentation exported to ONNX
///
/// The model sees the image at a stride-aligned resolution and returns a
/// person logit map plus one heatmap per body part. Part channel 0 is hair.
pub struct BodyPix {
    session: Session,
    config: SegmenterConfig,
}

impl BodyPix {
    /// Load a BodyPix model
    ///
    /// `model_path` may be the `.onnx` file itself or a directory holding
    /// the file named by [`SegmenterConfig::model_file_name`].
    pub fn new<P: AsRef<Path>>(model_path: P, config: SegmenterConfig) -> Result<Self> {
        config.validate()?;
        let path = resolve_model_file(model_path.as_ref(), &config);

        tracing::info!("Loading BodyPix model from {}", path.display());
        tracing::debug!(
            "architecture={}, output_stride={}, multiplier={}, quant_bytes={}, score_threshold={}",
            config.architecture,
            config.output_stride,
            config.multiplier,
            config.quant_bytes,
            config.score_threshold
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("BodyPix model loaded successfully");

        Ok(Self { session, config })
    }

    fn infer(&mut self, frame: &RgbImage) -> Result<LabelBuffer, SegmentError> {
        let (frame_width, frame_height) = frame.dimensions();
        let input_width = self.config.valid_input_size(frame_width);
        let input_height = self.config.valid_input_size(frame_height);
        tracing::debug!(
            "Model input {}x{} for {}x{} frame",
            input_width,
            input_height,
            frame_width,
            frame_height
        );

        let preprocessor =
            Preprocessor::new(self.config.architecture, input_width, input_height);
        let input = Tensor::from_array(preprocessor.preprocess(frame))
            .context("Failed to build input tensor")?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("Failed to run inference")?;
        drop(_infer_span);

        let segments = outputs
            .get(SEGMENTS_OUTPUT)
            .ok_or_else(|| SegmentError::Malformed(format!("missing output {SEGMENTS_OUTPUT}")))?
            .try_extract_array::<f32>()
            .context("Failed to read segment logits")?;
        let parts = outputs
            .get(PARTS_OUTPUT)
            .ok_or_else(|| SegmentError::Malformed(format!("missing output {PARTS_OUTPUT}")))?
            .try_extract_array::<f32>()
            .context("Failed to read part heatmaps")?;

        let labels =
            Preprocessor::decode_labels(&segments, &parts, self.config.score_threshold)?;
        Preprocessor::postprocess_labels(&labels, frame_width, frame_height)
    }
}

impl Segmenter for BodyPix {
    fn segment(&mut self, image: &RgbImage) -> Result<LabelBuffer, SegmentError> {
        let _span = tracing::debug_span!("bodypix_segment").entered();

        let labels = self.infer(image)?;
        if labels.histogram().person() == 0 {
            return Err(SegmentError::NoPerson);
        }
        Ok(labels)
    }

    fn name(&self) -> &str {
        "bodypix"
    }
}

fn resolve_model_file(path: &Path, config: &SegmenterConfig) -> PathBuf {
    if path.is_dir() {
        path.join(config.model_file_name())
    } else {
        path.to_path_buf()
    }
}
