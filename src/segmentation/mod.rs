mod bodypix;
pub mod config;
mod preprocess;
pub mod types;

pub use bodypix::BodyPix;
pub use config::{Architecture, ConfigOverrides, SegmenterConfig};
pub use preprocess::Preprocessor;
pub use types::{LabelBuffer, LabelHistogram, SegmentError, Segmenter, BACKGROUND, HAIR};

use anyhow::Result;
use std::path::Path;

/// Create the default segmenter (BodyPix)
pub fn create_default_segmenter(
    model_path: &Path,
    config: SegmenterConfig,
) -> Result<Box<dyn Segmenter>> {
    let model = BodyPix::new(model_path, config)?;
    Ok(Box::new(model))
}
