//! Body-part cutouts for photographs of people.
//!
//! A segmenter labels every pixel as background, hair or another body part.
//! The labels become an RGBA mask under a [`mask::LabelPolicy`], which is
//! optionally intersected with the photo's own alpha and then composited
//! back onto the photo with a Porter-Duff operator.

pub mod codec;
pub mod compose;
pub mod error;
pub mod mask;
pub mod pipeline;
pub mod reconcile;
pub mod segmentation;

pub use compose::{composite, BlendOperator};
pub use error::PipelineError;
pub use mask::{build_mask, LabelPolicy, LabelTable, StandardPolicy};
pub use pipeline::{Mode, Pipeline, PipelineOptions, Processed, RunReport};
pub use reconcile::{extract_alpha, reconcile_alpha};
pub use segmentation::{LabelBuffer, SegmentError, Segmenter, SegmenterConfig};
