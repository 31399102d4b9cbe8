use std::path::PathBuf;

use thiserror::Error;

/// Width and height of a buffer, as reported in error messages
pub type Dimensions = (u32, u32);

/// Errors surfaced by the cutout pipeline
///
/// Every variant is fatal for the invocation that raised it. Nothing is
/// retried and no output file is written once one of these is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode input image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no person or body part detected: {0}")]
    NoDetection(String),

    #[error(
        "{stage}: dimension mismatch, expected {}x{} but got {}x{}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    DimensionMismatch {
        stage: &'static str,
        expected: Dimensions,
        actual: Dimensions,
    },

    #[error("label {label} at pixel {index} has no entry in the {policy} policy")]
    UnmappedLabel {
        label: u32,
        index: usize,
        policy: &'static str,
    },

    #[error("failed to encode output image {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("segmentation model failed: {0:#}")]
    Model(anyhow::Error),
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check that two buffers agree on size before a stage combines them
    pub(crate) fn check_dimensions(
        stage: &'static str,
        expected: Dimensions,
        actual: Dimensions,
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                stage,
                expected,
                actual,
            })
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_names_stage_and_sizes() {
        let err = PipelineError::check_dimensions("composite", (4, 2), (2, 4))
            .expect_err("sizes differ");
        assert_eq!(
            err.to_string(),
            "composite: dimension mismatch, expected 4x2 but got 2x4"
        );
    }

    #[test]
    fn matching_dimensions_pass() {
        assert!(PipelineError::check_dimensions("reconcile", (3, 3), (3, 3)).is_ok());
    }
}
