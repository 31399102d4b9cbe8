use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Architecture {
    #[serde(rename = "MobileNetV1")]
    #[value(name = "mobilenet-v1")]
    MobileNetV1,
    #[serde(rename = "ResNet50")]
    #[value(name = "resnet50")]
    ResNet50,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MobileNetV1 => f.write_str("MobileNetV1"),
            Self::ResNet50 => f.write_str("ResNet50"),
        }
    }
}

/// Immutable segmenter settings
///
/// These trade accuracy for speed inside the segmenter only. Nothing
/// downstream of the label buffer reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmenterConfig {
    pub architecture: Architecture,
    pub output_stride: u32,
    pub multiplier: f32,
    pub quant_bytes: u32,
    pub score_threshold: f32,
    /// Fraction of the source resolution fed to the model
    pub internal_resolution: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::MobileNetV1,
            output_stride: 16,
            multiplier: 0.75,
            quant_bytes: 2,
            score_threshold: 0.3,
            internal_resolution: 0.5,
        }
    }
}

/// Optional per-field replacements, typically from command-line flags
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub architecture: Option<Architecture>,
    pub output_stride: Option<u32>,
    pub multiplier: Option<f32>,
    pub quant_bytes: Option<u32>,
    pub score_threshold: Option<f32>,
    pub internal_resolution: Option<f32>,
}

impl SegmenterConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read segmenter config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse segmenter config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides on top of `self`, then validate the result once
    pub fn with_overrides(self, overrides: ConfigOverrides) -> Result<Self> {
        let config = Self {
            architecture: overrides.architecture.unwrap_or(self.architecture),
            output_stride: overrides.output_stride.unwrap_or(self.output_stride),
            multiplier: overrides.multiplier.unwrap_or(self.multiplier),
            quant_bytes: overrides.quant_bytes.unwrap_or(self.quant_bytes),
            score_threshold: overrides.score_threshold.unwrap_or(self.score_threshold),
            internal_resolution: overrides
                .internal_resolution
                .unwrap_or(self.internal_resolution),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.architecture {
            Architecture::MobileNetV1 => {
                if !matches!(self.output_stride, 8 | 16) {
                    bail!(
                        "MobileNetV1 supports output stride 8 or 16, got {}",
                        self.output_stride
                    );
                }
                if ![0.5, 0.75, 1.0].contains(&self.multiplier) {
                    bail!(
                        "MobileNetV1 supports multiplier 0.5, 0.75 or 1.0, got {}",
                        self.multiplier
                    );
                }
            }
            Architecture::ResNet50 => {
                if !matches!(self.output_stride, 16 | 32) {
                    bail!(
                        "ResNet50 supports output stride 16 or 32, got {}",
                        self.output_stride
                    );
                }
                if self.multiplier != 1.0 {
                    bail!("ResNet50 supports multiplier 1.0 only, got {}", self.multiplier);
                }
            }
        }

        if !matches!(self.quant_bytes, 1 | 2 | 4) {
            bail!("quant bytes must be 1, 2 or 4, got {}", self.quant_bytes);
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            bail!(
                "score threshold must be within [0, 1], got {}",
                self.score_threshold
            );
        }
        if !(self.internal_resolution > 0.0 && self.internal_resolution <= 1.0) {
            bail!(
                "internal resolution must be within (0, 1], got {}",
                self.internal_resolution
            );
        }

        Ok(())
    }

    /// File name of the exported model matching this config
    pub fn model_file_name(&self) -> String {
        let arch = match self.architecture {
            Architecture::MobileNetV1 => "mobilenet",
            Architecture::ResNet50 => "resnet50",
        };
        format!(
            "bodypix-{}-{}-stride{}-q{}.onnx",
            arch,
            (self.multiplier * 100.0).round() as u32,
            self.output_stride,
            self.quant_bytes
        )
    }

    /// Model input size for a source dimension
    ///
    /// Valid sizes satisfy `(size - 1) % stride == 0`.
    pub fn valid_input_size(&self, source: u32) -> u32 {
        let scaled = (source as f32 * self.internal_resolution).round().max(1.0) as u32;
        if (scaled - 1) % self.output_stride == 0 {
            scaled
        } else {
            (scaled / self.output_stride) * self.output_stride + 1
        }
    }
}
