use std::collections::BTreeMap;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::segmentation::{BACKGROUND, HAIR};

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
pub const OPAQUE_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Every component at the largest byte value
///
/// Marks body pixels in the overlay mask so the reconciler only has to
/// narrow alpha. Written out explicitly instead of relying on an
/// out-of-range value being clamped.
pub const KEEP_ALL: Rgba<u8> = Rgba([u8::MAX; 4]);

/// Maps a pixel label to the mask colour for that pixel
pub trait LabelPolicy {
    /// `None` means the label is not covered by this policy
    fn color(&self, label: u32) -> Option<Rgba<u8>>;

    /// Policy name for error messages and logs
    fn name(&self) -> &'static str;
}

/// The two policies the pipeline modes use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardPolicy {
    /// Hair and background transparent, body opaque white
    Cutout,
    /// Hair and background transparent, body [`KEEP_ALL`]
    Overlay,
}

impl LabelPolicy for StandardPolicy {
    fn color(&self, label: u32) -> Option<Rgba<u8>> {
        let color = match (self, label) {
            (_, BACKGROUND) | (_, HAIR) => TRANSPARENT,
            (Self::Cutout, _) => OPAQUE_WHITE,
            (Self::Overlay, _) => KEEP_ALL,
        };
        Some(color)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Cutout => "cutout",
            Self::Overlay => "overlay",
        }
    }
}

/// A policy described as data
///
/// Labels listed in `colors` map to their entry. Labels at or above
/// `rest_from` (when set) map to `rest`. Anything else is unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelTable {
    pub colors: BTreeMap<u32, [u8; 4]>,
    #[serde(default)]
    pub rest_from: Option<u32>,
    #[serde(default)]
    pub rest: [u8; 4],
}

impl LabelPolicy for LabelTable {
    fn color(&self, label: u32) -> Option<Rgba<u8>> {
        if let Some(color) = self.colors.get(&label) {
            return Some(Rgba(*color));
        }
        match self.rest_from {
            Some(start) if label >= start => Some(Rgba(self.rest)),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "table"
    }
}
