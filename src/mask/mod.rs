mod policy;

pub use policy::{LabelPolicy, LabelTable, StandardPolicy, KEEP_ALL, OPAQUE_WHITE, TRANSPARENT};

use image::RgbaImage;

use crate::error::{PipelineError, Result};
use crate::segmentation::LabelBuffer;

/// Build an RGBA mask from per-pixel labels
///
/// Each output pixel depends only on its own label. There is no smoothing
/// across label boundaries. The buffer is allocated once at
/// `width * height * 4` bytes and written by index.
///
/// # Errors
///
/// * `PipelineError::UnmappedLabel` - the policy has no colour for a label
pub fn build_mask(labels: &LabelBuffer, policy: &dyn LabelPolicy) -> Result<RgbaImage> {
    let _span = tracing::debug_span!("build_mask", policy = policy.name()).entered();

    let (width, height) = labels.dimensions();
    let mut mask = RgbaImage::new(width, height);

    for (index, (pixel, &label)) in mask.pixels_mut().zip(labels.labels()).enumerate() {
        let color = policy
            .color(label)
            .ok_or_else(|| PipelineError::UnmappedLabel {
                label,
                index,
                policy: policy.name(),
            })?;
        *pixel = color;
    }

    let histogram = labels.histogram();
    tracing::debug!(
        "Mask labels: background={}, hair={}, body={}",
        histogram.background,
        histogram.hair,
        histogram.body
    );

    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::collections::BTreeMap;

    fn labels(values: Vec<u32>, width: u32, height: u32) -> LabelBuffer {
        LabelBuffer::new(values, width, height).expect("valid label buffer")
    }

    #[test]
    fn cutout_mask_for_background_and_body() {
        let mask = build_mask(&labels(vec![0, 2], 2, 1), &StandardPolicy::Cutout)
            .expect("cutout covers all labels");
        assert_eq!(mask.dimensions(), (2, 1));
        assert_eq!(*mask.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*mask.get_pixel(1, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn cutout_hides_hair_and_background_everywhere() {
        let values = vec![0, 1, 2, 3, 1, 0, 24, 5, 1];
        let mask = build_mask(&labels(values.clone(), 3, 3), &StandardPolicy::Cutout)
            .expect("cutout covers all labels");
        for (pixel, label) in mask.pixels().zip(values) {
            if label >= 2 {
                assert_eq!(*pixel, OPAQUE_WHITE);
            } else {
                assert_eq!(*pixel, TRANSPARENT);
            }
        }
    }

    #[test]
    fn overlay_mask_marks_body_with_keep_all() {
        let mask = build_mask(&labels(vec![1, 4], 1, 2), &StandardPolicy::Overlay)
            .expect("overlay covers all labels");
        assert_eq!(*mask.get_pixel(0, 0), TRANSPARENT);
        assert_eq!(*mask.get_pixel(0, 1), KEEP_ALL);
    }

    #[test]
    fn unmapped_label_fails_with_its_position() {
        let table = LabelTable {
            colors: BTreeMap::from([(0, [0, 0, 0, 0]), (1, [0, 0, 0, 0])]),
            ..Default::default()
        };
        let err = build_mask(&labels(vec![0, 1, 7, 0], 2, 2), &table)
            .expect_err("label 7 is not in the table");
        match err {
            PipelineError::UnmappedLabel { label, index, .. } => {
                assert_eq!(label, 7);
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_label_buffer_builds_empty_mask() {
        let mask = build_mask(&labels(Vec::new(), 0, 0), &StandardPolicy::Cutout)
            .expect("empty input");
        assert_eq!(mask.dimensions(), (0, 0));
    }
}
