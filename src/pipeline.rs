use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{DynamicImage, RgbaImage};

use crate::codec;
use crate::compose::{composite, BlendOperator};
use crate::error::{PipelineError, Result};
use crate::mask::{build_mask, StandardPolicy};
use crate::reconcile::{extract_alpha, reconcile_alpha};
use crate::segmentation::{LabelBuffer, LabelHistogram, SegmentError, Segmenter};

/// Operating mode, fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Cutout mask erased from the opaque source with `dest-out`
    QuickCutout,
    /// Overlay mask intersected with source alpha, then drawn `over` the source
    Overlay,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuickCutout => f.write_str("quick-cutout"),
            Self::Overlay => f.write_str("overlay"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: Mode,
    /// Contrast-stretch the source before segmenting and compositing
    pub normalize: bool,
    /// Resize the source to this size before anything else
    pub working_size: Option<(u32, u32)>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mode: Mode::QuickCutout,
            normalize: true,
            working_size: None,
        }
    }
}

/// Outcome of one successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    pub width: u32,
    pub height: u32,
    pub labels: LabelHistogram,
    pub output: PathBuf,
    pub bytes: u64,
}

/// Final image plus the label statistics behind it
#[derive(Debug, Clone)]
pub struct Processed {
    pub image: RgbaImage,
    pub labels: LabelHistogram,
}

#[derive(Debug, Default)]
struct StageTimes {
    segment: Duration,
    mask: Duration,
    composite: Duration,
}

/// Drives one image at a time through segment, mask, reconcile and composite
pub struct Pipeline {
    segmenter: Box<dyn Segmenter>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(segmenter: Box<dyn Segmenter>, options: PipelineOptions) -> Self {
        Self { segmenter, options }
    }

    /// Decode `input`, process it and write the result to `output`
    ///
    /// Nothing is written unless every stage succeeds.
    pub fn run(&mut self, input: &Path, output: &Path) -> Result<RunReport> {
        tracing::info!("Processing {} in {} mode", input.display(), self.options.mode);

        let decode_start = Instant::now();
        let source = codec::decode(input)?;
        tracing::debug!(
            "decode={:.1}ms ({}x{})",
            decode_start.elapsed().as_secs_f64() * 1000.0,
            source.width(),
            source.height()
        );

        let processed = self.process(&source)?;

        let encode_start = Instant::now();
        let bytes = codec::write_image(&processed.image, output)?;
        tracing::debug!("encode={:.1}ms", encode_start.elapsed().as_secs_f64() * 1000.0);

        let (width, height) = processed.image.dimensions();
        tracing::info!(
            "Output file saved: {} ({}x{}, {:?}, {} bytes)",
            output.display(),
            width,
            height,
            codec::output_format(output),
            bytes
        );

        Ok(RunReport {
            mode: self.options.mode,
            width,
            height,
            labels: processed.labels,
            output: output.to_path_buf(),
            bytes,
        })
    }

    /// Run the in-memory stages on an already decoded image
    pub fn process(&mut self, source: &DynamicImage) -> Result<Processed> {
        let mut times = StageTimes::default();

        let processed = match self.options.mode {
            Mode::QuickCutout => {
                // The cutout works on the photo without its own transparency
                let opaque = DynamicImage::ImageRgb8(source.to_rgb8());
                let base = self.prepare(&opaque);
                let labels = self.segment(&base, &mut times)?;

                let start = Instant::now();
                let mask = build_mask(&labels, &StandardPolicy::Cutout)?;
                times.mask = start.elapsed();
                tracing::info!("Mask image created");

                let start = Instant::now();
                let image = composite(&base, &mask, BlendOperator::DestOut)?;
                times.composite = start.elapsed();

                Processed {
                    image,
                    labels: labels.histogram(),
                }
            }
            Mode::Overlay => {
                let base = self.prepare(source);
                let labels = self.segment(&base, &mut times)?;

                let start = Instant::now();
                let mask = build_mask(&labels, &StandardPolicy::Overlay)?;
                let reconciled = reconcile_alpha(&mask, &extract_alpha(&base))?;
                times.mask = start.elapsed();
                tracing::info!("Mask image created and reconciled with source alpha");

                let start = Instant::now();
                let image = composite(&base, &reconciled, BlendOperator::Over)?;
                times.composite = start.elapsed();

                Processed {
                    image,
                    labels: labels.histogram(),
                }
            }
        };

        tracing::debug!(
            "segment={:.1}ms, mask={:.1}ms, composite={:.1}ms",
            times.segment.as_secs_f64() * 1000.0,
            times.mask.as_secs_f64() * 1000.0,
            times.composite.as_secs_f64() * 1000.0
        );

        Ok(processed)
    }

    /// Force an alpha channel, then resize and normalize as configured
    fn prepare(&self, source: &DynamicImage) -> RgbaImage {
        let mut image = codec::ensure_alpha(source);
        if let Some((width, height)) = self.options.working_size {
            image = codec::resize(&image, width, height);
        }
        if self.options.normalize {
            image = codec::normalize(&image);
        }
        image
    }

    fn segment(&mut self, base: &RgbaImage, times: &mut StageTimes) -> Result<LabelBuffer> {
        let _span = tracing::debug_span!("segment", backend = self.segmenter.name()).entered();

        let start = Instant::now();
        let rgb = codec::remove_alpha(base);
        let labels = self.segmenter.segment(&rgb).map_err(|err| match err {
            SegmentError::NoPerson => PipelineError::NoDetection(format!(
                "{} found no person in the {}x{} image",
                self.segmenter.name(),
                rgb.width(),
                rgb.height()
            )),
            SegmentError::Malformed(detail) => PipelineError::NoDetection(detail),
            SegmentError::Model(source) => PipelineError::Model(source),
        })?;
        times.segment = start.elapsed();

        PipelineError::check_dimensions("segment", base.dimensions(), labels.dimensions())?;

        let histogram = labels.histogram();
        if histogram.person() == 0 {
            return Err(PipelineError::NoDetection(format!(
                "{} labelled every pixel of the {}x{} image as background",
                self.segmenter.name(),
                rgb.width(),
                rgb.height()
            )));
        }
        tracing::info!(
            "Segmentation completed: {} person pixels ({} hair, {} body)",
            histogram.person(),
            histogram.hair,
            histogram.body
        );

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    /// Returns a fixed label buffer regardless of the image
    struct FixedSegmenter(LabelBuffer);

    impl Segmenter for FixedSegmenter {
        fn segment(&mut self, _image: &RgbImage) -> Result<LabelBuffer, SegmentError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct EmptySegmenter;

    impl Segmenter for EmptySegmenter {
        fn segment(&mut self, _image: &RgbImage) -> Result<LabelBuffer, SegmentError> {
            Err(SegmentError::NoPerson)
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    fn pipeline(labels: Vec<u32>, width: u32, height: u32, mode: Mode) -> Pipeline {
        let labels = LabelBuffer::new(labels, width, height).expect("valid labels");
        Pipeline::new(
            Box::new(FixedSegmenter(labels)),
            PipelineOptions {
                mode,
                normalize: false,
                working_size: None,
            },
        )
    }

    fn red(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 0, 0])))
    }

    #[test]
    fn quick_cutout_erases_body_pixels() {
        let mut pipeline = pipeline(vec![0, 1, 2, 3], 4, 1, Mode::QuickCutout);
        let processed = pipeline.process(&red(4, 1)).expect("pipeline succeeds");

        let alphas: Vec<u8> = processed.image.pixels().map(|p| p[3]).collect();
        assert_eq!(alphas, vec![255, 255, 0, 0]);
        assert!(processed.image.pixels().all(|p| p.0[..3] == [255, 0, 0]));
        assert_eq!(processed.labels.body, 2);
    }

    #[test]
    fn quick_cutout_ignores_source_transparency() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 1, Rgba([0, 0, 255, 0])));
        let mut pipeline = pipeline(vec![0, 2], 2, 1, Mode::QuickCutout);
        let processed = pipeline.process(&source).expect("pipeline succeeds");
        assert_eq!(*processed.image.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(processed.image.get_pixel(1, 0)[3], 0);
    }

    #[test]
    fn overlay_paints_body_white_where_source_is_visible() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_fn(3, 1, |x, _| {
            Rgba([255, 0, 0, if x == 2 { 0 } else { 255 }])
        }));
        let mut pipeline = pipeline(vec![1, 2, 2], 3, 1, Mode::Overlay);
        let processed = pipeline.process(&source).expect("pipeline succeeds");

        // hair keeps the source
        assert_eq!(*processed.image.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        // body over visible source becomes white
        assert_eq!(*processed.image.get_pixel(1, 0), Rgba([255, 255, 255, 255]));
        // body over transparent source stays transparent
        assert_eq!(processed.image.get_pixel(2, 0)[3], 0);
    }

    #[test]
    fn no_person_is_reported_as_no_detection() {
        let mut pipeline = Pipeline::new(Box::new(EmptySegmenter), PipelineOptions::default());
        let err = pipeline.process(&red(2, 2)).expect_err("nothing detected");
        assert!(matches!(err, PipelineError::NoDetection(_)));
    }

    #[test]
    fn all_background_labels_are_no_detection() {
        for mode in [Mode::QuickCutout, Mode::Overlay] {
            let mut pipeline = pipeline(vec![0; 4], 2, 2, mode);
            let err = pipeline.process(&red(2, 2)).expect_err("no person pixels");
            assert!(matches!(err, PipelineError::NoDetection(_)));
        }
    }

    #[test]
    fn empty_label_buffer_is_no_detection() {
        let mut pipeline = pipeline(Vec::new(), 0, 0, Mode::QuickCutout);
        let err = pipeline.process(&red(0, 0)).expect_err("zero pixels");
        assert!(matches!(err, PipelineError::NoDetection(_)));
    }

    #[test]
    fn label_size_must_match_working_image() {
        let mut pipeline = pipeline(vec![0, 2], 2, 1, Mode::QuickCutout);
        let err = pipeline.process(&red(3, 1)).expect_err("labels are 2x1");
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch { stage: "segment", .. }
        ));
    }

    #[test]
    fn working_size_resizes_before_segmenting() {
        let labels = LabelBuffer::new(vec![2; 4], 2, 2).expect("valid labels");
        let mut pipeline = Pipeline::new(
            Box::new(FixedSegmenter(labels)),
            PipelineOptions {
                mode: Mode::Overlay,
                normalize: false,
                working_size: Some((2, 2)),
            },
        );
        let processed = pipeline.process(&red(8, 6)).expect("pipeline succeeds");
        assert_eq!(processed.image.dimensions(), (2, 2));
    }
}
