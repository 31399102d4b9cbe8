use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use partcut::pipeline::{Mode, Pipeline, PipelineOptions};
use partcut::segmentation::{self, Architecture, ConfigOverrides, SegmenterConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input image path
    input: PathBuf,

    /// Output image path (format taken from the extension, PNG by default)
    output: PathBuf,

    /// Pipeline mode
    #[arg(long, value_enum, default_value_t = Mode::QuickCutout)]
    mode: Mode,

    /// Path to the segmentation model (ONNX file, or a directory of models)
    #[arg(long)]
    model: PathBuf,

    /// Segmenter config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model architecture
    #[arg(long, value_enum)]
    architecture: Option<Architecture>,

    /// Output stride of the model
    #[arg(long)]
    output_stride: Option<u32>,

    /// Depth multiplier (MobileNetV1 only)
    #[arg(long)]
    multiplier: Option<f32>,

    /// Bytes per quantized weight
    #[arg(long)]
    quant_bytes: Option<u32>,

    /// Minimum person score for a pixel to count as part of a person
    #[arg(long)]
    score_threshold: Option<f32>,

    /// Fraction of the image resolution fed to the model
    #[arg(long)]
    internal_resolution: Option<f32>,

    /// Resize the input to WIDTHxHEIGHT before processing
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Skip contrast normalization of the input
    #[arg(long)]
    no_normalize: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width: u32 = width.trim().parse().context("invalid width")?;
    let height: u32 = height.trim().parse().context("invalid height")?;
    if width == 0 || height == 0 {
        bail!("size must be non-zero, got {width}x{height}");
    }
    Ok((width, height))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("partcut starting");

    let base_config = match &args.config {
        Some(path) => SegmenterConfig::from_file(path)?,
        None => SegmenterConfig::default(),
    };
    let config = base_config
        .with_overrides(ConfigOverrides {
            architecture: args.architecture,
            output_stride: args.output_stride,
            multiplier: args.multiplier,
            quant_bytes: args.quant_bytes,
            score_threshold: args.score_threshold,
            internal_resolution: args.internal_resolution,
        })
        .context("Invalid segmenter configuration")?;

    let segmenter = segmentation::create_default_segmenter(&args.model, config)
        .context("Failed to load segmentation model")?;

    let mut pipeline = Pipeline::new(
        segmenter,
        PipelineOptions {
            mode: args.mode,
            normalize: !args.no_normalize,
            working_size: args.resize,
        },
    );

    let report = pipeline
        .run(&args.input, &args.output)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    tracing::info!(
        "Done: {}x{}, {} hair / {} body pixels",
        report.width,
        report.height,
        report.labels.hair,
        report.labels.body
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("128x128").expect("valid size"), (128, 128));
        assert_eq!(parse_size("640X480").expect("valid size"), (640, 480));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("128").is_err());
    }

    #[test]
    fn cli_accepts_positional_paths_and_mode() {
        let args = Args::try_parse_from([
            "partcut", "in.png", "out.png", "--model", "model.onnx", "--mode", "overlay",
            "--resize", "128x128",
        ])
        .expect("valid args");
        assert_eq!(args.mode, Mode::Overlay);
        assert_eq!(args.resize, Some((128, 128)));
        assert_eq!(args.input, PathBuf::from("in.png"));
    }
}
