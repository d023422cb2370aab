use anyhow::{Context, Result};
use camola::capture::{CaptureSource, WebcamCapture};
use camola::composite::{background, LayerCompositor};
use camola::config::{
    BackgroundMode, ForegroundEffect, PipelineConfig, PixelateConfig, Resolution, TrailsConfig,
    DEFAULT_SMOOTHING,
};
use camola::output::V4L2Output;
use camola::{segmentation, FramePipeline, PipelineState};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Webcam background replacement", long_about = None)]
struct Args {
    /// Path to segmentation model (ONNX file)
    #[arg(long)]
    model: PathBuf,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: PathBuf,

    /// Capture resolution width
    #[arg(long, default_value_t = 1920)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 1080)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Solid color background in hex (e.g. 00FF00)
    #[arg(long, conflicts_with_all = ["background_image", "background_video"])]
    background_color: Option<String>,

    /// Background image file path
    #[arg(long, conflicts_with = "background_video")]
    background_image: Option<PathBuf>,

    /// Background video file path (loops automatically)
    #[arg(long)]
    background_video: Option<PathBuf>,

    /// Pixelate the camera's own background instead of replacing it
    #[arg(long)]
    pixelate_background: bool,

    /// Pixel block size for pixelation effects
    #[arg(long, default_value_t = 16)]
    pixel_size: u32,

    /// Invert colors in the pixelated background
    #[arg(long)]
    invert_background: bool,

    /// Artistic effect applied to the foreground (you)
    #[arg(long, value_enum)]
    foreground_effect: Option<EffectArg>,

    /// Leave fading ghost trails behind moving subjects
    #[arg(long)]
    trails: bool,

    /// Capture a trail snapshot every N frames
    #[arg(long, default_value_t = 3)]
    trail_interval: u32,

    /// Number of trail snapshots kept
    #[arg(long, default_value_t = 8)]
    trail_count: usize,

    /// Opacity of the oldest trail
    #[arg(long, default_value_t = 0.1)]
    trail_fade_start: f32,

    /// Opacity of the newest trail
    #[arg(long, default_value_t = 0.6)]
    trail_fade_end: f32,

    /// Pixelate trail snapshots using --pixel-size
    #[arg(long)]
    trail_pixelate: bool,

    /// Hue rotation in degrees applied per trail
    #[arg(long, default_value_t = 0.0)]
    trail_hue_shift: f32,

    /// Weight of the current frame's matte in temporal smoothing, in (0, 1]
    #[arg(long, default_value_t = DEFAULT_SMOOTHING)]
    temporal_smoothing: f32,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectArg {
    #[value(alias = "cartoon")]
    Stylize,
    Sketch,
    #[value(alias = "sketch_bw")]
    SketchMono,
}

impl From<EffectArg> for ForegroundEffect {
    fn from(effect: EffectArg) -> Self {
        match effect {
            EffectArg::Stylize => ForegroundEffect::Stylize,
            EffectArg::Sketch => ForegroundEffect::Sketch,
            EffectArg::SketchMono => ForegroundEffect::SketchMono,
        }
    }
}

impl Args {
    fn to_config(&self) -> Result<PipelineConfig> {
        let background = BackgroundMode::from_flags(
            self.background_color.as_deref(),
            self.background_image.clone(),
            self.background_video.clone(),
        )?;

        let config = PipelineConfig {
            capture: Resolution::new(self.capture_width, self.capture_height),
            output: Resolution::new(self.output_width, self.output_height),
            fps: self.fps,
            background,
            pixelate: PixelateConfig {
                enabled: self.pixelate_background,
                pixel_size: self.pixel_size,
                invert: self.invert_background,
            },
            foreground_effect: self.foreground_effect.map(Into::into).unwrap_or_default(),
            trails: TrailsConfig {
                enabled: self.trails,
                interval: self.trail_interval,
                count: self.trail_count,
                fade_start: self.trail_fade_start,
                fade_end: self.trail_fade_end,
                pixelate: self.trail_pixelate,
                hue_shift: self.trail_hue_shift,
            },
            smoothing: self.temporal_smoothing,
            show_matte: self.show_matte,
        };

        Ok(config.validate()?)
    }
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

    let config = args.to_config().context("Invalid configuration")?;

    tracing::info!("Camola starting");
    tracing::info!("Capture: {}", config.capture);
    tracing::info!("Output: {}", config.output);
    tracing::info!("Target FPS: {}", config.fps);
    tracing::info!("Foreground effect: {:?}", config.foreground_effect);
    if config.trails.enabled {
        tracing::info!(
            "Trails: every {} frames, {} kept, opacity {:.2}-{:.2}, hue shift {}",
            config.trails.interval,
            config.trails.count,
            config.trails.fade_start,
            config.trails.fade_end,
            config.trails.hue_shift
        );
    }

    // Initialize capture
    let mut capture = WebcamCapture::new(args.input_device, config.capture, config.fps)
        .context("Failed to initialize webcam capture")?;
    let (capture_width, capture_height) = capture.resolution();
    if (capture_width, capture_height) != (config.capture.width, config.capture.height) {
        tracing::warn!(
            "Webcam delivers {}x{} instead of requested {}",
            capture_width,
            capture_height,
            config.capture
        );
    }

    // Initialize output
    let mut output = V4L2Output::new(&args.output_device, config.output)
        .context("Failed to initialize v4l2loopback output")?;

    let model = segmentation::create_default_model(&args.model)
        .context("Failed to load segmentation model")?;

    let background = background::from_config(&config).context("Failed to prepare background")?;
    let compositor = LayerCompositor::from_config(&config, background);
    let mut pipeline = FramePipeline::from_config(&config, model, compositor);
    let mut state = PipelineState::for_config(&config);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Stopping...");
        flag.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let summary = camola::pipeline::run(
        &mut capture,
        &mut output,
        &mut pipeline,
        &mut state,
        config.frame_duration(),
        &running,
    )?;

    // Release devices before reporting
    drop(pipeline);
    drop(output);
    drop(capture);

    tracing::info!("Camola stopped after {} frames", summary.frames);

    Ok(())
}
