use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;
use image::{Luma, Rgb, RgbImage};
use ndarray::Array4;
use tempfile::TempDir;

use camola::capture::CaptureSource;
use camola::composite::background::{self, BackgroundLayer, SolidColor};
use camola::composite::{LayerCompositor, TrailStage};
use camola::config::{
    BackgroundMode, ForegroundEffect, PipelineConfig, PixelateConfig, Resolution, TrailsConfig,
};
use camola::matte::{Matte, MatteEstimator};
use camola::output::OutputSink;
use camola::pipeline::{run, FramePipeline, PipelineState, StopReason};
use camola::segmentation::InferenceModel;

/// Model that reports the same probability everywhere
struct ConstantModel(f32);

impl InferenceModel for ConstantModel {
    fn infer(&mut self, _input: &Array4<f32>) -> Result<Matte> {
        Ok(Matte::from_pixel(40, 40, Luma([self.0])))
    }
}

/// Model whose output alternates between two values
struct FlickerModel {
    values: [f32; 2],
    calls: usize,
}

impl InferenceModel for FlickerModel {
    fn infer(&mut self, _input: &Array4<f32>) -> Result<Matte> {
        let value = self.values[self.calls % 2];
        self.calls += 1;
        Ok(Matte::from_pixel(40, 40, Luma([value])))
    }
}

struct FailingModel;

impl InferenceModel for FailingModel {
    fn infer(&mut self, _input: &Array4<f32>) -> Result<Matte> {
        anyhow::bail!("accelerator lost")
    }
}

/// Yields the queued frames, then fails like an unplugged camera
struct ScriptedCapture {
    frames: VecDeque<RgbImage>,
}

impl ScriptedCapture {
    fn new(count: usize, width: u32, height: u32) -> Self {
        Self {
            frames: (0..count)
                .map(|i| RgbImage::from_pixel(width, height, Rgb([i as u8 * 10, 80, 160])))
                .collect(),
        }
    }
}

impl CaptureSource for ScriptedCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        self.frames
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("device disconnected"))
    }

    fn resolution(&self) -> (u32, u32) {
        (64, 48)
    }
}

struct CollectingSink {
    frames: Vec<RgbImage>,
    size: (u32, u32),
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            size: (32, 24),
        }
    }
}

impl OutputSink for CollectingSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.size
    }
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        capture: Resolution::new(64, 48),
        output: Resolution::new(32, 24),
        ..PipelineConfig::default()
    }
}

fn pipeline_with(
    config: &PipelineConfig,
    model: Box<dyn InferenceModel>,
    background: Box<dyn BackgroundLayer>,
) -> FramePipeline {
    let compositor = LayerCompositor::from_config(config, background);
    FramePipeline::from_config(config, model, compositor)
}

fn camera_frame() -> RgbImage {
    RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]))
}

#[test]
fn background_only_when_matte_is_empty() {
    let config = PipelineConfig {
        background: BackgroundMode::Color(Rgb([0, 255, 0])),
        ..small_config()
    }
    .validate()
    .unwrap();
    let background = background::from_config(&config).unwrap();
    let mut pipeline = pipeline_with(&config, Box::new(ConstantModel(0.0)), background);
    let mut state = PipelineState::for_config(&config);

    let output = pipeline.process(&camera_frame(), &mut state).unwrap();

    assert_eq!(output.dimensions(), (32, 24));
    assert!(output.pixels().all(|p| p.0 == [0, 255, 0]));
    assert_eq!(state.frame_counter, 1);
}

#[test]
fn foreground_dominates_when_matte_is_full() {
    let config = PipelineConfig {
        capture: Resolution::new(32, 24),
        ..small_config()
    };
    let frame = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 7) as u8, (y * 9) as u8, 200]));
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(1.0)),
        Box::new(SolidColor::new(Rgb([255, 0, 255]))),
    );
    let mut state = PipelineState::for_config(&config);

    let output = pipeline.process(&frame, &mut state).unwrap();

    assert_eq!(output.dimensions(), frame.dimensions());
    for (out, input) in output.pixels().zip(frame.pixels()) {
        for c in 0..3 {
            assert!((out[c] as i16 - input[c] as i16).abs() <= 1);
        }
    }
}

#[test]
fn smoothing_state_tracks_previous_frames() {
    let config = PipelineConfig {
        smoothing: 0.5,
        ..small_config()
    };
    let model = FlickerModel {
        values: [1.0, 0.0],
        calls: 0,
    };
    let mut pipeline = pipeline_with(&config, Box::new(model), Box::new(SolidColor::new(Rgb([0, 0, 0]))));
    let mut state = PipelineState::for_config(&config);
    let frame = camera_frame();

    pipeline.process(&frame, &mut state).unwrap();
    let first = state.smoothing.previous().unwrap().get_pixel(10, 10)[0];
    pipeline.process(&frame, &mut state).unwrap();
    let second = state.smoothing.previous().unwrap().get_pixel(10, 10)[0];
    pipeline.process(&frame, &mut state).unwrap();
    let third = state.smoothing.previous().unwrap().get_pixel(10, 10)[0];

    assert!((first - 1.0).abs() < 1e-4);
    assert!((second - 0.5).abs() < 1e-4);
    assert!((third - 0.75).abs() < 1e-4);
}

#[test]
fn full_smoothing_weight_follows_the_model() {
    let config = PipelineConfig {
        smoothing: 1.0,
        ..small_config()
    };
    let model = FlickerModel {
        values: [1.0, 0.0],
        calls: 0,
    };
    let frame = camera_frame();
    let mut estimator = MatteEstimator::new(Box::new(model), config.smoothing);
    let mut state = PipelineState::for_config(&config);

    estimator.segment(&frame, &mut state.smoothing).unwrap();
    let matte = estimator.segment(&frame, &mut state.smoothing).unwrap();

    assert!(matte.pixels().all(|p| p[0] == 0.0));
}

#[test]
fn trails_buffer_is_bounded_and_sampled() {
    let config = PipelineConfig {
        trails: TrailsConfig {
            enabled: true,
            interval: 2,
            count: 3,
            ..TrailsConfig::default()
        },
        ..small_config()
    }
    .validate()
    .unwrap();
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(0.6)),
        Box::new(SolidColor::new(Rgb([0, 0, 0]))),
    );
    let mut state = PipelineState::for_config(&config);
    let frame = camera_frame();

    let mut lengths = Vec::new();
    for _ in 0..10 {
        pipeline.process(&frame, &mut state).unwrap();
        lengths.push(state.trails.len());
    }

    // snapshots on frames 0, 2, 4, ... capped at three
    assert_eq!(lengths, vec![1, 1, 2, 2, 3, 3, 3, 3, 3, 3]);
    assert_eq!(state.frame_counter, 10);
}

#[test]
fn disabled_trails_match_plain_blend() {
    let config = PipelineConfig {
        foreground_effect: ForegroundEffect::None,
        ..small_config()
    };
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(0.4)),
        Box::new(SolidColor::new(Rgb([30, 60, 90]))),
    );
    let mut compositor = LayerCompositor::new(
        config.output,
        ForegroundEffect::None,
        Box::new(SolidColor::new(Rgb([30, 60, 90]))),
        None,
    );
    let mut state = PipelineState::for_config(&config);
    let frame = camera_frame();

    let output = pipeline.process(&frame, &mut state).unwrap();
    let matte = state.smoothing.previous().unwrap().clone();
    let expected = compositor.composite(&frame, &matte, &mut state.trails, 0);

    assert_eq!(output, expected);
    assert!(state.trails.is_empty());
}

#[test]
fn single_trail_is_drawn_at_fade_start() {
    let trails = TrailsConfig {
        enabled: true,
        interval: 1,
        count: 4,
        fade_start: 0.5,
        fade_end: 1.0,
        ..TrailsConfig::default()
    };
    let mut compositor = LayerCompositor::new(
        Resolution::new(4, 4),
        ForegroundEffect::None,
        Box::new(SolidColor::new(Rgb([0, 0, 0]))),
        Some(TrailStage::new(trails, 2)),
    );
    let mut buffer = camola::composite::TrailBuffer::new(4);
    let white = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));

    compositor.composite(&white, &Matte::from_pixel(4, 4, Luma([1.0])), &mut buffer, 0);
    let out = compositor.composite(&white, &Matte::new(4, 4), &mut buffer, 1);

    // ghost at half opacity over black
    assert!(out.pixels().all(|p| p.0 == [100, 100, 100]));
}

#[test]
fn pixelated_background_is_blocky() {
    let config = PipelineConfig {
        pixelate: PixelateConfig {
            enabled: true,
            pixel_size: 8,
            invert: false,
        },
        ..small_config()
    }
    .validate()
    .unwrap();
    let background = background::from_config(&config).unwrap();
    let mut pipeline = pipeline_with(&config, Box::new(ConstantModel(0.0)), background);
    let mut state = PipelineState::for_config(&config);

    let output = pipeline.process(&camera_frame(), &mut state).unwrap();

    for (x, y, pixel) in output.enumerate_pixels() {
        assert_eq!(pixel, output.get_pixel(x / 8 * 8, y / 8 * 8));
    }
}

#[test]
fn still_image_background_is_resized_to_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("background.png");
    RgbImage::from_pixel(10, 10, Rgb([12, 34, 56])).save(&path).unwrap();

    let config = PipelineConfig {
        background: BackgroundMode::Image(path),
        ..small_config()
    }
    .validate()
    .unwrap();
    let background = background::from_config(&config).unwrap();
    let mut pipeline = pipeline_with(&config, Box::new(ConstantModel(0.0)), background);
    let mut state = PipelineState::for_config(&config);

    let output = pipeline.process(&camera_frame(), &mut state).unwrap();

    assert_eq!(output.dimensions(), (32, 24));
    assert!(output.pixels().all(|p| p.0 == [12, 34, 56]));
}

#[test]
fn show_matte_outputs_grayscale_silhouette() {
    let config = PipelineConfig {
        show_matte: true,
        ..small_config()
    };
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(1.0)),
        Box::new(SolidColor::new(Rgb([0, 255, 0]))),
    );
    let mut state = PipelineState::for_config(&config);

    let output = pipeline.process(&camera_frame(), &mut state).unwrap();

    assert_eq!(output.dimensions(), (32, 24));
    assert!(output.pixels().all(|p| p[0] >= 254 && p[0] == p[1] && p[1] == p[2]));
}

#[test]
fn run_stops_cleanly_when_capture_fails() {
    let config = small_config();
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(0.0)),
        Box::new(SolidColor::new(Rgb([1, 2, 3]))),
    );
    let mut state = PipelineState::for_config(&config);
    let mut capture = ScriptedCapture::new(4, 64, 48);
    let mut sink = CollectingSink::default();
    let running = AtomicBool::new(true);

    let summary = run(
        &mut capture,
        &mut sink,
        &mut pipeline,
        &mut state,
        Duration::ZERO,
        &running,
    )
    .unwrap();

    assert_eq!(summary.frames, 4);
    assert_eq!(summary.reason, StopReason::CaptureFailed);
    assert_eq!(sink.frames.len(), 4);
    assert!(sink.frames.iter().all(|f| f.dimensions() == (32, 24)));
    assert_eq!(state.frame_counter, 4);
}

#[test]
fn run_honours_stop_flag_between_frames() {
    let config = small_config();
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(0.0)),
        Box::new(SolidColor::new(Rgb([1, 2, 3]))),
    );
    let mut state = PipelineState::for_config(&config);
    let mut capture = ScriptedCapture::new(4, 64, 48);
    let mut sink = CollectingSink::default();
    let running = AtomicBool::new(false);

    let summary = run(
        &mut capture,
        &mut sink,
        &mut pipeline,
        &mut state,
        Duration::ZERO,
        &running,
    )
    .unwrap();

    assert_eq!(summary.reason, StopReason::Interrupted);
    assert_eq!(summary.frames, 0);
    assert!(sink.frames.is_empty());
}

#[test]
fn inference_failure_is_fatal() {
    let config = small_config();
    let mut pipeline = pipeline_with(
        &config,
        Box::new(FailingModel),
        Box::new(SolidColor::new(Rgb([1, 2, 3]))),
    );
    let mut state = PipelineState::for_config(&config);
    let mut capture = ScriptedCapture::new(2, 64, 48);
    let mut sink = CollectingSink::default();
    let running = AtomicBool::new(true);

    let result = run(
        &mut capture,
        &mut sink,
        &mut pipeline,
        &mut state,
        Duration::ZERO,
        &running,
    );

    assert!(result.is_err());
    assert!(sink.frames.is_empty());
    assert_eq!(state.frame_counter, 0);
}

#[test]
fn run_refuses_sink_with_other_resolution() {
    let config = small_config();
    let mut pipeline = pipeline_with(
        &config,
        Box::new(ConstantModel(0.0)),
        Box::new(SolidColor::new(Rgb([1, 2, 3]))),
    );
    let mut state = PipelineState::for_config(&config);
    let mut capture = ScriptedCapture::new(2, 64, 48);
    let mut sink = CollectingSink {
        frames: Vec::new(),
        size: (64, 48),
    };
    let running = AtomicBool::new(true);

    let result = run(
        &mut capture,
        &mut sink,
        &mut pipeline,
        &mut state,
        Duration::ZERO,
        &running,
    );

    assert!(result.is_err());
    assert!(sink.frames.is_empty());
    assert_eq!(state.frame_counter, 0);
}
