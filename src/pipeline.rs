use crate::capture::CaptureSource;
use crate::composite::{LayerCompositor, TrailBuffer};
use crate::config::{PipelineConfig, Resolution};
use crate::matte::{MatteEstimator, SmoothingState};
use crate::output::OutputSink;
use crate::segmentation::{InferenceModel, Preprocessor};
use anyhow::{ensure, Context, Result};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Everything carried from one frame to the next
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub smoothing: SmoothingState,
    pub trails: TrailBuffer,
    /// Number of frames processed so far; the index of the next frame
    pub frame_counter: u64,
}

impl PipelineState {
    pub fn new(trail_capacity: usize) -> Self {
        Self {
            smoothing: SmoothingState::new(),
            trails: TrailBuffer::new(trail_capacity),
            frame_counter: 0,
        }
    }

    pub fn for_config(config: &PipelineConfig) -> Self {
        let capacity = if config.trails.enabled {
            config.trails.count
        } else {
            0
        };
        Self::new(capacity)
    }
}

/// Per-stage processing time of one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTimings {
    pub segment: Duration,
    pub composite: Duration,
}

/// Matte estimation followed by compositing, once per frame
pub struct FramePipeline {
    estimator: MatteEstimator,
    compositor: LayerCompositor,
    show_matte: bool,
}

impl FramePipeline {
    pub fn new(estimator: MatteEstimator, compositor: LayerCompositor, show_matte: bool) -> Self {
        Self {
            estimator,
            compositor,
            show_matte,
        }
    }

    pub fn output_size(&self) -> Resolution {
        self.compositor.output_size()
    }

    pub fn from_config(
        config: &PipelineConfig,
        model: Box<dyn InferenceModel>,
        compositor: LayerCompositor,
    ) -> Self {
        Self::new(
            MatteEstimator::new(model, config.smoothing),
            compositor,
            config.show_matte,
        )
    }

    /// Turn one input frame into one output frame, advancing `state`
    pub fn process(&mut self, frame: &RgbImage, state: &mut PipelineState) -> Result<RgbImage> {
        self.process_timed(frame, state).map(|(output, _)| output)
    }

    pub fn process_timed(
        &mut self,
        frame: &RgbImage,
        state: &mut PipelineState,
    ) -> Result<(RgbImage, FrameTimings)> {
        let frame_index = state.frame_counter;

        let segment_start = Instant::now();
        let matte = self
            .estimator
            .segment(frame, &mut state.smoothing)
            .context("Failed to segment frame")?;
        let segment = segment_start.elapsed();

        let composite_start = Instant::now();
        let output = if self.show_matte {
            let size = self.compositor.output_size();
            let matte = Preprocessor::resize_matte(&matte, size.width, size.height);
            Preprocessor::matte_to_rgb(&matte)
        } else {
            self.compositor
                .composite(frame, &matte, &mut state.trails, frame_index)
        };
        let composite = composite_start.elapsed();

        state.frame_counter += 1;

        Ok((output, FrameTimings { segment, composite }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The stop flag was cleared (Ctrl+C)
    Interrupted,
    /// The capture source stopped delivering frames
    CaptureFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub reason: StopReason,
}

/// Running averages logged every [`STATS_INTERVAL`] frames
#[derive(Default)]
struct Stats {
    capture: Duration,
    segment: Duration,
    composite: Duration,
    output: Duration,
}

const STATS_INTERVAL: u64 = 30;

impl Stats {
    fn log(&self, frames: u64) {
        let avg_ms = |total: Duration| total.as_secs_f64() * 1000.0 / frames as f64;
        let capture_ms = avg_ms(self.capture);
        let segment_ms = avg_ms(self.segment);
        let composite_ms = avg_ms(self.composite);
        let output_ms = avg_ms(self.output);
        let total_ms = capture_ms + segment_ms + composite_ms + output_ms;
        let actual_fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
            frames,
            capture_ms,
            segment_ms,
            composite_ms,
            output_ms,
            total_ms,
            actual_fps
        );
    }
}

/// Capture → process → output until capture fails or `running` is cleared.
///
/// The stop flag is only checked between frames, so a frame that has been
/// captured is always written. Frames are never dropped to catch up; when a
/// frame finishes early the loop sleeps out the rest of `frame_duration`.
pub fn run<C, O>(
    capture: &mut C,
    output: &mut O,
    pipeline: &mut FramePipeline,
    state: &mut PipelineState,
    frame_duration: Duration,
    running: &AtomicBool,
) -> Result<RunSummary>
where
    C: CaptureSource + ?Sized,
    O: OutputSink + ?Sized,
{
    let size = pipeline.output_size();
    let (sink_width, sink_height) = output.resolution();
    ensure!(
        (sink_width, sink_height) == (size.width, size.height),
        "Output sink expects {}x{} but the pipeline produces {}",
        sink_width,
        sink_height,
        size
    );

    let mut stats = Stats::default();
    let mut frames = 0u64;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    let reason = loop {
        if !running.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }

        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = match capture.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to capture frame: {:#}", e);
                break StopReason::CaptureFailed;
            }
        };
        stats.capture += capture_start.elapsed();

        let (output_frame, timings) = pipeline.process_timed(&frame, state)?;
        stats.segment += timings.segment;
        stats.composite += timings.composite;

        let output_start = Instant::now();
        output
            .write_frame(&output_frame)
            .context("Failed to write frame")?;
        stats.output += output_start.elapsed();

        frames += 1;

        if frames % STATS_INTERVAL == 0 {
            stats.log(frames);
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    };

    tracing::info!("Pipeline stopped after {} frames ({:?})", frames, reason);

    Ok(RunSummary { frames, reason })
}
