//! Matte estimation: inference, refinement and temporal stabilization.

pub mod filter;

pub use crate::segmentation::Matte;

use crate::segmentation::{InferenceModel, Preprocessor};
use anyhow::{Context, Result};
use image::RgbImage;

/// Blur applied to the resized probability map
const EDGE_BLUR_KERNEL: usize = 7;
/// Blur applied after the morphological open
const RESOFTEN_BLUR_KERNEL: usize = 5;

/// Previous frame's matte, carried between calls to [`MatteEstimator::segment`]
#[derive(Debug, Clone, Default)]
pub struct SmoothingState {
    previous: Option<Matte>,
}

impl SmoothingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&Matte> {
        self.previous.as_ref()
    }

    /// Blend `current` with the stored matte using an exponential moving average
    /// and remember the result for the next frame.
    ///
    /// `weight` is the share given to `current`. The stored matte is ignored when
    /// its size differs from `current` (e.g. after a capture resolution change).
    pub fn stabilize(&mut self, current: Matte, weight: f32) -> Matte {
        let blended = match &self.previous {
            Some(previous) if previous.dimensions() == current.dimensions() => {
                let mut blended = current;
                for (value, prev) in blended.pixels_mut().zip(previous.pixels()) {
                    value[0] = (weight * value[0] + (1.0 - weight) * prev[0]).clamp(0.0, 1.0);
                }
                blended
            }
            _ => current,
        };

        self.previous = Some(blended.clone());
        blended
    }
}

/// Turns raw model output into a clean, temporally stable alpha matte
pub struct MatteEstimator {
    model: Box<dyn InferenceModel>,
    preprocessor: Preprocessor,
    smoothing: f32,
}

impl MatteEstimator {
    /// `smoothing` is the EMA weight of the current frame, in (0, 1]
    pub fn new(model: Box<dyn InferenceModel>, smoothing: f32) -> Self {
        let (width, height) = model.input_size();
        Self {
            model,
            preprocessor: Preprocessor::new(width, height),
            smoothing,
        }
    }

    /// Estimate the matte for `frame`, updating `state` with the result
    pub fn segment(&mut self, frame: &RgbImage, state: &mut SmoothingState) -> Result<Matte> {
        let _span = tracing::debug_span!("segment").entered();

        let input = self.preprocessor.preprocess(frame);
        let raw = self.model.infer(&input).context("Inference failed")?;

        let (width, height) = frame.dimensions();
        let matte = refine(&raw, width, height);

        Ok(state.stabilize(matte, self.smoothing))
    }
}

/// Resize the raw probability map to the frame size, soften edges and remove noise
pub fn refine(raw: &Matte, width: u32, height: u32) -> Matte {
    let _span = tracing::debug_span!("refine").entered();

    let resized = Preprocessor::resize_matte(raw, width, height);
    let blurred = filter::gaussian_blur(&resized, EDGE_BLUR_KERNEL);
    let opened = filter::open(&blurred);
    let mut matte = filter::gaussian_blur(&opened, RESOFTEN_BLUR_KERNEL);
    filter::clamp_unit(&mut matte);
    matte
}
