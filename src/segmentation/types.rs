use anyhow::Result;
use image::{ImageBuffer, Luma};
use ndarray::Array4;

/// Alpha matte: 0.0 = background, 1.0 = foreground
pub type Matte = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Model input edge length used by the bundled matting models
pub const MODEL_INPUT_SIZE: u32 = 320;

/// Trait for inference providers
/// Allows swapping between different backends without touching the matte pipeline
pub trait InferenceModel {
    /// Run the model on a single frame
    ///
    /// # Arguments
    /// * `input` - NCHW tensor of shape [1, 3, H, W], RGB, values in [0, 1]
    ///
    /// # Returns
    /// * Raw foreground probability map at the model's output resolution
    fn infer(&mut self, input: &Array4<f32>) -> Result<Matte>;

    /// Get the model's expected input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32) {
        (MODEL_INPUT_SIZE, MODEL_INPUT_SIZE)
    }
}
