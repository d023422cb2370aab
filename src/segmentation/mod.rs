mod onnx;
mod preprocess;
pub mod types;

pub use onnx::OnnxModel;
pub use preprocess::Preprocessor;
pub use types::{InferenceModel, Matte};

use anyhow::Result;
use std::path::Path;

/// Create the default inference provider (single-input ONNX matting model)
pub fn create_default_model<P: AsRef<Path>>(model_path: P) -> Result<Box<dyn InferenceModel>> {
    let model = OnnxModel::new(model_path)?;
    Ok(Box::new(model))
}
