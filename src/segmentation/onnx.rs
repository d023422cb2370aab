use super::preprocess::Preprocessor;
use super::types::{InferenceModel, Matte, MODEL_INPUT_SIZE};
use anyhow::{Context, Result};
use ndarray::Array4;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;

/// Single-input matting model served by ONNX Runtime
///
/// Input: `[1, 3, 320, 320]` RGB tensor in [0, 1].
/// Output 0: `[1, 1, H, W]` foreground probability map.
pub struct OnnxModel {
    session: Session,
    width: u32,
    height: u32,
}

impl OnnxModel {
    /// Load a model, preferring CUDA and falling back to CPU
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading segmentation model from {}", path.display());

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Segmentation model loaded successfully");
        tracing::debug!("Model producer: {:?}", session.metadata()?.producer()?);

        Ok(Self {
            session,
            width: MODEL_INPUT_SIZE,
            height: MODEL_INPUT_SIZE,
        })
    }
}

impl InferenceModel for OnnxModel {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Matte> {
        let _span = tracing::debug_span!("inference").entered();

        let shape = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_value = ort::value::Value::from_array((
            [shape.0, shape.1, shape.2, shape.3].as_slice(),
            data,
        ))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .context("Failed to run inference")?;

        // Probability map, shape [1, 1, H, W]
        let (matte_shape, matte_data) = outputs[0].try_extract_tensor::<f32>()?;
        anyhow::ensure!(
            matte_shape.len() == 4,
            "Unexpected model output rank {}",
            matte_shape.len()
        );
        let matte_height = matte_shape[2] as u32;
        let matte_width = matte_shape[3] as u32;

        Preprocessor::matte_from_raw(matte_width, matte_height, matte_data).with_context(|| {
            format!(
                "Model output has {} values, expected {}x{}",
                matte_data.len(),
                matte_width,
                matte_height
            )
        })
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
