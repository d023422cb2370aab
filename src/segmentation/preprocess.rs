use super::types::Matte;
use image::{imageops, Luma, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB frames to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize (bilinear) to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Frames are already RGB, which is the channel order the model expects.
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }

    /// Resize a matte (bilinear) to the given dimensions
    pub fn resize_matte(matte: &Matte, target_width: u32, target_height: u32) -> Matte {
        if matte.dimensions() == (target_width, target_height) {
            return matte.clone();
        }

        imageops::resize(
            matte,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        )
    }

    /// Build a matte from a flattened row-major probability map
    pub fn matte_from_raw(width: u32, height: u32, values: &[f32]) -> Option<Matte> {
        if values.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Matte::from_fn(width, height, |x, y| {
            Luma([values[(y * width + x) as usize]])
        }))
    }

    /// Convert matte to grayscale RGB image for visualization
    pub fn matte_to_rgb(matte: &Matte) -> RgbImage {
        let (width, height) = matte.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let value = (matte.get_pixel(x, y)[0] * 255.0).clamp(0.0, 255.0) as u8;
            image::Rgb([value, value, value])
        })
    }
}
