//! Layered compositing of foreground, background and trails.
//!
//! Every frame runs the same fixed sequence:
//! 1. resize frame and matte to output resolution
//! 2. foreground layer (effect applied to the whole frame)
//! 3. background layer (pixelated / solid / image / video, else the frame itself)
//! 4. trails stage, decorating the background when enabled
//! 5. `out = fg * matte + bg * (1 - matte)`

pub mod background;
pub mod effects;
pub mod trails;
#[cfg(feature = "background-video")]
pub mod video;

pub use background::{BackgroundLayer, FrameStream, LoopingVideo};
pub use trails::{trail_opacity, TrailBuffer, TrailSnapshot, TrailStage};

use crate::config::{ForegroundEffect, PipelineConfig, Resolution};
use crate::matte::Matte;
use crate::segmentation::Preprocessor;
use image::{ImageBuffer, Rgb, RgbImage};

/// Floating-point colour layer on the 0..=255 scale
pub type Layer = ImageBuffer<Rgb<f32>, Vec<f32>>;

pub fn to_layer(image: &RgbImage) -> Layer {
    Layer::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image.get_pixel(x, y).0.map(f32::from))
    })
}

/// `clamp(fg * matte + bg * (1 - matte))` truncated to 8 bits per channel
pub fn blend(foreground: &RgbImage, background: &Layer, matte: &Matte) -> RgbImage {
    debug_assert_eq!(foreground.dimensions(), background.dimensions());
    debug_assert_eq!(foreground.dimensions(), matte.dimensions());

    RgbImage::from_fn(foreground.width(), foreground.height(), |x, y| {
        let alpha = matte.get_pixel(x, y)[0];
        let fg = foreground.get_pixel(x, y);
        let bg = background.get_pixel(x, y);
        Rgb(std::array::from_fn(|c| {
            (fg[c] as f32 * alpha + bg[c] * (1.0 - alpha)).clamp(0.0, 255.0) as u8
        }))
    })
}

pub struct LayerCompositor {
    output: Resolution,
    effect: ForegroundEffect,
    background: Box<dyn BackgroundLayer>,
    trails: Option<TrailStage>,
}

impl LayerCompositor {
    pub fn new(
        output: Resolution,
        effect: ForegroundEffect,
        background: Box<dyn BackgroundLayer>,
        trails: Option<TrailStage>,
    ) -> Self {
        Self {
            output,
            effect,
            background,
            trails,
        }
    }

    /// Build a compositor for `config` around an already-opened background
    pub fn from_config(config: &PipelineConfig, background: Box<dyn BackgroundLayer>) -> Self {
        let trails = config
            .trails
            .enabled
            .then(|| TrailStage::new(config.trails, config.pixelate.pixel_size));
        Self::new(config.output, config.foreground_effect, background, trails)
    }

    pub fn output_size(&self) -> Resolution {
        self.output
    }

    /// Composite one frame.
    ///
    /// Trails are drawn from the snapshots already in `trails`; when
    /// `frame_index` falls on the sampling interval, this frame's foreground is
    /// captured afterwards for use by later frames.
    pub fn composite(
        &mut self,
        frame: &RgbImage,
        matte: &Matte,
        trails: &mut TrailBuffer,
        frame_index: u64,
    ) -> RgbImage {
        let _span = tracing::debug_span!("composite").entered();

        let frame = background::resize_to(frame.clone(), self.output);
        let matte = Preprocessor::resize_matte(matte, self.output.width, self.output.height);

        let foreground = self.effect.apply(&frame);

        let background = self
            .background
            .next_layer(&frame)
            .map(|layer| background::resize_to(layer, self.output))
            .unwrap_or_else(|| frame.clone());
        let mut background = to_layer(&background);

        if let Some(stage) = &self.trails {
            background = stage.layer(background, trails);
            stage.capture(trails, frame_index, &foreground, &matte);
        }

        blend(&foreground, &background, &matte)
    }
}
