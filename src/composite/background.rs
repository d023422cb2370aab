//! Background layer sources.

use super::effects::pixelate;
use crate::config::{BackgroundMode, PipelineConfig, Resolution};
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use std::path::Path;

/// Produces the layer drawn behind the subject.
///
/// `frame` is the camera frame already resized to output resolution. Returning
/// `None` means "no background this frame"; the compositor then falls back to
/// the camera frame itself.
pub trait BackgroundLayer {
    fn next_layer(&mut self, frame: &RgbImage) -> Option<RgbImage>;
}

/// Keep the camera's own background
pub struct NoBackground;

impl BackgroundLayer for NoBackground {
    fn next_layer(&mut self, _frame: &RgbImage) -> Option<RgbImage> {
        None
    }
}

pub struct SolidColor {
    color: Rgb<u8>,
}

impl SolidColor {
    pub fn new(color: Rgb<u8>) -> Self {
        Self { color }
    }
}

impl BackgroundLayer for SolidColor {
    fn next_layer(&mut self, frame: &RgbImage) -> Option<RgbImage> {
        Some(RgbImage::from_pixel(frame.width(), frame.height(), self.color))
    }
}

/// A still image decoded once and resized to output resolution
pub struct StillImage {
    image: RgbImage,
}

impl StillImage {
    pub fn open<P: AsRef<Path>>(path: P, size: Resolution) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("Failed to load background image: {}", path.display()))?
            .to_rgb8();
        Ok(Self::from_image(image, size))
    }

    pub fn from_image(image: RgbImage, size: Resolution) -> Self {
        Self {
            image: resize_to(image, size),
        }
    }
}

impl BackgroundLayer for StillImage {
    fn next_layer(&mut self, _frame: &RgbImage) -> Option<RgbImage> {
        Some(self.image.clone())
    }
}

/// The camera frame itself, pixelated and optionally colour-inverted
pub struct Pixelated {
    pixel_size: u32,
    invert: bool,
}

impl Pixelated {
    pub fn new(pixel_size: u32, invert: bool) -> Self {
        Self { pixel_size, invert }
    }
}

impl BackgroundLayer for Pixelated {
    fn next_layer(&mut self, frame: &RgbImage) -> Option<RgbImage> {
        let mut layer = pixelate(frame, self.pixel_size);
        if self.invert {
            imageops::invert(&mut layer);
        }
        Some(layer)
    }
}

/// A sequential source of decoded frames that can be restarted
pub trait FrameStream {
    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<()>;
}

/// Plays a [`FrameStream`] forever, rewinding at end of stream
pub struct LoopingVideo<S> {
    stream: S,
    size: Resolution,
}

impl<S: FrameStream> LoopingVideo<S> {
    pub fn new(stream: S, size: Resolution) -> Self {
        Self { stream, size }
    }

    fn rewind_and_read(&mut self) -> Option<RgbImage> {
        if let Err(e) = self.stream.rewind() {
            tracing::warn!("Failed to rewind background video: {:#}", e);
            return None;
        }
        match self.stream.next_frame() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                tracing::warn!("Background video has no frames after rewind");
                None
            }
            Err(e) => {
                tracing::warn!("Failed to read background video after rewind: {:#}", e);
                None
            }
        }
    }
}

impl<S: FrameStream> BackgroundLayer for LoopingVideo<S> {
    fn next_layer(&mut self, _frame: &RgbImage) -> Option<RgbImage> {
        let frame = match self.stream.next_frame() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                tracing::debug!("Background video ended, looping");
                self.rewind_and_read()
            }
            Err(e) => {
                tracing::warn!("Background video read failed, rewinding: {:#}", e);
                self.rewind_and_read()
            }
        };
        frame.map(|frame| resize_to(frame, self.size))
    }
}

/// Resize (bilinear) unless already at `size`
pub fn resize_to(image: RgbImage, size: Resolution) -> RgbImage {
    if image.dimensions() == (size.width, size.height) {
        return image;
    }
    imageops::resize(&image, size.width, size.height, imageops::FilterType::Triangle)
}

/// Build the background layer selected by the configuration.
///
/// Pixelation takes priority over any configured background source, which is
/// then never opened.
pub fn from_config(config: &PipelineConfig) -> Result<Box<dyn BackgroundLayer>> {
    if config.pixelate.enabled {
        if config.background != BackgroundMode::None {
            tracing::warn!("Background pixelation enabled, ignoring configured background source");
        }
        tracing::info!(
            "Using pixelated background (pixel size {}, invert={})",
            config.pixelate.pixel_size,
            config.pixelate.invert
        );
        return Ok(Box::new(Pixelated::new(
            config.pixelate.pixel_size,
            config.pixelate.invert,
        )));
    }

    match &config.background {
        BackgroundMode::None => {
            tracing::info!("No background replacement");
            Ok(Box::new(NoBackground))
        }
        BackgroundMode::Color(color) => {
            tracing::info!("Using solid color background: {:?}", color.0);
            Ok(Box::new(SolidColor::new(*color)))
        }
        BackgroundMode::Image(path) => {
            let image = StillImage::open(path, config.output)?;
            tracing::info!("Using image background: {}", path.display());
            Ok(Box::new(image))
        }
        BackgroundMode::Video(path) => open_video(path, config.output),
    }
}

#[cfg(feature = "background-video")]
fn open_video(path: &Path, size: Resolution) -> Result<Box<dyn BackgroundLayer>> {
    let stream = super::video::VideoFile::open(path)
        .with_context(|| format!("Failed to load background video: {}", path.display()))?;
    tracing::info!("Using video background: {}", path.display());
    Ok(Box::new(LoopingVideo::new(stream, size)))
}

#[cfg(not(feature = "background-video"))]
fn open_video(path: &Path, _size: Resolution) -> Result<Box<dyn BackgroundLayer>> {
    anyhow::bail!(
        "Cannot play {}: built without the `background-video` feature",
        path.display()
    )
}
