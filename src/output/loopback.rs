use super::OutputSink;
use crate::config::Resolution;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    /// Open a v4l2loopback device and configure it for YUYV at `size`
    pub fn new<P: AsRef<Path>>(device_path: P, size: Resolution) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!("Opening v4l2loopback device at {} ({})", path.display(), size);

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;
        let requested = Format::new(size.width, size.height, FourCC::new(b"YUYV"));
        let actual = Output::set_format(&device, &requested)
            .context("Failed to set v4l2loopback output format")?;
        anyhow::ensure!(
            actual.width == size.width && actual.height == size.height,
            "v4l2loopback device accepted {}x{} instead of {}",
            actual.width,
            actual.height,
            size
        );
        tracing::info!("v4l2loopback device configured: {}", actual);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width: size.width,
            height: size.height,
        })
    }
}

/// Pack an RGB frame as YUV 4:2:2 (YUYV), averaging chroma over each pixel pair
pub fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let mut yuyv = Vec::with_capacity((width.div_ceil(2) * 4 * height) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let pixel1 = rgb_image.get_pixel(x, y);
            let pixel2 = if x + 1 < width {
                rgb_image.get_pixel(x + 1, y)
            } else {
                pixel1
            };

            let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
            let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            // Y0 U Y1 V
            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        anyhow::ensure!(
            frame.dimensions() == (self.width, self.height),
            "Frame is {}x{}, sink expects {}x{}",
            frame.width(),
            frame.height(),
            self.width,
            self.height
        );

        let yuyv_data = rgb_to_yuyv(frame);

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;
        self.file.flush().context("Failed to flush v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for V4L2Output {
    fn drop(&mut self) {
        tracing::info!("v4l2loopback device closed");
    }
}
