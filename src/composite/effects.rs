//! Per-frame image effects: foreground stylization, pixelation and hue rotation.

use crate::config::ForegroundEffect;
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use std::borrow::Cow;

// Painterly stylization
const STYLIZE_SIGMA: f32 = 2.5;
const STYLIZE_LEVELS: f32 = 6.0;
const STYLIZE_EDGE_THRESHOLD: f32 = 48.0;
const STYLIZE_EDGE_DARKEN: f32 = 0.35;

// Pencil sketch
const SKETCH_SIGMA: f32 = 6.0;
const SKETCH_SHADE_FACTOR: f32 = 0.05;

impl ForegroundEffect {
    /// Apply the effect to the whole frame. `None` leaves the frame untouched.
    pub fn apply<'a>(&self, frame: &'a RgbImage) -> Cow<'a, RgbImage> {
        match self {
            ForegroundEffect::None => Cow::Borrowed(frame),
            ForegroundEffect::Stylize => Cow::Owned(stylize(frame)),
            ForegroundEffect::Sketch => Cow::Owned(pencil_sketch_color(frame)),
            ForegroundEffect::SketchMono => {
                let sketch = pencil_sketch_gray(frame);
                Cow::Owned(RgbImage::from_fn(sketch.width(), sketch.height(), |x, y| {
                    let v = sketch.get_pixel(x, y)[0];
                    Rgb([v, v, v])
                }))
            }
        }
    }
}

/// Smooth, posterize and ink strong edges
fn stylize(frame: &RgbImage) -> RgbImage {
    let smooth = imageops::blur(frame, STYLIZE_SIGMA);
    let gray = imageops::grayscale(&smooth);
    let step = 255.0 / STYLIZE_LEVELS;

    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let edge = gradient_magnitude(&gray, x, y);
        let shade = if edge > STYLIZE_EDGE_THRESHOLD {
            STYLIZE_EDGE_DARKEN
        } else {
            1.0
        };
        let pixel = smooth.get_pixel(x, y);
        Rgb(pixel.0.map(|c| {
            let level = (c as f32 / step).floor().min(STYLIZE_LEVELS - 1.0);
            ((level + 0.5) * step * shade).clamp(0.0, 255.0) as u8
        }))
    })
}

/// Central-difference gradient magnitude, clamped at the borders
fn gradient_magnitude(gray: &GrayImage, x: u32, y: u32) -> f32 {
    let (width, height) = gray.dimensions();
    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f32;
    let dx = at((x + 1).min(width - 1), y) - at(x.saturating_sub(1), y);
    let dy = at(x, (y + 1).min(height - 1)) - at(x, y.saturating_sub(1));
    (dx * dx + dy * dy).sqrt()
}

/// Colour-dodge the luminance with its blurred negative
fn pencil_sketch_gray(frame: &RgbImage) -> GrayImage {
    let gray = imageops::grayscale(frame);
    let mut negative = gray.clone();
    imageops::invert(&mut negative);
    let blurred = imageops::blur(&negative, SKETCH_SIGMA);

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let base = gray.get_pixel(x, y)[0] as f32;
        let blend = blurred.get_pixel(x, y)[0] as f32;
        let dodged = if blend >= 255.0 {
            255.0
        } else {
            (base * 255.0 / (255.0 - blend)).min(255.0)
        };
        Luma([(dodged * (1.0 - SKETCH_SHADE_FACTOR)) as u8])
    })
}

/// Replace the frame's luma with the pencil sketch, keeping its chroma
fn pencil_sketch_color(frame: &RgbImage) -> RgbImage {
    let sketch = pencil_sketch_gray(frame);

    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0.map(|c| c as f32);
        let luma = sketch.get_pixel(x, y)[0] as f32;
        let cb = -0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        Rgb([
            luma + 1.402 * cr,
            luma - 0.344_136 * cb - 0.714_136 * cr,
            luma + 1.772 * cb,
        ]
        .map(|c| c.clamp(0.0, 255.0) as u8))
    })
}

/// Downscale by `pixel_size` (linear) and scale back up (nearest) to produce blocks
pub fn pixelate(frame: &RgbImage, pixel_size: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    let small_width = (width / pixel_size).max(1);
    let small_height = (height / pixel_size).max(1);

    let small = imageops::resize(
        frame,
        small_width,
        small_height,
        imageops::FilterType::Triangle,
    );

    imageops::resize(&small, width, height, imageops::FilterType::Nearest)
}

/// Rotate the hue of an RGB triple (any positive scale) by `degrees`, keeping S and V
pub fn rotate_hue(rgb: [f32; 3], degrees: f32) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    if chroma <= f32::EPSILON {
        return rgb;
    }

    let hue = if max == r {
        60.0 * ((g - b) / chroma)
    } else if max == g {
        60.0 * ((b - r) / chroma + 2.0)
    } else {
        60.0 * ((r - g) / chroma + 4.0)
    };
    let hue = (hue + degrees).rem_euclid(360.0);

    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = max - chroma;
    [r1 + m, g1 + m, b1 + m]
}
