//! Ghost trails: a bounded history of premultiplied foreground snapshots layered
//! beneath the live subject with opacity ramping from oldest to newest.

use super::effects::{pixelate, rotate_hue};
use super::Layer;
use crate::config::TrailsConfig;
use crate::matte::Matte;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;

/// Foreground colour multiplied by its matte, plus the matte itself
#[derive(Debug, Clone, PartialEq)]
pub struct TrailSnapshot {
    pub color: Layer,
    pub matte: Matte,
}

impl TrailSnapshot {
    pub fn capture(foreground: &RgbImage, matte: &Matte) -> Self {
        let color = Layer::from_fn(foreground.width(), foreground.height(), |x, y| {
            let alpha = matte.get_pixel(x, y)[0];
            Rgb(foreground.get_pixel(x, y).0.map(|c| c as f32 * alpha))
        });
        Self {
            color,
            matte: matte.clone(),
        }
    }
}

/// Fixed-capacity FIFO of trail snapshots, oldest first
#[derive(Debug, Clone)]
pub struct TrailBuffer {
    snapshots: VecDeque<TrailSnapshot>,
    capacity: usize,
}

impl TrailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest one when full
    pub fn push(&mut self, snapshot: TrailSnapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TrailSnapshot> {
        self.snapshots.iter()
    }
}

/// Opacity of trail `index` out of `count`, interpolated from `fade_start` to `fade_end`.
///
/// A lone trail sits at `t = 0` and therefore uses `fade_start`.
pub fn trail_opacity(index: usize, count: usize, fade_start: f32, fade_end: f32) -> f32 {
    let t = index as f32 / count.saturating_sub(1).max(1) as f32;
    fade_start + t * (fade_end - fade_start)
}

/// Decorates a background layer with the buffered trails and captures new snapshots
#[derive(Debug, Clone)]
pub struct TrailStage {
    config: TrailsConfig,
    pixel_size: u32,
}

impl TrailStage {
    pub fn new(config: TrailsConfig, pixel_size: u32) -> Self {
        Self { config, pixel_size }
    }

    pub fn should_capture(&self, frame_index: u64) -> bool {
        frame_index % self.config.interval as u64 == 0
    }

    /// Store a snapshot of the foreground when `frame_index` falls on the sampling interval
    pub fn capture(
        &self,
        buffer: &mut TrailBuffer,
        frame_index: u64,
        foreground: &RgbImage,
        matte: &Matte,
    ) {
        if !self.should_capture(frame_index) {
            return;
        }

        let snapshot = if self.config.pixelate {
            TrailSnapshot::capture(&pixelate(foreground, self.pixel_size), matte)
        } else {
            TrailSnapshot::capture(foreground, matte)
        };

        tracing::debug!(frame_index, buffered = buffer.len() + 1, "Captured trail snapshot");
        buffer.push(snapshot);
    }

    /// Blend every buffered trail onto `base`, oldest first
    pub fn layer(&self, mut base: Layer, buffer: &TrailBuffer) -> Layer {
        let _span = tracing::debug_span!("trails", count = buffer.len()).entered();

        let count = buffer.len();
        for (index, trail) in buffer.iter().enumerate() {
            if trail.color.dimensions() != base.dimensions() {
                tracing::warn!("Trail size does not match output, skipping");
                continue;
            }

            let opacity = trail_opacity(index, count, self.config.fade_start, self.config.fade_end);
            let hue = self.config.hue_shift * index as f32;

            for (x, y, pixel) in base.enumerate_pixels_mut() {
                let alpha = trail.matte.get_pixel(x, y)[0] * opacity;
                if alpha <= 0.0 {
                    continue;
                }
                let mut color = trail.color.get_pixel(x, y).0;
                if hue != 0.0 {
                    color = rotate_hue(color, hue);
                }
                for c in 0..3 {
                    pixel[c] = color[c] * alpha + pixel[c] * (1.0 - alpha);
                }
            }
        }

        base
    }
}
