//! Camola: webcam background replacement.
//!
//! Each captured frame is segmented into an alpha matte, refined and smoothed
//! over time, then composited over a replacement background before being
//! written to a v4l2loopback device.

pub mod capture;
pub mod composite;
pub mod config;
pub mod matte;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use config::PipelineConfig;
pub use pipeline::{FramePipeline, PipelineState, RunSummary, StopReason};
