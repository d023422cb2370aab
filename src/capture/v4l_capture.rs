use super::CaptureSource;
use crate::config::Resolution;
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as CameraResolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open the webcam at the supported format closest to `requested` and `fps`
    pub fn new(device_index: u32, requested: Resolution, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {} @ {}fps",
            device_index,
            requested,
            fps
        );

        let index = CameraIndex::Index(device_index);
        let format = CameraFormat::new(
            CameraResolution::new(requested.width, requested.height),
            FrameFormat::MJPEG,
            fps,
        );
        let requested_format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested_format).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam opened: {}x{} @ {}fps",
            actual.width(),
            actual.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame().context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(decoded)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
        tracing::info!("Webcam released");
    }
}
