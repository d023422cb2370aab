//! Background video decoding with FFmpeg.

use super::background::FrameStream;
use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Video file decoded frame by frame to RGB
pub struct VideoFile {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    scaler: ffmpeg::software::scaling::Context,
    end_of_input: bool,
    frame_count: u64,
}

impl VideoFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        ffmpeg::init().context("Failed to initialize FFmpeg")?;

        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("Failed to open video file: {}", path.display()))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("No video stream found")?;
        let stream_index = stream.index();

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("Failed to create codec context")?
            .decoder()
            .video()
            .context("Failed to create video decoder")?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("Failed to create video scaler")?;

        tracing::debug!(
            "Opened background video {}: {}x{}",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            decoder,
            stream_index,
            scaler,
            end_of_input: false,
            frame_count: 0,
        })
    }

    fn convert_frame(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .context("Failed to scale frame")?;

        let (width, height) = (rgb.width(), rgb.height());
        let row_bytes = width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data(0);

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .context("Video frame row is out of bounds")?,
            );
        }

        RgbImage::from_raw(width, height, pixels)
            .context("Failed to create image buffer from frame data")
    }
}

impl FrameStream for VideoFile {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.frame_count += 1;
                return self.convert_frame(&decoded).map(Some);
            }
            if self.end_of_input {
                tracing::debug!("Background video ended after {} frames", self.frame_count);
                return Ok(None);
            }

            let stream_index = self.stream_index;
            let packet = self
                .input
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);

            match packet {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("Failed to send packet to decoder")?,
                None => {
                    self.decoder.send_eof().context("Failed to flush decoder")?;
                    self.end_of_input = true;
                }
            }
        }
    }

    /// Reopen the file at its first frame
    fn rewind(&mut self) -> Result<()> {
        let path = self.path.clone();
        *self = Self::open(path)?;
        Ok(())
    }
}
