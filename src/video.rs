use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{
    codec::context::Context as CodecCtx,
    format::{context::Input, Pixel},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{context::Context as SwsCtx, flag::Flags},
};
use image::{imageops, GrayImage};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Roi;

/// Video metadata
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub total_frames: u64,
}

/// One decoded frame, already cropped to the region of interest.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp: f64,
    pub pixels: GrayImage,
}

/// Ordered supply of frames for the dispatcher.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Next frame in decode order, or `None` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Sequential decoder over the best video stream of a container.
pub struct VideoSource {
    ictx: Input,
    decoder: ffmpeg::decoder::Video,
    scaler: SwsCtx,
    stream_index: usize,
    info: VideoInfo,
    roi: Roi,
    next_index: u64,
    eof_sent: bool,
}

impl VideoSource {
    pub fn open(path: &Path, roi: Roi) -> Result<Self> {
        ffmpeg::init().context("Failed to initialize ffmpeg")?;

        let ictx = ffmpeg::format::input(&path)
            .with_context(|| format!("Could not open video file {}", path.display()))?;

        let (stream_index, decoder, fps, nb_frames) = {
            let stream = ictx
                .streams()
                .best(Type::Video)
                .ok_or_else(|| anyhow!("no video stream in {}", path.display()))?;

            let rate = stream.avg_frame_rate();
            let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                warn!("could not read FPS from {}, defaulting to 30", path.display());
                30.0
            };

            let decoder = CodecCtx::from_parameters(stream.parameters())
                .context("codec context")?
                .decoder()
                .video()
                .context("video decoder")?;

            (stream.index(), decoder, fps, stream.frames())
        };

        let width = decoder.width();
        let height = decoder.height();
        roi.validate(width, height)?;

        // Format-level duration is in AV_TIME_BASE units (microseconds)
        let total_frames = if nb_frames > 0 {
            nb_frames as u64
        } else {
            let duration = ictx.duration().max(0) as f64 / 1_000_000.0;
            (duration * fps).round() as u64
        };

        let scaler = SwsCtx::get(
            decoder.format(),
            width,
            height,
            Pixel::GRAY8,
            width,
            height,
            Flags::BILINEAR,
        )
        .context("scaler init")?;

        let info = VideoInfo {
            fps,
            width,
            height,
            total_frames,
        };
        info!("Video info: {:?}", info);

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            info,
            roi,
            next_index: 0,
            eof_sent: false,
        })
    }

    fn crop(&mut self, decoded: &VideoFrame) -> Result<Frame> {
        let mut gray = VideoFrame::empty();
        self.scaler
            .run(decoded, &mut gray)
            .context("pixel convert")?;

        let (width, height) = (self.info.width, self.info.height);
        let full = copy_plane(gray.data(0), gray.stride(0), width, height)?;
        let pixels = imageops::crop_imm(
            &full,
            self.roi.x,
            self.roi.y,
            self.roi.width,
            self.roi.height,
        )
        .to_image();

        let index = self.next_index;
        self.next_index += 1;
        Ok(Frame {
            index,
            timestamp: index as f64 / self.info.fps,
            pixels,
        })
    }
}

impl FrameSource for VideoSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let mut decoded = VideoFrame::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.crop(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let next = self
                .ictx
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));

            match next {
                Some((index, packet)) if index == self.stream_index => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("skipping undecodable packet at frame {}: {}", self.next_index, e);
                    }
                }
                Some(_) => continue,
                None => {
                    self.decoder.send_eof().context("flush decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

/// Copy one 8-bit plane into a tightly packed image, dropping per-row padding.
fn copy_plane(data: &[u8], stride: usize, width: u32, height: u32) -> Result<GrayImage> {
    let row_bytes = width as usize;
    let mut flat = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        if end > data.len() {
            return Err(anyhow!(
                "frame row {row} out of bounds (stride={stride}, data.len()={})",
                data.len()
            ));
        }
        flat.extend_from_slice(&data[start..end]);
    }
    GrayImage::from_raw(width, height, flat)
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_plane_strips_row_padding() {
        // 3x2 image stored with a stride of 4
        let data = [1, 2, 3, 99, 4, 5, 6, 99];
        let img = copy_plane(&data, 4, 3, 2).unwrap();
        assert_eq!(img.into_raw(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn copy_plane_rejects_short_buffers() {
        let data = [1, 2, 3, 4];
        assert!(copy_plane(&data, 3, 3, 2).is_err());
    }
}
