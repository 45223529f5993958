//! Local video file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and scaled straight to GRAY8. Timestamps are
//! the stream's presentation timestamps; frames without one fall back to
//! `index / fps`.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::GrayImage;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    path: String,
    fps: u32,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    last_timestamp_s: f64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn new(path: &str, fps: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            fps: fps.max(1),
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            frame_count: 0,
            last_timestamp_s: 0.0,
            eof_sent: false,
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(err) if is_drained(&err) => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("decode frame {} of '{}'", self.frame_count, self.path)
                })
            }
        }
        let mut gray = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut gray)
            .context("scale frame to GRAY8")?;
        let image = frame_to_luma(&gray)?;

        let index = self.frame_count;
        let stamped = decoded
            .timestamp()
            .map(|pts| pts as f64 * self.time_base)
            .unwrap_or(index as f64 / self.fps as f64);
        if stamped < self.last_timestamp_s {
            log::debug!(
                "frame {} timestamp {:.3}s behind {:.3}s; holding",
                index,
                stamped,
                self.last_timestamp_s
            );
        }
        let timestamp_s = stamped.max(self.last_timestamp_s);

        self.frame_count += 1;
        self.last_timestamp_s = timestamp_s;
        Ok(Some(Frame::new(index, timestamp_s, image)))
    }
}

impl FrameSource for FfmpegFileSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("FfmpegFileSource: connected to {} (ffmpeg)", self.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            name: self.path.clone(),
        }
    }
}

/// True when the decoder has nothing more to give for now: it wants another
/// packet (EAGAIN) or has been fully flushed (EOF). Anything else is a decode
/// failure.
fn is_drained(err: &ffmpeg::Error) -> bool {
    matches!(
        err,
        ffmpeg::Error::Eof | ffmpeg::Error::Other { errno: ffmpeg::util::error::EAGAIN }
    )
}

fn frame_to_luma(frame: &ffmpeg::frame::Video) -> Result<GrayImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    GrayImage::from_raw(width, height, pixels).context("ffmpeg frame has inconsistent size")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_eagain_and_eof_mean_drained() {
        assert!(is_drained(&ffmpeg::Error::Eof));
        assert!(is_drained(&ffmpeg::Error::Other {
            errno: ffmpeg::util::error::EAGAIN
        }));
        assert!(!is_drained(&ffmpeg::Error::InvalidData));
        assert!(!is_drained(&ffmpeg::Error::Bug));
    }
}
