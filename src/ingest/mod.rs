//! Frame ingestion sources.
//!
//! This module provides different sources of grayscale frames:
//! - Synthetic scripted lot (`stub://`, testing and demos)
//! - Directories of still images (PNG/JPEG)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Every source yields a finite or endless sequence of `Frame`s with
//! non-decreasing stream timestamps. End of sequence is `Ok(None)`; a decode
//! failure is an error and ends the run.
//!
//! The ingestion layer is responsible for:
//! - Converting to 8-bit luma at decode time
//! - Skipping the first `start_frame` frames
//! - Blurring before the engine sees a frame
//!
//! The ingestion layer MUST NOT:
//! - Fetch remote URLs
//! - Re-deliver or reorder frames

#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
pub mod preprocess;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::Frame;
use crate::region::RegionSet;

pub use images::ImageSequenceSource;
pub use preprocess::{gaussian_blur, PreprocessedSource};
pub use synthetic::{stall_row, ScriptedVehicle, SyntheticLot};

/// Producer of grayscale frames for the engine.
pub trait FrameSource {
    /// Prepare the source. Sources that need no setup only log.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame, or `None` once the sequence is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub name: String,
}

/// Where frames come from and how they are prepared.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// `stub://<name>`, a directory of images, or a local video file.
    pub url: String,
    /// Frame rate used to timestamp sources without their own clock.
    pub fps: u32,
    /// Apply the 5x5 Gaussian blur before classification.
    pub blur: bool,
    /// Frames dropped from the head of the source.
    pub start_frame: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://lot".to_string(),
            fps: 10,
            blur: true,
            start_frame: 0,
        }
    }
}

impl SourceConfig {
    pub fn is_synthetic(&self) -> bool {
        self.url.starts_with("stub://")
    }
}

/// Opens the source named by `config.url` with skipping and blurring applied.
///
/// Synthetic lots are scripted around `regions` so every space sees traffic.
pub fn open_source(config: &SourceConfig, regions: &RegionSet) -> Result<Box<dyn FrameSource>> {
    if config.fps == 0 {
        return Err(anyhow!("source fps must be greater than zero"));
    }
    if !is_local_path(&config.url) {
        return Err(anyhow!(
            "frame sources only support local paths and stub:// (got '{}')",
            config.url
        ));
    }

    let base: Box<dyn FrameSource> = if let Some(name) = config.url.strip_prefix("stub://") {
        Box::new(SyntheticLot::for_regions(name, regions, config.fps))
    } else if Path::new(&config.url).is_dir() {
        Box::new(ImageSequenceSource::open(&config.url, config.fps)?)
    } else {
        open_video_file(config)?
    };

    let skipped: Box<dyn FrameSource> = if config.start_frame > 0 {
        Box::new(SkipFrames::new(base, config.start_frame))
    } else {
        base
    };

    Ok(if config.blur {
        Box::new(PreprocessedSource::new(skipped))
    } else {
        skipped
    })
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video_file(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(file_ffmpeg::FfmpegFileSource::new(
        &config.url,
        config.fps,
    )?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video_file(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "'{}' is not a directory; video files require the ingest-file-ffmpeg feature",
        config.url
    ))
}

fn is_local_path(url: &str) -> bool {
    if url.trim().is_empty() {
        return false;
    }
    if url.starts_with("stub://") {
        return true;
    }
    !url.contains("://")
}

// ----------------------------------------------------------------------------
// Start-frame skipping
// ----------------------------------------------------------------------------

/// Drops the first `count` frames of `inner`. Delivered frames keep their
/// original index and timestamp.
pub struct SkipFrames<S> {
    inner: S,
    remaining: u64,
}

impl<S: FrameSource> SkipFrames<S> {
    pub fn new(inner: S, count: u64) -> Self {
        Self {
            inner,
            remaining: count,
        }
    }
}

impl<S: FrameSource> FrameSource for SkipFrames<S> {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining > 0 {
            let requested = self.remaining;
            while self.remaining > 0 {
                if self.inner.next_frame()?.is_none() {
                    log::warn!("source ended while skipping to frame {}", requested);
                    self.remaining = 0;
                    return Ok(None);
                }
                self.remaining -= 1;
            }
            log::info!("skipped {} frames", requested);
        }
        self.inner.next_frame()
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}
