//! Image-sequence frame source.
//!
//! Reads every PNG/JPEG in a local directory in file-name order. Frames are
//! converted to 8-bit luma at decode time and timestamped `index / fps`.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    fps: u32,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, fps: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if fps == 0 {
            return Err(anyhow!("image sequence fps must be greater than zero"));
        }
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list {}", dir.display()))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no PNG or JPEG files in {}", dir.display()));
        }
        files.sort();

        Ok(Self {
            dir,
            files,
            fps,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "ImageSequenceSource: connected to {} ({} images)",
            self.dir.display(),
            self.files.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_luma8();
        let index = self.next as u64;
        self.next += 1;
        Ok(Some(Frame::new(index, index as f64 / self.fps as f64, image)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.next as u64,
            name: self.dir.display().to_string(),
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
