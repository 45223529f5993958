//! Grayscale frames as the classifier sees them.
//!
//! - `Frame`: one decoded, grayscale image plus its stream timestamp.
//! - `Frame::region_pixels`: the bounding-box crop a region is scored on.
//!
//! Timestamps are stream time (seconds from the start of the video), never
//! wall-clock time, so debounce decisions replay identically at any
//! processing speed.

use image::{imageops, GrayImage};

use crate::region::Region;
use crate::KernelError;

/// One grayscale frame with its position in the stream.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Stream time in seconds.
    pub timestamp_s: f64,
    /// Zero-based index assigned by the source.
    pub index: u64,
    image: GrayImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_s: f64, image: GrayImage) -> Self {
        Self {
            timestamp_s,
            index,
            image,
        }
    }

    /// Frame filled with a single intensity.
    pub fn uniform(index: u64, timestamp_s: f64, width: u32, height: u32, value: u8) -> Self {
        Self::new(
            index,
            timestamp_s,
            GrayImage::from_pixel(width, height, image::Luma([value])),
        )
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut GrayImage {
        &mut self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Copies the pixels under `region`'s bounding box.
    ///
    /// Fails when the box reaches past the frame edge rather than scoring a
    /// clipped crop against a full-size mask.
    pub fn region_pixels(&self, region: &Region) -> Result<GrayImage, KernelError> {
        let bbox = region.bounding_box();
        if !bbox.fits_within(self.width(), self.height()) {
            return Err(KernelError::RegionOutOfFrame {
                id: region.id(),
                bbox: *bbox,
                frame_width: self.width(),
                frame_height: self.height(),
            });
        }
        Ok(imageops::crop_imm(&self.image, bbox.x, bbox.y, bbox.width, bbox.height).to_image())
    }
}
