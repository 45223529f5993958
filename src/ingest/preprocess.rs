//! Frame preprocessing applied between a source and the engine.

use anyhow::Result;
use image::GrayImage;

use super::{FrameSource, SourceStats};
use crate::detect::reflect_101;
use crate::frame::Frame;

const BLUR_RADIUS: i64 = 2;
const BLUR_SIGMA: f64 = 3.0;

fn blur_kernel() -> [f64; 5] {
    let mut kernel = [0.0; 5];
    for (i, w) in kernel.iter_mut().enumerate() {
        let x = i as f64 - BLUR_RADIUS as f64;
        *w = (-(x * x) / (2.0 * BLUR_SIGMA * BLUR_SIGMA)).exp();
    }
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// 5x5 Gaussian blur with sigma 3, separable, reflect-101 borders, rounded
/// back to 8 bits.
pub fn gaussian_blur(img: &GrayImage) -> GrayImage {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if w == 0 || h == 0 {
        return img.clone();
    }
    let kernel = blur_kernel();
    let raw = img.as_raw();

    let mut horizontal = vec![0.0f64; raw.len()];
    for y in 0..h {
        let row = (y * w) as usize;
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x + k as i64 - BLUR_RADIUS, w);
                acc += weight * raw[row + sx] as f64;
            }
            horizontal[row + x as usize] = acc;
        }
    }

    let mut out = vec![0u8; raw.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y + k as i64 - BLUR_RADIUS, h);
                acc += weight * horizontal[sy * w as usize + x as usize];
            }
            out[(y * w + x) as usize] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(img.width(), img.height(), out).unwrap_or_else(|| img.clone())
}

/// Blurs every frame of `inner` in place.
pub struct PreprocessedSource<S> {
    inner: S,
}

impl<S: FrameSource> PreprocessedSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: FrameSource> FrameSource for PreprocessedSource<S> {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.inner.next_frame()?.map(|mut frame| {
            let blurred = gaussian_blur(frame.image());
            *frame.image_mut() = blurred;
            frame
        }))
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}
