//! Synthetic scripted parking lot (`stub://`).
//!
//! Renders a flat asphalt surface with painted stall outlines and vehicles
//! that arrive and leave on a fixed timeline. Output is deterministic for a
//! given seed, so tests and demos can assert on exact transitions.

use anyhow::Result;
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;
use crate::region::{BoundingBox, RegionDefinition, RegionSet};

const ASPHALT: u8 = 90;
const PAINT: u8 = 230;
const BODY: u8 = 40;
const WINDSHIELD: u8 = 180;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const MARGIN: u32 = 8;
/// Distance from a region box to its painted outline. The 5x5 blur reaches
/// two pixels, so paint at this distance never touches a region pixel.
const STALL_GAP: u32 = 4;

/// Seconds before the first scripted arrival. Covers the default
/// discard + collection window at 10 fps with room to spare.
pub const FIRST_ARRIVAL_S: f64 = 6.0;
/// Spacing between arrivals of consecutive spaces.
pub const ARRIVAL_SPACING_S: f64 = 3.0;
/// How long vehicles in even-positioned spaces stay before leaving.
pub const DWELL_S: f64 = 8.0;

/// A vehicle occupying `area` from `arrive_s` until `depart_s`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScriptedVehicle {
    pub area: BoundingBox,
    pub arrive_s: f64,
    /// `None` parks for the rest of the stream.
    pub depart_s: Option<f64>,
}

impl ScriptedVehicle {
    pub fn present_at(&self, t: f64) -> bool {
        t >= self.arrive_s && self.depart_s.map_or(true, |depart| t < depart)
    }
}

/// A single row of `count` 60x100 stalls, 10 px apart, starting at (20, 20).
/// Used when a synthetic run has no region file.
pub fn stall_row(count: u32) -> Vec<RegionDefinition> {
    (0..count)
        .map(|id| {
            let left = 20 + id as i32 * 70;
            RegionDefinition::rect(id, left, 20, left + 59, 119)
        })
        .collect()
}

pub struct SyntheticLot {
    name: String,
    fps: u32,
    background: GrayImage,
    vehicles: Vec<ScriptedVehicle>,
    noise: u8,
    rng: StdRng,
    frame_count: u64,
    frame_limit: Option<u64>,
}

impl SyntheticLot {
    /// Empty lot of the given size.
    pub fn new(name: &str, width: u32, height: u32, fps: u32) -> Self {
        Self {
            name: name.to_string(),
            fps: fps.max(1),
            background: GrayImage::from_pixel(width, height, Luma([ASPHALT])),
            vehicles: Vec::new(),
            noise: 0,
            rng: StdRng::seed_from_u64(0),
            frame_count: 0,
            frame_limit: None,
        }
    }

    /// Lot sized to hold `regions`, with a stall outline around each one.
    ///
    /// The space at position `i` gets a vehicle at
    /// `FIRST_ARRIVAL_S + i * ARRIVAL_SPACING_S`; vehicles in even positions
    /// leave again after `DWELL_S`.
    pub fn for_regions(name: &str, regions: &RegionSet, fps: u32) -> Self {
        let boxes: Vec<BoundingBox> = regions.iter().map(|r| *r.bounding_box()).collect();
        let width = boxes
            .iter()
            .map(|b| b.right() + MARGIN)
            .max()
            .unwrap_or(0)
            .max(DEFAULT_WIDTH);
        let height = boxes
            .iter()
            .map(|b| b.bottom() + MARGIN)
            .max()
            .unwrap_or(0)
            .max(DEFAULT_HEIGHT);

        let mut lot = Self::new(name, width, height, fps);
        for bbox in &boxes {
            lot.paint_stall(bbox, &boxes);
        }
        for (pos, bbox) in boxes.iter().enumerate() {
            let arrive_s = FIRST_ARRIVAL_S + pos as f64 * ARRIVAL_SPACING_S;
            let depart_s = (pos % 2 == 0).then_some(arrive_s + DWELL_S);
            lot = lot.with_vehicle(ScriptedVehicle {
                area: *bbox,
                arrive_s,
                depart_s,
            });
        }
        lot
    }

    pub fn with_vehicle(mut self, vehicle: ScriptedVehicle) -> Self {
        self.vehicles.push(vehicle);
        self
    }

    /// Uniform per-pixel noise of up to `amplitude` levels either way.
    pub fn with_noise(mut self, amplitude: u8) -> Self {
        self.noise = amplitude;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// End the stream after `frames` frames. Unlimited by default.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn vehicles(&self) -> &[ScriptedVehicle] {
        &self.vehicles
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }

    /// Outline `STALL_GAP` pixels outside `bbox`, kept far enough from every
    /// region box that blurring cannot carry paint into a space.
    fn paint_stall(&mut self, bbox: &BoundingBox, keep_clear: &[BoundingBox]) {
        let (w, h) = self.background.dimensions();
        let gap = STALL_GAP as i64;
        let left = bbox.x as i64 - gap;
        let top = bbox.y as i64 - gap;
        let right = bbox.right() as i64 - 1 + gap;
        let bottom = bbox.bottom() as i64 - 1 + gap;
        for y in top..=bottom {
            for x in left..=right {
                let on_edge = x == left || x == right || y == top || y == bottom;
                if !on_edge || x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                    continue;
                }
                if keep_clear.iter().any(|b| near(b, x, y)) {
                    continue;
                }
                self.background.put_pixel(x as u32, y as u32, Luma([PAINT]));
            }
        }
    }

    fn render(&mut self, t: f64) -> GrayImage {
        let mut img = self.background.clone();
        for vehicle in self.vehicles.iter().filter(|v| v.present_at(t)) {
            draw_vehicle(&mut img, &vehicle.area);
        }
        if self.noise > 0 {
            let amplitude = self.noise as i16;
            for pixel in img.pixels_mut() {
                let delta = self.rng.gen_range(-amplitude..=amplitude);
                pixel.0[0] = (pixel.0[0] as i16 + delta).clamp(0, 255) as u8;
            }
        }
        img
    }
}

impl FrameSource for SyntheticLot {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticLot: connected to stub://{} (synthetic, {}x{}, {} vehicles)",
            self.name,
            self.width(),
            self.height(),
            self.vehicles.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let index = self.frame_count;
        let t = index as f64 / self.fps as f64;
        let image = self.render(t);
        self.frame_count += 1;
        Ok(Some(Frame::new(index, t, image)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            name: format!("stub://{}", self.name),
        }
    }
}

/// True when `(x, y)` lies within `STALL_GAP - 1` pixels of `bbox`.
fn near(bbox: &BoundingBox, x: i64, y: i64) -> bool {
    let reach = STALL_GAP as i64 - 1;
    x >= bbox.x as i64 - reach
        && x < bbox.right() as i64 + reach
        && y >= bbox.y as i64 - reach
        && y < bbox.bottom() as i64 + reach
}

/// Dark body inset from the box edge with a bright windshield band across the
/// upper third.
fn draw_vehicle(img: &mut GrayImage, area: &BoundingBox) {
    let inset = (area.width.min(area.height) / 8).max(1);
    if area.width <= 2 * inset || area.height <= 2 * inset {
        return;
    }
    let (x0, y0) = (area.x + inset, area.y + inset);
    let (x1, y1) = (area.right() - inset, area.bottom() - inset);
    let shield_top = y0 + (y1 - y0) / 6;
    let shield_bottom = y0 + (y1 - y0) / 3;
    for y in y0..y1.min(img.height()) {
        for x in x0..x1.min(img.width()) {
            let value = if (shield_top..shield_bottom).contains(&y) && x > x0 + inset && x + inset < x1 {
                WINDSHIELD
            } else {
                BODY
            };
            img.put_pixel(x, y, Luma([value]));
        }
    }
}
