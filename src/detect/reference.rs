use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::region::RegionSet;
use crate::KernelError;

/// Frames dropped before anything else, while exposure and focus settle.
pub const DEFAULT_DISCARD_FRAMES: u32 = 20;
/// Length of the reference collection window in frames.
pub const DEFAULT_COLLECT_FRAMES: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    pub discard_frames: u32,
    /// Zero disables reference capture; regions are then scored on texture alone.
    pub collect_frames: u32,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            discard_frames: DEFAULT_DISCARD_FRAMES,
            collect_frames: DEFAULT_COLLECT_FRAMES,
        }
    }
}

/// Where the stream is relative to reference capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Frame `frame` of the `of`-frame settle period; not classified.
    Warmup { frame: u32, of: u32 },
    /// Frame `frame` of the `of`-frame collection window; not classified.
    Calibrating { frame: u32, of: u32 },
    /// Regions are being classified.
    Detecting,
}

impl Phase {
    pub fn is_detecting(&self) -> bool {
        matches!(self, Self::Detecting)
    }

    /// Initialization progress, 0–100. Detecting reports 100.
    pub fn percent(&self) -> u32 {
        match *self {
            Self::Warmup { .. } => 0,
            Self::Calibrating { frame, of } => frame * 100 / of.max(1),
            Self::Detecting => 100,
        }
    }
}

/// One-shot reference snapshots, one per region.
///
/// The snapshot is taken on the first frame of the collection window and never
/// replaced, even though the window keeps running for `collect_frames` frames.
pub struct ReferenceCapture {
    settings: ReferenceSettings,
    frames_seen: u64,
    snapshots: Vec<Option<GrayImage>>,
    announced_complete: bool,
}

impl ReferenceCapture {
    pub fn new(settings: ReferenceSettings, region_count: usize) -> Self {
        Self {
            settings,
            frames_seen: 0,
            snapshots: vec![None; region_count],
            announced_complete: false,
        }
    }

    pub fn settings(&self) -> &ReferenceSettings {
        &self.settings
    }

    /// Advances the capture window by one frame and returns the phase that
    /// frame belongs to. Only `Phase::Detecting` frames are to be classified.
    /// On error nothing has changed: the frame does not count.
    pub fn observe(&mut self, frame: &Frame, regions: &RegionSet) -> Result<Phase, KernelError> {
        let seen = self.frames_seen;
        let discard = self.settings.discard_frames as u64;
        let collect = self.settings.collect_frames as u64;

        if seen < discard {
            self.frames_seen += 1;
            return Ok(Phase::Warmup {
                frame: (seen + 1) as u32,
                of: self.settings.discard_frames,
            });
        }
        if seen < discard + collect {
            let crops = self
                .snapshots
                .iter()
                .zip(regions)
                .map(|(slot, region)| match slot {
                    Some(_) => Ok(None),
                    None => frame.region_pixels(region).map(Some),
                })
                .collect::<Result<Vec<_>, _>>()?;
            for (slot, crop) in self.snapshots.iter_mut().zip(crops) {
                if crop.is_some() {
                    *slot = crop;
                }
            }
            self.frames_seen += 1;
            if seen == discard {
                log::info!(
                    "reference snapshots captured for {} regions at {:.2}s",
                    self.snapshots.len(),
                    frame.timestamp_s
                );
            }
            return Ok(Phase::Calibrating {
                frame: (seen - discard + 1) as u32,
                of: self.settings.collect_frames,
            });
        }

        self.frames_seen += 1;
        if !self.announced_complete {
            self.announced_complete = true;
            if collect == 0 {
                log::info!("reference capture disabled; scoring on texture only");
            } else {
                log::info!("calibration complete; detection started");
            }
        }
        Ok(Phase::Detecting)
    }

    /// Reference crop of the region at `position`, once captured.
    pub fn snapshot(&self, position: usize) -> Option<&GrayImage> {
        self.snapshots.get(position).and_then(Option::as_ref)
    }

    pub fn is_set(&self, position: usize) -> bool {
        self.snapshot(position).is_some()
    }

    /// True once no further frame can change a snapshot.
    pub fn is_complete(&self) -> bool {
        let window = self.settings.discard_frames as u64 + self.settings.collect_frames as u64;
        self.frames_seen >= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionDefinition;

    fn regions() -> RegionSet {
        RegionSet::from_definitions(&[
            RegionDefinition::rect(0, 0, 0, 3, 3),
            RegionDefinition::rect(1, 4, 0, 7, 3),
        ])
        .unwrap()
    }

    #[test]
    fn discards_then_captures_first_collection_frame_only() {
        let regions = regions();
        let settings = ReferenceSettings {
            discard_frames: 2,
            collect_frames: 3,
        };
        let mut capture = ReferenceCapture::new(settings, regions.len());

        let phases: Vec<Phase> = (0..7u8)
            .map(|i| {
                let frame = Frame::uniform(i as u64, i as f64 * 0.1, 8, 4, 10 * i);
                capture.observe(&frame, &regions).unwrap()
            })
            .collect();

        assert_eq!(phases[0], Phase::Warmup { frame: 1, of: 2 });
        assert_eq!(phases[1], Phase::Warmup { frame: 2, of: 2 });
        assert_eq!(phases[2], Phase::Calibrating { frame: 1, of: 3 });
        assert_eq!(phases[4], Phase::Calibrating { frame: 3, of: 3 });
        assert_eq!(phases[5], Phase::Detecting);
        assert_eq!(phases[6], Phase::Detecting);
        assert!(capture.is_complete());

        // Frame 2 (value 20) is the snapshot; frames 3 and 4 did not replace it.
        for pos in 0..2 {
            let snap = capture.snapshot(pos).unwrap();
            assert_eq!(snap.dimensions(), (4, 4));
            assert!(snap.pixels().all(|p| p.0[0] == 20));
        }
    }

    #[test]
    fn stream_ending_early_leaves_references_unset() {
        let regions = regions();
        let mut capture = ReferenceCapture::new(ReferenceSettings::default(), regions.len());
        for i in 0..5 {
            let frame = Frame::uniform(i, i as f64, 8, 4, 0);
            capture.observe(&frame, &regions).unwrap();
        }
        assert!(!capture.is_set(0));
        assert!(!capture.is_set(1));
        assert!(!capture.is_complete());
    }

    #[test]
    fn zero_collection_window_skips_capture() {
        let regions = regions();
        let settings = ReferenceSettings {
            discard_frames: 1,
            collect_frames: 0,
        };
        let mut capture = ReferenceCapture::new(settings, regions.len());
        let frame = Frame::uniform(0, 0.0, 8, 4, 0);
        assert!(matches!(capture.observe(&frame, &regions).unwrap(), Phase::Warmup { .. }));
        assert_eq!(capture.observe(&frame, &regions).unwrap(), Phase::Detecting);
        assert!(!capture.is_set(0));
    }

    #[test]
    fn out_of_frame_region_fails_capture() {
        let regions = regions();
        let settings = ReferenceSettings {
            discard_frames: 0,
            collect_frames: 1,
        };
        let mut capture = ReferenceCapture::new(settings, regions.len());
        let small = Frame::uniform(0, 0.0, 6, 4, 0);
        let err = capture.observe(&small, &regions).unwrap_err();
        assert!(matches!(err, KernelError::RegionOutOfFrame { id: 1, .. }));
    }

    #[test]
    fn calibration_percent() {
        assert_eq!(Phase::Calibrating { frame: 15, of: 30 }.percent(), 50);
        assert_eq!(Phase::Warmup { frame: 3, of: 20 }.percent(), 0);
        assert_eq!(Phase::Detecting.percent(), 100);
    }

    #[test]
    fn failed_capture_frame_does_not_count() {
        let regions = regions();
        let settings = ReferenceSettings {
            discard_frames: 0,
            collect_frames: 2,
        };
        let mut capture = ReferenceCapture::new(settings, regions.len());

        // Wide enough for region 0 only.
        let narrow = Frame::uniform(0, 0.0, 4, 4, 50);
        assert!(matches!(
            capture.observe(&narrow, &regions),
            Err(KernelError::RegionOutOfFrame { id: 1, .. })
        ));
        assert!(!capture.is_set(0));
        assert!(!capture.is_set(1));

        let full = Frame::uniform(1, 0.1, 8, 4, 70);
        assert_eq!(
            capture.observe(&full, &regions).unwrap(),
            Phase::Calibrating { frame: 1, of: 2 }
        );
        assert!(capture.snapshot(0).unwrap().pixels().all(|p| p.0[0] == 70));
        assert!(capture.is_set(1));
    }
}
