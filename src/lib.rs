//! Parking Occupancy Kernel
//!
//! This crate classifies fixed regions of a video frame (parking spaces) as
//! vacant or occupied, and reports only transitions that persist.
//!
//! # Architecture
//!
//! The kernel holds these guarantees by construction:
//!
//! 1. **Immutable Geometry**: Regions, their boxes and masks never change after load.
//! 2. **Single-Shot Reference**: Each region's reference is captured once and never replaced.
//! 3. **Stream-Time Debounce**: Status flips only after a deviation lasts `detect_delay`
//!    of stream time, so replay at any speed gives the same result.
//! 4. **Consistent Counts**: Vacant plus occupied always equals the region count.
//! 5. **Between-Frame Control**: Sensitivity commands and stop requests apply at frame
//!    boundaries only.
//!
//! # Module Structure
//!
//! - `region`: Region geometry, masks and region-file loading
//! - `frame`: Grayscale frames and region crops
//! - `detect`: Texture/difference scoring and reference capture
//! - `occupancy`: Per-region debounce
//! - `aggregate`: Counts and history
//! - `engine`: The per-frame pipeline
//! - `runner`: Source-to-sink loop with commands and stop
//! - `ingest`: Frame sources (synthetic, image directories, video files)
//! - `config`, `ui`, `report`: Daemon configuration, console display, run summary

use thiserror::Error;

pub mod aggregate;
pub mod config;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod occupancy;
pub mod region;
pub mod report;
pub mod runner;
pub mod tuning;
pub mod ui;

pub use aggregate::{Aggregator, HistorySample, HistorySettings, OccupancyCounts};
pub use config::{ConfigOverrides, ParkingConfig};
pub use detect::{MetricEvaluator, MetricWeights, Phase, ReferenceSettings, RegionMetrics};
pub use engine::{EngineConfig, FrameReport, OccupancyEngine, RegionStatus, Transition};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats, SyntheticLot};
pub use occupancy::{DebounceState, Occupancy};
pub use region::{
    load_region_file, BoundingBox, Point, Region, RegionDefinition, RegionSet,
};
pub use report::{RegionSummary, RunSummary};
pub use runner::{control_channel, ControlHandle, NullSink, RunControl, RunEnd, RunStats, StatusSink};
pub use tuning::{Command, Sensitivity};

/// Failures at the library boundary.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A region definition cannot be turned into a usable polygon. The whole
    /// region set is rejected.
    #[error("invalid region {id}: {reason}")]
    InvalidRegion { id: u32, reason: String },

    /// A region's bounding box reaches past the frame edge.
    #[error("region {id} box {bbox} does not fit in a {frame_width}x{frame_height} frame")]
    RegionOutOfFrame {
        id: u32,
        bbox: BoundingBox,
        frame_width: u32,
        frame_height: u32,
    },

    /// The frame source failed mid-stream. Terminal for the run.
    #[error("frame read failed: {0:#}")]
    FrameRead(anyhow::Error),

    /// A frame arrived with a timestamp earlier than its predecessor (or not
    /// finite at all).
    #[error("frame timestamp {current}s precedes previous {previous}s")]
    TimestampRegression { previous: f64, current: f64 },
}
