//! Per-region change scoring.
//!
//! - `laplacian`: texture filter over a region crop
//! - `metric`: combined texture + reference-difference score
//! - `reference`: one-shot reference snapshots and the capture phases

mod laplacian;
mod metric;
mod reference;

pub(crate) use laplacian::reflect_101;
pub use laplacian::laplacian_abs;
pub use metric::{
    MetricEvaluator, MetricWeights, RegionMetrics, DEFAULT_DIFF_THRESHOLD, DEFAULT_DIFF_WEIGHT,
    DEFAULT_TEXTURE_WEIGHT,
};
pub use reference::{
    Phase, ReferenceCapture, ReferenceSettings, DEFAULT_COLLECT_FRAMES, DEFAULT_DISCARD_FRAMES,
};
