use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::laplacian::laplacian_abs;
use crate::region::Mask;

/// Default multiplier on the texture measure.
pub const DEFAULT_TEXTURE_WEIGHT: f64 = 0.3;
/// Default multiplier on the changed-pixel ratio.
pub const DEFAULT_DIFF_WEIGHT: f64 = 10.0;
/// Default absolute-difference level above which a pixel counts as changed.
pub const DEFAULT_DIFF_THRESHOLD: u8 = 30;

/// Weighting of the combined change score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub texture_weight: f64,
    pub diff_weight: f64,
    /// Intensity difference (0–255) a pixel must exceed to count as changed.
    pub diff_threshold: u8,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            texture_weight: DEFAULT_TEXTURE_WEIGHT,
            diff_weight: DEFAULT_DIFF_WEIGHT,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
        }
    }
}

/// Measurements behind one region's candidate status for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RegionMetrics {
    /// Mean absolute Laplacian over the masked pixels.
    pub texture: f64,
    /// Fraction of masked pixels that differ from the reference; `None` when
    /// the region has no reference yet.
    pub diff_ratio: Option<f64>,
    /// Value compared against the sensitivity threshold.
    pub score: f64,
}

impl RegionMetrics {
    /// Raw (undebounced) classification: occupied when the score is strictly
    /// above the threshold.
    pub fn is_occupied(&self, threshold: f64) -> bool {
        self.score > threshold
    }
}

/// Scores a region crop against its reference snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricEvaluator {
    weights: MetricWeights,
}

impl MetricEvaluator {
    pub fn new(weights: MetricWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &MetricWeights {
        &self.weights
    }

    /// Computes the change score of `current` (a bounding-box crop) restricted
    /// to `mask`.
    ///
    /// With a reference the score is `texture * texture_weight + diff_ratio *
    /// diff_weight`; without one it is the texture measure alone. Pure: the
    /// same inputs always give the same score.
    pub fn evaluate(
        &self,
        current: &GrayImage,
        reference: Option<&GrayImage>,
        mask: &Mask,
    ) -> RegionMetrics {
        debug_assert_eq!(current.dimensions(), (mask.width(), mask.height()));

        let covered = mask.covered();
        if covered == 0 {
            return RegionMetrics {
                texture: 0.0,
                diff_ratio: reference.map(|_| 0.0),
                score: 0.0,
            };
        }

        let cells = mask.cells();
        let laplacian = laplacian_abs(current);
        let texture_sum: f64 = laplacian
            .iter()
            .zip(cells)
            .filter(|(_, &inside)| inside)
            .map(|(v, _)| *v)
            .sum();
        let texture = texture_sum / covered as f64;

        let Some(reference) = reference else {
            return RegionMetrics {
                texture,
                diff_ratio: None,
                score: texture,
            };
        };
        debug_assert_eq!(current.dimensions(), reference.dimensions());

        let changed = current
            .as_raw()
            .iter()
            .zip(reference.as_raw())
            .zip(cells)
            .filter(|((cur, refp), &inside)| inside && cur.abs_diff(**refp) > self.weights.diff_threshold)
            .count();
        let diff_ratio = changed as f64 / covered as f64;

        RegionMetrics {
            texture,
            diff_ratio: Some(diff_ratio),
            score: texture * self.weights.texture_weight + diff_ratio * self.weights.diff_weight,
        }
    }
}
