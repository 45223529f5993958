//! Parking-space regions.
//!
//! A `Region` is built once from an externally supplied definition and never
//! changes afterwards:
//! - `polygon`: the outline in full-frame coordinates
//! - `bounding_box`: the tight pixel box around the outline
//! - `mask`: which pixels of that box lie inside the outline
//!
//! Region sets are all-or-nothing. One bad definition rejects the whole set,
//! so a run never monitors a partial lot.

mod geometry;
mod loader;
mod mask;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::KernelError;

pub use geometry::{BoundingBox, Point};
pub use loader::{load_region_file, parse_region_document, RegionFormat};
pub use mask::Mask;

/// Minimum vertex count for a rasterizable outline.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Largest bounding box a region may span (an 8K frame).
pub const MAX_REGION_PIXELS: u64 = 7680 * 4320;

/// One region record as it appears in a region file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    pub id: u32,
    #[serde(flatten)]
    pub shape: RegionShape,
}

/// Outline of a region record: an explicit polygon, or the two-corner
/// rectangle shorthand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionShape {
    Polygon { coordinates: Vec<Point> },
    Rect { rect: [i32; 4] },
}

impl RegionDefinition {
    pub fn polygon(id: u32, coordinates: Vec<Point>) -> Self {
        Self {
            id,
            shape: RegionShape::Polygon { coordinates },
        }
    }

    /// Rectangle from two opposite corners, in any order.
    pub fn rect(id: u32, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            id,
            shape: RegionShape::Rect {
                rect: [x1, y1, x2, y2],
            },
        }
    }

    /// Outline vertices. The rectangle shorthand expands clockwise from the
    /// top-left corner.
    pub fn outline(&self) -> Vec<Point> {
        match &self.shape {
            RegionShape::Polygon { coordinates } => coordinates.clone(),
            RegionShape::Rect { rect: [x1, y1, x2, y2] } => {
                let (left, right) = (*x1.min(x2), *x1.max(x2));
                let (top, bottom) = (*y1.min(y2), *y1.max(y2));
                vec![
                    Point::new(left, top),
                    Point::new(right, top),
                    Point::new(right, bottom),
                    Point::new(left, bottom),
                ]
            }
        }
    }
}

/// Immutable geometry of one parking space.
#[derive(Clone, Debug)]
pub struct Region {
    id: u32,
    polygon: Vec<Point>,
    bounding_box: BoundingBox,
    mask: Mask,
}

impl Region {
    pub fn new(id: u32, polygon: Vec<Point>) -> Result<Self, KernelError> {
        let invalid = |reason: String| KernelError::InvalidRegion { id, reason };

        if polygon.len() < MIN_POLYGON_POINTS {
            return Err(invalid(format!(
                "polygon has {} points, need at least {}",
                polygon.len(),
                MIN_POLYGON_POINTS
            )));
        }
        let n = polygon.len();
        if let Some(i) = (0..n).find(|&i| polygon[i] == polygon[(i + 1) % n]) {
            return Err(invalid(format!("vertex {} repeats its neighbour", i)));
        }
        let bounding_box = BoundingBox::enclosing(&polygon)
            .ok_or_else(|| invalid("polygon has negative coordinates".to_string()))?;
        let box_pixels = u64::from(bounding_box.width) * u64::from(bounding_box.height);
        if box_pixels > MAX_REGION_PIXELS {
            return Err(invalid(format!(
                "bounding box too large: {} spans {} pixels, limit {}",
                bounding_box, box_pixels, MAX_REGION_PIXELS
            )));
        }
        if geometry::doubled_area(&polygon) == 0 {
            return Err(invalid("polygon encloses no area".to_string()));
        }
        if let Some((a, b)) = geometry::find_self_intersection(&polygon) {
            return Err(invalid(format!("edges {} and {} intersect", a, b)));
        }

        let mask = Mask::rasterize(&polygon, &bounding_box);
        if mask.covered() == 0 {
            return Err(invalid("mask rasterized to zero pixels".to_string()));
        }

        Ok(Self {
            id,
            polygon,
            bounding_box,
            mask,
        })
    }

    pub fn from_definition(def: &RegionDefinition) -> Result<Self, KernelError> {
        Self::new(def.id, def.outline())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Human-facing space number (spaces are numbered from 1).
    pub fn label(&self) -> u32 {
        self.id + 1
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }
}

/// Ordered collection of regions. Positions follow input order and index the
/// per-region state arrays held by the engine.
#[derive(Clone, Debug, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    positions: HashMap<u32, usize>,
}

impl RegionSet {
    /// Builds every region or none.
    pub fn from_definitions(defs: &[RegionDefinition]) -> Result<Self, KernelError> {
        let mut set = Self::default();
        for def in defs {
            if set.positions.contains_key(&def.id) {
                return Err(KernelError::InvalidRegion {
                    id: def.id,
                    reason: "duplicate region id".to_string(),
                });
            }
            let region = Region::from_definition(def)?;
            set.positions.insert(region.id, set.regions.len());
            set.regions.push(region);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: u32) -> Option<&Region> {
        self.position(id).map(|pos| &self.regions[pos])
    }

    /// Input-order position of the region with `id`.
    pub fn position(&self, id: u32) -> Option<usize> {
        self.positions.get(&id).copied()
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(i32, i32)]) -> Vec<Point> {
        raw.iter().copied().map(Point::from).collect()
    }

    #[test]
    fn square_region_builds_box_and_mask() {
        let region = Region::new(0, pts(&[(0, 0), (10, 0), (10, 10), (0, 10)])).unwrap();
        assert_eq!(region.label(), 1);
        assert_eq!(
            *region.bounding_box(),
            BoundingBox { x: 0, y: 0, width: 11, height: 11 }
        );
        assert_eq!(region.mask().covered(), 121);
    }

    #[test]
    fn too_few_points_is_invalid() {
        let err = Region::new(4, pts(&[(0, 0), (5, 5)])).unwrap_err();
        assert!(matches!(err, KernelError::InvalidRegion { id: 4, .. }));
    }

    #[test]
    fn self_intersecting_polygon_is_flagged_not_fixed() {
        let err = Region::new(1, pts(&[(0, 0), (10, 10), (10, 0), (0, 10)])).unwrap_err();
        match err {
            KernelError::InvalidRegion { id, reason } => {
                assert_eq!(id, 1);
                assert!(reason.contains("intersect"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn degenerate_polygons_are_invalid() {
        assert!(Region::new(0, pts(&[(0, 0), (5, 5), (10, 10)])).is_err());
        assert!(Region::new(0, pts(&[(0, 0), (0, 0), (5, 0), (5, 5)])).is_err());
        assert!(Region::new(0, pts(&[(-2, 0), (5, 0), (5, 5), (0, 5)])).is_err());
    }

    #[test]
    fn rect_shorthand_expands_to_corners() {
        let def = RegionDefinition::rect(3, 40, 12, 10, 2);
        assert_eq!(def.outline(), pts(&[(10, 2), (40, 2), (40, 12), (10, 12)]));
        let region = Region::from_definition(&def).unwrap();
        assert_eq!(
            *region.bounding_box(),
            BoundingBox { x: 10, y: 2, width: 31, height: 11 }
        );
    }

    #[test]
    fn region_set_preserves_order_and_rejects_duplicates() {
        let defs = vec![
            RegionDefinition::rect(7, 0, 0, 4, 4),
            RegionDefinition::rect(2, 10, 0, 14, 4),
        ];
        let set = RegionSet::from_definitions(&defs).unwrap();
        let ids: Vec<u32> = set.iter().map(Region::id).collect();
        assert_eq!(ids, vec![7, 2]);
        assert_eq!(set.position(2), Some(1));

        let dup = vec![
            RegionDefinition::rect(1, 0, 0, 4, 4),
            RegionDefinition::rect(1, 10, 0, 14, 4),
        ];
        assert!(RegionSet::from_definitions(&dup).is_err());
    }

    #[test]
    fn oversized_box_is_rejected_before_rasterizing() {
        let err = Region::from_definition(&RegionDefinition::rect(9, 0, 0, i32::MAX, i32::MAX))
            .unwrap_err();
        match err {
            KernelError::InvalidRegion { id, reason } => {
                assert_eq!(id, 9);
                assert!(reason.contains("bounding box too large"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // A single typo in a lot file takes the whole set down with it.
        let defs = vec![
            RegionDefinition::rect(0, 0, 0, 4, 4),
            RegionDefinition::rect(1, 10, 0, 100_000, 100_000),
        ];
        assert!(matches!(
            RegionSet::from_definitions(&defs),
            Err(KernelError::InvalidRegion { id: 1, .. })
        ));

        // 8K-wide boxes are still fine.
        assert!(Region::from_definition(&RegionDefinition::rect(2, 0, 0, 7679, 9)).is_ok());
    }

    #[test]
    fn one_bad_definition_rejects_the_set() {
        let defs = vec![
            RegionDefinition::rect(0, 0, 0, 4, 4),
            RegionDefinition::polygon(1, pts(&[(0, 0), (1, 1)])),
        ];
        assert!(RegionSet::from_definitions(&defs).is_err());
    }

    #[test]
    fn empty_set_is_valid() {
        let set = RegionSet::from_definitions(&[]).unwrap();
        assert!(set.is_empty());
    }
}
