use super::geometry::{contains_point, BoundingBox, Point};

/// Boolean coverage grid of a polygon in bounding-box-local coordinates.
///
/// Row-major, `width * height` cells. Coordinates outside the grid are
/// implicitly uncovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
    covered: usize,
}

impl Mask {
    /// Rasterizes `polygon` (full-frame coordinates) into the grid spanned by
    /// `bbox`. A pixel is covered when its integer position lies inside the
    /// polygon or on its outline.
    pub fn rasterize(polygon: &[Point], bbox: &BoundingBox) -> Self {
        let mut cells = Vec::with_capacity(bbox.area());
        for ly in 0..bbox.height {
            for lx in 0..bbox.width {
                let q = Point::new((bbox.x + lx) as i32, (bbox.y + ly) as i32);
                cells.push(contains_point(polygon, q));
            }
        }
        let covered = cells.iter().filter(|&&c| c).count();
        Self {
            width: bbox.width,
            height: bbox.height,
            cells,
            covered,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Coverage at box-local `(x, y)`; false outside the grid.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.cells[y as usize * self.width as usize + x as usize]
    }

    /// Number of covered pixels.
    pub fn covered(&self) -> usize {
        self.covered
    }

    /// Row-major coverage cells, aligned with the pixels of a box-sized crop.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(i32, i32)]) -> Vec<Point> {
        raw.iter().copied().map(Point::from).collect()
    }

    #[test]
    fn square_covers_whole_box() {
        let square = pts(&[(0, 0), (10, 0), (10, 10), (0, 10)]);
        let bbox = BoundingBox::enclosing(&square).unwrap();
        let mask = Mask::rasterize(&square, &bbox);
        assert_eq!(mask.covered(), 121);
        assert!(mask.cells().iter().all(|&c| c));
    }

    #[test]
    fn offset_triangle_covers_half_plane() {
        let tri = pts(&[(20, 30), (30, 30), (20, 40)]);
        let bbox = BoundingBox::enclosing(&tri).unwrap();
        let mask = Mask::rasterize(&tri, &bbox);
        assert_eq!((mask.width(), mask.height()), (11, 11));
        // Box-local (0,0) is the right-angle corner.
        assert!(mask.contains(0, 0));
        assert!(mask.contains(3, 3));
        assert!(mask.contains(5, 5));
        assert!(!mask.contains(6, 6));
        assert!(!mask.contains(10, 10));
        // Cells on or under the hypotenuse x + y <= 10.
        assert_eq!(mask.covered(), 66);
    }

    #[test]
    fn outside_grid_is_uncovered() {
        let square = pts(&[(0, 0), (3, 0), (3, 3), (0, 3)]);
        let bbox = BoundingBox::enclosing(&square).unwrap();
        let mask = Mask::rasterize(&square, &bbox);
        assert!(!mask.contains(-1, 0));
        assert!(!mask.contains(0, 4));
        assert!(!mask.contains(4, 4));
    }
}
