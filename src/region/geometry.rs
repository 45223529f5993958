use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer point in full-frame pixel coordinates.
///
/// Serialized as a two-element `[x, y]` sequence, the shape region files use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned pixel rectangle. `width`/`height` count pixels, so a box whose
/// corners are `(0, 0)` and `(10, 10)` is 11 × 11.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Tightest box around `points`. Returns `None` for an empty slice or when a
    /// point has a negative coordinate.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if min_x < 0 || min_y < 0 {
            return None;
        }
        Some(Self {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x) as u32 + 1,
            height: (max_y - min_y) as u32 + 1,
        })
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the whole box lies inside a `frame_width` × `frame_height` image.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.right() <= frame_width && self.bottom() <= frame_height
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Twice the signed area of the polygon (shoelace formula).
pub(crate) fn doubled_area(polygon: &[Point]) -> i64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum()
}

/// Sign of the turn `p -> q -> r`: positive counter-clockwise, negative
/// clockwise, zero collinear.
fn orientation(p: Point, q: Point, r: Point) -> i64 {
    (q.x as i64 - p.x as i64) * (r.y as i64 - p.y as i64)
        - (q.y as i64 - p.y as i64) * (r.x as i64 - p.x as i64)
}

/// `q` lies on the closed segment `p..r` (assuming collinearity already holds).
fn within_span(p: Point, q: Point, r: Point) -> bool {
    q.x >= p.x.min(r.x) && q.x <= p.x.max(r.x) && q.y >= p.y.min(r.y) && q.y <= p.y.max(r.y)
}

/// True when `q` lies on the closed segment `a..b`.
pub(crate) fn on_segment(a: Point, b: Point, q: Point) -> bool {
    orientation(a, b, q) == 0 && within_span(a, q, b)
}

/// Closed-segment intersection test, touching endpoints included.
pub(crate) fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1.signum() * o2.signum() < 0 && o3.signum() * o4.signum() < 0 {
        return true;
    }
    (o1 == 0 && within_span(a1, b1, a2))
        || (o2 == 0 && within_span(a1, b2, a2))
        || (o3 == 0 && within_span(b1, a1, b2))
        || (o4 == 0 && within_span(b1, a2, b2))
}

/// Finds the first pair of edges that cross or overlap, returning their
/// starting vertex indices.
///
/// Adjacent edges share a vertex by construction, so they only count when they
/// fold back over each other.
pub(crate) fn find_self_intersection(polygon: &[Point]) -> Option<(usize, usize)> {
    let n = polygon.len();
    let edge = |i: usize| (polygon[i], polygon[(i + 1) % n]);

    for i in 0..n {
        let (a1, a2) = edge(i);
        for j in (i + 1)..n {
            let (b1, b2) = edge(j);
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                // Shared vertex is a2 == b1 (or b2 == a1 for the wrap-around pair).
                let (shared, a_far, b_far) = if j == i + 1 { (a2, a1, b2) } else { (a1, a2, b1) };
                if orientation(a_far, shared, b_far) == 0 {
                    // Collinear neighbours overlap when they point back at each other.
                    let dot = (a_far.x as i64 - shared.x as i64) * (b_far.x as i64 - shared.x as i64)
                        + (a_far.y as i64 - shared.y as i64) * (b_far.y as i64 - shared.y as i64);
                    if dot > 0 {
                        return Some((i, j));
                    }
                }
                continue;
            }
            if segments_intersect(a1, a2, b1, b2) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Even-odd containment test with the boundary counted as inside.
pub(crate) fn contains_point(polygon: &[Point], q: Point) -> bool {
    let n = polygon.len();
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if on_segment(a, b, q) {
            return true;
        }
        // Half-open rule on y keeps shared vertices from being counted twice.
        if (a.y > q.y) != (b.y > q.y) {
            let dy = (b.y - a.y) as f64;
            let x_cross = a.x as f64 + (q.y - a.y) as f64 * (b.x - a.x) as f64 / dy;
            if (q.x as f64) < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
