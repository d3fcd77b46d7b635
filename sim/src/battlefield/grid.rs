//! Quantized 2D coordinates for the battlefield indices.
//!
//! Global positions (meters, X east, Y north) are mapped onto a square
//! integer grid of side [`GRID_EXTENT`]. The grid point `(0, 0)` is reserved
//! as the null point: a unit sitting there is not part of the battlefield.
//! Valid positions are clamped to `[1, GRID_EXTENT - 1]` so the null point
//! is never produced by a real position.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Side length of the grid in grid units.
pub const GRID_EXTENT: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: u32,
    pub y: u32,
}

impl GridPoint {
    pub const NULL: GridPoint = GridPoint { x: 0, y: 0 };

    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Squared Euclidean distance in grid units.
    #[inline]
    pub fn distance2(&self, other: GridPoint) -> u64 {
        let dx = self.x.abs_diff(other.x) as u64;
        let dy = self.y.abs_diff(other.y) as u64;
        dx * dx + dy * dy
    }

    /// Chebyshev distance, used for the re-bucketing hysteresis.
    #[inline]
    pub fn chebyshev(&self, other: GridPoint) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Whether two circles (centers and radii in grid units) overlap.
pub fn circles_overlap(a: GridPoint, ra: u32, b: GridPoint, rb: u32) -> bool {
    let r = ra as u64 + rb as u64;
    a.distance2(b) <= r * r
}

/// Whether `p` lies inside the circle of radius `r` around `center`.
#[inline]
pub fn in_circle(p: GridPoint, center: GridPoint, r: u32) -> bool {
    p.distance2(center) <= (r as u64) * (r as u64)
}

/// Squared horizontal distance between two global positions.
#[inline]
pub fn global_distance2(a: DVec3, b: DVec3) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Linear map between global meters and grid units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridTransform {
    /// Grid units per meter.
    scale: f64,
    /// Global coordinate of the grid origin, negated.
    offset: f64,
}

impl GridTransform {
    /// Fit a square world of side `world_size` (centered on the origin) plus
    /// `margin` on every side into the grid.
    pub fn new(world_size: f64, margin: f64) -> Self {
        let span = (world_size + 2.0 * margin).max(1.0);
        Self { scale: GRID_EXTENT as f64 / span, offset: span / 2.0 }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Size of one grid unit in meters.
    pub fn resolution(&self) -> f64 {
        1.0 / self.scale
    }

    #[inline]
    fn axis_to_grid(&self, v: f64) -> u32 {
        let g = ((v + self.offset) * self.scale).floor();
        g.clamp(1.0, (GRID_EXTENT - 1) as f64) as u32
    }

    #[inline]
    fn axis_to_global(&self, g: u32) -> f64 {
        (g as f64 + 0.5) / self.scale - self.offset
    }

    pub fn global_to_grid(&self, p: DVec3) -> GridPoint {
        GridPoint::new(self.axis_to_grid(p.x), self.axis_to_grid(p.y))
    }

    /// Center of the grid cell, at zero altitude.
    pub fn grid_to_global(&self, g: GridPoint) -> DVec3 {
        DVec3::new(self.axis_to_global(g.x), self.axis_to_global(g.y), 0.0)
    }

    /// Convert a distance in meters to grid units, rounding up.
    pub fn to_grid_distance(&self, meters: f64) -> u32 {
        (meters.max(0.0) * self.scale).ceil().min(GRID_EXTENT as f64) as u32
    }
}

impl Default for GridTransform {
    fn default() -> Self {
        Self::new(200_000.0, 10_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_one_unit() {
        let t = GridTransform::new(100_000.0, 5_000.0);
        let unit = t.resolution();
        for &(x, y) in &[(0.0, 0.0), (49_999.0, -49_999.0), (-12_345.6, 7_890.1), (3.3, -0.4)] {
            let p = DVec3::new(x, y, 0.0);
            let back = t.grid_to_global(t.global_to_grid(p));
            assert!((back.x - x).abs() < unit);
            assert!((back.y - y).abs() < unit);
        }
    }

    #[test]
    fn test_null_point_never_produced() {
        let t = GridTransform::new(1000.0, 0.0);
        let g = t.global_to_grid(DVec3::new(-1.0e9, -1.0e9, 0.0));
        assert!(!g.is_null());
        assert_eq!(g, GridPoint::new(1, 1));
        let far = t.global_to_grid(DVec3::new(1.0e9, 1.0e9, 0.0));
        assert_eq!(far, GridPoint::new(GRID_EXTENT - 1, GRID_EXTENT - 1));
    }

    #[test]
    fn test_origin_maps_to_center() {
        let t = GridTransform::new(1024.0, 0.0);
        assert_eq!(t.global_to_grid(DVec3::ZERO), GridPoint::new(GRID_EXTENT / 2, GRID_EXTENT / 2));
    }

    #[test]
    fn test_monotonic() {
        let t = GridTransform::default();
        let mut last = 0;
        for i in -100..100 {
            let g = t.global_to_grid(DVec3::new(i as f64 * 37.0, 0.0, 0.0));
            assert!(g.x >= last);
            last = g.x;
        }
    }

    #[test]
    fn test_distances() {
        let a = GridPoint::new(10, 10);
        let b = GridPoint::new(13, 14);
        assert_eq!(a.distance2(b), 25);
        assert_eq!(a.chebyshev(b), 4);
        assert!(in_circle(b, a, 5));
        assert!(!in_circle(b, a, 4));
        assert!(circles_overlap(a, 2, b, 3));
        assert!(!circles_overlap(a, 2, b, 2));
        assert_eq!(global_distance2(DVec3::new(3.0, 4.0, 100.0), DVec3::ZERO), 25.0);
    }

    #[test]
    fn test_distance_conversion() {
        let t = GridTransform::new(1024.0, 0.0);
        assert_eq!(t.to_grid_distance(10.0), 10_240);
        assert_eq!(t.to_grid_distance(5000.0), GRID_EXTENT);
        assert_eq!(t.to_grid_distance(-5.0), 0);
    }
}
