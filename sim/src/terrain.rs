//! Terrain queries used by the flight dynamics.
//!
//! The physics core only needs elevation and surface normal under a point.
//! [`HeightField`] is a grid heightmap with bilinear sampling; terrain
//! rendering and paging are somebody else's problem.

use bevy_ecs::prelude::*;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Elevation and normal lookups in local coordinates (X east, Y north, Z up).
pub trait Terrain {
    fn elevation(&self, x: f64, y: f64) -> f64;

    /// Unit surface normal at `(x, y)`.
    fn normal(&self, x: f64, y: f64) -> DVec3;
}

/// Infinite level plane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FlatTerrain {
    pub elevation: f64,
}

impl FlatTerrain {
    pub fn new(elevation: f64) -> Self {
        Self { elevation }
    }
}

impl Terrain for FlatTerrain {
    fn elevation(&self, _x: f64, _y: f64) -> f64 {
        self.elevation
    }

    fn normal(&self, _x: f64, _y: f64) -> DVec3 {
        DVec3::Z
    }
}

/// Grid-based heightmap centered on the local origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    /// Number of samples along X.
    pub width: usize,
    /// Number of samples along Y.
    pub height: usize,
    /// Distance between samples in meters.
    pub cell_size: f64,
    /// Local position of sample (0, 0).
    pub origin_x: f64,
    pub origin_y: f64,
    /// Elevations in row-major order.
    pub heights: Vec<f64>,
}

impl HeightField {
    /// Flat heightmap of `width x height` samples centered on the origin.
    pub fn new(width: usize, height: usize, cell_size: f64) -> Self {
        let width = width.max(2);
        let height = height.max(2);
        Self {
            width,
            height,
            cell_size,
            origin_x: -((width - 1) as f64 * cell_size) / 2.0,
            origin_y: -((height - 1) as f64 * cell_size) / 2.0,
            heights: vec![0.0; width * height],
        }
    }

    /// Build a heightmap by evaluating `f(x, y)` at every sample.
    pub fn from_fn(width: usize, height: usize, cell_size: f64, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut grid = Self::new(width, height, cell_size);
        for gy in 0..grid.height {
            for gx in 0..grid.width {
                let (x, y) = grid.sample_position(gx, gy);
                grid.heights[gy * grid.width + gx] = f(x, y);
            }
        }
        grid
    }

    /// Local position of a sample.
    pub fn sample_position(&self, gx: usize, gy: usize) -> (f64, f64) {
        (
            self.origin_x + gx as f64 * self.cell_size,
            self.origin_y + gy as f64 * self.cell_size,
        )
    }

    pub fn set_sample(&mut self, gx: usize, gy: usize, elevation: f64) {
        if gx < self.width && gy < self.height {
            self.heights[gy * self.width + gx] = elevation;
        }
    }

    #[inline]
    fn sample(&self, gx: usize, gy: usize) -> f64 {
        self.heights[gy * self.width + gx]
    }

    /// Bilinear elevation; positions outside the grid clamp to the edge.
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        let fx = ((x - self.origin_x) / self.cell_size).clamp(0.0, (self.width - 1) as f64);
        let fy = ((y - self.origin_y) / self.cell_size).clamp(0.0, (self.height - 1) as f64);
        let x0 = (fx.floor() as usize).min(self.width - 2);
        let y0 = (fy.floor() as usize).min(self.height - 2);
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let h00 = self.sample(x0, y0);
        let h10 = self.sample(x0 + 1, y0);
        let h01 = self.sample(x0, y0 + 1);
        let h11 = self.sample(x0 + 1, y0 + 1);
        let a = h00 * (1.0 - tx) + h10 * tx;
        let b = h01 * (1.0 - tx) + h11 * tx;
        a * (1.0 - ty) + b * ty
    }

    /// Central-difference normal from neighbouring samples.
    pub fn normal_at(&self, x: f64, y: f64) -> DVec3 {
        let d = self.cell_size;
        let dhdx = (self.height_at(x + d, y) - self.height_at(x - d, y)) / (2.0 * d);
        let dhdy = (self.height_at(x, y + d) - self.height_at(x, y - d)) / (2.0 * d);
        DVec3::new(-dhdx, -dhdy, 1.0).normalize()
    }

    /// World bounds as (min_x, min_y, max_x, max_y).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let max_x = self.origin_x + (self.width - 1) as f64 * self.cell_size;
        let max_y = self.origin_y + (self.height - 1) as f64 * self.cell_size;
        (self.origin_x, self.origin_y, max_x, max_y)
    }
}

impl Terrain for HeightField {
    fn elevation(&self, x: f64, y: f64) -> f64 {
        self.height_at(x, y)
    }

    fn normal(&self, x: f64, y: f64) -> DVec3 {
        self.normal_at(x, y)
    }
}

/// Resource wrapper so that terrain can be shared with ECS systems.
#[derive(Resource, Clone)]
pub struct TerrainResource(pub Arc<RwLock<HeightField>>);

impl TerrainResource {
    pub fn new(grid: HeightField) -> Self {
        Self(Arc::new(RwLock::new(grid)))
    }

    /// Flat terrain at sea level covering `extent` meters on a side.
    pub fn flat(extent: f64) -> Self {
        Self::new(HeightField::new(2, 2, extent))
    }
}

impl Terrain for TerrainResource {
    fn elevation(&self, x: f64, y: f64) -> f64 {
        self.0.read().map(|g| g.height_at(x, y)).unwrap_or(0.0)
    }

    fn normal(&self, x: f64, y: f64) -> DVec3 {
        self.0.read().map(|g| g.normal_at(x, y)).unwrap_or(DVec3::Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heightfield_centered() {
        let grid = HeightField::new(101, 101, 2.0);
        assert_eq!(grid.origin_x, -100.0);
        let (x, y) = grid.sample_position(50, 50);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn test_bilinear_on_slope() {
        let grid = HeightField::from_fn(11, 11, 10.0, |x, _| 0.1 * x);
        assert!((grid.height_at(12.5, 3.0) - 1.25).abs() < 1e-9);
        assert!((grid.height_at(-7.0, 40.0) + 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_slope_normal_tilts_downhill() {
        let grid = HeightField::from_fn(11, 11, 10.0, |x, _| 0.1 * x);
        let n = grid.normal_at(0.0, 0.0);
        assert!(n.x < 0.0);
        assert!(n.y.abs() < 1e-9);
        assert!((n.length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_outside_bounds_clamps() {
        let grid = HeightField::from_fn(5, 5, 1.0, |x, y| x + y);
        assert_eq!(grid.height_at(100.0, 100.0), 4.0);
        assert_eq!(grid.height_at(-100.0, -100.0), -4.0);
    }

    #[test]
    fn test_resource_reads_through_lock() {
        let res = TerrainResource::new(HeightField::from_fn(3, 3, 1.0, |_, _| 42.0));
        assert_eq!(res.elevation(0.0, 0.0), 42.0);
        assert_eq!(res.normal(0.0, 0.0), DVec3::Z);
    }

    #[test]
    fn test_flat_terrain() {
        let flat = FlatTerrain::new(-3.0);
        assert_eq!(flat.elevation(1.0e6, -1.0e6), -3.0);
        assert_eq!(flat.normal(0.0, 0.0), DVec3::Z);
    }
}
