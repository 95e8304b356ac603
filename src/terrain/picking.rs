use glam::Vec3;

use super::heightmap::{is_valid_height, HeightmapPyramid};

pub const MAX_PICK_CHECKS: usize = 500;

// Below this the ray is treated as parallel to a triangle.
const EPSILON: f32 = 1e-6;

/// Intersects rays with level 0 of a heightmap pyramid.
///
/// The ray is walked across the sample grid cell by cell; each cell is split
/// into two triangles and tested exactly. Cells with a missing corner are
/// skipped.
#[derive(Clone, Copy, Debug)]
pub struct TerrainPicker {
    scale: Vec3,
    max_checks: usize,
}

impl TerrainPicker {
    pub fn new(scale: Vec3) -> Self {
        Self {
            scale,
            max_checks: MAX_PICK_CHECKS,
        }
    }

    /// Cells visited before the walk gives up.
    pub fn with_max_checks(mut self, max_checks: usize) -> Self {
        self.max_checks = max_checks;
        self
    }

    pub fn max_checks(&self) -> usize {
        self.max_checks
    }

    /// First point where the ray from `origin` along `direction` meets the
    /// surface, in world space.
    pub fn pick(&self, pyramid: &dyn HeightmapPyramid, origin: Vec3, direction: Vec3) -> Option<Vec3> {
        let direction = direction.try_normalize()?;

        // Walk in sample space.
        let px = origin.x / self.scale.x;
        let pz = origin.z / self.scale.z;
        let dx = direction.x / self.scale.x;
        let dz = direction.z / self.scale.z;

        let mut cell = (px.floor() as i32, pz.floor() as i32);
        let step = (dx.signum() as i32, dz.signum() as i32);
        let t_delta = (
            if dx != 0.0 { (1.0 / dx).abs() } else { f32::INFINITY },
            if dz != 0.0 { (1.0 / dz).abs() } else { f32::INFINITY },
        );
        let boundary = |p: f32, cell: i32, d: f32| {
            if d > 0.0 {
                (cell as f32 + 1.0 - p) / d
            } else if d < 0.0 {
                (cell as f32 - p) / d
            } else {
                f32::INFINITY
            }
        };
        let mut t_max = (boundary(px, cell.0, dx), boundary(pz, cell.1, dz));
        let mut stepped_x = true;

        for _ in 0..self.max_checks {
            if let Some(hit) = self.check_cell(pyramid, cell.0, cell.1, origin, direction) {
                return Some(hit);
            }
            // The walk can land one cell short of the surface it crosses.
            let neighbour = if stepped_x {
                (cell.0, cell.1.saturating_add(1))
            } else {
                (cell.0.saturating_add(1), cell.1)
            };
            if let Some(hit) = self.check_cell(pyramid, neighbour.0, neighbour.1, origin, direction) {
                return Some(hit);
            }

            if t_max.0.is_infinite() && t_max.1.is_infinite() {
                // Vertical ray: only the cell under the origin can be hit.
                return None;
            }
            if t_max.0 < t_max.1 {
                cell.0 = cell.0.saturating_add(step.0);
                t_max.0 += t_delta.0;
                stepped_x = true;
            } else {
                cell.1 = cell.1.saturating_add(step.1);
                t_max.1 += t_delta.1;
                stepped_x = false;
            }
        }
        None
    }

    fn check_cell(
        &self,
        pyramid: &dyn HeightmapPyramid,
        x: i32,
        z: i32,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<Vec3> {
        let corner = |cx: i32, cz: i32| {
            let height = pyramid.height(0, cx, cz);
            is_valid_height(height).then(|| {
                Vec3::new(
                    cx as f32 * self.scale.x,
                    height * self.scale.y,
                    cz as f32 * self.scale.z,
                )
            })
        };
        let (nx, nz) = (x.saturating_add(1), z.saturating_add(1));
        let a = corner(x, z)?;
        let b = corner(x, nz)?;
        let c = corner(nx, z)?;
        let d = corner(nx, nz)?;

        intersect_triangle(origin, direction, a, b, c)
            .or_else(|| intersect_triangle(origin, direction, c, b, d))
            .map(|t| origin + direction * t)
    }
}

/// Möller–Trumbore, both faces. Returns the distance along the ray.
fn intersect_triangle(origin: Vec3, direction: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}
