//! Object picking and selection.
//!
//! Picking is done on the CPU: the cursor position is unprojected into a world
//! space ray which is then tested against the scene graph.
//!
//! The picking works as follows:
//! 1. Map the cursor to normalized device coordinates of the current viewport
//! 2. Unproject the near and far points through the inverse view-projection
//! 3. Reject meshes whose world bounding box misses the ray
//! 4. Test the remaining triangles and sort the hits by distance
//!
//! Step 3 keeps clicks on large scenes (the chess board and its 32 pieces)
//! cheap without any acceleration structure.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Transform, Vector3};

use crate::data_structures::scene_graph::NodeId;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    /// Always normalized.
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Unprojects a cursor position (physical pixels, origin top-left).
    ///
    /// Returns `None` for an empty viewport or a singular camera matrix.
    pub fn from_screen(
        cursor: (f64, f64),
        viewport: (u32, u32),
        view_proj: &Matrix4<f32>,
    ) -> Option<Self> {
        let (width, height) = viewport;
        if width == 0 || height == 0 {
            return None;
        }
        let x = (cursor.0 / width as f64) as f32 * 2.0 - 1.0;
        let y = 1.0 - (cursor.1 / height as f64) as f32 * 2.0;
        let inverse = view_proj.invert()?;
        // wgpu clip space depth runs from 0 (near) to 1 (far)
        let near = inverse.transform_point(Point3::new(x, y, 0.0));
        let far = inverse.transform_point(Point3::new(x, y, 1.0));
        let direction = far - near;
        if direction.magnitude2() <= f32::EPSILON {
            return None;
        }
        Some(Self::new(near, direction))
    }

    /// Möller–Trumbore ray/triangle test, both faces count.
    pub fn intersect_triangle(&self, a: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> Option<f32> {
        let edge1 = b - a;
        let edge2 = c - a;
        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);
        if det.abs() < 1e-8 {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = inv_det * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = inv_det * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = inv_det * edge2.dot(q);
        (t > 1e-6).then_some(t)
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// An inverted box that any point or box will grow.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn from_points(points: impl IntoIterator<Item = Point3<f32>>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand(p);
        }
        aabb
    }

    pub fn expand(&mut self, p: Point3<f32>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        out.expand(other.min);
        out.expand(other.max);
        out
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    /// Bounds of the eight transformed corners.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let (lo, hi) = (self.min, self.max);
        Aabb::from_points(
            [
                Point3::new(lo.x, lo.y, lo.z),
                Point3::new(hi.x, lo.y, lo.z),
                Point3::new(lo.x, hi.y, lo.z),
                Point3::new(lo.x, lo.y, hi.z),
                Point3::new(hi.x, hi.y, lo.z),
                Point3::new(hi.x, lo.y, hi.z),
                Point3::new(lo.x, hi.y, hi.z),
                Point3::new(hi.x, hi.y, hi.z),
            ]
            .into_iter()
            .map(|corner| matrix.transform_point(corner)),
        )
    }

    /// Slab test. Returns the entry distance, or the exit distance when the origin is inside.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        let origin = ray.origin.to_vec();
        for axis in 0..3 {
            let inv = 1.0 / ray.direction[axis];
            let t1 = (self.min[axis] - origin[axis]) * inv;
            let t2 = (self.max[axis] - origin[axis]) * inv;
            // NaN appears for rays parallel to a slab they start on; treat as inside
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            if !lo.is_nan() {
                t_near = t_near.max(lo);
            }
            if !hi.is_nan() {
                t_far = t_far.min(hi);
            }
        }
        if t_near <= t_far && t_far >= 0.0 {
            Some(if t_near >= 0.0 { t_near } else { t_far })
        } else {
            None
        }
    }
}

/// A ray hit against a mesh node, in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub node: NodeId,
    pub distance: f32,
    pub point: Point3<f32>,
}
