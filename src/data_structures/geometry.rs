//! CPU-side triangle and line geometry.
//!
//! Every builder returns a plain [`Geometry`]: positions, normals, texture
//! coordinates, optional vertex colours and a `u32` index list. Texture
//! coordinates use the wgpu convention (v grows downwards). Geometries carry a
//! process-wide id so the renderer can upload each one exactly once.

use std::{
    collections::HashSet,
    f32::consts::{PI, TAU},
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use cgmath::{EuclideanSpace, InnerSpace, Matrix3, Matrix4, Point2, Point3, Rad, Transform, Vector3};

use crate::{data_structures::skin::SkinWeights, pick::Aabb};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out ids shared by geometries and textures.
pub fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A parametric curve mapping `t` in `0..=1` to a point.
pub type Curve<'a> = &'a dyn Fn(f32) -> Point3<f32>;

/// Samples `divisions + 1` evenly spaced points along a curve.
pub fn sample_curve(curve: Curve, divisions: usize) -> Vec<Point3<f32>> {
    let divisions = divisions.max(1);
    (0..=divisions)
        .map(|i| curve(i as f32 / divisions as f32))
        .collect()
}

#[derive(Debug)]
pub struct Geometry {
    id: u64,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u32>,
    /// Joint influences of a skinned mesh.
    pub skin: Option<SkinWeights>,
    bounds: OnceLock<Aabb>,
}

impl Clone for Geometry {
    fn clone(&self) -> Self {
        // A clone is a new resource as far as the GPU cache is concerned
        let mut copy = Self::new(
            self.positions.clone(),
            self.normals.clone(),
            self.uvs.clone(),
            self.colors.clone(),
            self.indices.clone(),
        );
        copy.skin = self.skin.clone();
        copy
    }
}

impl Geometry {
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        uvs: Vec<[f32; 2]>,
        colors: Option<Vec<[f32; 3]>>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            id: next_resource_id(),
            positions,
            normals,
            uvs,
            colors,
            indices,
            skin: None,
            bounds: OnceLock::new(),
        }
    }

    pub fn with_skin(mut self, skin: SkinWeights) -> Self {
        self.skin = Some(skin);
        self
    }

    /// Hand written attribute buffers. Normals are derived from the triangles when absent.
    pub fn from_buffers(
        positions: Vec<[f32; 3]>,
        normals: Option<Vec<[f32; 3]>>,
        colors: Option<Vec<[f32; 3]>>,
        uvs: Option<Vec<[f32; 2]>>,
        indices: Option<Vec<u32>>,
    ) -> Self {
        let indices = indices.unwrap_or_else(|| (0..positions.len() as u32).collect());
        let uvs = uvs.unwrap_or_else(|| vec![[0.0; 2]; positions.len()]);
        let has_normals = normals.is_some();
        let mut geometry = Self::new(positions, normals.unwrap_or_default(), uvs, colors, indices);
        if !has_normals {
            geometry.compute_vertex_normals();
        }
        geometry
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f32>; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                Point3::from(self.positions[tri[0] as usize]),
                Point3::from(self.positions[tri[1] as usize]),
                Point3::from(self.positions[tri[2] as usize]),
            ]
        })
    }

    pub fn bounding_box(&self) -> Aabb {
        *self
            .bounds
            .get_or_init(|| Aabb::from_points(self.positions.iter().map(|p| Point3::from(*p))))
    }

    /// Moves every vertex; the cached bounds are reset.
    pub fn translate(&mut self, offset: Vector3<f32>) {
        for p in self.positions.iter_mut() {
            p[0] += offset.x;
            p[1] += offset.y;
            p[2] += offset.z;
        }
        self.bounds = OnceLock::new();
    }

    /// Centers the geometry on its bounding box.
    pub fn center(&mut self) {
        let center = self.bounding_box().center();
        self.translate(-center.to_vec());
    }

    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let a = Point3::from(self.positions[tri[0] as usize]);
            let b = Point3::from(self.positions[tri[1] as usize]);
            let c = Point3::from(self.positions[tri[2] as usize]);
            let face = (b - a).cross(c - a);
            for &i in tri {
                normals[i as usize] += face;
            }
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > f32::EPSILON {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }

    pub fn box_geometry(width: f32, height: f32, depth: f32) -> Self {
        let half = Vector3::new(width / 2.0, height / 2.0, depth / 2.0);
        // (normal, right, up) with right x up == normal so each face winds CCW from outside
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, right, up) in faces {
            let (n, r, u) = (Vector3::from(normal), Vector3::from(right), Vector3::from(up));
            let base = positions.len() as u32;
            for (s, t) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = n + r * s + u * t;
                positions.push([p.x * half.x, p.y * half.y, p.z * half.z]);
                normals.push(normal);
                uvs.push([(s + 1.0) / 2.0, 1.0 - (t + 1.0) / 2.0]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(positions, normals, uvs, None, indices)
    }

    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        Self::sphere_section(radius, width_segments, height_segments, 0.0, TAU, 0.0, PI)
    }

    /// A sphere, or a slice of one when the phi/theta ranges are narrowed.
    pub fn sphere_section(
        radius: f32,
        width_segments: u32,
        height_segments: u32,
        phi_start: f32,
        phi_length: f32,
        theta_start: f32,
        theta_length: f32,
    ) -> Self {
        let ws = width_segments.max(3);
        let hs = height_segments.max(2);
        let theta_end = (theta_start + theta_length).min(PI);
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for iy in 0..=hs {
            let v = iy as f32 / hs as f32;
            for ix in 0..=ws {
                let u = ix as f32 / ws as f32;
                let phi = phi_start + u * phi_length;
                let theta = theta_start + v * theta_length;
                let p = Vector3::new(
                    -radius * phi.cos() * theta.sin(),
                    radius * theta.cos(),
                    radius * phi.sin() * theta.sin(),
                );
                positions.push(p.into());
                let n = if p.magnitude2() > 0.0 { p.normalize() } else { Vector3::unit_y() };
                normals.push(n.into());
                uvs.push([u, v]);
            }
        }
        let row = ws + 1;
        let mut indices = Vec::new();
        for iy in 0..hs {
            for ix in 0..ws {
                let a = iy * row + ix + 1;
                let b = iy * row + ix;
                let c = (iy + 1) * row + ix;
                let d = (iy + 1) * row + ix + 1;
                if iy != 0 || theta_start > 0.0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != hs - 1 || theta_end < PI {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }
        Self::new(positions, normals, uvs, None, indices)
    }

    /// A plane in the XY plane facing +Z.
    pub fn plane(width: f32, height: f32, width_segments: u32, height_segments: u32) -> Self {
        let gx = width_segments.max(1);
        let gy = height_segments.max(1);
        let seg_w = width / gx as f32;
        let seg_h = height / gy as f32;
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for iy in 0..=gy {
            let y = iy as f32 * seg_h - height / 2.0;
            for ix in 0..=gx {
                let x = ix as f32 * seg_w - width / 2.0;
                positions.push([x, -y, 0.0]);
                normals.push([0.0, 0.0, 1.0]);
                uvs.push([ix as f32 / gx as f32, iy as f32 / gy as f32]);
            }
        }
        let row = gx + 1;
        let mut indices = Vec::new();
        for iy in 0..gy {
            for ix in 0..gx {
                let a = ix + row * iy;
                let b = ix + row * (iy + 1);
                let c = ix + 1 + row * (iy + 1);
                let d = ix + 1 + row * iy;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }
        Self::new(positions, normals, uvs, None, indices)
    }

    pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32, arc: f32) -> Self {
        let radial = radial_segments.max(2);
        let tubular = tubular_segments.max(3);
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for j in 0..=radial {
            for i in 0..=tubular {
                let u = i as f32 / tubular as f32 * arc;
                let v = j as f32 / radial as f32 * TAU;
                let p = Vector3::new(
                    (radius + tube * v.cos()) * u.cos(),
                    (radius + tube * v.cos()) * u.sin(),
                    tube * v.sin(),
                );
                let center = Vector3::new(radius * u.cos(), radius * u.sin(), 0.0);
                positions.push(p.into());
                normals.push((p - center).normalize().into());
                uvs.push([i as f32 / tubular as f32, 1.0 - j as f32 / radial as f32]);
            }
        }
        let row = tubular + 1;
        let mut indices = Vec::new();
        for j in 1..=radial {
            for i in 1..=tubular {
                let a = row * j + i - 1;
                let b = row * (j - 1) + i - 1;
                let c = row * (j - 1) + i;
                let d = row * j + i;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }
        Self::new(positions, normals, uvs, None, indices)
    }

    pub fn torus_knot(
        radius: f32,
        tube: f32,
        tubular_segments: u32,
        radial_segments: u32,
        p: u32,
        q: u32,
    ) -> Self {
        let tubular = tubular_segments.max(3);
        let radial = radial_segments.max(3);
        let (p, q) = (p.max(1) as f32, q as f32);
        let on_curve = |u: f32| {
            let qu_over_p = q / p * u;
            let cs = qu_over_p.cos();
            Vector3::new(
                radius * (2.0 + cs) * 0.5 * u.cos(),
                radius * (2.0 + cs) * u.sin() * 0.5,
                radius * qu_over_p.sin() * 0.5,
            )
        };
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for i in 0..=tubular {
            let u = i as f32 / tubular as f32 * p * TAU;
            let p1 = on_curve(u);
            let p2 = on_curve(u + 0.01);
            let t = p2 - p1;
            let n = p2 + p1;
            let b = t.cross(n).normalize();
            let n = b.cross(t).normalize();
            for j in 0..=radial {
                let v = j as f32 / radial as f32 * TAU;
                let cx = -tube * v.cos();
                let cy = tube * v.sin();
                let vertex = p1 + n * cx + b * cy;
                positions.push(vertex.into());
                normals.push((vertex - p1).normalize().into());
                uvs.push([i as f32 / tubular as f32, 1.0 - j as f32 / radial as f32]);
            }
        }
        Self::new(positions, normals, uvs, None, grid_indices(tubular, radial))
    }

    /// Sweeps a circle along a curve using parallel-transported frames.
    pub fn tube(curve: Curve, tubular_segments: u32, radius: f32, radial_segments: u32, closed: bool) -> Self {
        let segments = tubular_segments.max(1) as usize;
        let radial = radial_segments.max(3);
        let frames = frenet_frames(curve, segments, closed);
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for i in 0..=segments {
            // A closed tube reuses the first ring so the seam is watertight
            let ring = if closed && i == segments { 0 } else { i };
            let center = curve(ring as f32 / segments as f32);
            let (normal, binormal) = (frames.normals[ring], frames.binormals[ring]);
            for j in 0..=radial {
                let v = j as f32 / radial as f32 * TAU;
                let n = (normal * -v.cos() + binormal * v.sin()).normalize();
                positions.push((center + n * radius).into());
                normals.push(n.into());
                uvs.push([i as f32 / segments as f32, 1.0 - j as f32 / radial as f32]);
            }
        }
        Self::new(positions, normals, uvs, None, grid_indices(segments as u32, radial))
    }

    /// Revolves a profile (x = radius, y = height) around the Y axis.
    pub fn lathe(points: &[Point2<f32>], segments: u32, phi_start: f32, phi_length: f32) -> Self {
        let segments = segments.max(1);
        let len = points.len() as u32;
        let mut positions = Vec::new();
        let mut uvs = Vec::new();
        for i in 0..=segments {
            let phi = phi_start + i as f32 / segments as f32 * phi_length;
            let (sin, cos) = phi.sin_cos();
            for (j, p) in points.iter().enumerate() {
                positions.push([p.x * sin, p.y, p.x * cos]);
                let v = if len > 1 { j as f32 / (len - 1) as f32 } else { 0.0 };
                uvs.push([i as f32 / segments as f32, 1.0 - v]);
            }
        }
        let mut indices = Vec::new();
        if len > 1 {
            for i in 0..segments {
                for j in 0..len - 1 {
                    let base = j + i * len;
                    let (a, b, c, d) = (base, base + len, base + len + 1, base + 1);
                    indices.extend_from_slice(&[a, b, d, c, d, b]);
                }
            }
        }
        let mut geometry = Self::new(positions, Vec::new(), uvs, None, indices);
        geometry.compute_vertex_normals();
        geometry
    }

    /// A flat, filled polygon in the XY plane.
    pub fn shape(shape: &Shape) -> Self {
        let contour = shape.points();
        let positions: Vec<[f32; 3]> = contour.iter().map(|p| [p.x, p.y, 0.0]).collect();
        let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
        let uvs = contour.iter().map(|p| [p.x, 1.0 - p.y]).collect();
        let indices = triangulate(&contour)
            .into_iter()
            .flat_map(|tri| tri.map(|i| i as u32))
            .collect();
        Self::new(positions, normals, uvs, None, indices)
    }

    /// Extrudes closed outlines along +Z, with an optional bevel around the caps.
    ///
    /// Outlines winding opposite to the first one are holes and are skipped.
    pub fn extrude(contours: &[Vec<Point2<f32>>], options: &ExtrudeOptions) -> Self {
        let mut builder = FlatBuilder::default();
        let reference = contours.first().map(|c| signed_area(c) >= 0.0);
        for contour in contours {
            let contour = dedup_closing_point(contour);
            if contour.len() < 3 || Some(signed_area(&contour) >= 0.0) != reference {
                continue;
            }
            let mut contour = contour;
            if signed_area(&contour) < 0.0 {
                contour.reverse();
            }
            extrude_contour(&mut builder, &contour, options);
        }
        builder.finish()
    }
}

fn grid_indices(rings: u32, radial: u32) -> Vec<u32> {
    let row = radial + 1;
    let mut indices = Vec::new();
    for j in 1..=rings {
        for i in 1..=radial {
            let a = row * (j - 1) + (i - 1);
            let b = row * j + (i - 1);
            let c = row * j + i;
            let d = row * (j - 1) + i;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    indices
}

struct Frames {
    normals: Vec<Vector3<f32>>,
    binormals: Vec<Vector3<f32>>,
}

fn tangent_at(curve: Curve, t: f32) -> Vector3<f32> {
    let delta = 1e-4;
    let t1 = (t - delta).max(0.0);
    let t2 = (t + delta).min(1.0);
    let tangent = curve(t2) - curve(t1);
    if tangent.magnitude2() > 0.0 {
        tangent.normalize()
    } else {
        Vector3::unit_x()
    }
}

fn frenet_frames(curve: Curve, segments: usize, closed: bool) -> Frames {
    let tangents: Vec<Vector3<f32>> = (0..=segments)
        .map(|i| tangent_at(curve, i as f32 / segments as f32))
        .collect();
    let first = tangents[0];
    let (ax, ay, az) = (first.x.abs(), first.y.abs(), first.z.abs());
    let axis = if ax <= ay && ax <= az {
        Vector3::unit_x()
    } else if ay <= az {
        Vector3::unit_y()
    } else {
        Vector3::unit_z()
    };
    let vec = first.cross(axis).normalize();
    let mut normals = vec![first.cross(vec)];
    let mut binormals = vec![first.cross(normals[0])];
    for i in 1..=segments {
        let mut normal = normals[i - 1];
        let vec = tangents[i - 1].cross(tangents[i]);
        if vec.magnitude() > f32::EPSILON {
            let theta = tangents[i - 1].dot(tangents[i]).clamp(-1.0, 1.0).acos();
            normal = Matrix3::from_axis_angle(vec.normalize(), Rad(theta)) * normal;
        }
        normals.push(normal);
        binormals.push(tangents[i].cross(normal));
    }
    if closed {
        let mut theta = normals[0].dot(normals[segments]).clamp(-1.0, 1.0).acos() / segments as f32;
        if tangents[0].dot(normals[0].cross(normals[segments])) > 0.0 {
            theta = -theta;
        }
        for i in 1..=segments {
            normals[i] = Matrix3::from_axis_angle(tangents[i], Rad(theta * i as f32)) * normals[i];
            binormals[i] = tangents[i].cross(normals[i]);
        }
    }
    Frames { normals, binormals }
}

/// A 2D outline built from path commands, sampled into points for triangulation.
#[derive(Clone, Debug, Default)]
pub struct Shape {
    points: Vec<Point2<f32>>,
    curve_segments: usize,
}

impl Shape {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            curve_segments: 12,
        }
    }

    pub fn move_to(mut self, x: f32, y: f32) -> Self {
        self.points.clear();
        self.points.push(Point2::new(x, y));
        self
    }

    pub fn line_to(mut self, x: f32, y: f32) -> Self {
        self.points.push(Point2::new(x, y));
        self
    }

    pub fn quadratic_curve_to(mut self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        let start = self.points.last().copied().unwrap_or(Point2::new(0.0, 0.0));
        let control = Point2::new(cx, cy);
        let end = Point2::new(x, y);
        self.points
            .extend(sample_quadratic(start, control, end, self.curve_segments));
        self
    }

    pub fn close_path(mut self) -> Self {
        if let (Some(first), Some(last)) = (self.points.first().copied(), self.points.last().copied()) {
            if first != last {
                self.points.push(first);
            }
        }
        self
    }

    /// The sampled outline without a repeated closing point.
    pub fn points(&self) -> Vec<Point2<f32>> {
        dedup_closing_point(&self.points)
    }

    /// The outline as drawn by a line, closing point included.
    pub fn outline(&self) -> Vec<Point3<f32>> {
        self.points.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect()
    }
}

pub(crate) fn sample_quadratic(
    start: Point2<f32>,
    control: Point2<f32>,
    end: Point2<f32>,
    segments: usize,
) -> impl Iterator<Item = Point2<f32>> {
    let segments = segments.max(1);
    (1..=segments).map(move |i| {
        let t = i as f32 / segments as f32;
        let k = 1.0 - t;
        Point2::new(
            k * k * start.x + 2.0 * k * t * control.x + t * t * end.x,
            k * k * start.y + 2.0 * k * t * control.y + t * t * end.y,
        )
    })
}

pub(crate) fn sample_cubic(
    start: Point2<f32>,
    c1: Point2<f32>,
    c2: Point2<f32>,
    end: Point2<f32>,
    segments: usize,
) -> impl Iterator<Item = Point2<f32>> {
    let segments = segments.max(1);
    (1..=segments).map(move |i| {
        let t = i as f32 / segments as f32;
        let k = 1.0 - t;
        let (a, b, c, d) = (k * k * k, 3.0 * k * k * t, 3.0 * k * t * t, t * t * t);
        Point2::new(
            a * start.x + b * c1.x + c * c2.x + d * end.x,
            a * start.y + b * c1.y + c * c2.y + d * end.y,
        )
    })
}

fn dedup_closing_point(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut points = points.to_vec();
    points.dedup_by(|a, b| (*a - *b).magnitude2() < 1e-12);
    if points.len() > 1 && (points[0] - points[points.len() - 1]).magnitude2() < 1e-12 {
        points.pop();
    }
    points
}

/// Twice the signed area; positive for counter-clockwise outlines.
pub fn signed_area(points: &[Point2<f32>]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

fn cross2(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn inside_triangle(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>, c: Point2<f32>) -> bool {
    cross2(a, b, p) >= 0.0 && cross2(b, c, p) >= 0.0 && cross2(c, a, p) >= 0.0
}

/// Ear-clipping triangulation of a simple polygon.
///
/// Triangles index into `points` and wind counter-clockwise whatever the
/// orientation of the input.
pub fn triangulate(points: &[Point2<f32>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }
    let mut ring: Vec<usize> = (0..n).collect();
    if signed_area(points) < 0.0 {
        ring.reverse();
    }
    let mut triangles = Vec::with_capacity(n - 2);
    while ring.len() > 3 {
        let len = ring.len();
        let ear = (0..len).find(|&i| {
            let (prev, cur, next) = (ring[(i + len - 1) % len], ring[i], ring[(i + 1) % len]);
            let (a, b, c) = (points[prev], points[cur], points[next]);
            if cross2(a, b, c) <= f32::EPSILON {
                return false;
            }
            ring.iter()
                .filter(|&&other| other != prev && other != cur && other != next)
                .all(|&other| !inside_triangle(points[other], a, b, c))
        });
        match ear {
            Some(i) => {
                triangles.push([ring[(i + len - 1) % len], ring[i], ring[(i + 1) % len]]);
                ring.remove(i);
            }
            None => {
                log::warn!("polygon with {} points is degenerate, falling back to a fan", n);
                for i in 1..ring.len() - 1 {
                    triangles.push([ring[0], ring[i], ring[i + 1]]);
                }
                return triangles;
            }
        }
    }
    triangles.push([ring[0], ring[1], ring[2]]);
    triangles
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bevel {
    pub thickness: f32,
    pub size: f32,
    pub offset: f32,
    pub segments: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtrudeOptions {
    pub depth: f32,
    pub steps: u32,
    pub bevel: Option<Bevel>,
}

impl Default for ExtrudeOptions {
    fn default() -> Self {
        Self {
            depth: 1.0,
            steps: 1,
            bevel: None,
        }
    }
}

/// Accumulates non-indexed triangles with flat face normals.
#[derive(Default)]
struct FlatBuilder {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
}

impl FlatBuilder {
    fn triangle(&mut self, a: Point3<f32>, b: Point3<f32>, c: Point3<f32>, uv: [[f32; 2]; 3]) {
        let face = (b - a).cross(c - a);
        let normal = if face.magnitude2() > 0.0 { face.normalize() } else { Vector3::unit_z() };
        for (p, uv) in [a, b, c].into_iter().zip(uv) {
            self.positions.push(p.into());
            self.normals.push(normal.into());
            self.uvs.push(uv);
        }
    }

    fn finish(self) -> Geometry {
        let indices = (0..self.positions.len() as u32).collect();
        Geometry::new(self.positions, self.normals, self.uvs, None, indices)
    }
}

/// Outward miter directions of a counter-clockwise outline.
fn bevel_vectors(contour: &[Point2<f32>]) -> Vec<cgmath::Vector2<f32>> {
    let n = contour.len();
    (0..n)
        .map(|i| {
            let prev = contour[(i + n - 1) % n];
            let cur = contour[i];
            let next = contour[(i + 1) % n];
            let outward = |d: cgmath::Vector2<f32>| {
                if d.magnitude2() > 0.0 {
                    cgmath::Vector2::new(d.y, -d.x).normalize()
                } else {
                    cgmath::Vector2::new(0.0, 0.0)
                }
            };
            let n1 = outward(cur - prev);
            let n2 = outward(next - cur);
            let sum = n1 + n2;
            if sum.magnitude2() < 1e-12 {
                return n1;
            }
            let dir = sum.normalize();
            // Keep sharp corners from shooting off
            let cos = dir.dot(n1).max(0.25);
            dir / cos
        })
        .collect()
}

fn extrude_contour(builder: &mut FlatBuilder, contour: &[Point2<f32>], options: &ExtrudeOptions) {
    let miters = bevel_vectors(contour);
    let layer = |size: f32, z: f32| -> Vec<Point3<f32>> {
        contour
            .iter()
            .zip(&miters)
            .map(|(p, m)| Point3::new(p.x + m.x * size, p.y + m.y * size, z))
            .collect()
    };
    let mut layers = Vec::new();
    let steps = options.steps.max(1);
    match options.bevel {
        Some(bevel) => {
            let segments = bevel.segments.max(1);
            for b in 0..segments {
                let t = b as f32 / segments as f32;
                let z = bevel.thickness * (t * PI / 2.0).cos();
                let size = bevel.size * (t * PI / 2.0).sin() + bevel.offset;
                layers.push(layer(size, -z));
            }
            for s in 0..=steps {
                let z = options.depth * s as f32 / steps as f32;
                layers.push(layer(bevel.size + bevel.offset, z));
            }
            for b in (0..segments).rev() {
                let t = b as f32 / segments as f32;
                let z = bevel.thickness * (t * PI / 2.0).cos();
                let size = bevel.size * (t * PI / 2.0).sin() + bevel.offset;
                layers.push(layer(size, options.depth + z));
            }
        }
        None => {
            for s in 0..=steps {
                layers.push(layer(0.0, options.depth * s as f32 / steps as f32));
            }
        }
    }

    let triangles = triangulate(contour);
    let back = &layers[0];
    let front = &layers[layers.len() - 1];
    let uv = |p: Point3<f32>| [p.x, 1.0 - p.y];
    for [a, b, c] in &triangles {
        builder.triangle(front[*a], front[*b], front[*c], [uv(front[*a]), uv(front[*b]), uv(front[*c])]);
        builder.triangle(back[*c], back[*b], back[*a], [uv(back[*c]), uv(back[*b]), uv(back[*a])]);
    }

    let n = contour.len();
    for pair in layers.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        for i in 0..n {
            let j = (i + 1) % n;
            let side_uv = |p: Point3<f32>| [p.x + p.y, 1.0 - p.z];
            builder.triangle(
                lower[i],
                lower[j],
                upper[j],
                [side_uv(lower[i]), side_uv(lower[j]), side_uv(upper[j])],
            );
            builder.triangle(
                lower[i],
                upper[j],
                upper[i],
                [side_uv(lower[i]), side_uv(upper[j]), side_uv(upper[i])],
            );
        }
    }
}

/// Unlit line list: every two positions form one segment.
#[derive(Clone, Debug)]
pub struct LineSegments {
    id: u64,
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex colours; falls back to `color` when empty.
    pub colors: Vec<[f32; 3]>,
    pub color: [f32; 3],
}

impl LineSegments {
    pub fn new(positions: Vec<[f32; 3]>, color: [f32; 3]) -> Self {
        Self {
            id: next_resource_id(),
            positions,
            colors: Vec::new(),
            color,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connects consecutive points, closing the loop on request.
    pub fn polyline(points: &[Point3<f32>], closed: bool, color: [f32; 3]) -> Self {
        let mut positions = Vec::new();
        for pair in points.windows(2) {
            positions.push(pair[0].into());
            positions.push(pair[1].into());
        }
        if closed && points.len() > 2 {
            positions.push(points[points.len() - 1].into());
            positions.push(points[0].into());
        }
        Self::new(positions, color)
    }

    /// Each distinct triangle edge once.
    pub fn wireframe(geometry: &Geometry, color: [f32; 3]) -> Self {
        let mut seen = HashSet::new();
        let mut positions = Vec::new();
        for tri in geometry.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let key = (a.min(b), a.max(b));
                if seen.insert(key) {
                    positions.push(geometry.positions[a as usize]);
                    positions.push(geometry.positions[b as usize]);
                }
            }
        }
        Self::new(positions, color)
    }

    /// One segment per vertex along its normal.
    pub fn vertex_normals(geometry: &Geometry, size: f32, color: [f32; 3]) -> Self {
        let mut positions = Vec::with_capacity(geometry.positions.len() * 2);
        for (p, n) in geometry.positions.iter().zip(&geometry.normals) {
            let start = Point3::from(*p);
            let end = start + Vector3::from(*n) * size;
            positions.push(start.into());
            positions.push(end.into());
        }
        Self::new(positions, color)
    }

    /// Edges of the volume seen by a camera, given its inverse view-projection.
    ///
    /// Clip space depth runs from 0 to 1 as in wgpu.
    pub fn frustum(inverse_view_proj: &Matrix4<f32>, color: [f32; 3]) -> Self {
        let corner = |x: f32, y: f32, z: f32| inverse_view_proj.transform_point(Point3::new(x, y, z));
        let near = [corner(-1.0, -1.0, 0.0), corner(1.0, -1.0, 0.0), corner(1.0, 1.0, 0.0), corner(-1.0, 1.0, 0.0)];
        let far = [corner(-1.0, -1.0, 1.0), corner(1.0, -1.0, 1.0), corner(1.0, 1.0, 1.0), corner(-1.0, 1.0, 1.0)];
        let mut positions = Vec::with_capacity(24);
        for i in 0..4 {
            let j = (i + 1) % 4;
            for (a, b) in [(near[i], near[j]), (far[i], far[j]), (near[i], far[i])] {
                positions.push(a.into());
                positions.push(b.into());
            }
        }
        Self::new(positions, color)
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().map(|p| Point3::from(*p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(geometry: &Geometry) {
        let count = geometry.vertex_count() as u32;
        assert!(geometry.indices.iter().all(|&i| i < count));
        assert_eq!(geometry.indices.len() % 3, 0);
        assert_eq!(geometry.normals.len(), geometry.positions.len());
        assert_eq!(geometry.uvs.len(), geometry.positions.len());
    }

    #[test]
    fn box_has_six_quads_and_matching_bounds() {
        let cube = Geometry::box_geometry(2.0, 4.0, 6.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices.len(), 36);
        let bounds = cube.bounding_box();
        assert_eq!(bounds.min, Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(bounds.max, Point3::new(1.0, 2.0, 3.0));
        assert_indices_in_range(&cube);
    }

    #[test]
    fn box_faces_wind_outwards() {
        let cube = Geometry::box_geometry(1.0, 1.0, 1.0);
        for tri in cube.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Point3::from(cube.positions[tri[k] as usize]));
            let face = (b - a).cross(c - a).normalize();
            let normal = Vector3::from(cube.normals[tri[0] as usize]);
            assert!(face.dot(normal) > 0.99);
        }
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = Geometry::sphere(0.7, 16, 12);
        for p in &sphere.positions {
            assert!((Vector3::from(*p).magnitude() - 0.7).abs() < 1e-5);
        }
        assert_indices_in_range(&sphere);
    }

    #[test]
    fn torus_knot_and_tube_are_well_formed() {
        assert_indices_in_range(&Geometry::torus_knot(1.0, 0.3, 64, 16, 2, 3));
        assert_indices_in_range(&Geometry::torus(0.3, 0.1, 8, 24, TAU));
        let sin_curve = |t: f32| Point3::new(t * 3.0 - 1.5, (TAU * t).sin(), 0.0) * 4.0;
        let tube = Geometry::tube(&sin_curve, 40, 0.8, 8, true);
        assert_eq!(tube.vertex_count(), 41 * 9);
        assert_indices_in_range(&tube);
    }

    #[test]
    fn sampled_curve_includes_both_ends() {
        let line = |t: f32| Point3::new(t, 0.0, 0.0);
        let points = sample_curve(&line, 30);
        assert_eq!(points.len(), 31);
        assert_eq!(points[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(points[30], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn square_shape_triangulates_into_two_triangles() {
        let square = Shape::new()
            .move_to(1.0, 1.0)
            .line_to(1.0, -1.0)
            .line_to(-1.0, -1.0)
            .line_to(-1.0, 1.0)
            .close_path();
        let geometry = Geometry::shape(&square);
        assert_eq!(geometry.vertex_count(), 4);
        assert_eq!(geometry.indices.len(), 6);
    }

    #[test]
    fn concave_outline_triangulates_fully() {
        let arrow = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 4.0),
            Point2::new(2.0, 1.0),
            Point2::new(0.0, 4.0),
        ];
        let triangles = triangulate(&arrow);
        assert_eq!(triangles.len(), 3);
        let area: f32 = triangles
            .iter()
            .map(|[a, b, c]| cross2(arrow[*a], arrow[*b], arrow[*c]) / 2.0)
            .sum();
        assert!((area - signed_area(&arrow) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn extrusion_spans_the_requested_depth() {
        let square = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let solid = Geometry::extrude(&[square.clone()], &ExtrudeOptions { depth: 2.0, ..Default::default() });
        let bounds = solid.bounding_box();
        assert!((bounds.min.z - 0.0).abs() < 1e-6);
        assert!((bounds.max.z - 2.0).abs() < 1e-6);
        // two caps of two triangles, four sides of two triangles
        assert_eq!(solid.indices.len(), (4 + 8) * 3);

        let bevelled = Geometry::extrude(
            &[square],
            &ExtrudeOptions {
                depth: 1.5,
                steps: 1,
                bevel: Some(Bevel { thickness: 0.7, size: 0.7, offset: 0.0, segments: 2 }),
            },
        );
        let bounds = bevelled.bounding_box();
        assert!((bounds.min.z + 0.7).abs() < 1e-5);
        assert!((bounds.max.z - 2.2).abs() < 1e-5);
        assert!(bounds.max.x > 1.0);
    }

    #[test]
    fn wireframe_emits_each_edge_once() {
        let quad = Geometry::from_buffers(
            vec![[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            None,
            None,
            None,
            Some(vec![0, 1, 2, 2, 1, 3]),
        );
        // four outer edges plus the shared diagonal
        assert_eq!(LineSegments::wireframe(&quad, [1.0; 3]).positions.len(), 10);
        assert_eq!(Vector3::from(quad.normals[0]), Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn lathe_revolves_every_profile_point() {
        let profile: Vec<Point2<f32>> = (0..10)
            .map(|i| Point2::new((i as f32 * 0.2).sin() * 3.0 + 3.0, (i as f32 - 5.0) * 0.8))
            .collect();
        let lathe = Geometry::lathe(&profile, 32, 0.0, PI);
        assert_eq!(lathe.vertex_count(), 33 * 10);
        assert_eq!(lathe.indices.len(), 32 * 9 * 6);
        assert_indices_in_range(&lathe);
    }

    #[test]
    fn centered_geometry_has_origin_in_the_middle() {
        let mut cube = Geometry::box_geometry(1.0, 1.0, 1.0);
        cube.translate(Vector3::new(3.0, 0.0, 0.0));
        assert!((cube.bounding_box().center().x - 3.0).abs() < 1e-6);
        cube.center();
        assert!(cube.bounding_box().center().x.abs() < 1e-6);
    }
}
