//! Local transforms of scene nodes and their GPU representation.
//!
//! Rotations are kept as XYZ Euler angles in radians so that a tween can spin
//! a node by a full turn and back without the value wrapping around.

use cgmath::{Matrix, Matrix3, Matrix4, Quaternion, Rad, SquareMatrix, Vector3};

use crate::data_structures::model;

/// Position, Euler rotation and scale of a node relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: Vector3<f32>,
    /// XYZ Euler angles in radians.
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            ..Self::new()
        }
    }

    /// Build a transform from translation, rotation quaternion and scale as found in glTF nodes.
    pub fn from_trs(position: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        // glTF stores quaternions as [x, y, z, w]
        let quat = Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]);
        Self {
            position: position.into(),
            rotation: euler_from_quaternion(quat),
            scale: scale.into(),
        }
    }

    pub fn set_quaternion(&mut self, quat: Quaternion<f32>) {
        self.rotation = euler_from_quaternion(quat);
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        Quaternion::from(
            Matrix3::from_angle_x(Rad(self.rotation.x))
                * Matrix3::from_angle_y(Rad(self.rotation.y))
                * Matrix3::from_angle_z(Rad(self.rotation.z)),
        )
    }

    pub fn rotation_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_angle_x(Rad(self.rotation.x))
            * Matrix4::from_angle_y(Rad(self.rotation.y))
            * Matrix4::from_angle_z(Rad(self.rotation.z))
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * self.rotation_matrix()
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vector3<f32>> for Instance {
    fn from(position: Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

/// Converts a unit quaternion into XYZ Euler angles.
pub fn euler_from_quaternion(quat: Quaternion<f32>) -> Vector3<f32> {
    let m = Matrix3::from(quat);
    // cgmath is column major: m.z.x is row 0, column 2
    let m13 = m.z.x.clamp(-1.0, 1.0);
    let y = m13.asin();
    if m13.abs() < 0.999_999_9 {
        Vector3::new((-m.z.y).atan2(m.z.z), y, (-m.y.x).atan2(m.x.x))
    } else {
        Vector3::new(m.y.z.atan2(m.y.y), y, 0.0)
    }
}

/**
 * The raw instance is the actual data stored on the GPU: the world matrix of a
 * node and the matching normal matrix.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl InstanceRaw {
    pub fn from_world(world: &Matrix4<f32>) -> Self {
        let upper = Matrix3::from_cols(
            world.x.truncate(),
            world.y.truncate(),
            world.z.truncate(),
        );
        // Non-uniform scale needs the inverse transpose; degenerate scales fall back to the raw rotation
        let normal = upper
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or(upper);
        Self {
            model: (*world).into(),
            normal: normal.into(),
        }
    }
}

/**
 * Stride layout here: the world matrix as four vec4s followed by the normal
 * matrix as three vec3s.
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // Advance once per instance rather than once per vertex
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Rotation3, Transform, Point3, Deg};

    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn euler_round_trips_through_quaternion() {
        let quat = Quaternion::from_angle_y(Deg(30.0));
        let euler = euler_from_quaternion(quat);
        assert!(close(euler.x, 0.0));
        assert!(close(euler.y, 30f32.to_radians()));
        assert!(close(euler.z, 0.0));
    }

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let instance = Instance {
            position: Vector3::new(1.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        let p = instance.to_matrix().transform_point(Point3::new(1.0, 0.0, 0.0));
        // (1,0,0) scaled to (2,0,0), rotated about y to (0,0,-2), then moved by x + 1
        assert!(close(p.x, 1.0));
        assert!(close(p.y, 0.0));
        assert!(close(p.z, -2.0));
    }
}
