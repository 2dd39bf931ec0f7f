//! Perspective camera, projection and orbit controls.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};
use wgpu::util::DeviceExt;
use winit::{dpi::PhysicalPosition, event::MouseScrollDelta};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new((0.0, 0.0, 5.0))
    }
}

impl Camera {
    /// A camera at `position` looking at the origin.
    pub fn new<P: Into<Point3<f32>>>(position: P) -> Self {
        Self {
            position: position.into(),
            target: Point3::origin(),
            up: Vector3::unit_y(),
        }
    }

    pub fn look_at(&mut self, target: Point3<f32>) {
        self.target = target;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Updates the aspect ratio; a zero sized viewport is ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.aspect = width as f32 / height as f32;
        true
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

pub fn view_proj(camera: &Camera, projection: &Projection) -> Matrix4<f32> {
    projection.calc_matrix() * camera.calc_matrix()
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_position: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
            inv_view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        *self = Self::from_matrix(camera.position, view_proj(camera, projection));
    }

    /// Uniform for an arbitrary view-projection, e.g. a light's shadow camera.
    pub fn from_matrix(position: Point3<f32>, matrix: Matrix4<f32>) -> Self {
        Self {
            view_position: position.to_homogeneous().into(),
            view_proj: matrix.into(),
            inv_view_proj: matrix.invert().unwrap_or_else(Matrix4::identity).into(),
        }
    }
}

/// Uniform buffer and bind group holding a [`CameraUniform`].
///
/// The renderer keeps one for the view camera and one for the shadow camera.
#[derive(Debug)]
pub struct CameraResources {
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        let uniform = CameraUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Buffer", label)),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = camera_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(&format!("{}_bind_group", label)),
        });
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue, uniform: CameraUniform) {
        self.uniform = uniform;
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

pub fn camera_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("camera_bind_group_layout"),
    })
}

/// Orbits the camera around its target.
///
/// Right-drag changes yaw and pitch, the wheel changes the distance. Input is
/// accumulated between frames and applied in [`OrbitControls::update`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub distance: f32,
    /// Rotation around the up axis in radians.
    pub yaw: f32,
    /// Elevation above the target's horizon in radians.
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub enabled: bool,
    dragging: bool,
    pending_yaw: f32,
    pending_pitch: f32,
    pending_zoom: f32,
}

impl OrbitControls {
    /// Starts orbiting from wherever the camera currently is.
    pub fn new(camera: &Camera) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.magnitude().max(f32::EPSILON);
        let pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();
        let yaw = offset.x.atan2(offset.z);
        Self {
            target: camera.target,
            distance,
            yaw,
            pitch,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_pitch: -std::f32::consts::FRAC_PI_2 + 0.001,
            max_pitch: std::f32::consts::FRAC_PI_2 - 0.001,
            rotate_speed: 0.005,
            zoom_speed: 0.95,
            enabled: true,
            dragging: false,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            pending_zoom: 0.0,
        }
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Raw pointer motion in pixels; ignored unless a drag is in progress.
    pub fn handle_mouse(&mut self, dx: f64, dy: f64) {
        if !self.enabled || !self.dragging {
            return;
        }
        self.pending_yaw -= dx as f32 * self.rotate_speed;
        self.pending_pitch += dy as f32 * self.rotate_speed;
    }

    pub fn handle_scroll(&mut self, delta: &MouseScrollDelta) {
        if !self.enabled {
            return;
        }
        self.pending_zoom += match delta {
            MouseScrollDelta::LineDelta(_, scroll) => *scroll,
            MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 / 50.0,
        };
    }

    /// Applies the accumulated input and places the camera.
    pub fn update(&mut self, camera: &mut Camera) {
        self.yaw += self.pending_yaw;
        self.pitch = (self.pitch + self.pending_pitch).clamp(self.min_pitch, self.max_pitch);
        if self.pending_zoom != 0.0 {
            self.distance *= self.zoom_speed.powf(self.pending_zoom);
        }
        self.distance = self
            .distance
            .clamp(self.min_distance.max(f32::EPSILON), self.max_distance);
        self.pending_yaw = 0.0;
        self.pending_pitch = 0.0;
        self.pending_zoom = 0.0;

        camera.target = self.target;
        camera.position = self.target
            + Vector3::new(
                self.distance * self.yaw.sin() * self.pitch.cos(),
                self.distance * self.pitch.sin(),
                self.distance * self.yaw.cos() * self.pitch.cos(),
            );
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Deg;

    use super::*;

    #[test]
    fn resize_keeps_aspect_on_zero_height() {
        let mut projection = Projection::new(800, 600, Deg(75.0), 0.1, 100.0);
        assert!(!projection.resize(800, 0));
        assert_eq!(projection.aspect, 800.0 / 600.0);
        assert!(projection.resize(1024, 512));
        assert_eq!(projection.aspect, 2.0);
    }

    #[test]
    fn orbit_starts_where_the_camera_is() {
        let mut camera = Camera::new((0.0, 0.0, 50.0));
        let mut controls = OrbitControls::new(&camera);
        controls.update(&mut camera);
        assert!((camera.position - Point3::new(0.0, 0.0, 50.0)).magnitude() < 1e-4);
    }

    #[test]
    fn drag_only_orbits_while_pressed_and_pitch_is_clamped() {
        let mut camera = Camera::new((0.0, 0.0, 10.0));
        let mut controls = OrbitControls::new(&camera);
        controls.handle_mouse(100.0, 0.0);
        controls.update(&mut camera);
        assert!((camera.position.x).abs() < 1e-4);

        controls.set_dragging(true);
        controls.handle_mouse(0.0, 100_000.0);
        controls.update(&mut camera);
        assert!(controls.pitch <= controls.max_pitch);
        assert!(((camera.position - camera.target).magnitude() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn wheel_zooms_in() {
        let mut camera = Camera::new((0.0, 0.0, 10.0));
        let mut controls = OrbitControls::new(&camera);
        controls.handle_scroll(&MouseScrollDelta::LineDelta(0.0, 2.0));
        controls.update(&mut camera);
        assert!(controls.distance < 10.0);
    }
}
