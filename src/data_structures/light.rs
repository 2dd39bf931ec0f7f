//! Light sources and their shadow settings.
//!
//! A light's position is the world position of the node carrying it;
//! directional and spot lights additionally aim at a world space target.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector3};

use crate::{camera::OPENGL_TO_WGPU_MATRIX, data_structures::material::hex_color};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Ambient,
    Directional { target: Point3<f32> },
    Point { distance: f32, decay: f32 },
    Spot {
        target: Point3<f32>,
        /// Half angle of the cone in radians.
        angle: f32,
        penumbra: f32,
        distance: f32,
        decay: f32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub map_size: u32,
    /// Percentage-closer filter radius in texels.
    pub radius: f32,
    pub bias: f32,
    pub near: f32,
    pub far: f32,
    /// Half extent of the orthographic box used by directional lights.
    pub extent: f32,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            map_size: 512,
            radius: 1.0,
            bias: 0.0,
            near: 0.5,
            far: 500.0,
            extent: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    /// Linear RGB.
    pub color: [f32; 3],
    pub intensity: f32,
    pub shadow: Option<Shadow>,
}

impl Light {
    pub fn ambient(color: u32, intensity: f32) -> Self {
        Self::new(LightKind::Ambient, color, intensity)
    }

    pub fn directional(color: u32, intensity: f32) -> Self {
        Self::new(
            LightKind::Directional {
                target: Point3::origin(),
            },
            color,
            intensity,
        )
    }

    pub fn point(color: u32, intensity: f32) -> Self {
        Self::new(
            LightKind::Point {
                distance: 0.0,
                decay: 2.0,
            },
            color,
            intensity,
        )
    }

    pub fn spot(color: u32, intensity: f32, angle: impl Into<Rad<f32>>, penumbra: f32) -> Self {
        Self::new(
            LightKind::Spot {
                target: Point3::origin(),
                angle: angle.into().0,
                penumbra,
                distance: 0.0,
                decay: 2.0,
            },
            color,
            intensity,
        )
    }

    fn new(kind: LightKind, color: u32, intensity: f32) -> Self {
        Self {
            kind,
            color: hex_color(color),
            intensity,
            shadow: None,
        }
    }

    pub fn with_shadow(mut self, shadow: Shadow) -> Self {
        self.shadow = Some(shadow);
        self
    }

    pub fn target(&self) -> Option<Point3<f32>> {
        match self.kind {
            LightKind::Directional { target } | LightKind::Spot { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Re-aims directional and spot lights; other kinds ignore it.
    pub fn set_target(&mut self, point: Point3<f32>) {
        match &mut self.kind {
            LightKind::Directional { target } | LightKind::Spot { target, .. } => *target = point,
            _ => (),
        }
    }

    pub fn casts_shadow(&self) -> bool {
        self.shadow.is_some()
            && matches!(self.kind, LightKind::Directional { .. } | LightKind::Spot { .. })
    }

    /// Kind index used by the mesh shader.
    pub fn code(&self) -> u32 {
        match self.kind {
            LightKind::Ambient => 0,
            LightKind::Directional { .. } => 1,
            LightKind::Point { .. } => 2,
            LightKind::Spot { .. } => 3,
        }
    }

    /// View-projection of the shadow camera when the light sits at `position`.
    pub fn shadow_view_proj(&self, position: Point3<f32>) -> Option<Matrix4<f32>> {
        let shadow = self.shadow?;
        let target = self.target()?;
        let forward = target - position;
        if forward.magnitude2() <= f32::EPSILON {
            return None;
        }
        // look_at breaks down when looking straight along the up vector
        let up = if forward.normalize().y.abs() > 0.99 {
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };
        let view = Matrix4::look_at_rh(position, target, up);
        let proj = match self.kind {
            LightKind::Spot { angle, .. } => cgmath::perspective(
                Rad((angle * 2.0).max(1f32.to_radians())),
                1.0,
                shadow.near,
                shadow.far,
            ),
            _ => cgmath::ortho(
                -shadow.extent,
                shadow.extent,
                -shadow.extent,
                shadow.extent,
                shadow.near,
                shadow.far,
            ),
        };
        Some(OPENGL_TO_WGPU_MATRIX * proj * view)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Deg;

    use super::*;

    #[test]
    fn only_aimed_lights_cast_shadows() {
        let spot = Light::spot(0xffffff, 150.0, Deg(30.0), 0.2).with_shadow(Shadow::default());
        assert!(spot.casts_shadow());
        let point = Light::point(0xffffff, 500.0).with_shadow(Shadow::default());
        assert!(!point.casts_shadow());
    }

    #[test]
    fn retargeting_moves_the_shadow_camera() {
        let mut spot = Light::spot(0xffffff, 150.0, Deg(30.0), 0.2).with_shadow(Shadow::default());
        spot.set_target(Point3::new(1.0, 0.0, 0.0));
        assert_eq!(spot.target(), Some(Point3::new(1.0, 0.0, 0.0)));
        assert!(spot.shadow_view_proj(Point3::new(0.0, 5.0, 0.0)).is_some());
        assert!(spot.shadow_view_proj(Point3::new(1.0, 0.0, 0.0)).is_none());
    }
}
