//! Surface descriptions attached to mesh primitives.

use std::sync::Arc;

use crate::data_structures::texture::TextureData;

/// Lighting model used by the mesh shader.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shading {
    /// Unlit, the colour (and map) is written as is.
    Basic,
    Lambert,
    Phong { specular: [f32; 3], shininess: f32 },
    Standard { roughness: f32, metalness: f32 },
    Physical {
        roughness: f32,
        metalness: f32,
        clearcoat: f32,
        clearcoat_roughness: f32,
    },
}

impl Shading {
    /// Index used by the shader to select the lighting branch.
    pub fn code(&self) -> u32 {
        match self {
            Shading::Basic => 0,
            Shading::Lambert => 1,
            Shading::Phong { .. } => 2,
            Shading::Standard { .. } => 3,
            Shading::Physical { .. } => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Clone, Debug)]
pub struct Material {
    pub shading: Shading,
    /// Linear RGB.
    pub color: [f32; 3],
    pub emissive: [f32; 3],
    pub opacity: f32,
    pub transparent: bool,
    pub side: Side,
    pub wireframe: bool,
    pub flat_shading: bool,
    pub vertex_colors: bool,
    pub map: Option<Arc<TextureData>>,
    /// Scales reflections of the scene environment; zero disables them.
    pub env_map_intensity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            shading: Shading::Standard {
                roughness: 1.0,
                metalness: 0.0,
            },
            color: [1.0; 3],
            emissive: [0.0; 3],
            opacity: 1.0,
            transparent: false,
            side: Side::Front,
            wireframe: false,
            flat_shading: false,
            vertex_colors: false,
            map: None,
            env_map_intensity: 1.0,
        }
    }
}

impl Material {
    pub fn basic(color: u32) -> Self {
        Self {
            shading: Shading::Basic,
            color: hex_color(color),
            ..Default::default()
        }
    }

    pub fn lambert(color: u32) -> Self {
        Self {
            shading: Shading::Lambert,
            color: hex_color(color),
            ..Default::default()
        }
    }

    pub fn phong(color: u32) -> Self {
        Self {
            shading: Shading::Phong {
                specular: [0.067; 3],
                shininess: 30.0,
            },
            color: hex_color(color),
            ..Default::default()
        }
    }

    pub fn standard(color: u32, roughness: f32, metalness: f32) -> Self {
        Self {
            shading: Shading::Standard {
                roughness,
                metalness,
            },
            color: hex_color(color),
            ..Default::default()
        }
    }

    pub fn physical(color: u32, roughness: f32, metalness: f32, clearcoat: f32) -> Self {
        Self {
            shading: Shading::Physical {
                roughness,
                metalness,
                clearcoat,
                clearcoat_roughness: 0.0,
            },
            color: hex_color(color),
            ..Default::default()
        }
    }

    pub fn with_map(mut self, map: Arc<TextureData>) -> Self {
        self.map = Some(map);
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_vertex_colors(mut self) -> Self {
        self.vertex_colors = true;
        self
    }

    pub fn with_flat_shading(mut self) -> Self {
        self.flat_shading = true;
        self
    }

    pub fn with_wireframe(mut self) -> Self {
        self.wireframe = true;
        self
    }

    pub fn with_emissive(mut self, emissive: u32) -> Self {
        self.emissive = hex_color(emissive);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self.transparent = opacity < 1.0;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent || self.opacity < 1.0
    }
}

/// Converts a `0xRRGGBB` sRGB colour into linear RGB.
pub fn hex_color(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
