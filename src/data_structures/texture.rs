//! Textures on both sides of the bus.
//!
//! [`TextureData`] is decoded RGBA8 pixel data owned by materials and
//! backgrounds. [`Texture`] is the wgpu texture, view and sampler the renderer
//! uploads it into, plus the depth and shadow targets.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Vector3};
use image::{GenericImageView, ImageFormat};

use crate::{
    data_structures::geometry::next_resource_id,
    error::{AssetError, AssetResult},
};

/// Largest radiance an RGBM texel holds; shaders decode with the same constant.
pub const RGBM_RANGE: f32 = 16.0;

/// Clones keep the id: they hold the same pixels.
#[derive(Clone, Debug)]
pub struct TextureData {
    id: u64,
    revision: u64,
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub pixels: Vec<u8>,
    /// Whether `pixels` are sRGB encoded colour rather than linear data.
    pub srgb: bool,
    /// Linear radiance packed as RGBM: `rgb * a * RGBM_RANGE`.
    pub rgbm: bool,
}

impl TextureData {
    pub fn new(label: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>, srgb: bool) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            id: next_resource_id(),
            revision: 0,
            label: label.into(),
            width,
            height,
            pixels,
            srgb,
            rgbm: false,
        }
    }

    /// A 1x1 texture of a single colour.
    pub fn solid(label: impl Into<String>, rgba: [u8; 4]) -> Self {
        Self::new(label, 1, 1, rgba.to_vec(), true)
    }

    pub fn from_image(label: impl Into<String>, img: &image::DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(label, width, height, img.to_rgba8().into_raw(), true)
    }

    /// Decodes an image file. `extension` picks the decoder, otherwise it is guessed.
    pub fn from_bytes(label: &str, bytes: &[u8], extension: Option<&str>) -> AssetResult<Self> {
        let img = match extension.and_then(ImageFormat::from_extension) {
            Some(format) => image::load_from_memory_with_format(bytes, format),
            None => image::load_from_memory(bytes),
        }
        .map_err(|e| AssetError::decode(label, e))?;
        Ok(Self::from_image(label, &img))
    }

    /// Decodes a Radiance `.hdr` image into RGBM encoded linear radiance.
    ///
    /// Tone mapping happens per frame in the shaders, see [`crate::stage::ToneMapping`].
    pub fn from_hdr(label: &str, bytes: &[u8]) -> AssetResult<Self> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)
            .map_err(|e| AssetError::decode(label, e))?
            .to_rgb32f();
        let (width, height) = img.dimensions();
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for rgb in img.pixels() {
            pixels.extend(encode_rgbm([rgb[0], rgb[1], rgb[2]]));
        }
        let mut data = Self::new(label, width, height, pixels, false);
        data.rgbm = true;
        Ok(data)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bumped by [`TextureData::successor`]; the renderer re-uploads on change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// New pixels for the same texture, e.g. the next video frame.
    pub fn successor(&self, pixels: Vec<u8>) -> Self {
        Self {
            id: self.id,
            revision: self.revision + 1,
            label: self.label.clone(),
            width: self.width,
            height: self.height,
            pixels,
            srgb: self.srgb,
            rgbm: self.rgbm,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        let i = ((y * self.width + x) * 4) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Linear radiance of an RGBM texel, or the raw channels scaled to 0..1 otherwise.
    pub fn radiance(&self, x: u32, y: u32) -> [f32; 3] {
        let [r, g, b, a] = self.pixel(x, y).map(|c| c as f32 / 255.0);
        let scale = if self.rgbm { a * RGBM_RANGE } else { 1.0 };
        [r * scale, g * scale, b * scale]
    }
}

fn encode_rgbm(rgb: [f32; 3]) -> [u8; 4] {
    let rgb = rgb.map(|c| c.clamp(0.0, RGBM_RANGE));
    let peak = rgb[0].max(rgb[1]).max(rgb[2]) / RGBM_RANGE;
    let m = (peak.clamp(1.0 / 255.0, 1.0) * 255.0).ceil() / 255.0;
    let [r, g, b] = rgb.map(|c| (c / (m * RGBM_RANGE) * 255.0).round().min(255.0) as u8);
    [r, g, b, (m * 255.0).round() as u8]
}

/// Longitude/latitude texture coordinates of a world direction.
pub fn equirect_uv(direction: Vector3<f32>) -> (f32, f32) {
    let d = direction.normalize();
    let u = d.x.atan2(-d.z) / (2.0 * PI) + 0.5;
    let v = d.y.clamp(-1.0, 1.0).acos() / PI;
    (u, v)
}

pub fn equirect_direction(u: f32, v: f32) -> Vector3<f32> {
    let longitude = (u - 0.5) * 2.0 * PI;
    let polar = v * PI;
    Vector3::new(
        polar.sin() * longitude.sin(),
        polar.cos(),
        -polar.sin() * longitude.cos(),
    )
}

/// Picks the cube face and its texel coordinates for a direction.
///
/// Faces are ordered +x, -x, +y, -y, +z, -z.
pub fn cube_face_uv(direction: Vector3<f32>) -> (usize, f32, f32) {
    let (x, y, z) = (direction.x, direction.y, direction.z);
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());
    let (face, sc, tc, ma) = if ax >= ay && ax >= az {
        if x > 0.0 { (0, -z, -y, ax) } else { (1, z, -y, ax) }
    } else if ay >= az {
        if y > 0.0 { (2, x, z, ay) } else { (3, x, -z, ay) }
    } else if z > 0.0 {
        (4, x, -y, az)
    } else {
        (5, -x, -y, az)
    };
    (face, (sc / ma + 1.0) / 2.0, (tc / ma + 1.0) / 2.0)
}

/// Resamples six cube faces into one equirectangular image.
pub fn cube_to_equirect(label: &str, faces: &[TextureData; 6], width: u32) -> TextureData {
    let width = width.max(2);
    let height = width / 2;
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..height {
        for col in 0..width {
            let u = (col as f32 + 0.5) / width as f32;
            let v = (row as f32 + 0.5) / height as f32;
            let (face, s, t) = cube_face_uv(equirect_direction(u, v));
            let face = &faces[face];
            let x = (s * face.width as f32) as u32;
            let y = (t * face.height as f32) as u32;
            pixels.extend(face.pixel(x, y));
        }
    }
    TextureData::new(label, width, height, pixels, faces[0].srgb)
}

/// Offset and repeat that crop a background image to cover a view without stretching.
pub fn cover_crop(background_aspect: f32, view_aspect: f32) -> ([f32; 2], [f32; 2]) {
    let aspect = background_aspect / view_aspect;
    if aspect > 1.0 {
        ([(1.0 - 1.0 / aspect) / 2.0, 0.0], [1.0 / aspect, 1.0])
    } else {
        ([0.0, (1.0 - aspect) / 2.0], [1.0, aspect])
    }
}

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Depth target that can also be sampled with a comparison sampler (shadow maps).
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("depth compare sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        }));

        Self {
            texture,
            view,
            sampler,
        }
    }

    pub fn from_data(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> Self {
        let size = wgpu::Extent3d {
            width: data.width.max(1),
            height: data.height.max(1),
            depth_or_array_layers: 1,
        };
        let format = if data.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&data.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texture = Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            texture,
            sampler: Some(create_default_sampler(device)),
        };
        texture.write(queue, data);
        texture
    }

    /// Overwrites the pixels; `data` must have the texture's size.
    pub fn write(&self, queue: &wgpu::Queue, data: &TextureData) {
        let size = self.texture.size();
        if size.width != data.width || size.height != data.height {
            log::warn!(
                "texture {} is {}x{}, refusing a {}x{} upload",
                data.label,
                size.width,
                size.height,
                data.width,
                data.height
            );
            return;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
    }

    /// Plain white, bound wherever a material has no map.
    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_data(device, queue, &TextureData::solid("white", [255; 4]))
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radiance_hdr(pixels: &[[f32; 3]], width: usize) -> Vec<u8> {
        let pixels: Vec<image::Rgb<f32>> = pixels.iter().map(|p| image::Rgb(*p)).collect();
        let mut bytes = Vec::new();
        image::codecs::hdr::HdrEncoder::new(&mut bytes)
            .encode(&pixels, width, pixels.len() / width)
            .expect("encode hdr");
        bytes
    }

    #[test]
    fn hdr_keeps_linear_radiance_above_one() {
        let bytes = radiance_hdr(&[[0.0, 0.0, 0.0], [0.18, 0.18, 0.18], [4.0, 2.0, 1.0], [40.0, 0.5, 0.0]], 2);
        let sky = TextureData::from_hdr("sky.hdr", &bytes).expect("decode");
        assert!(sky.rgbm && !sky.srgb);
        assert_eq!((sky.width, sky.height), (2, 2));

        let close = |a: [f32; 3], b: [f32; 3], tolerance: f32| {
            a.iter().zip(b).all(|(a, b)| (a - b).abs() <= tolerance * b.max(0.05))
        };
        assert_eq!(sky.radiance(0, 0), [0.0; 3]);
        assert!(close(sky.radiance(1, 0), [0.18; 3], 0.05), "{:?}", sky.radiance(1, 0));
        assert!(close(sky.radiance(0, 1), [4.0, 2.0, 1.0], 0.02), "{:?}", sky.radiance(0, 1));
        // clipped at the top of the range
        assert!(close(sky.radiance(1, 1), [RGBM_RANGE, 0.5, 0.0], 0.05), "{:?}", sky.radiance(1, 1));
    }

    #[test]
    fn broken_hdr_is_a_decode_error() {
        assert!(matches!(
            TextureData::from_hdr("sky.hdr", b"#?RADIANCE\nnot really"),
            Err(AssetError::Decode { .. })
        ));
    }

    #[test]
    fn cover_crop_trims_the_longer_side() {
        let (offset, repeat) = cover_crop(2.0, 1.0);
        assert_eq!(repeat, [0.5, 1.0]);
        assert_eq!(offset, [0.25, 0.0]);
        let (offset, repeat) = cover_crop(1.0, 2.0);
        assert_eq!(repeat, [1.0, 0.5]);
        assert_eq!(offset, [0.0, 0.25]);
    }

    #[test]
    fn equirect_lookup_round_trips() {
        for dir in [
            Vector3::new(1.0, 0.2, 0.0),
            Vector3::new(0.0, -0.5, -1.0),
            Vector3::new(-0.3, 0.9, 0.4),
        ] {
            let (u, v) = equirect_uv(dir);
            let back = equirect_direction(u, v);
            assert!((back - dir.normalize()).magnitude() < 1e-4);
        }
    }

    #[test]
    fn cube_faces_follow_major_axis() {
        assert_eq!(cube_face_uv(Vector3::new(1.0, 0.0, 0.0)).0, 0);
        assert_eq!(cube_face_uv(Vector3::new(0.0, -1.0, 0.0)).0, 3);
        let (face, s, t) = cube_face_uv(Vector3::new(0.0, 0.0, -1.0));
        assert_eq!((face, s, t), (5, 0.5, 0.5));
    }

    #[test]
    fn equirect_from_solid_faces_keeps_each_colour() {
        let colours = [
            [255, 0, 0, 255],
            [0, 255, 0, 255],
            [0, 0, 255, 255],
            [255, 255, 0, 255],
            [0, 255, 255, 255],
            [255, 0, 255, 255],
        ];
        let faces = colours.map(|c| TextureData::new("face", 2, 2, c.repeat(4), true));
        let equirect = cube_to_equirect("sky", &faces, 64);
        assert_eq!((equirect.width, equirect.height), (64, 32));
        // top row looks up (+y), bottom row looks down (-y)
        assert_eq!(equirect.pixel(10, 0), colours[2]);
        assert_eq!(equirect.pixel(10, 31), colours[3]);
        // the centre column looks down -z
        assert_eq!(equirect.pixel(32, 16), colours[5]);
    }
}
