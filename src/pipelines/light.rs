//! Scene lighting on the GPU: the light list, the shadow map and the
//! environment map share one bind group.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        light::{Light, LightKind, Shadow},
        texture::{self, TextureData},
    },
    stage::ToneMapping,
};

/// Lights beyond this count are ignored.
pub const MAX_LIGHTS: usize = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRaw {
    /// xyz, kind
    pub position: [f32; 4],
    /// towards the light for directional and spot lights, cos of the cone angle
    pub direction: [f32; 4],
    /// colour times intensity, cos of the penumbra start
    pub color: [f32; 4],
    /// cutoff distance, decay, unused, unused
    pub params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub lights: [LightRaw; MAX_LIGHTS],
    pub ambient: [f32; 4],
    pub shadow_view_proj: [[f32; 4]; 4],
    /// light count, shadow light index + 1 (0 without shadows),
    /// environment map (0 none, 1 colour, 2 RGBM radiance), tone mapping
    pub counts: [u32; 4],
    /// exposure, shadow bias, shadow filter radius, shadow map size
    pub settings: [f32; 4],
}

impl Default for LightUniform {
    fn default() -> Self {
        Self::new()
    }
}

impl LightUniform {
    pub fn new() -> Self {
        Self {
            lights: [LightRaw::default(); MAX_LIGHTS],
            ambient: [0.0; 4],
            shadow_view_proj: Matrix4::identity().into(),
            counts: [0; 4],
            settings: [1.0, 0.0, 1.0, 1.0],
        }
    }

    pub fn light_count(&self) -> usize {
        self.counts[0] as usize
    }

    /// Adds a light at `position` (world space). Ambient lights accumulate
    /// into one term. Returns the slot of a non-ambient light.
    pub fn push(&mut self, light: &Light, position: Point3<f32>) -> Option<usize> {
        let radiance = light.color.map(|c| c * light.intensity);
        if let LightKind::Ambient = light.kind {
            for (ambient, c) in self.ambient.iter_mut().zip(radiance) {
                *ambient += c;
            }
            return None;
        }
        let slot = self.light_count();
        if slot >= MAX_LIGHTS {
            log::warn!("more than {} lights, ignoring the rest", MAX_LIGHTS);
            return None;
        }
        let towards_light = light
            .target()
            .map(|target| position - target)
            .filter(|d| d.magnitude2() > f32::EPSILON)
            .map_or([0.0, 1.0, 0.0], |d| d.normalize().into());
        let (cone, penumbra, distance, decay) = match light.kind {
            LightKind::Spot {
                angle,
                penumbra,
                distance,
                decay,
                ..
            } => (
                angle.cos(),
                (angle * (1.0 - penumbra)).cos(),
                distance,
                decay,
            ),
            LightKind::Point { distance, decay } => (-1.0, -1.0, distance, decay),
            _ => (-1.0, -1.0, 0.0, 0.0),
        };
        let [x, y, z] = position.to_vec().into();
        let [dx, dy, dz] = towards_light;
        let [r, g, b] = radiance;
        self.lights[slot] = LightRaw {
            position: [x, y, z, light.code() as f32],
            direction: [dx, dy, dz, cone],
            color: [r, g, b, penumbra],
            params: [distance, decay, 0.0, 0.0],
        };
        self.counts[0] += 1;
        Some(slot)
    }

    pub fn set_shadow(&mut self, slot: usize, view_proj: Matrix4<f32>, shadow: &Shadow) {
        self.shadow_view_proj = view_proj.into();
        self.counts[1] = slot as u32 + 1;
        self.settings[1] = shadow.bias;
        self.settings[2] = shadow.radius;
        self.settings[3] = shadow.map_size as f32;
    }

    pub fn shadow_slot(&self) -> Option<usize> {
        self.counts[1].checked_sub(1).map(|s| s as usize)
    }

    pub fn set_environment(&mut self, environment: Option<&TextureData>) {
        self.counts[2] = match environment {
            None => 0,
            Some(texture) if texture.rgbm => 2,
            Some(_) => 1,
        };
    }

    pub fn set_tone_mapping(&mut self, tone_mapping: ToneMapping, exposure: f32) {
        self.counts[3] = match tone_mapping {
            ToneMapping::None => 0,
            ToneMapping::AcesFilmic => 1,
        };
        self.settings[0] = exposure;
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("light_bind_group_layout"),
    })
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub shadow_map: texture::Texture,
    shadow_map_size: u32,
    environment: texture::Texture,
    // id and revision of the uploaded environment
    environment_source: Option<(u64, u64)>,
    sampler: wgpu::Sampler,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let uniform = LightUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = mk_bind_group_layout(device);
        let shadow_map_size = Shadow::default().map_size;
        let shadow_map = texture::Texture::create_depth_texture(
            device,
            [shadow_map_size, shadow_map_size],
            "shadow_map",
        );
        let environment = texture::Texture::white(device, queue);
        let sampler = texture::create_default_sampler(device);
        let bind_group = mk_bind_group(
            device,
            &bind_group_layout,
            &buffer,
            &shadow_map,
            &environment,
            &sampler,
        );
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
            shadow_map,
            shadow_map_size,
            environment,
            environment_source: None,
            sampler,
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue, uniform: LightUniform) {
        self.uniform = uniform;
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }

    /// Recreates the shadow map when a light asks for another resolution.
    pub fn ensure_shadow_map(&mut self, device: &wgpu::Device, size: u32) {
        let size = size.clamp(1, device.limits().max_texture_dimension_2d);
        if size == self.shadow_map_size {
            return;
        }
        log::debug!("shadow map resized to {}", size);
        self.shadow_map = texture::Texture::create_depth_texture(device, [size, size], "shadow_map");
        self.shadow_map_size = size;
        self.rebuild(device);
    }

    /// Uploads the environment map if it changed since the last frame.
    pub fn set_environment(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        environment: Option<&TextureData>,
    ) {
        let Some(data) = environment else {
            return;
        };
        let source = Some((data.id(), data.revision()));
        if source == self.environment_source {
            return;
        }
        let same_texture = self.environment_source.is_some_and(|(id, _)| id == data.id());
        if same_texture {
            self.environment.write(queue, data);
        } else {
            self.environment = texture::Texture::from_data(device, queue, data);
            self.rebuild(device);
        }
        self.environment_source = source;
    }

    fn rebuild(&mut self, device: &wgpu::Device) {
        self.bind_group = mk_bind_group(
            device,
            &self.bind_group_layout,
            &self.buffer,
            &self.shadow_map,
            &self.environment,
            &self.sampler,
        );
    }
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow_map: &texture::Texture,
    environment: &texture::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: wgpu::BindingResource::TextureView(&shadow_map.view),
        },
        wgpu::BindGroupEntry {
            binding: 3,
            resource: wgpu::BindingResource::TextureView(&environment.view),
        },
        wgpu::BindGroupEntry {
            binding: 4,
            resource: wgpu::BindingResource::Sampler(sampler),
        },
    ];
    if let Some(compare) = &shadow_map.sampler {
        entries.push(wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::Sampler(compare),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &entries,
        label: Some("light_bind_group"),
    })
}
