//! The lit mesh pipeline and the shared pipeline builder.

use crate::data_structures::{
    instance::InstanceRaw,
    material::{Material, Shading, Side},
    model::{self, Vertex},
    texture::Texture,
};

/// Per draw material parameters, bound with a dynamic offset.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    /// rgb, opacity
    pub color: [f32; 4],
    /// rgb, environment map intensity
    pub emissive: [f32; 4],
    /// rgb, shininess
    pub specular: [f32; 4],
    /// roughness, metalness, clearcoat, clearcoat roughness
    pub pbr: [f32; 4],
    /// shading model, flags, unused, unused
    pub mode: [u32; 4],
}

impl MaterialUniform {
    pub const VERTEX_COLORS: u32 = 1;
    pub const FLAT_SHADING: u32 = 1 << 1;
    pub const MAP: u32 = 1 << 2;
    pub const RECEIVE_SHADOW: u32 = 1 << 3;
    pub const DOUBLE_SIDED: u32 = 1 << 4;

    pub fn from_material(material: &Material, receive_shadow: bool) -> Self {
        let (specular, shininess) = match material.shading {
            Shading::Phong {
                specular,
                shininess,
            } => (specular, shininess),
            _ => ([0.0; 3], 0.0),
        };
        let pbr = match material.shading {
            Shading::Standard {
                roughness,
                metalness,
            } => [roughness, metalness, 0.0, 0.0],
            Shading::Physical {
                roughness,
                metalness,
                clearcoat,
                clearcoat_roughness,
            } => [roughness, metalness, clearcoat, clearcoat_roughness],
            _ => [1.0, 0.0, 0.0, 0.0],
        };
        let mut flags = 0;
        if material.vertex_colors {
            flags |= Self::VERTEX_COLORS;
        }
        if material.flat_shading {
            flags |= Self::FLAT_SHADING;
        }
        if material.map.is_some() {
            flags |= Self::MAP;
        }
        if receive_shadow {
            flags |= Self::RECEIVE_SHADOW;
        }
        if material.side == Side::Double {
            flags |= Self::DOUBLE_SIDED;
        }
        let [r, g, b] = material.color;
        let [er, eg, eb] = material.emissive;
        let [sr, sg, sb] = specular;
        Self {
            color: [r, g, b, material.opacity],
            emissive: [er, eg, eb, material.env_map_intensity],
            specular: [sr, sg, sb, shininess],
            pbr,
            mode: [material.shading.code(), flags, 0, 0],
        }
    }
}

/// Distinguishes the mesh pipelines; one is built per combination in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub side: Side,
    pub transparent: bool,
}

impl PipelineKey {
    pub fn for_material(material: &Material) -> Self {
        Self {
            side: material.side,
            transparent: material.is_transparent(),
        }
    }

    fn cull_mode(&self) -> Option<wgpu::Face> {
        match self.side {
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        }
    }
}

/// Fixed function state that differs between pipelines.
#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

pub fn material_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(
                    std::mem::size_of::<MaterialUniform>() as wgpu::BufferAddress,
                ),
            },
            count: None,
        }],
        label: Some("material_bind_group_layout"),
    })
}

/// A colour map and its sampler.
pub fn texture_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("texture_bind_group_layout"),
    })
}

pub fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &Texture,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(
                    texture.sampler.as_ref().unwrap_or(sampler),
                ),
            },
        ],
        label: Some(label),
    })
}

/// A growable uniform buffer of [`MaterialUniform`]s addressed by dynamic offsets.
#[derive(Debug)]
pub struct MaterialResources {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
    stride: u64,
    capacity: usize,
    staging: Vec<u8>,
}

impl MaterialResources {
    pub fn new(device: &wgpu::Device) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let size = std::mem::size_of::<MaterialUniform>() as u64;
        let stride = size.div_ceil(alignment) * alignment;
        let bind_group_layout = material_bind_group_layout(device);
        let capacity = 16;
        let (buffer, bind_group) = Self::allocate(device, &bind_group_layout, stride, capacity);
        Self {
            buffer,
            bind_group,
            bind_group_layout,
            stride,
            capacity,
            staging: Vec::new(),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Material Buffer"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<MaterialUniform>() as u64),
                }),
            }],
            label: Some("material_bind_group"),
        });
        (buffer, bind_group)
    }

    /// Dynamic offset of the `index`th material written by [`MaterialResources::write`].
    pub fn offset(&self, index: usize) -> wgpu::DynamicOffset {
        (self.stride * index as u64) as wgpu::DynamicOffset
    }

    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, materials: &[MaterialUniform]) {
        if materials.is_empty() {
            return;
        }
        if materials.len() > self.capacity {
            self.capacity = materials.len().next_power_of_two();
            (self.buffer, self.bind_group) =
                Self::allocate(device, &self.bind_group_layout, self.stride, self.capacity);
        }
        self.staging.clear();
        self.staging.resize(self.stride as usize * materials.len(), 0);
        for (i, material) in materials.iter().enumerate() {
            let start = i * self.stride as usize;
            let bytes = bytemuck::bytes_of(material);
            self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        }
        queue.write_buffer(&self.buffer, 0, &self.staging);
    }
}

/// Layout shared by every mesh pipeline: camera, lights, material, map.
pub fn mk_mesh_pipeline_layout(
    device: &wgpu::Device,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
    light_bind_group_layout: &wgpu::BindGroupLayout,
    material_bind_group_layout: &wgpu::BindGroupLayout,
    texture_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Mesh Pipeline Layout"),
        bind_group_layouts: &[
            camera_bind_group_layout,
            light_bind_group_layout,
            material_bind_group_layout,
            texture_bind_group_layout,
        ],
        push_constant_ranges: &[],
    })
}

pub fn mk_mesh_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Mesh Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("mesh.wgsl").into()),
    };
    let blend = if key.transparent {
        wgpu::BlendState::ALPHA_BLENDING
    } else {
        wgpu::BlendState::REPLACE
    };
    mk_render_pipeline(
        device,
        layout,
        color_format,
        Some(blend),
        Some(Texture::DEPTH_FORMAT),
        &[model::ModelVertex::desc(), InstanceRaw::desc()],
        shader,
        PipelineSettings {
            cull_mode: key.cull_mode(),
            // transparent surfaces are depth tested but do not occlude each other
            depth_write: !key.transparent,
            ..Default::default()
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
    settings: PipelineSettings,
) -> wgpu::RenderPipeline {
    let label = shader.label.map(|l| format!("{} Pipeline", l));
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: label.as_deref(),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: settings.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: settings.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: settings.depth_write,
            depth_compare: settings.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}
