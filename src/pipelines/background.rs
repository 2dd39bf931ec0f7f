//! Full screen background: a cropped image or an equirectangular sky.

use wgpu::util::DeviceExt;

use crate::{
    data_structures::texture::{self, Texture, TextureData},
    pipelines::basic::{PipelineSettings, mk_render_pipeline},
    stage::{Background, Stage, ToneMapping},
};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BackgroundUniform {
    /// offset xy, repeat xy
    pub offset_repeat: [f32; 4],
    /// 0 nothing, 1 image, 2 equirectangular; RGBM texels; ACES tone mapping; unused
    pub mode: [u32; 4],
    /// exposure, unused
    pub tone: [f32; 4],
}

impl BackgroundUniform {
    pub fn from_background(background: &Background) -> Self {
        match background {
            Background::None => Self {
                offset_repeat: [0.0, 0.0, 1.0, 1.0],
                mode: [0; 4],
                tone: [1.0, 0.0, 0.0, 0.0],
            },
            Background::Image {
                texture,
                offset,
                repeat,
            } => Self {
                offset_repeat: [offset[0], offset[1], repeat[0], repeat[1]],
                mode: [1, texture.rgbm as u32, 0, 0],
                tone: [1.0, 0.0, 0.0, 0.0],
            },
            Background::Equirect(texture) => Self {
                offset_repeat: [0.0, 0.0, 1.0, 1.0],
                mode: [2, texture.rgbm as u32, 0, 0],
                tone: [1.0, 0.0, 0.0, 0.0],
            },
        }
    }

    /// The background goes through the same tone curve as the meshes drawn over it.
    pub fn with_tone_mapping(mut self, tone_mapping: ToneMapping, exposure: f32) -> Self {
        self.mode[2] = match tone_mapping {
            ToneMapping::None => 0,
            ToneMapping::AcesFilmic => 1,
        };
        self.tone[0] = exposure;
        self
    }

    pub fn is_visible(&self) -> bool {
        self.mode[0] != 0
    }
}

fn background_texture(background: &Background) -> Option<&TextureData> {
    match background {
        Background::None => None,
        Background::Image { texture, .. } | Background::Equirect(texture) => Some(texture),
    }
}

#[derive(Debug)]
pub struct BackgroundResources {
    pub pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    texture: Texture,
    sampler: wgpu::Sampler,
    source: Option<(u64, u64)>,
    visible: bool,
}

impl BackgroundResources {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
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
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("background_bind_group_layout"),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Background Pipeline Layout"),
            bind_group_layouts: &[camera_bind_group_layout, &bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("background.wgsl").into()),
        };
        let pipeline = mk_render_pipeline(
            device,
            &layout,
            color_format,
            Some(wgpu::BlendState::REPLACE),
            Some(Texture::DEPTH_FORMAT),
            &[],
            shader,
            PipelineSettings {
                cull_mode: None,
                depth_write: false,
                depth_compare: wgpu::CompareFunction::Always,
                ..Default::default()
            },
        );
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Background Buffer"),
            contents: bytemuck::cast_slice(&[BackgroundUniform::from_background(&Background::None)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let texture = Texture::white(device, queue);
        let sampler = texture::create_default_sampler(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer, &texture, &sampler);
        Self {
            pipeline,
            bind_group_layout,
            buffer,
            bind_group,
            texture,
            sampler,
            source: None,
            visible: false,
        }
    }

    /// Uploads the uniform and, if it changed, the background texture.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, stage: &Stage) {
        let background = &stage.background;
        let uniform = BackgroundUniform::from_background(background)
            .with_tone_mapping(stage.tone_mapping, stage.exposure);
        self.visible = uniform.is_visible();
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniform]));
        let Some(data) = background_texture(background) else {
            return;
        };
        let source = Some((data.id(), data.revision()));
        if source == self.source {
            return;
        }
        if self.source.is_some_and(|(id, _)| id == data.id()) {
            self.texture.write(queue, data);
        } else {
            self.texture = Texture::from_data(device, queue, data);
            self.bind_group = mk_bind_group(
                device,
                &self.bind_group_layout,
                &self.buffer,
                &self.texture,
                &self.sampler,
            );
        }
        self.source = source;
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, camera_bind_group: &wgpu::BindGroup) {
        if !self.visible {
            return;
        }
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, camera_bind_group, &[]);
        render_pass.set_bind_group(1, &self.bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    texture: &Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some("background_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn image_backgrounds_pass_their_crop() {
        let background = Background::Image {
            texture: Arc::new(TextureData::solid("bg", [0; 4])),
            offset: [0.25, 0.0],
            repeat: [0.5, 1.0],
        };
        let uniform = BackgroundUniform::from_background(&background);
        assert_eq!(uniform.offset_repeat, [0.25, 0.0, 0.5, 1.0]);
        assert_eq!(uniform.mode[0], 1);
        assert!(!BackgroundUniform::from_background(&Background::None).is_visible());
    }

    #[test]
    fn hdr_skies_are_decoded_and_tone_mapped_with_the_frame() {
        let mut sky = TextureData::solid("sky", [255; 4]);
        sky.rgbm = true;
        let background = Background::Equirect(Arc::new(sky));

        let plain = BackgroundUniform::from_background(&background);
        assert_eq!(plain.mode, [2, 1, 0, 0]);
        let mapped = plain.with_tone_mapping(ToneMapping::AcesFilmic, 0.8);
        assert_eq!(mapped.mode, [2, 1, 1, 0]);
        assert_eq!(mapped.tone[0], 0.8);
    }
}
