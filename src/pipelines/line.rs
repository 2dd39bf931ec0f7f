//! Unlit line segments: helpers, wireframes and curves.

use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{LineVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{PipelineSettings, mk_render_pipeline},
};

pub fn mk_line_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Line Pipeline Layout"),
        bind_group_layouts: &[camera_bind_group_layout],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Line Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("line.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        color_format,
        Some(wgpu::BlendState::REPLACE),
        Some(Texture::DEPTH_FORMAT),
        &[LineVertex::desc(), InstanceRaw::desc()],
        shader,
        PipelineSettings {
            topology: wgpu::PrimitiveTopology::LineList,
            cull_mode: None,
            // coplanar with the faces they outline
            depth_compare: wgpu::CompareFunction::LessEqual,
            ..Default::default()
        },
    )
}
