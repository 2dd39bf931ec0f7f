//! Vertex layouts and GPU-side mesh buffers.
//!
//! CPU geometry lives in [`crate::data_structures::geometry`]; this module is
//! the bridge that turns it into vertex/index buffers the pipelines can draw.

use wgpu::util::DeviceExt;

use crate::data_structures::geometry::{Geometry, LineSegments};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex for LineVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Interleaves the attribute arrays of a geometry into vertices.
///
/// Missing uvs default to zero and missing colours to white so that every
/// geometry fits the one vertex layout.
pub fn interleave(geometry: &Geometry) -> Vec<ModelVertex> {
    interleave_posed(geometry, &geometry.positions, &geometry.normals)
}

/// Like [`interleave`] with positions and normals replaced, e.g. by a skinned pose.
pub fn interleave_posed(geometry: &Geometry, positions: &[[f32; 3]], normals: &[[f32; 3]]) -> Vec<ModelVertex> {
    positions
        .iter()
        .enumerate()
        .map(|(i, position)| ModelVertex {
            position: *position,
            normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            tex_coords: geometry.uvs.get(i).copied().unwrap_or_default(),
            color: geometry
                .colors
                .as_ref()
                .and_then(|colors| colors.get(i).copied())
                .unwrap_or([1.0; 3]),
        })
        .collect()
}

/// Vertex and index buffers of one uploaded geometry.
#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
}

impl Mesh {
    /// The vertex buffer accepts writes so skinned meshes can be re-posed in place.
    pub fn from_geometry(device: &wgpu::Device, geometry: &Geometry) -> Self {
        let name = format!("geometry-{}", geometry.id());
        let vertices = interleave(geometry);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", name)),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", name)),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            name,
            vertex_buffer,
            index_buffer,
            num_elements: geometry.indices.len() as u32,
        }
    }
}

/// Vertex buffer of a line list.
#[derive(Debug)]
pub struct LineMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub num_vertices: u32,
}

impl LineMesh {
    pub fn from_segments(device: &wgpu::Device, lines: &LineSegments) -> Self {
        let vertices: Vec<LineVertex> = lines
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| LineVertex {
                position: *position,
                color: lines.colors.get(i).copied().unwrap_or(lines.color),
            })
            .collect();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Line Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            vertex_buffer,
            num_vertices: vertices.len() as u32,
        }
    }
}

/// Draw calls for cached meshes. Bind groups are set by the caller; the
/// instance buffer is expected in slot 1.
pub trait DrawModel {
    fn draw_mesh_instanced(&mut self, mesh: &Mesh, instances: std::ops::Range<u32>);

    fn draw_lines_instanced(&mut self, lines: &LineMesh, instances: std::ops::Range<u32>);
}

impl DrawModel for wgpu::RenderPass<'_> {
    fn draw_mesh_instanced(&mut self, mesh: &Mesh, instances: std::ops::Range<u32>) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    fn draw_lines_instanced(&mut self, lines: &LineMesh, instances: std::ops::Range<u32>) {
        self.set_vertex_buffer(0, lines.vertex_buffer.slice(..));
        self.draw(0..lines.num_vertices, instances);
    }
}
