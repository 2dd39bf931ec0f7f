//! Drawing a [`Stage`] with wgpu.
//!
//! Rendering happens in two steps. [`FramePlan::collect`] walks the scene
//! graph once and produces everything the GPU needs for one frame: instance
//! transforms, material uniforms, draw lists sorted into opaque, line and
//! transparent batches, the light list and the shadow caster. The
//! [`GpuRenderer`] then uploads what changed and records the passes:
//!
//! 1. shadow pass: depth of every shadow caster, seen from the first shadow light
//! 2. main pass: clear, background, opaque meshes, lines, transparent meshes
//!    back to front
//!
//! GPU buffers are cached by geometry id and textures by id and revision;
//! entries not used by a frame are dropped at its end. Skinned primitives are
//! posed on the CPU while collecting and get a vertex buffer per node, which
//! is rewritten every frame.

use std::{
    collections::{HashMap, HashSet},
    iter,
    sync::Arc,
};

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform};
use winit::window::Window;

use crate::{
    camera::{CameraResources, CameraUniform},
    context::{Context, Viewport},
    data_structures::{
        geometry::{Geometry, LineSegments},
        instance::InstanceRaw,
        light::Shadow,
        material::Material,
        model::{DrawModel, LineMesh, Mesh, ModelVertex, interleave_posed},
        scene_graph::{NodeId, NodeKind},
        skin::skin_geometry,
        texture::{self, Texture, TextureData},
    },
    error::RenderError,
    flow::Renderer,
    pipelines::{
        background::BackgroundResources,
        basic::{self, MaterialResources, MaterialUniform, PipelineKey},
        light::LightUniform,
        line, shadow,
    },
    stage::Stage,
};

/// One primitive of a mesh node.
#[derive(Debug)]
pub struct MeshDraw<'a> {
    pub node: NodeId,
    pub geometry: &'a Arc<Geometry>,
    pub material: &'a Material,
    pub instance: u32,
    pub material_index: usize,
    pub key: PipelineKey,
    pub cast_shadow: bool,
    /// Distance from the camera to the node origin.
    pub depth: f32,
    /// This frame's pose of a skinned primitive.
    pub skinned: Option<Vec<ModelVertex>>,
}

/// Geometry id, plus the node for skinned meshes whose buffers hold a per-node pose.
pub type MeshKey = (u64, Option<NodeId>);

impl MeshDraw<'_> {
    pub fn mesh_key(&self) -> MeshKey {
        (self.geometry.id(), self.skinned.as_ref().map(|_| self.node))
    }
}

#[derive(Debug)]
pub enum LineSource<'a> {
    Segments(&'a LineSegments),
    /// The edges of a mesh drawn with a wireframe material, in its colour.
    Wireframe(&'a Arc<Geometry>, [f32; 3]),
}

#[derive(Debug)]
pub struct LineDraw<'a> {
    pub source: LineSource<'a>,
    pub instance: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct ShadowCaster {
    pub view_proj: Matrix4<f32>,
    pub position: Point3<f32>,
    pub shadow: Shadow,
}

/// Everything one frame draws, collected from the stage.
#[derive(Debug)]
pub struct FramePlan<'a> {
    pub instances: Vec<InstanceRaw>,
    pub materials: Vec<MaterialUniform>,
    pub opaque: Vec<MeshDraw<'a>>,
    pub transparent: Vec<MeshDraw<'a>>,
    pub lines: Vec<LineDraw<'a>>,
    pub lights: LightUniform,
    pub shadow: Option<ShadowCaster>,
}

impl<'a> FramePlan<'a> {
    pub fn collect(stage: &'a Stage) -> Self {
        let mut plan = Self {
            instances: Vec::new(),
            materials: Vec::new(),
            opaque: Vec::new(),
            transparent: Vec::new(),
            lines: Vec::new(),
            lights: LightUniform::new(),
            shadow: None,
        };
        let eye = stage.camera.position;
        for (id, world) in stage.scene.visible_nodes() {
            let Some(node) = stage.scene.get(id) else {
                continue;
            };
            match &node.kind {
                NodeKind::Mesh(primitives) => {
                    let instance = plan.push_instance(&world);
                    let depth = (world.transform_point(Point3::origin()) - eye).magnitude();
                    let joints = node.skin.as_ref().map(|skin| skin.joint_matrices(&stage.scene, &world));
                    for primitive in primitives {
                        let material = &primitive.material;
                        if material.wireframe {
                            plan.lines.push(LineDraw {
                                source: LineSource::Wireframe(&primitive.geometry, material.color),
                                instance,
                            });
                            continue;
                        }
                        let material_index = plan.materials.len();
                        plan.materials.push(MaterialUniform::from_material(
                            material,
                            node.receive_shadow && stage.shadows_enabled,
                        ));
                        let draw = MeshDraw {
                            node: id,
                            geometry: &primitive.geometry,
                            material,
                            instance,
                            material_index,
                            key: PipelineKey::for_material(material),
                            cast_shadow: node.cast_shadow,
                            depth,
                            skinned: joints.as_deref().and_then(|joints| {
                                let (positions, normals) = skin_geometry(&primitive.geometry, joints)?;
                                Some(interleave_posed(&primitive.geometry, &positions, &normals))
                            }),
                        };
                        if draw.key.transparent {
                            plan.transparent.push(draw);
                        } else {
                            plan.opaque.push(draw);
                        }
                    }
                }
                NodeKind::Lines(lines) => {
                    let instance = plan.push_instance(&world);
                    plan.lines.push(LineDraw {
                        source: LineSource::Segments(lines),
                        instance,
                    });
                }
                NodeKind::Light(light) => {
                    let position = world.transform_point(Point3::origin());
                    let Some(slot) = plan.lights.push(light, position) else {
                        continue;
                    };
                    if !stage.shadows_enabled || plan.shadow.is_some() || !light.casts_shadow() {
                        continue;
                    }
                    if let (Some(view_proj), Some(shadow)) =
                        (light.shadow_view_proj(position), light.shadow)
                    {
                        plan.lights.set_shadow(slot, view_proj, &shadow);
                        plan.shadow = Some(ShadowCaster {
                            view_proj,
                            position,
                            shadow,
                        });
                    }
                }
                NodeKind::Group | NodeKind::Pivot | NodeKind::Audio(_) => (),
            }
        }
        plan.transparent.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        plan.lights.set_environment(stage.environment.as_deref());
        plan.lights.set_tone_mapping(stage.tone_mapping, stage.exposure);
        plan
    }

    fn push_instance(&mut self, world: &Matrix4<f32>) -> u32 {
        self.instances.push(InstanceRaw::from_world(world));
        (self.instances.len() - 1) as u32
    }

    /// Draws that need a colour map.
    pub fn maps(&self) -> impl Iterator<Item = &'a Arc<TextureData>> + '_ {
        self.opaque
            .iter()
            .chain(self.transparent.iter())
            .filter_map(|draw| draw.material.map.as_ref())
    }
}

struct CachedTexture {
    revision: u64,
    texture: Texture,
    bind_group: wgpu::BindGroup,
}

/// The wgpu renderer behind a window.
pub struct GpuRenderer {
    context: Context,
    mesh_layout: wgpu::PipelineLayout,
    mesh_pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    line_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    shadow_camera: CameraResources,
    background: BackgroundResources,
    materials: MaterialResources,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white: wgpu::BindGroup,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    meshes: HashMap<MeshKey, Mesh>,
    lines: HashMap<u64, LineMesh>,
    wireframes: HashMap<u64, LineMesh>,
    textures: HashMap<u64, CachedTexture>,
}

impl GpuRenderer {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let context = Context::new(window).await?;
        let device = &context.device;
        let format = context.config.format;

        let materials = MaterialResources::new(device);
        let texture_layout = basic::texture_bind_group_layout(device);
        let mesh_layout = basic::mk_mesh_pipeline_layout(
            device,
            &context.camera.bind_group_layout,
            &context.light.bind_group_layout,
            &materials.bind_group_layout,
            &texture_layout,
        );
        let line_pipeline = line::mk_line_pipeline(device, format, &context.camera.bind_group_layout);
        let shadow_camera = CameraResources::new(device, "shadow camera");
        let shadow_pipeline = shadow::mk_shadow_pipeline(device, &shadow_camera.bind_group_layout);
        let background = BackgroundResources::new(
            device,
            &context.queue,
            format,
            &context.camera.bind_group_layout,
        );
        let sampler = texture::create_default_sampler(device);
        let white = basic::texture_bind_group(
            device,
            &texture_layout,
            &Texture::white(device, &context.queue),
            &sampler,
            "white_bind_group",
        );
        let instance_capacity = 64;
        let instance_buffer = mk_instance_buffer(device, instance_capacity);

        Ok(Self {
            mesh_layout,
            mesh_pipelines: HashMap::new(),
            line_pipeline,
            shadow_pipeline,
            shadow_camera,
            background,
            materials,
            texture_layout,
            sampler,
            white,
            instance_buffer,
            instance_capacity,
            meshes: HashMap::new(),
            lines: HashMap::new(),
            wireframes: HashMap::new(),
            textures: HashMap::new(),
            context,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        self.context.window()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Uploads everything `plan` refers to and drops what it does not.
    fn prepare(&mut self, stage: &Stage, plan: &FramePlan) {
        let device = &self.context.device;
        let queue = &self.context.queue;

        self.context.camera.write(
            queue,
            CameraUniform::from_matrix(stage.camera.position, stage.view_proj()),
        );

        if plan.instances.len() > self.instance_capacity {
            self.instance_capacity = plan.instances.len().next_power_of_two();
            self.instance_buffer = mk_instance_buffer(device, self.instance_capacity);
        }
        if !plan.instances.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&plan.instances));
        }
        self.materials.write(device, queue, &plan.materials);

        let mut used_meshes = HashSet::new();
        for draw in plan.opaque.iter().chain(plan.transparent.iter()) {
            let key = draw.mesh_key();
            used_meshes.insert(key);
            let mesh = self
                .meshes
                .entry(key)
                .or_insert_with(|| Mesh::from_geometry(device, draw.geometry));
            if let Some(vertices) = &draw.skinned {
                queue.write_buffer(&mesh.vertex_buffer, 0, bytemuck::cast_slice(vertices));
            }
            self.mesh_pipelines.entry(draw.key).or_insert_with(|| {
                log::debug!("building mesh pipeline {:?}", draw.key);
                basic::mk_mesh_pipeline(device, &self.mesh_layout, self.context.config.format, draw.key)
            });
        }
        self.meshes.retain(|id, _| used_meshes.contains(id));

        let mut used_lines = HashSet::new();
        let mut used_wireframes = HashSet::new();
        for draw in &plan.lines {
            match &draw.source {
                LineSource::Segments(segments) => {
                    used_lines.insert(segments.id());
                    self.lines
                        .entry(segments.id())
                        .or_insert_with(|| LineMesh::from_segments(device, segments));
                }
                LineSource::Wireframe(geometry, color) => {
                    used_wireframes.insert(geometry.id());
                    self.wireframes.entry(geometry.id()).or_insert_with(|| {
                        LineMesh::from_segments(device, &LineSegments::wireframe(geometry, *color))
                    });
                }
            }
        }
        self.lines.retain(|id, _| used_lines.contains(id));
        self.wireframes.retain(|id, _| used_wireframes.contains(id));

        let mut used_textures = HashSet::new();
        for map in plan.maps() {
            used_textures.insert(map.id());
            match self.textures.get_mut(&map.id()) {
                Some(cached) if cached.revision == map.revision() => (),
                Some(cached) if same_size(&cached.texture, map) => {
                    cached.texture.write(queue, map);
                    cached.revision = map.revision();
                }
                _ => {
                    let texture = Texture::from_data(device, queue, map);
                    let bind_group = basic::texture_bind_group(
                        device,
                        &self.texture_layout,
                        &texture,
                        &self.sampler,
                        &map.label,
                    );
                    self.textures.insert(
                        map.id(),
                        CachedTexture {
                            revision: map.revision(),
                            texture,
                            bind_group,
                        },
                    );
                }
            }
        }
        self.textures.retain(|id, _| used_textures.contains(id));

        if let Some(caster) = &plan.shadow {
            self.context.light.ensure_shadow_map(device, caster.shadow.map_size);
            self.shadow_camera.write(
                queue,
                CameraUniform::from_matrix(caster.position, caster.view_proj),
            );
        }
        self.context
            .light
            .set_environment(device, queue, stage.environment.as_deref());
        self.context.light.write(queue, plan.lights);
        self.background.prepare(device, queue, stage);
    }

    fn map_bind_group(&self, material: &Material) -> &wgpu::BindGroup {
        material
            .map
            .as_ref()
            .and_then(|map| self.textures.get(&map.id()))
            .map_or(&self.white, |cached| &cached.bind_group)
    }

    fn shadow_pass(&self, encoder: &mut wgpu::CommandEncoder, plan: &FramePlan) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.context.light.shadow_map.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&self.shadow_pipeline);
        render_pass.set_bind_group(0, &self.shadow_camera.bind_group, &[]);
        render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        for draw in plan.opaque.iter().chain(plan.transparent.iter()) {
            if !draw.cast_shadow {
                continue;
            }
            let Some(mesh) = self.meshes.get(&draw.mesh_key()) else {
                continue;
            };
            if mesh.num_elements == 0 {
                continue;
            }
            render_pass.draw_mesh_instanced(mesh, draw.instance..draw.instance + 1);
        }
    }

    fn draw_meshes(&self, render_pass: &mut wgpu::RenderPass<'_>, draws: &[MeshDraw]) {
        for draw in draws {
            let (Some(mesh), Some(pipeline)) = (
                self.meshes.get(&draw.mesh_key()),
                self.mesh_pipelines.get(&draw.key),
            ) else {
                continue;
            };
            if mesh.num_elements == 0 {
                log::warn!("{} has no triangles", mesh.name);
                continue;
            }
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(
                2,
                &self.materials.bind_group,
                &[self.materials.offset(draw.material_index)],
            );
            render_pass.set_bind_group(3, self.map_bind_group(draw.material), &[]);
            render_pass.draw_mesh_instanced(mesh, draw.instance..draw.instance + 1);
        }
    }

    fn draw_lines(&self, render_pass: &mut wgpu::RenderPass<'_>, draws: &[LineDraw]) {
        render_pass.set_pipeline(&self.line_pipeline);
        render_pass.set_bind_group(0, &self.context.camera.bind_group, &[]);
        for draw in draws {
            let lines = match &draw.source {
                LineSource::Segments(segments) => self.lines.get(&segments.id()),
                LineSource::Wireframe(geometry, _) => self.wireframes.get(&geometry.id()),
            };
            let Some(lines) = lines.filter(|l| l.num_vertices > 0) else {
                continue;
            };
            render_pass.draw_lines_instanced(lines, draw.instance..draw.instance + 1);
        }
    }
}

fn same_size(texture: &Texture, data: &TextureData) -> bool {
    let size = texture.texture.size();
    size.width == data.width && size.height == data.height
}

fn mk_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Instance Buffer"),
        size: (capacity * std::mem::size_of::<InstanceRaw>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl Renderer for GpuRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.context.resize(viewport.width, viewport.height);
    }

    fn render(&mut self, stage: &Stage) -> Result<(), RenderError> {
        if stage.viewport.is_empty() {
            return Ok(());
        }
        let plan = FramePlan::collect(stage);
        self.prepare(stage, &plan);

        let output = self.context.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        if plan.shadow.is_some() {
            self.shadow_pass(&mut encoder, &plan);
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(stage.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.context.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.background
                .draw(&mut render_pass, &self.context.camera.bind_group);

            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            render_pass.set_bind_group(0, &self.context.camera.bind_group, &[]);
            render_pass.set_bind_group(1, &self.context.light.bind_group, &[]);
            self.draw_meshes(&mut render_pass, &plan.opaque);
            self.draw_lines(&mut render_pass, &plan.lines);
            // the line pipeline only shares group 0
            render_pass.set_bind_group(1, &self.context.light.bind_group, &[]);
            self.draw_meshes(&mut render_pass, &plan.transparent);
        }

        self.context.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
