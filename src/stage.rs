//! The per-scene application context.
//!
//! A [`Stage`] bundles everything the setup and update hooks of a scene work
//! against: camera and projection, the scene graph, running tweens and
//! animation mixers, the background and the render settings. The lifecycle
//! owns it and lends it to every hook; the renderer only reads it.

use std::sync::Arc;

use cgmath::{Deg, Matrix4};
use instant::Duration;

use crate::{
    camera::{Camera, OrbitControls, Projection, view_proj},
    context::Viewport,
    data_structures::{
        material::hex_color,
        scene_graph::{Node, NodeId, SceneGraph},
        texture::{TextureData, cover_crop},
    },
    pick::{Hit, Ray},
    resources::{AssetLoader, animation::AnimationMixer},
    tween::{TweenRunner, TweenSpec},
};

/// What is drawn behind the scene. A solid colour is the stage's clear colour.
#[derive(Clone, Debug, Default)]
pub enum Background {
    #[default]
    None,
    /// A screen aligned image sampled at `offset + uv * repeat`.
    Image {
        texture: Arc<TextureData>,
        offset: [f32; 2],
        repeat: [f32; 2],
    },
    /// An equirectangular panorama looked up by view direction.
    Equirect(Arc<TextureData>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToneMapping {
    #[default]
    None,
    AcesFilmic,
}

#[derive(Debug)]
pub struct Stage {
    pub camera: Camera,
    pub projection: Projection,
    pub controls: Option<OrbitControls>,
    pub viewport: Viewport,
    pub scene: SceneGraph,
    pub tweens: TweenRunner,
    pub mixers: Vec<AnimationMixer>,
    pub background: Background,
    /// Reflected by standard and physical materials.
    pub environment: Option<Arc<TextureData>>,
    pub clear_colour: wgpu::Color,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub shadows_enabled: bool,
    pub loader: AssetLoader,
    /// Last known pointer position in physical pixels.
    pub cursor: (f64, f64),
}

impl Stage {
    /// Camera at (0, 0, 5) looking at the origin, 75° field of view, 0.1 to 100.
    pub fn new(viewport: Viewport, loader: AssetLoader) -> Self {
        Self {
            camera: Camera::default(),
            projection: Projection::new(viewport.width, viewport.height, Deg(75.0), 0.1, 100.0),
            controls: None,
            viewport,
            scene: SceneGraph::new(),
            tweens: TweenRunner::new(),
            mixers: Vec::new(),
            background: Background::None,
            environment: None,
            clear_colour: wgpu::Color::BLACK,
            tone_mapping: ToneMapping::None,
            exposure: 1.0,
            shadows_enabled: false,
            loader,
            cursor: (0.0, 0.0),
        }
    }

    /// Replaces the projection, keeping the current aspect ratio.
    pub fn set_perspective(&mut self, fovy: impl Into<cgmath::Rad<f32>>, znear: f32, zfar: f32) {
        self.projection = Projection::new(self.viewport.width, self.viewport.height, fovy, znear, zfar);
    }

    /// Adds a node under the scene root.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.scene.add(NodeId::ROOT, node)
    }

    pub fn enable_orbit_controls(&mut self) {
        self.controls = Some(OrbitControls::new(&self.camera));
    }

    pub fn animate(&mut self, specs: impl IntoIterator<Item = TweenSpec>) {
        self.tweens.extend(specs);
    }

    pub fn set_background_color(&mut self, hex: u32) {
        let [r, g, b] = hex_color(hex);
        self.clear_colour = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        };
        self.background = Background::None;
    }

    /// Shows `texture` behind the scene, cropped to cover the viewport.
    pub fn set_background_image(&mut self, texture: Arc<TextureData>) {
        self.background = Background::Image {
            texture,
            offset: [0.0, 0.0],
            repeat: [1.0, 1.0],
        };
        self.fit_background();
    }

    /// Recomputes the cover crop of an image background for the current viewport.
    pub fn fit_background(&mut self) {
        let view_aspect = self.viewport.aspect();
        if let Background::Image {
            texture,
            offset,
            repeat,
        } = &mut self.background
        {
            (*offset, *repeat) = cover_crop(texture.aspect(), view_aspect);
        }
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        view_proj(&self.camera, &self.projection)
    }

    /// World ray through a position on the surface, in physical pixels.
    pub fn pointer_ray(&self, position: (f64, f64)) -> Option<Ray> {
        Ray::from_screen(
            position,
            (self.viewport.width, self.viewport.height),
            &self.view_proj(),
        )
    }

    /// Intersects the ray with every child of the scene root, nearest first.
    pub fn raycast(&self, ray: &Ray) -> Vec<Hit> {
        let roots = self.scene.children(NodeId::ROOT).to_vec();
        self.scene.raycast(ray, &roots)
    }

    /// Moves tweens and animations forward and places the camera.
    pub(crate) fn advance(&mut self, dt: Duration) {
        self.tweens.advance(&mut self.scene, dt);
        for mixer in self.mixers.iter_mut() {
            mixer.update(&mut self.scene, dt);
        }
        if let Some(controls) = &mut self.controls {
            controls.update(&mut self.camera);
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::data_structures::{geometry::Geometry, material::Material};

    fn stage(runtime: &tokio::runtime::Runtime) -> Stage {
        Stage::new(Viewport::new(800, 400, 1.0), AssetLoader::new(runtime.handle().clone()))
    }

    #[test]
    fn defaults_match_the_common_scene_setup() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let stage = stage(&runtime);
        assert_eq!(stage.camera.position, Point3::new(0.0, 0.0, 5.0));
        assert_eq!(stage.projection.aspect, 2.0);
        assert_eq!(stage.projection.znear, 0.1);
        assert_eq!(stage.projection.zfar, 100.0);
    }

    #[test]
    fn image_backgrounds_follow_the_viewport() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = stage(&runtime);
        let square = Arc::new(TextureData::new("bg", 2, 2, vec![0; 16], true));
        stage.set_background_image(square);
        let Background::Image { offset, repeat, .. } = &stage.background else {
            panic!("expected an image background");
        };
        assert_eq!((*offset, *repeat), ([0.0, 0.25], [1.0, 0.5]));

        stage.viewport = Viewport::new(400, 800, 1.0);
        stage.fit_background();
        let Background::Image { offset, repeat, .. } = &stage.background else {
            panic!("expected an image background");
        };
        assert_eq!((*offset, *repeat), ([0.25, 0.0], [0.5, 1.0]));
    }

    #[test]
    fn clicks_through_the_centre_hit_the_origin() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = stage(&runtime);
        let cube = stage.add(Node::mesh(
            "cube",
            Geometry::box_geometry(1.0, 1.0, 1.0),
            Material::basic(0xffffff),
        ));
        let ray = stage.pointer_ray((400.0, 200.0)).expect("ray");
        let hits = stage.raycast(&ray);
        assert_eq!(hits.first().map(|h| h.node), Some(cube));
        assert!((hits[0].point.z - 0.5).abs() < 1e-3);
    }
}
