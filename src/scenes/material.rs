use instant::Duration;

use crate::{
    camera::Camera,
    data_structures::{geometry::Geometry, material::Material, scene_graph::Node},
    flow::{GraphicsFlow, Out},
    stage::Stage,
};

/// A red physical material on a box and a sphere.
#[derive(Debug, Default)]
pub struct MaterialScene;

impl MaterialScene {
    pub fn new() -> Self {
        Self
    }

    pub fn material() -> Material {
        Material::physical(0xff0000, 0.25, 0.5, 0.0)
    }
}

impl GraphicsFlow for MaterialScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((0.0, 0.0, 3.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        super::key_light(stage, 1.0, -1.0, 2.0, 4.0);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        let material = Self::material();
        stage.add(Node::mesh("Box", Geometry::box_geometry(1.0, 1.0, 1.0), material.clone()).at(-1.0, 0.0, 0.0));
        stage.add(Node::mesh("Sphere", Geometry::sphere(0.7, 32, 32), material).at(1.0, 0.0, 0.0));
        Out::Empty
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, _stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        Out::Empty
    }
}
