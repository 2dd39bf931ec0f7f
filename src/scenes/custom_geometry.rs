use std::sync::Arc;

use instant::Duration;

use crate::{
    camera::Camera,
    data_structures::{
        geometry::{Geometry, LineSegments},
        material::{Material, hex_color},
        scene_graph::{Node, NodeId},
        texture::TextureData,
    },
    flow::{GraphicsFlow, Out},
    stage::Stage,
};

const MAP: &str = "textures/uv_grid_opengl.jpg";

/// A quad assembled from raw attribute buffers.
pub fn quad() -> Geometry {
    Geometry::from_buffers(
        vec![
            [-1.0, -1.0, 0.0],
            [1.0, -1.0, 0.0],
            [-1.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ],
        Some(vec![[0.0, 0.0, 1.0]; 4]),
        Some(vec![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 0.0],
        ]),
        // v grows downwards
        Some(vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]]),
        Some(vec![0, 1, 2, 2, 1, 3]),
    )
}

/// A hand-written textured quad with its vertex normals drawn.
#[derive(Debug, Default)]
pub struct CustomGeometryScene {
    quad: Option<NodeId>,
}

impl CustomGeometryScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_map(&mut self, stage: &mut Stage, map: Arc<TextureData>) {
        let primitives = self
            .quad
            .and_then(|id| stage.scene.get_mut(id))
            .and_then(|node| node.primitives_mut());
        if let Some(primitives) = primitives {
            for primitive in primitives.iter_mut() {
                primitive.material.map = Some(map.clone());
            }
        }
    }
}

impl GraphicsFlow for CustomGeometryScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((0.0, 0.0, 2.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        super::key_light(stage, 1.0, -1.0, 2.0, 4.0);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        let geometry = quad();
        let helper = LineSegments::vertex_normals(&geometry, 0.1, hex_color(0xffff00));
        self.quad = Some(stage.add(Node::mesh("Quad", geometry, Material::phong(0xffffff))));
        stage.add(Node::lines("Normals", helper));
        Out::load(stage.loader.texture(MAP), Self::apply_map)
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, _stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        Out::Empty
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn quad_keeps_the_given_normals() {
        let quad = quad();
        assert_eq!(quad.normals, vec![[0.0, 0.0, 1.0]; 4]);
        assert_eq!(quad.indices.len(), 6);
        assert!(quad.colors.is_some());
    }

    #[test]
    fn the_map_lands_on_the_quad() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = CustomGeometryScene::new();
        scene.setup_model(&mut stage);
        scene.apply_map(&mut stage, Arc::new(TextureData::solid("grid", [255; 4])));

        let node = stage.scene.find("Quad").and_then(|id| stage.scene.get(id)).expect("quad");
        let crate::data_structures::scene_graph::NodeKind::Mesh(primitives) = &node.kind else {
            panic!("expected a mesh");
        };
        assert!(primitives[0].material.map.is_some());
        assert!(stage.scene.find("Normals").is_some());
    }
}
