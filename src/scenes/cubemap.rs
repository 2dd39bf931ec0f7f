use std::sync::Arc;

use cgmath::Deg;
use instant::Duration;

use crate::{
    camera::Camera,
    data_structures::{
        geometry::Geometry,
        material::Material,
        scene_graph::{Node, NodeKind, Primitive},
        texture::TextureData,
    },
    flow::{GraphicsFlow, Out},
    stage::{Background, Stage},
};

const FACES: [&str; 6] = [
    "Maskonaive2/posx.jpg",
    "Maskonaive2/negx.jpg",
    "Maskonaive2/posy.jpg",
    "Maskonaive2/negy.jpg",
    "Maskonaive2/posz.jpg",
    "Maskonaive2/negz.jpg",
];
/// Width of the panorama the six faces are merged into.
const PANORAMA_WIDTH: u32 = 2048;

/// Grid coordinates of the spheres: x and y from -20 to 20, z from -200 to 20, 10 apart.
pub fn sphere_grid() -> Vec<[f32; 3]> {
    let axis = |from: i32, to: i32| (from..=to).step_by(10).map(|v| v as f32);
    let mut positions = Vec::new();
    for x in axis(-20, 20) {
        for y in axis(-20, 20) {
            for z in axis(-200, 20) {
                positions.push([x, y, z]);
            }
        }
    }
    positions
}

/// Mirror spheres reflecting a cube-map sky.
#[derive(Debug, Default)]
pub struct CubemapScene {
    spheres: usize,
}

impl CubemapScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_sky(&mut self, stage: &mut Stage, sky: Arc<TextureData>) {
        stage.background = Background::Equirect(sky.clone());
        stage.environment = Some(sky);
        stage.fit_background();
        self.add_spheres(stage);
    }

    fn add_spheres(&mut self, stage: &mut Stage) {
        let geometry = Arc::new(Geometry::sphere(1.0, 32, 16));
        let green = Material::standard(0x2ecc71, 0.0, 1.0);
        let red = Material::standard(0xe74c3c, 0.0, 1.0);
        let grid = sphere_grid();
        self.spheres = grid.len();
        for (i, [x, y, z]) in grid.into_iter().enumerate() {
            let material = if i % 2 == 0 { red.clone() } else { green.clone() };
            let primitive = Primitive {
                geometry: geometry.clone(),
                material,
            };
            stage.add(Node::new(format!("Sphere {}", i), NodeKind::Mesh(vec![primitive])).at(x, y, z));
        }
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres
    }
}

impl GraphicsFlow for CubemapScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.set_perspective(Deg(60.0), 0.1, 1000.0);
        stage.camera = Camera::new((0.0, 0.0, 40.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        super::key_light(stage, 1.0, -1.0, 1.0, 1.0);
        let sky = stage.loader.cube_texture(FACES, PANORAMA_WIDTH);
        Out::load(sky, Self::apply_sky)
    }

    /// The spheres wait for the sky they reflect.
    fn setup_model(&mut self, _stage: &mut Stage) -> Out<Self> {
        Out::Empty
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, _stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        Out::Empty
    }

    fn on_resize(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.fit_background();
        Out::Empty
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_the_whole_range() {
        let grid = sphere_grid();
        assert_eq!(grid.len(), 5 * 5 * 23);
        assert_eq!(grid[0], [-20.0, -20.0, -200.0]);
        assert_eq!(grid[grid.len() - 1], [20.0, 20.0, 20.0]);
    }

    #[test]
    fn spheres_follow_the_sky_and_alternate_colours() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = CubemapScene::new();
        assert!(matches!(scene.setup_model(&mut stage), Out::Empty));
        assert!(stage.scene.find("Sphere 0").is_none());

        scene.apply_sky(&mut stage, Arc::new(TextureData::solid("sky", [0, 0, 255, 255])));
        assert!(matches!(stage.background, Background::Equirect(_)));
        assert!(stage.environment.is_some());
        assert_eq!(scene.sphere_count(), 575);

        let colour = |name: &str| match &stage.scene.get(stage.scene.find(name).expect("sphere")).expect("node").kind {
            NodeKind::Mesh(primitives) => primitives[0].material.color,
            _ => panic!("expected a mesh"),
        };
        assert_ne!(colour("Sphere 0"), colour("Sphere 1"));
        assert_eq!(colour("Sphere 0"), colour("Sphere 2"));
    }
}
