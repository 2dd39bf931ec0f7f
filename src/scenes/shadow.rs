use std::{f32::consts::TAU, sync::Arc};

use cgmath::{Deg, Point3, Rad, SquareMatrix};
use instant::Duration;

use crate::{
    camera::Camera,
    data_structures::{
        geometry::{Geometry, LineSegments},
        light::{Light, Shadow},
        material::{Material, Side, hex_color},
        scene_graph::{Node, NodeId, NodeKind, Primitive},
    },
    flow::{GraphicsFlow, Out},
    stage::Stage,
};

const PIVOT: &str = "smallSpherePivot";
/// Degrees per second the small sphere orbits at.
const ORBIT_SPEED: f32 = 50.0;

/// A ground plane, a torus knot and a ring of tori, lit by a spot light
/// that follows a small orbiting sphere.
#[derive(Debug, Default)]
pub struct ShadowScene {
    spot: Option<NodeId>,
    helper: Option<NodeId>,
    sphere: Option<NodeId>,
}

impl ShadowScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the outline of the spot light's shadow camera.
    fn refresh_helper(&self, stage: &mut Stage) {
        let (Some(spot), Some(helper)) = (self.spot, self.helper) else {
            return;
        };
        let position = stage.scene.world_position(spot);
        let view_proj = stage
            .scene
            .get(spot)
            .and_then(|node| node.light_ref())
            .and_then(|light| light.shadow_view_proj(position));
        let Some(inverse) = view_proj.and_then(|m| m.invert()) else {
            return;
        };
        if let Some(node) = stage.scene.get_mut(helper) {
            node.kind = NodeKind::Lines(LineSegments::frustum(&inverse, hex_color(0xffaa00)));
        }
    }
}

impl GraphicsFlow for ShadowScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((7.0, 7.0, 0.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.add(Node::light("Aux Light", Light::directional(0xffffff, 0.5)).at(0.0, 5.0, 0.0));
        let spot = Light::spot(0xffffff, 150.0, Deg(30.0), 0.2).with_shadow(Shadow {
            map_size: 2048,
            radius: 1.0,
            far: 20.0,
            ..Default::default()
        });
        self.spot = Some(stage.add(Node::light("Spot Light", spot).at(0.0, 5.0, 0.0)));
        self.helper = Some(stage.add(Node::lines("Shadow Camera", LineSegments::new(Vec::new(), [1.0; 3]))));
        stage.shadows_enabled = true;
        self.refresh_helper(stage);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        let mut ground = Node::mesh(
            "Ground",
            Geometry::plane(10.0, 10.0, 1, 1),
            Material::standard(0x2c3e50, 0.5, 0.5).with_side(Side::Double),
        )
        .with_shadows(false, true);
        ground.transform.rotation.x = Rad::from(Deg(-90.0)).0;
        stage.add(ground);

        stage.add(
            Node::mesh(
                "Torus Knot",
                Geometry::torus_knot(1.0, 0.3, 128, 64, 2, 3),
                Material::standard(0xffffff, 0.1, 0.2),
            )
            .at(0.0, 1.6, 0.0)
            .with_shadows(true, true),
        );

        let torus = Arc::new(Geometry::torus(0.4, 0.1, 32, 32, TAU));
        let torus_material = Material::standard(0x9b59b6, 0.5, 0.9);
        for i in 0..8 {
            let mut pivot = Node::pivot(format!("Torus Pivot {}", i));
            pivot.transform.rotation.y = Rad::from(Deg(45.0 * i as f32)).0;
            let pivot = stage.add(pivot);
            let primitive = Primitive {
                geometry: torus.clone(),
                material: torus_material.clone(),
            };
            stage.scene.add(
                pivot,
                Node::new(format!("Torus {}", i), NodeKind::Mesh(vec![primitive]))
                    .at(3.0, 0.5, 0.0)
                    .with_shadows(true, true),
            );
        }

        let pivot = stage.add(Node::pivot(PIVOT));
        self.sphere = Some(
            stage.scene.add(
                pivot,
                Node::mesh(
                    "Small Sphere",
                    Geometry::sphere(0.3, 32, 32),
                    Material::standard(0xe74c3c, 0.2, 0.5),
                )
                .at(3.0, 0.5, 0.0)
                .with_shadows(true, true),
            ),
        );
        Out::Empty
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, stage: &mut Stage, timestamp: Duration) -> Out<Self> {
        let Some(pivot) = stage.scene.find(PIVOT) else {
            return Out::Empty;
        };
        if let Some(node) = stage.scene.get_mut(pivot) {
            node.transform.rotation.y = Rad::from(Deg(timestamp.as_secs_f32() * ORBIT_SPEED)).0;
        }
        let target = self
            .sphere
            .map(|sphere| stage.scene.world_position(sphere))
            .unwrap_or(Point3::new(0.0, 0.0, 0.0));
        if let Some(light) = self
            .spot
            .and_then(|spot| stage.scene.get_mut(spot))
            .and_then(|node| node.light_mut())
        {
            light.set_target(target);
        }
        self.refresh_helper(stage);
        Out::Empty
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    fn setup(stage: &mut Stage) -> ShadowScene {
        let mut scene = ShadowScene::new();
        scene.setup_camera(stage);
        scene.setup_light(stage);
        scene.setup_model(stage);
        scene
    }

    #[test]
    fn builds_eight_tori_around_the_knot() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        setup(&mut stage);
        let tori: Vec<_> = (0..8)
            .filter_map(|i| stage.scene.find(&format!("Torus {}", i)))
            .collect();
        assert_eq!(tori.len(), 8);
        // the tori share one geometry
        let geometry_ids: std::collections::HashSet<u64> = tori
            .iter()
            .filter_map(|id| match &stage.scene.get(*id)?.kind {
                NodeKind::Mesh(primitives) => Some(primitives[0].geometry.id()),
                _ => None,
            })
            .collect();
        assert_eq!(geometry_ids.len(), 1);
        assert!(stage.shadows_enabled);
    }

    #[test]
    fn spot_light_tracks_the_orbiting_sphere() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = setup(&mut stage);
        // 50 degrees per second: a quarter turn after 1.8 s
        scene.on_update(&mut stage, Duration::from_millis(1800));

        let sphere = stage.scene.find("Small Sphere").expect("sphere");
        let position = stage.scene.world_position(sphere);
        assert!((position.x - 0.0).abs() < 1e-4);
        assert!((position.z + 3.0).abs() < 1e-4);

        let spot = stage.scene.find("Spot Light").expect("spot");
        let target = stage.scene.get(spot).and_then(|n| n.light_ref()).and_then(|l| l.target());
        assert_eq!(target, Some(position));

        let helper = stage.scene.find("Shadow Camera").expect("helper");
        let NodeKind::Lines(lines) = &stage.scene.get(helper).expect("node").kind else {
            panic!("expected lines");
        };
        assert_eq!(lines.positions.len(), 24);
    }
}
