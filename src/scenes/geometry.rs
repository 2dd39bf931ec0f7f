use std::{f32::consts::TAU, sync::Arc};

use cgmath::{Point2, Point3};
use instant::Duration;

use crate::{
    camera::Camera,
    data_structures::{
        font::{Font, TextOptions, text_geometry},
        geometry::{Bevel, Geometry, LineSegments, Shape, sample_curve},
        material::{Material, hex_color},
        scene_graph::{Node, NodeId},
    },
    flow::{GraphicsFlow, Out},
    stage::Stage,
};

const FONT: &str = "fonts/helvetiker_regular.typeface.json";
const FILL: u32 = 0x515151;
const WIRE: u32 = 0xffff00;

/// Which model the geometry scene builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GeometryVariant {
    /// Extruded, bevelled "GIS" text.
    #[default]
    Text,
    /// A sine wave drawn as a line.
    Curve,
    /// A closed tube swept along the sine wave.
    Tube,
    /// A filled square.
    Shape,
    /// The square's outline only.
    ShapeOutline,
    /// Half a vase turned around the Y axis.
    Lathe,
}

/// Sine wave spanning x in `-1.5..=1.5`, scaled.
pub fn sin_curve(scale: f32) -> impl Fn(f32) -> Point3<f32> {
    move |t| Point3::new((t * 3.0 - 1.5) * scale, (TAU * t).sin() * scale, 0.0)
}

fn square() -> Shape {
    Shape::new()
        .move_to(1.0, 1.0)
        .line_to(1.0, -1.0)
        .line_to(-1.0, -1.0)
        .line_to(-1.0, 1.0)
        .close_path()
}

fn vase_profile() -> Vec<Point2<f32>> {
    (0..10)
        .map(|i| {
            let i = i as f32;
            Point2::new((i * 0.2).sin() * 3.0 + 3.0, (i - 5.0) * 0.8)
        })
        .collect()
}

/// A filled geometry with its wireframe on top.
#[derive(Debug, Default)]
pub struct GeometryScene {
    variant: GeometryVariant,
    model: Option<NodeId>,
}

impl GeometryScene {
    pub fn new(variant: GeometryVariant) -> Self {
        Self {
            variant,
            model: None,
        }
    }

    pub fn model(&self) -> Option<NodeId> {
        self.model
    }

    fn add_filled(&mut self, stage: &mut Stage, geometry: Geometry) {
        let wireframe = LineSegments::wireframe(&geometry, hex_color(WIRE));
        let group = stage.add(Node::group("Model"));
        stage.scene.add(group, Node::mesh("Fill", geometry, Material::phong(FILL)));
        stage.scene.add(group, Node::lines("Wireframe", wireframe));
        self.model = Some(group);
    }

    fn add_line(&mut self, stage: &mut Stage, points: &[Point3<f32>]) {
        let line = LineSegments::polyline(points, false, hex_color(WIRE));
        self.model = Some(stage.add(Node::lines("Line", line)));
    }

    fn add_text(&mut self, stage: &mut Stage, font: &Font) {
        let options = TextOptions {
            size: 5.0,
            depth: 1.5,
            curve_segments: 4,
            bevel: Some(Bevel {
                thickness: 0.7,
                size: 0.7,
                offset: 0.0,
                segments: 2,
            }),
        };
        self.add_filled(stage, text_geometry(font, "GIS", &options));
    }
}

impl GraphicsFlow for GeometryScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((0.0, 0.0, 15.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        super::key_light(stage, 1.0, -1.0, 2.0, 4.0);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        match self.variant {
            GeometryVariant::Text => {
                return Out::load(stage.loader.font(FONT), |scene: &mut Self, stage, font: Arc<Font>| {
                    scene.add_text(stage, &font)
                });
            }
            GeometryVariant::Curve => {
                let points = sample_curve(&sin_curve(4.0), 30);
                self.add_line(stage, &points);
            }
            GeometryVariant::Tube => {
                self.add_filled(stage, Geometry::tube(&sin_curve(4.0), 40, 0.8, 8, true));
            }
            GeometryVariant::Shape => self.add_filled(stage, Geometry::shape(&square())),
            GeometryVariant::ShapeOutline => self.add_line(stage, &square().outline()),
            GeometryVariant::Lathe => {
                self.add_filled(stage, Geometry::lathe(&vase_profile(), 32, 0.0, TAU / 2.0));
            }
        }
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

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::NodeKind;

    #[test]
    fn sin_curve_spans_three_scaled_units() {
        let curve = sin_curve(4.0);
        assert_eq!(curve(0.0), Point3::new(-6.0, 0.0, 0.0));
        assert!((curve(1.0).x - 6.0).abs() < 1e-5);
        assert!((curve(0.25).y - 4.0).abs() < 1e-5);
    }

    #[test]
    fn filled_variants_carry_their_wireframe() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        for variant in [GeometryVariant::Tube, GeometryVariant::Shape, GeometryVariant::Lathe] {
            let mut stage = super::super::test_stage(&runtime);
            let mut scene = GeometryScene::new(variant);
            assert!(matches!(scene.setup_model(&mut stage), Out::Empty));
            let model = scene.model().expect("model");
            let children = stage.scene.children(model);
            assert_eq!(children.len(), 2);
            let kinds: Vec<_> = children
                .iter()
                .filter_map(|id| stage.scene.get(*id))
                .map(|n| matches!(n.kind, NodeKind::Mesh(_)))
                .collect();
            assert_eq!(kinds, vec![true, false]);
        }
    }

    #[test]
    fn outline_closes_the_square() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = GeometryScene::new(GeometryVariant::ShapeOutline);
        scene.setup_model(&mut stage);
        let node = stage.scene.get(scene.model().expect("model")).expect("node");
        let NodeKind::Lines(lines) = &node.kind else {
            panic!("expected a line");
        };
        // four sides, two positions each
        assert_eq!(lines.positions.len(), 8);
    }

    #[test]
    fn text_waits_for_its_font() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = GeometryScene::new(GeometryVariant::Text);
        assert!(matches!(scene.setup_model(&mut stage), Out::FutFn(ref f) if f.len() == 1));
        assert_eq!(scene.model(), None);
    }
}
