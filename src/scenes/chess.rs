use cgmath::{Deg, Vector3};
use instant::Duration;

use crate::{
    camera::Camera,
    chess::{BOARD_NAME, PickAndPlace, REST_HEIGHT, board_position, resolve_click},
    data_structures::{
        light::Light,
        scene_graph::{ModelScene, Node, NodeId},
    },
    flow::{GraphicsFlow, Out},
    pick::Hit,
    stage::Stage,
};

const MODEL: &str = "chess.glb";
const BACK_RANK: [&str; 8] = ["Rock", "Knight", "Bishop", "Queen", "King", "Bishop", "Knight", "Rock"];

/// Where one piece starts: board square, model node to copy and the copy's name.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub row: u32,
    pub col: u32,
    pub model: String,
    pub name: String,
}

/// The 32 pieces of the opening position, white on rows 0 and 1.
pub fn opening_position() -> Vec<Placement> {
    let mut placements = Vec::with_capacity(32);
    for (colour, back, pawns) in [("White", 0, 1), ("Black", 7, 6)] {
        for col in 0..8 {
            placements.push(Placement {
                row: pawns,
                col,
                model: format!("{}-Pawn", colour),
                name: format!("{}-Pawn-{}", colour, col),
            });
        }
        for (col, kind) in BACK_RANK.iter().enumerate() {
            let model = format!("{}-{}", colour, kind);
            // kings and queens are unique, the rest are numbered from the left
            let name = match *kind {
                "Queen" | "King" => model.clone(),
                _ => {
                    let index = BACK_RANK[..col].iter().filter(|k| *k == kind).count();
                    format!("{}-{}", model, index)
                }
            };
            placements.push(Placement {
                row: back,
                col: col as u32,
                model,
                name,
            });
        }
    }
    placements
}

/// A chess board whose pieces are lifted and moved with the mouse.
#[derive(Debug, Default)]
pub struct ChessScene {
    picking: PickAndPlace,
    board: Option<NodeId>,
}

impl ChessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn picking(&self) -> &PickAndPlace {
        &self.picking
    }

    fn setup_board(&mut self, stage: &mut Stage, model: ModelScene) {
        let repository = stage.scene.instantiate(&model).root;
        let Some(board) = stage.scene.find_by_name(repository, BOARD_NAME) else {
            log::error!("{} has no node called {}", MODEL, BOARD_NAME);
            return;
        };
        stage.scene.attach(NodeId::ROOT, board);
        if let Some(node) = stage.scene.get_mut(board) {
            node.transform.position = Vector3::new(0.0, 0.0, 0.0);
        }
        self.board = Some(board);

        let bounds = stage.scene.world_bounding_box(board);
        let size = bounds.max.x - bounds.min.x;
        for placement in opening_position() {
            let copy = stage
                .scene
                .find_by_name(repository, &placement.model)
                .and_then(|source| stage.scene.clone_subtree(source));
            let Some(piece) = copy else {
                log::warn!("{} has no piece called {}", MODEL, placement.model);
                continue;
            };
            let (x, z) = board_position(size, placement.row, placement.col);
            if let Some(node) = stage.scene.get_mut(piece) {
                node.name = placement.name;
                node.transform.position = Vector3::new(x, REST_HEIGHT, z);
                node.transform.rotation = Vector3::new(0.0, 0.0, 0.0);
            }
            stage.scene.attach(NodeId::ROOT, piece);
        }
        // the repository stays detached and is never drawn
    }
}

impl GraphicsFlow for ChessScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.set_perspective(Deg(40.0), 1.0, 100.0);
        stage.camera = Camera::new((0.0, 0.0, 50.0));
        Out::configure(|stage: &mut Stage| {
            stage.clear_colour = wgpu::Color {
                r: 0.7,
                g: 0.7,
                b: 0.7,
                a: 1.0,
            };
        })
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.add(Node::light("Ambient Light", Light::ambient(0xffffff, 0.1)));
        for (x, z) in [(10.0, 10.0), (-10.0, -10.0), (-10.0, 10.0), (10.0, -10.0)] {
            stage.add(Node::light("Point Light", Light::point(0xffffff, 500.0)).at(x, 30.0, z));
        }
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        Out::load(stage.loader.model(MODEL), Self::setup_board)
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, _stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        Out::Empty
    }

    fn on_click(&mut self, stage: &mut Stage, hits: &[Hit]) -> Out<Self> {
        let target = resolve_click(&stage.scene, hits);
        log::debug!("chess click on {:?}", target);
        let commands = self.picking.on_click(target);
        stage.animate(commands);
        Out::Empty
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::{
        chess::LIFT_HEIGHT,
        data_structures::{
            geometry::Geometry,
            material::Material,
            scene_graph::{ModelNode, Primitive},
        },
    };

    fn model() -> ModelScene {
        let node = |name: &str, geometry: Geometry| ModelNode {
            name: name.to_string(),
            primitives: vec![Primitive::new(geometry, Material::basic(0xffffff))],
            ..Default::default()
        };
        ModelScene {
            name: "chess".to_string(),
            nodes: vec![
                node(BOARD_NAME, Geometry::box_geometry(16.0, 0.2, 16.0)),
                node("White-Pawn", Geometry::box_geometry(0.5, 1.0, 0.5)),
            ],
            roots: vec![0, 1],
            ..Default::default()
        }
    }

    #[test]
    fn opening_position_names_every_piece_once() {
        let placements = opening_position();
        assert_eq!(placements.len(), 32);
        let names: std::collections::HashSet<_> = placements.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), 32);
        assert!(names.contains("White-Rock-1"));
        assert!(names.contains("Black-Queen"));
        let king = placements.iter().find(|p| p.name == "White-King").expect("king");
        assert_eq!((king.row, king.col), (0, 4));
    }

    #[test]
    fn pieces_stand_on_their_squares() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = ChessScene::new();
        scene.setup_board(&mut stage, model());

        assert!(stage.scene.find(BOARD_NAME).is_some());
        for col in 0..8 {
            let pawn = stage.scene.find(&format!("White-Pawn-{}", col)).expect("pawn");
            let position = stage.scene.get(pawn).expect("node").transform.position;
            let (x, z) = board_position(16.0, 1, col);
            assert!((position.x - x).abs() < 1e-4);
            assert!((position.z - z).abs() < 1e-4);
            assert_eq!(position.y, REST_HEIGHT);
        }
        // models missing from the file are skipped
        assert!(stage.scene.find("Black-Pawn-0").is_none());
    }

    #[test]
    fn clicked_pawn_is_lifted() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = ChessScene::new();
        scene.setup_board(&mut stage, model());
        let pawn = stage.scene.find("White-Pawn-3").expect("pawn");
        let hit = Hit {
            node: pawn,
            distance: 10.0,
            point: cgmath::Point3::new(0.0, 0.0, 0.0),
        };

        scene.on_click(&mut stage, &[hit]);
        assert_eq!(scene.picking().selection(), Some(pawn));
        stage.advance(Duration::from_secs(1));
        let transform = stage.scene.get(pawn).expect("pawn").transform;
        assert_eq!(transform.position.y, LIFT_HEIGHT);
        assert!(stage.tweens.is_empty());
    }
}
