use std::f32::consts::TAU;

use cgmath::Point3;
use flow_scenes::{
    chess::{BOARD_NAME, ClickTarget, LIFT_HEIGHT, PickAndPlace, REST_HEIGHT, resolve_click},
    data_structures::{
        geometry::Geometry,
        material::Material,
        scene_graph::{Node, NodeId, SceneGraph},
    },
    pick::{Hit, Ray},
    tween::{TweenField, TweenRunner},
};
use instant::Duration;

struct Board {
    scene: SceneGraph,
    tweens: TweenRunner,
    state: PickAndPlace,
    a: NodeId,
    b: NodeId,
}

impl Board {
    fn new() -> Self {
        let mut scene = SceneGraph::new();
        scene.add(
            NodeId::ROOT,
            Node::mesh(BOARD_NAME, Geometry::box_geometry(16.0, 0.2, 16.0), Material::basic(0xffffff)),
        );
        let piece = || Geometry::box_geometry(1.0, 2.0, 1.0);
        let a = scene.add(
            NodeId::ROOT,
            Node::mesh("White-Pawn-0", piece(), Material::basic(0xeeeeee)).at(-7.0, REST_HEIGHT, -5.0),
        );
        let b = scene.add(
            NodeId::ROOT,
            Node::mesh("Black-Pawn-0", piece(), Material::basic(0x111111)).at(-7.0, REST_HEIGHT, 5.0),
        );
        Self {
            scene,
            tweens: TweenRunner::new(),
            state: PickAndPlace::new(),
            a,
            b,
        }
    }

    fn click(&mut self, target: ClickTarget) -> usize {
        let commands = self.state.on_click(target);
        let count = commands.len();
        self.tweens.extend(commands);
        count
    }

    /// Straight down onto the board at (x, z).
    fn click_at(&mut self, x: f32, z: f32) -> usize {
        let ray = Ray::new(Point3::new(x, 50.0, z), cgmath::Vector3::new(0.0, -1.0, 0.0));
        let roots = self.scene.children(NodeId::ROOT).to_vec();
        let hits: Vec<Hit> = self.scene.raycast(&ray, &roots);
        let target = resolve_click(&self.scene, &hits);
        self.click(target)
    }

    fn run(&mut self, seconds: f32) {
        // small steps, like frames
        let steps = (seconds * 60.0).ceil() as u32;
        for _ in 0..steps {
            self.tweens.advance(&mut self.scene, Duration::from_secs_f32(1.0 / 60.0));
        }
    }

    fn position(&self, id: NodeId) -> Point3<f32> {
        let p = self.scene.get(id).expect("piece").transform.position;
        Point3::new(p.x, p.y, p.z)
    }

    fn rotation_y(&self, id: NodeId) -> f32 {
        self.scene.get(id).expect("piece").transform.rotation.y
    }
}

#[test]
fn clicking_a_piece_twice_deselects_it() {
    let mut board = Board::new();
    assert_eq!(board.click(ClickTarget::Piece(board.a)), 2);
    board.run(1.1);
    assert_eq!(board.position(board.a).y, LIFT_HEIGHT);
    assert_eq!(board.rotation_y(board.a), TAU);

    assert_eq!(board.click(ClickTarget::Piece(board.a)), 0);
    assert_eq!(board.state.selection(), None);
    assert_eq!(board.state.last_pick(), Some(board.a));
}

#[test]
fn switching_pieces_lowers_the_first_and_lifts_the_second() {
    let mut board = Board::new();
    board.click(ClickTarget::Piece(board.a));
    board.run(1.1);

    assert_eq!(board.click(ClickTarget::Piece(board.b)), 4);
    assert_eq!(board.state.selection(), Some(board.b));
    board.run(0.5);
    let (a, b) = (board.position(board.a).y, board.position(board.b).y);
    assert!(a < LIFT_HEIGHT && a > REST_HEIGHT, "a is on its way down: {}", a);
    assert!(b > REST_HEIGHT && b < LIFT_HEIGHT, "b is on its way up: {}", b);

    board.run(0.6);
    assert_eq!(board.position(board.a).y, REST_HEIGHT);
    assert_eq!(board.rotation_y(board.a), -TAU);
    assert_eq!(board.position(board.b).y, LIFT_HEIGHT);
    assert!(board.tweens.is_empty());
}

#[test]
fn board_click_moves_then_sets_the_piece_down() {
    let mut board = Board::new();
    board.click(ClickTarget::Piece(board.a));
    board.run(1.1);

    let commands = board.state.on_click(ClickTarget::Board(Point3::new(3.0, 0.1, 1.0)));
    let secs = Duration::from_secs;
    let plan: Vec<_> = commands.iter().map(|c| (c.target, c.field, c.to, c.delay, c.duration)).collect();
    assert_eq!(
        plan,
        vec![
            (board.a, TweenField::PositionX, 3.0, secs(0), secs(1)),
            (board.a, TweenField::PositionZ, 1.0, secs(0), secs(1)),
            (board.a, TweenField::PositionY, REST_HEIGHT, secs(1), secs(1)),
            (board.a, TweenField::RotationY, -TAU, secs(0), secs(2)),
        ]
    );
    board.tweens.extend(commands);
    assert_eq!(board.state.selection(), None);
    assert_eq!(board.state.last_pick(), None);

    // first second: sliding over the board, still lifted
    board.run(1.0);
    let p = board.position(board.a);
    assert!((p.x - 3.0).abs() < 1e-3 && (p.z - 1.0).abs() < 1e-3);
    assert!(p.y > REST_HEIGHT);

    // second second: down to rest, spin finished
    board.run(1.1);
    let p = board.position(board.a);
    assert_eq!(p.y, REST_HEIGHT);
    assert_eq!(board.rotation_y(board.a), -TAU);
    assert!(!board.tweens.is_animating(board.a));
}

#[test]
fn empty_clicks_and_unselected_board_clicks_are_ignored() {
    let mut board = Board::new();
    assert_eq!(board.click_at(100.0, 100.0), 0);
    assert_eq!(board.click_at(3.0, 1.0), 0);
    assert_eq!(board.state.selection(), None);
    assert!(board.tweens.is_empty());
}
