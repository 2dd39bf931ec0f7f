//! Pick-and-place of chess pieces on an 8x8 board.
//!
//! Clicking a piece lifts and spins it; clicking another piece swaps the
//! selection; clicking the board moves the selected piece there and sets it
//! down. The state machine only produces [`TweenSpec`]s, the scene applies them.

use std::f32::consts::TAU;

use cgmath::Point3;
use instant::Duration;

use crate::{
    data_structures::scene_graph::{NodeId, SceneGraph},
    pick::Hit,
    tween::{Timeline, TweenField, TweenSpec},
};

pub const BOARD_NAME: &str = "Board";
/// Height of a lifted piece.
pub const LIFT_HEIGHT: f32 = 4.0;
/// Height of a piece standing on the board.
pub const REST_HEIGHT: f32 = 0.3;
const STEP: Duration = Duration::from_secs(1);

/// Centre of a square, as (x, z), on a square board of edge `size` centred at the origin.
pub fn board_position(size: f32, row: u32, col: u32) -> (f32, f32) {
    let cell = size / 8.0;
    let half = size / 2.0;
    (
        col as f32 * cell + cell / 2.0 - half,
        row as f32 * cell + cell / 2.0 - half,
    )
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClickTarget {
    Piece(NodeId),
    Board(Point3<f32>),
    Nothing,
}

/// Classifies the nearest hit of a click.
pub fn resolve_click(scene: &SceneGraph, hits: &[Hit]) -> ClickTarget {
    let Some(hit) = hits.first() else {
        return ClickTarget::Nothing;
    };
    let is_board = |id: Option<NodeId>| {
        id.and_then(|id| scene.get(id))
            .is_some_and(|node| node.name == BOARD_NAME)
    };
    if is_board(Some(hit.node)) || is_board(scene.parent(hit.node)) {
        ClickTarget::Board(hit.point)
    } else {
        ClickTarget::Piece(hit.node)
    }
}

/// Selection state of the board.
#[derive(Clone, Debug, Default)]
pub struct PickAndPlace {
    selection: Option<NodeId>,
    last_pick: Option<NodeId>,
}

impl PickAndPlace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    pub fn last_pick(&self) -> Option<NodeId> {
        self.last_pick
    }

    pub fn on_click(&mut self, target: ClickTarget) -> Vec<TweenSpec> {
        match target {
            ClickTarget::Nothing => {
                // the selection survives a click into empty space
                self.last_pick = None;
                Vec::new()
            }
            ClickTarget::Piece(piece) => {
                self.last_pick = Some(piece);
                match self.selection {
                    Some(selected) if selected == piece => {
                        self.selection = None;
                        Vec::new()
                    }
                    Some(selected) => {
                        self.selection = Some(piece);
                        let mut commands = lower(selected);
                        commands.extend(raise(piece));
                        commands
                    }
                    None => {
                        self.selection = Some(piece);
                        raise(piece)
                    }
                }
            }
            ClickTarget::Board(point) => {
                self.last_pick = None;
                match self.selection.take() {
                    Some(piece) => place(piece, point),
                    None => Vec::new(),
                }
            }
        }
    }
}

fn raise(piece: NodeId) -> Vec<TweenSpec> {
    vec![
        TweenSpec::new(piece, TweenField::PositionY, LIFT_HEIGHT, STEP),
        TweenSpec::new(piece, TweenField::RotationY, TAU, STEP),
    ]
}

fn lower(piece: NodeId) -> Vec<TweenSpec> {
    vec![
        TweenSpec::new(piece, TweenField::PositionY, REST_HEIGHT, STEP),
        TweenSpec::new(piece, TweenField::RotationY, -TAU, STEP),
    ]
}

fn place(piece: NodeId, point: Point3<f32>) -> Vec<TweenSpec> {
    Timeline::new()
        .then([
            TweenSpec::new(piece, TweenField::PositionX, point.x, STEP),
            TweenSpec::new(piece, TweenField::PositionZ, point.z, STEP),
        ])
        .then([TweenSpec::new(piece, TweenField::PositionY, REST_HEIGHT, STEP)])
        .at(
            Duration::ZERO,
            TweenSpec::new(piece, TweenField::RotationY, -TAU, STEP * 2),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::Node;

    #[test]
    fn corner_squares_map_to_cell_centres() {
        let size = 16.0;
        let cell = size / 8.0;
        assert_eq!(board_position(size, 0, 0), (-size / 2.0 + cell / 2.0, -size / 2.0 + cell / 2.0));
        assert_eq!(board_position(size, 7, 7), (size / 2.0 - cell / 2.0, size / 2.0 - cell / 2.0));
        assert_eq!(board_position(size, 0, 7).0, 7.0);
    }

    #[test]
    fn clicks_on_board_children_count_as_board() {
        let mut scene = SceneGraph::new();
        let board = scene.add(NodeId::ROOT, Node::group(BOARD_NAME));
        let square = scene.add(board, Node::group("Square-A1"));
        let piece = scene.add(NodeId::ROOT, Node::group("White-Pawn-0"));
        let hit = |node| Hit {
            node,
            distance: 1.0,
            point: Point3::new(1.0, 0.0, 2.0),
        };
        assert_eq!(resolve_click(&scene, &[hit(square)]), ClickTarget::Board(Point3::new(1.0, 0.0, 2.0)));
        assert_eq!(resolve_click(&scene, &[hit(board)]), ClickTarget::Board(Point3::new(1.0, 0.0, 2.0)));
        assert_eq!(resolve_click(&scene, &[hit(piece), hit(board)]), ClickTarget::Piece(piece));
        assert_eq!(resolve_click(&scene, &[]), ClickTarget::Nothing);
    }

    #[test]
    fn board_click_without_selection_does_nothing() {
        let mut state = PickAndPlace::new();
        assert!(state.on_click(ClickTarget::Board(Point3::new(0.0, 0.0, 0.0))).is_empty());
        assert_eq!(state.selection(), None);
    }

    #[test]
    fn empty_click_keeps_the_selection() {
        let mut state = PickAndPlace::new();
        let piece = NodeId::ROOT;
        state.on_click(ClickTarget::Piece(piece));
        assert!(state.on_click(ClickTarget::Nothing).is_empty());
        assert_eq!(state.selection(), Some(piece));
        assert_eq!(state.last_pick(), None);
    }
}
