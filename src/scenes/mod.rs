//! The study scenes, one [`GraphicsFlow`](crate::flow::GraphicsFlow) each.
//!
//! Every scene is a plain struct; its setup hooks fill the stage and its
//! update hook animates it. The `demos/` binaries run one scene each.

pub mod animation;
pub mod chess;
pub mod cubemap;
pub mod custom_geometry;
pub mod geometry;
pub mod hdr;
pub mod material;
pub mod shadow;
pub mod sound;
pub mod webcam;

use crate::{
    data_structures::{light::Light, scene_graph::Node},
    stage::Stage,
};

/// The white directional key light most scenes start from.
pub(crate) fn key_light(stage: &mut Stage, intensity: f32, x: f32, y: f32, z: f32) {
    stage.add(Node::light("Key Light", Light::directional(0xffffff, intensity)).at(x, y, z));
}

#[cfg(all(test, not(target_arch = "wasm32")))]
pub(crate) fn test_stage(runtime: &tokio::runtime::Runtime) -> Stage {
    use crate::{context::Viewport, resources::AssetLoader};

    Stage::new(Viewport::new(800, 600, 1.0), AssetLoader::new(runtime.handle().clone()))
}
