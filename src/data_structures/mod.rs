//! Scene data: geometry, materials, lights, textures and the scene graph.
//!
//! - `geometry` holds triangle and line geometry plus the procedural builders
//! - `font` parses typeface fonts and builds extruded text
//! - `material` and `light` describe how surfaces are lit
//! - `texture` holds decoded pixel data and its GPU counterpart
//! - `instance` holds per-node transforms and their GPU layout
//! - `model` holds the GPU vertex layouts and mesh buffers
//! - `scene_graph` enables hierarchical scene organization
//! - `skin` deforms meshes with a skeleton of scene nodes

pub mod font;
pub mod geometry;
pub mod instance;
pub mod light;
pub mod material;
pub mod model;
pub mod scene_graph;
pub mod skin;
pub mod texture;
