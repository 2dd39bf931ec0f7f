//! flow-scenes
//!
//! Small 3D study scenes (materials, procedural geometry, shadows, animation,
//! positional audio, environment maps and a pick-and-place chess board)
//! running natively and on the web. Every scene is a [`flow::GraphicsFlow`]
//! driven by one shared lifecycle that owns the window, the GPU renderer and
//! the asynchronous asset loads.
//!
//! High-level modules
//! - `flow`: the scene lifecycle, its hooks and the winit entry point
//! - `stage`: the per-scene context handed to every hook
//! - `render`: the wgpu renderer drawing a stage
//! - `context`: surface, device and queue
//! - `camera`: camera, projection, orbit controls and their uniforms
//! - `data_structures`: geometry, materials, lights, textures and the scene graph
//! - `pipelines`: mesh, line, background and shadow pipelines
//! - `resources`: asset loading and animation clips
//! - `pick`: rays, bounding boxes and hit tests
//! - `tween`: declarative property animation
//! - `chess`: the pick-and-place state machine
//! - `audio`, `capture`: positional sound sources and video capture devices
//! - `scenes`: the study scenes themselves
//!

pub mod audio;
pub mod camera;
pub mod capture;
pub mod chess;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod pick;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scenes;
pub mod stage;
pub mod tween;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use wgpu::*;
pub use winit::dpi::PhysicalPosition;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;
