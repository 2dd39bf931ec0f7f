//! Render pipelines.
//!
//! - `basic`: lit meshes, material uniforms and the shared pipeline builder
//! - `light`: the light list, shadow map and environment map bind group
//! - `line`: unlit line segments
//! - `background`: image and panorama backgrounds
//! - `shadow`: the depth only shadow pass

pub mod background;
pub mod basic;
pub mod light;
pub mod line;
pub mod shadow;
