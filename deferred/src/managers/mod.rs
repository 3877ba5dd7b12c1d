//! Managers for the state the layer keeps between frames.

mod camera;
mod light;
pub mod shadow_camera;

pub use camera::*;
pub use light::*;
