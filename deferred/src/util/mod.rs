//! Utilities shared by the layer's components.

pub mod typedefs;
