//! Deferred lighting pass scheduler.
//!
//! A frame is split into an ordered list of passes: the G-buffer, a shadow map for
//! every shadow casting light (six for point lights), reflective shadow maps and
//! multiresolution one-bounce indirect lighting for lights that ask for it, the
//! per light shadowing and lighting passes, and finally shading. The frame driver
//! steps through the list by calling [`DeferredRenderingLayer::update`] with an
//! increasing pass index, flushing the scene's draws whenever the layer returns
//! [`UpdateResult::NEED_FLUSH`].
//!
//! The list only starts with the two G-buffer passes. The rest is planned by
//! [`build_pass_list`] once the G-buffer is complete, from the lights registered
//! when the frame started.
//!
//! The layer never touches a GPU itself; every device operation goes through the
//! [`RenderBackend`] trait, and the scene is reached through [`SceneManager`].

pub use deferred_types as types;

pub mod backend;
pub mod builder;
pub mod cascade;
mod error;
pub mod frame;
mod layer;
pub mod managers;
pub mod multires;
pub mod pass;
mod passes;
pub mod scene;
pub mod settings;
pub mod targets;
pub mod util;
pub mod volume;
pub mod vpl;

pub use backend::{
    Clear, FrameBufferDescriptor, FrameBufferId, PostProcess, QueryId, RenderBackend, Technique, TextureDescriptor,
    TextureId,
};
pub use builder::{build_pass_list, PassListOptions, PassPlan};
pub use error::*;
pub use frame::{FrameStatistics, UpdateResult};
pub use layer::DeferredRenderingLayer;
pub use pass::{PassCode, PassType};
pub use scene::{DeferredSceneObject, SceneManager};
pub use settings::{DeferredSettings, DisplayIllum, DisplayType, VisibilityPolicy};
pub use targets::ViewportAttrib;
