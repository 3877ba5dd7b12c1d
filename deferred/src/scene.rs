//! What the layer needs from the scene it lights.

use deferred_types::Camera;

use crate::{backend::TextureId, pass::PassType};

/// An object drawn into the layer's G-buffer and shadow maps.
///
/// Objects draw themselves whenever the frame driver flushes; the layer only tells
/// them which kind of pass the flush belongs to and which textures to read.
pub trait DeferredSceneObject {
    /// The next flush draws this kind of pass.
    fn pass(&mut self, pass_type: PassType);
    /// Lighting buffer read while shading.
    fn lighting_tex(&mut self, texture: TextureId);
    fn ssao_tex(&mut self, texture: Option<TextureId>);
    fn ssao_enabled(&mut self, enabled: bool);
}

/// The scene a frame renders.
pub trait SceneManager {
    /// Camera of the viewport, read once per frame at pass 0.
    fn active_camera(&self) -> Camera;

    /// Calls `f` with every object that takes part in deferred rendering.
    fn for_each_deferred_object(&mut self, f: &mut dyn FnMut(&mut dyn DeferredSceneObject));
}
