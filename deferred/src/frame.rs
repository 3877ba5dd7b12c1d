use bitflags::bitflags;
use glam::{Vec2, Vec3, Vec4};

use crate::{
    backend::{FrameParams, QueryId, TextureId},
    managers::{CameraManager, FrameLight},
    pass::PassCode,
    settings::DeferredSettings,
    targets::ViewportAttrib,
};

bitflags! {
    /// What the frame driver has to do after a call to
    /// [`update`](crate::DeferredRenderingLayer::update).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct UpdateResult: u32 {
        /// The scene objects must draw the current pass before the next call.
        const NEED_FLUSH = 1 << 0;
        /// The layer drew everything the pass needs itself.
        const FLUSHED = 1 << 1;
        /// The frame is complete.
        const FINISHED = 1 << 2;
        /// The shading buffer holds a debug view that must not be post processed.
        const SKIP_POSTPROCESS = 1 << 3;
    }
}

/// Counters of one frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FrameStatistics {
    pub passes: u32,
    pub flushes: u32,
    pub lights: u32,
    pub draws: u32,
    pub post_processes: u32,
    pub queries: u32,
}

/// State that only lives for the duration of one frame. Built at pass 0 and
/// dropped once the frame finishes or fails.
#[derive(Debug)]
pub struct FrameContext {
    pub pass_list: Vec<PassCode>,
    pub lights: Vec<FrameLight>,
    pub settings: DeferredSettings,
    pub viewport_attrib: ViewportAttrib,
    pub num_cascades: u32,
    pub pssm_lambda: f32,
    pub camera: CameraManager,
    pub frame_params: FrameParams,
    pub indirect_lighting_enabled: bool,
    pub ssvo_enabled: bool,
    pub num_mipmap_levels: u32,
    /// Linear depth range of the G-buffer, when sample distribution shadows need it.
    pub depth_bounds: Option<Vec2>,
    /// Shadow camera of the light whose reflective shadow map was drawn last.
    pub rsm_camera: Option<CameraManager>,
    /// Set once a light has gathered its VPLs into the indirect lighting levels.
    pub indirect_gathered: bool,
    /// Texture the last shadow pass drew its depth into.
    pub shadow_source: Option<TextureId>,
    /// The conditional render the layer has begun and not yet ended.
    pub open_conditional: Option<QueryId>,
    pub stats: FrameStatistics,
}

impl FrameContext {
    pub fn depth_near_far_invfar(&self) -> Vec3 {
        self.frame_params.depth_near_far_invfar.truncate()
    }
}

pub(crate) fn frame_params(camera: &CameraManager) -> FrameParams {
    FrameParams {
        view: camera.view(),
        proj: camera.proj(),
        inv_view: camera.inv_view(),
        inv_proj: camera.inv_proj(),
        depth_near_far_invfar: Vec4::from((camera.depth_near_far_invfar(), 0.0)),
    }
}
