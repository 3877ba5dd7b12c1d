//! The seam between the pass scheduler and the GPU.
//!
//! The layer never talks to a device directly. Everything it needs from the
//! renderer is expressed through [`RenderBackend`]: creating render targets,
//! binding frame buffers, drawing one of the layer's techniques through one of the
//! shared volume meshes, running post processes, and occlusion queries with
//! conditional rendering. All calls are synchronous and happen on the thread
//! driving [`update`](crate::DeferredRenderingLayer::update).

use arrayvec::ArrayVec;
use bytemuck::{Pod, Zeroable};
use deferred_types::{LightAttrib, LightType, TextureFormat, TextureUsages};
use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::{
    cascade::{CascadedShadowType, MAX_CASCADES},
    multires::UpsampleStep,
    settings::DisplayType,
    util::typedefs::SsoString,
    volume::{VolumeKind, VolumeMesh},
    vpl::VplParams,
    BackendError,
};

/// Backend defined texture id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Backend defined frame buffer id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameBufferId(pub u32);

/// Names the occlusion query of one light volume draw.
///
/// `index` is the cube face (0..6) of a point light or 0 for a spot light cone, and
/// 6 for the box volume a point light is lit through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId {
    pub light: u32,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: SsoString,
    pub size: UVec2,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsages,
    /// Six layer cube map.
    pub cube: bool,
}

impl TextureDescriptor {
    pub fn render_target(label: SsoString, size: UVec2, format: TextureFormat) -> Self {
        Self {
            label,
            size: size.max(UVec2::ONE),
            mip_levels: 1,
            format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            cube: false,
        }
    }

    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    pub fn with_cube(mut self) -> Self {
        self.cube = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameBufferDescriptor {
    pub label: SsoString,
    pub color: SmallVec<[TextureId; 2]>,
    pub depth_stencil: Option<TextureId>,
}

/// Clear of the currently bound frame buffer. `None` leaves the attachment as is.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Clear {
    pub color: Option<Vec4>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl Clear {
    pub fn all(color: Vec4, depth: f32, stencil: u32) -> Self {
        Self {
            color: Some(color),
            depth: Some(depth),
            stencil: Some(stencil),
        }
    }

    pub fn color(color: Vec4) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn depth(depth: f32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }
}

/// Draws the layer issues itself. Scene geometry is drawn by the scene objects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Technique {
    /// Depth only draw of a light volume inside an occlusion query.
    DepthOnly,
    /// Writes the light's shadow term into the shadowing buffer.
    Shadowing(LightType),
    /// Marks the pixels inside a light volume in the stencil buffer.
    LightStencil { eye_in_volume: bool },
    /// Resets the lighting buffer's stencil.
    ClearStencil,
    /// Accumulates the light into the lighting buffer.
    Lighting(LightType),
    /// Combines the G-buffer and the lighting buffer. Only drawn by the layer itself
    /// when the scene wrote a multiple render target G-buffer.
    Shading,
}

/// How computed indirect lighting is composited into the lighting buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IndirectComposite {
    /// Added on top of the direct lighting.
    Additive,
    /// Replaces the direct lighting.
    IndirectOnly,
}

/// Screen space and shadow map processing steps. Each names its inputs and outputs.
#[derive(Debug, Clone, PartialEq)]
pub enum PostProcess {
    /// Linearizes a shadow depth buffer into a variance shadow map.
    DepthToVsm {
        input: TextureId,
        output: TextureId,
        near_q: Vec2,
        inv_proj: Mat4,
    },
    /// Blurs a variance shadow map. Slot 0 is the 2D map, slot `n > 0` is cube face `n - 1`.
    ShadowMapFilter {
        input: TextureId,
        output: TextureId,
        slot: u32,
    },
    Ssvo {
        g_buffer: TextureId,
        depth: TextureId,
        output: TextureId,
    },
    GBufferToDepthDerivative {
        g_buffer: TextureId,
        output: TextureId,
        delta_offset: Vec4,
    },
    /// Builds `level + 1` of the depth derivative chain from `level`.
    DepthDerivativeMip {
        texture: TextureId,
        level: u32,
        delta_offset: Vec4,
    },
    GBufferToNormalCone {
        g_buffer: TextureId,
        output: TextureId,
        delta_offset: Vec4,
    },
    NormalConeMip {
        texture: TextureId,
        level: u32,
        delta_offset: Vec4,
    },
    /// Marks in the stencil of every level the pixels that must be lit at that level.
    SetSubsplatStencil {
        depth_derivative: TextureId,
        normal_cone: TextureId,
        output: TextureId,
        num_levels: u32,
        depth_normal_threshold: Vec2,
        far_plane: f32,
    },
    RsmToVpls {
        rsm_albedo: TextureId,
        rsm_normal: TextureId,
        rsm_depth: TextureId,
        output: TextureId,
        light_type: LightType,
        params: Box<VplParams>,
    },
    /// Gathers every VPL into every level of the indirect lighting texture.
    VplsLighting {
        vpls: TextureId,
        g_buffer: TextureId,
        output: TextureId,
        num_levels: u32,
        vpl_params: Vec3,
        depth_near_far_invfar: Vec3,
        /// Adds to the output instead of clearing it first.
        accumulate: bool,
    },
    /// Copies every level of `input` into `output`.
    CopyTexture {
        input: TextureId,
        output: TextureId,
    },
    /// Overwrites level `step.dst_level` of `output` with that level of `input` plus
    /// `input`'s upsampled coarser level. Other levels of `output` are left alone.
    Upsample {
        input: TextureId,
        output: TextureId,
        step: UpsampleStep,
    },
    CopyToLightBuffer {
        indirect: TextureId,
        output: TextureId,
        mode: IndirectComposite,
        indirect_scale: f32,
        inv_size: Vec2,
        depth_near_far_invfar: Vec3,
    },
    TemporalAa {
        current: TextureId,
        history: TextureId,
        output: TextureId,
    },
    /// Writes a debug view of one G-buffer channel over the shading buffer.
    Visualize {
        display: DisplayType,
        g_buffer: TextureId,
        output: TextureId,
    },
}

/// Per frame camera parameters.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameParams {
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    /// `(near, far, 1 / far, 0)`
    pub depth_near_far_invfar: Vec4,
}

/// Parameters of the light currently being drawn, in view space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightShaderParams {
    pub light_type: LightType,
    pub attrib: LightAttrib,
    pub color: Vec3,
    pub falloff: Vec3,
    pub position_es: Vec3,
    pub direction_es: Vec3,
    pub cos_outer_inner: Vec4,
    /// View space to the light's clip space. Identity for lights without a shadow camera.
    pub view_to_light_clip: Mat4,
    /// Model-view and model-view-projection of the light volume.
    pub volume_mv: Mat4,
    pub volume_mvp: Mat4,
    /// `(near * q, q)` with `q = far / (far - near)` of the light's shadow camera.
    pub near_q: Vec2,
}

/// Cascade split distances of a directional light for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeParams {
    pub shadow_type: CascadedShadowType,
    pub intervals: ArrayVec<Vec2, MAX_CASCADES>,
}

/// The renderer the layer drives.
pub trait RenderBackend {
    fn supports_render_target_format(&self, format: TextureFormat) -> bool;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId, BackendError>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn create_frame_buffer(&mut self, desc: &FrameBufferDescriptor) -> Result<FrameBufferId, BackendError>;
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferId);

    /// Uploads one of the shared volume meshes. Called once per kind.
    fn upload_volume(&mut self, kind: VolumeKind, mesh: &VolumeMesh) -> Result<(), BackendError>;

    fn bind_frame_buffer(&mut self, frame_buffer: FrameBufferId) -> Result<(), BackendError>;
    fn current_frame_buffer(&self) -> Option<FrameBufferId>;
    fn clear(&mut self, clear: Clear) -> Result<(), BackendError>;

    fn set_frame_params(&mut self, params: &FrameParams);
    fn set_light_params(&mut self, params: &LightShaderParams);
    fn set_cascades(&mut self, params: &CascadeParams);

    fn render(&mut self, technique: Technique, volume: VolumeKind) -> Result<(), BackendError>;
    fn build_mip_sublevels(&mut self, texture: TextureId) -> Result<(), BackendError>;
    fn apply_post_process(&mut self, post_process: &PostProcess) -> Result<(), BackendError>;

    fn begin_query(&mut self, query: QueryId) -> Result<(), BackendError>;
    fn end_query(&mut self, query: QueryId) -> Result<(), BackendError>;
    /// Draws until the matching end are skipped if the query's volume had no visible pixels.
    fn begin_conditional_render(&mut self, query: QueryId) -> Result<(), BackendError>;
    fn end_conditional_render(&mut self, query: QueryId) -> Result<(), BackendError>;

    /// Minimum and maximum linear depth written into the given depth buffer.
    fn reduce_depth_bounds(&mut self, depth: TextureId) -> Result<Vec2, BackendError>;
}
