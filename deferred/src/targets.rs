//! Render targets owned by the layer.
//!
//! Shadow related targets have fixed sizes and live as long as the layer. Screen
//! sized targets belong to the viewport and are rebuilt on every resize. Each
//! target lists its preferred format first; the first format the backend can
//! render to wins.

use bitflags::bitflags;
use deferred_types::TextureFormat;
use glam::UVec2;

use crate::{
    backend::{FrameBufferDescriptor, FrameBufferId, RenderBackend, TextureDescriptor, TextureId},
    cascade::{MAX_CASCADES, PSSM_DEFAULT_LAMBDA},
    format_sso,
    multires::MAX_IL_MIPMAP_LEVELS,
    vpl::VPL_COUNT,
    DeferredError,
};

/// Edge length of the 2D and cube shadow maps.
pub const SM_SIZE: u32 = 512;
/// Edge length of the reflective shadow map.
pub const RSM_SIZE: u32 = 512;

const SHADOW_MAP_FORMATS: &[TextureFormat] = &[TextureFormat::Rg16Float, TextureFormat::Rgba16Float];
const SHADOWING_FORMATS: &[TextureFormat] = &[TextureFormat::R16Float, TextureFormat::Rgba16Float];
const SHADING_FORMATS: &[TextureFormat] = &[TextureFormat::Rg11b10Float, TextureFormat::Rgba16Float];
const HDR_FORMATS: &[TextureFormat] = &[TextureFormat::Rgba16Float];
const LDR_FORMATS: &[TextureFormat] = &[TextureFormat::Rgba8Unorm];
const DEPTH_FORMATS: &[TextureFormat] = &[TextureFormat::Depth24PlusStencil8, TextureFormat::Depth32FloatStencil8];
const VPL_FORMATS: &[TextureFormat] = &[TextureFormat::Rgba32Float, TextureFormat::Rgba16Float];

/// Picks the first candidate the backend can render to.
pub fn choose_format(
    backend: &impl RenderBackend,
    target: &str,
    candidates: &[TextureFormat],
) -> Result<TextureFormat, DeferredError> {
    candidates
        .iter()
        .copied()
        .find(|&format| backend.supports_render_target_format(format))
        .ok_or_else(|| DeferredError::UnsupportedFormat {
            target: target.into(),
            candidates: candidates.to_vec(),
        })
}

/// Records everything it creates so a set of targets can be released together.
#[derive(Debug, Default)]
struct Allocations {
    textures: Vec<TextureId>,
    frame_buffers: Vec<FrameBufferId>,
}

impl Allocations {
    fn texture(
        &mut self,
        backend: &mut impl RenderBackend,
        label: &str,
        size: UVec2,
        formats: &[TextureFormat],
        mip_levels: u32,
    ) -> Result<TextureId, DeferredError> {
        let format = choose_format(backend, label, formats)?;
        let desc = TextureDescriptor::render_target(label.into(), size, format).with_mips(mip_levels);
        self.create(backend, desc)
    }

    fn create(&mut self, backend: &mut impl RenderBackend, desc: TextureDescriptor) -> Result<TextureId, DeferredError> {
        let id = backend.create_texture(&desc)?;
        log::trace!("Created render target {} {:?} as {id:?}", desc.label, desc.format);
        self.textures.push(id);
        Ok(id)
    }

    fn frame_buffer(
        &mut self,
        backend: &mut impl RenderBackend,
        label: &str,
        color: &[TextureId],
        depth_stencil: Option<TextureId>,
    ) -> Result<FrameBufferId, DeferredError> {
        let id = backend.create_frame_buffer(&FrameBufferDescriptor {
            label: label.into(),
            color: color.iter().copied().collect(),
            depth_stencil,
        })?;
        self.frame_buffers.push(id);
        Ok(id)
    }

    fn release(self, backend: &mut impl RenderBackend) {
        for frame_buffer in self.frame_buffers {
            backend.destroy_frame_buffer(frame_buffer);
        }
        for texture in self.textures {
            backend.destroy_texture(texture);
        }
    }
}

/// Fixed size shadow map, reflective shadow map and VPL targets.
#[derive(Debug)]
pub struct ShadowTargets {
    pub sm_tex: TextureId,
    pub sm_depth: TextureId,
    pub sm_buffer: FrameBufferId,
    /// Filtered 2D shadow map.
    pub blur_sm_tex: TextureId,
    /// Filtered cube shadow map of the point light being lit.
    pub sm_cube_tex: TextureId,
    pub rsm_albedo: TextureId,
    pub rsm_normal: TextureId,
    pub rsm_depth: TextureId,
    pub rsm_ds: TextureId,
    pub rsm_buffer: FrameBufferId,
    /// One texel column per VPL: position, normal and flux rows.
    pub vpl_tex: TextureId,
    allocations: Allocations,
}

impl ShadowTargets {
    pub fn new(backend: &mut impl RenderBackend) -> Result<Self, DeferredError> {
        profiling::scope!("ShadowTargets::new");

        let mut a = Allocations::default();
        match Self::create(backend, &mut a) {
            Ok(targets) => Ok(Self { allocations: a, ..targets }),
            Err(e) => {
                a.release(backend);
                Err(e)
            }
        }
    }

    fn create(backend: &mut impl RenderBackend, a: &mut Allocations) -> Result<Self, DeferredError> {
        let sm_size = UVec2::splat(SM_SIZE);
        let rsm_size = UVec2::splat(RSM_SIZE);
        let rsm_mips = RSM_SIZE.ilog2() + 1;

        let sm_tex = a.texture(backend, "shadow map", sm_size, SHADOW_MAP_FORMATS, 1)?;
        let sm_depth = a.texture(backend, "shadow map depth", sm_size, DEPTH_FORMATS, 1)?;
        let sm_buffer = a.frame_buffer(backend, "shadow map buffer", &[sm_tex], Some(sm_depth))?;
        let blur_sm_tex = a.texture(backend, "filtered shadow map", sm_size, SHADOW_MAP_FORMATS, 1)?;
        let cube_format = choose_format(backend, "shadow cube map", SHADOW_MAP_FORMATS)?;
        let sm_cube_tex = a.create(
            backend,
            TextureDescriptor::render_target("shadow cube map".into(), sm_size, cube_format).with_cube(),
        )?;

        let rsm_albedo = a.texture(backend, "rsm albedo", rsm_size, LDR_FORMATS, rsm_mips)?;
        let rsm_normal = a.texture(backend, "rsm normal", rsm_size, HDR_FORMATS, rsm_mips)?;
        let rsm_depth = a.texture(backend, "rsm depth", rsm_size, SHADOWING_FORMATS, rsm_mips)?;
        let rsm_ds = a.texture(backend, "rsm depth stencil", rsm_size, DEPTH_FORMATS, 1)?;
        let rsm_buffer = a.frame_buffer(backend, "rsm buffer", &[rsm_albedo, rsm_normal, rsm_depth], Some(rsm_ds))?;

        let vpl_tex = a.texture(backend, "vpls", UVec2::new(VPL_COUNT, 4), VPL_FORMATS, 1)?;

        Ok(Self {
            sm_tex,
            sm_depth,
            sm_buffer,
            blur_sm_tex,
            sm_cube_tex,
            rsm_albedo,
            rsm_normal,
            rsm_depth,
            rsm_ds,
            rsm_buffer,
            vpl_tex,
            allocations: Allocations::default(),
        })
    }

    pub fn release(self, backend: &mut impl RenderBackend) {
        self.allocations.release(backend);
    }
}

/// Screen sized targets of a viewport.
#[derive(Debug)]
pub struct ViewportTargets {
    pub size: UVec2,
    /// Normal and depth, with a full mip chain.
    pub g_buffer_rt0: TextureId,
    /// Albedo and specular, only written by multiple render target G-buffers.
    pub g_buffer_rt1: TextureId,
    pub depth_stencil: TextureId,
    pub g_buffer: FrameBufferId,
    pub mrt_g_buffer: FrameBufferId,
    /// Half resolution.
    pub shadowing_tex: TextureId,
    pub shadowing_buffer: FrameBufferId,
    pub lighting_tex: TextureId,
    pub lighting_buffer: FrameBufferId,
    pub shading_tex: TextureId,
    pub shading_buffer: FrameBufferId,
    /// Ping-ponged buffers temporal AA resolves into.
    pub merged_shading: [TextureId; 2],
    pub small_ssvo_tex: TextureId,
    /// Half resolution multiresolution indirect lighting targets.
    pub indirect_lighting_tex: TextureId,
    pub indirect_lighting_pingpong_tex: TextureId,
    pub depth_derivative_tex: TextureId,
    pub normal_cone_tex: TextureId,
    pub multires_ds: TextureId,
    allocations: Allocations,
}

impl ViewportTargets {
    pub fn new(backend: &mut impl RenderBackend, size: UVec2) -> Result<Self, DeferredError> {
        profiling::scope!("ViewportTargets::new");

        let mut a = Allocations::default();
        match Self::create(backend, &mut a, size) {
            Ok(targets) => Ok(Self { allocations: a, ..targets }),
            Err(e) => {
                a.release(backend);
                Err(e)
            }
        }
    }

    fn create(backend: &mut impl RenderBackend, a: &mut Allocations, size: UVec2) -> Result<Self, DeferredError> {
        let size = size.max(UVec2::ONE);
        let half = (size / 2).max(UVec2::ONE);
        let g_buffer_mips = size.max_element().ilog2() + 1;

        let g_buffer_rt0 = a.texture(backend, "g-buffer rt0", size, HDR_FORMATS, g_buffer_mips)?;
        let g_buffer_rt1 = a.texture(backend, "g-buffer rt1", size, LDR_FORMATS, 1)?;
        let depth_stencil = a.texture(backend, "depth stencil", size, DEPTH_FORMATS, 1)?;
        let g_buffer = a.frame_buffer(backend, "g-buffer", &[g_buffer_rt0], Some(depth_stencil))?;
        let mrt_g_buffer = a.frame_buffer(backend, "mrt g-buffer", &[g_buffer_rt0, g_buffer_rt1], Some(depth_stencil))?;

        let shadowing_tex = a.texture(backend, "shadowing", half, SHADOWING_FORMATS, 1)?;
        let shadowing_buffer = a.frame_buffer(backend, "shadowing buffer", &[shadowing_tex], None)?;

        let lighting_tex = a.texture(backend, "lighting", size, HDR_FORMATS, 1)?;
        let lighting_buffer = a.frame_buffer(backend, "lighting buffer", &[lighting_tex], Some(depth_stencil))?;

        let shading_tex = a.texture(backend, "shading", size, SHADING_FORMATS, 1)?;
        let shading_buffer = a.frame_buffer(backend, "shading buffer", &[shading_tex], Some(depth_stencil))?;
        let mut merged_shading = [shading_tex; 2];
        for (i, merged) in merged_shading.iter_mut().enumerate() {
            *merged = a.texture(backend, &format_sso!("merged shading {i}"), size, SHADING_FORMATS, 1)?;
        }

        let small_ssvo_tex = a.texture(backend, "small ssvo", half, SHADOWING_FORMATS, 1)?;

        let indirect_lighting_tex = a.texture(backend, "indirect lighting", half, HDR_FORMATS, MAX_IL_MIPMAP_LEVELS)?;
        let indirect_lighting_pingpong_tex = a.texture(
            backend,
            "indirect lighting pingpong",
            half,
            HDR_FORMATS,
            MAX_IL_MIPMAP_LEVELS,
        )?;
        let depth_derivative_tex = a.texture(backend, "depth derivative", half, SHADOWING_FORMATS, MAX_IL_MIPMAP_LEVELS)?;
        let normal_cone_tex = a.texture(backend, "normal cone", half, HDR_FORMATS, MAX_IL_MIPMAP_LEVELS)?;
        let multires_ds = a.texture(backend, "multires depth stencil", half, DEPTH_FORMATS, MAX_IL_MIPMAP_LEVELS)?;

        Ok(Self {
            size,
            g_buffer_rt0,
            g_buffer_rt1,
            depth_stencil,
            g_buffer,
            mrt_g_buffer,
            shadowing_tex,
            shadowing_buffer,
            lighting_tex,
            lighting_buffer,
            shading_tex,
            shading_buffer,
            merged_shading,
            small_ssvo_tex,
            indirect_lighting_tex,
            indirect_lighting_pingpong_tex,
            depth_derivative_tex,
            normal_cone_tex,
            multires_ds,
            allocations: Allocations::default(),
        })
    }

    /// Size of the multiresolution lighting targets' top level.
    pub fn multires_size(&self) -> UVec2 {
        (self.size / 2).max(UVec2::ONE)
    }

    pub fn release(self, backend: &mut impl RenderBackend) {
        self.allocations.release(backend);
    }
}

bitflags! {
    /// Per viewport feature switches.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ViewportAttrib: u32 {
        /// Never compute indirect lighting for this viewport.
        const NO_GI = 1 << 0;
        /// Never compute screen space occlusion for this viewport.
        const NO_SSVO = 1 << 1;
        const NO_TAA = 1 << 2;
    }
}

/// State of the viewport the layer renders into.
#[derive(Debug)]
pub struct Viewport {
    pub attrib: ViewportAttrib,
    pub num_cascades: u32,
    pub pssm_lambda: f32,
    pub targets: Option<ViewportTargets>,
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            attrib: ViewportAttrib::empty(),
            num_cascades: MAX_CASCADES as u32,
            pssm_lambda: PSSM_DEFAULT_LAMBDA,
            targets: None,
        }
    }

    /// Replaces the screen sized targets. On failure the old targets are already
    /// released and the viewport has none.
    pub fn resize(&mut self, backend: &mut impl RenderBackend, size: UVec2) -> Result<(), DeferredError> {
        if let Some(old) = self.targets.take() {
            old.release(backend);
        }
        self.targets = Some(ViewportTargets::new(backend, size)?);
        Ok(())
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}
