//! The work behind each pass type.

use deferred_types::{LightKind, LightType};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::{
    backend::{
        CascadeParams, Clear, IndirectComposite, LightShaderParams, PostProcess, QueryId, RenderBackend, Technique,
        TextureId,
    },
    builder::{build_pass_list, spot_volume_model, PassListOptions, VolumeQuery, POINT_LIGHT_VOLUME_QUERY},
    cascade::{pssm_intervals, CascadedShadowType},
    frame::{FrameContext, UpdateResult},
    managers::{shadow_camera::CubeFace, CameraManager, FrameLight},
    multires::{subsplat_thresholds, MipChain, UpsampleLayout},
    pass::{PassCode, PassType},
    settings::{DisplayIllum, DisplayType, VisibilityPolicy},
    targets::{ShadowTargets, ViewportAttrib, ViewportTargets},
    volume::{eye_in_point_volume, eye_in_spot_volume, LightVolumes, VolumeKind},
    vpl::{near_q, vpl_lighting_params, VplParams},
    DeferredError,
};

/// Borrows everything a pass needs from the layer for the duration of one pass.
pub(crate) struct PassRunner<'a, B> {
    pub backend: &'a mut B,
    pub targets: &'a ViewportTargets,
    pub shadow: &'a ShadowTargets,
    pub volumes: &'a LightVolumes,
    pub layout: &'a UpsampleLayout,
    pub merged_index: usize,
}

impl<B: RenderBackend> PassRunner<'_, B> {
    pub fn run(&mut self, frame: &mut FrameContext, code: PassCode) -> Result<UpdateResult, DeferredError> {
        let (pass_type, light, index) = code.decode();
        log::trace!("Running pass {code:?}");

        match pass_type {
            PassType::GBuffer | PassType::MrtGBuffer => match index {
                0 => self.begin_g_buffer(frame),
                _ => self.finish_g_buffer(frame),
            },
            PassType::Shading => self.shading(frame, index),
            PassType::SpecialShading => match index {
                0 => {
                    self.backend.bind_frame_buffer(self.targets.shading_buffer)?;
                    Ok(UpdateResult::NEED_FLUSH)
                }
                _ => self.finish_shading(frame),
            },
            PassType::GenShadowMap
            | PassType::GenReflectiveShadowMap
            | PassType::Lighting
            | PassType::IndirectLighting => self.light_pass(frame, pass_type, light as usize, index),
        }
    }

    fn render(&mut self, frame: &mut FrameContext, technique: Technique, volume: VolumeKind) -> Result<(), DeferredError> {
        frame.stats.draws += 1;
        self.backend.render(technique, volume)?;
        Ok(())
    }

    fn apply(&mut self, frame: &mut FrameContext, post_process: PostProcess) -> Result<(), DeferredError> {
        frame.stats.post_processes += 1;
        self.backend.apply_post_process(&post_process)?;
        Ok(())
    }

    fn begin_conditional(&mut self, frame: &mut FrameContext, query: QueryId) -> Result<(), DeferredError> {
        if frame.settings.visibility == VisibilityPolicy::AlwaysVisible {
            return Ok(());
        }
        if let Some(open) = frame.open_conditional.take() {
            log::warn!("Conditional render {open:?} still open when beginning {query:?}, ending it");
            self.backend.end_conditional_render(open)?;
        }
        self.backend.begin_conditional_render(query)?;
        frame.open_conditional = Some(query);
        Ok(())
    }

    /// Ends `query`'s conditional render if it is the one that is open.
    fn end_conditional(&mut self, frame: &mut FrameContext, query: QueryId) -> Result<(), DeferredError> {
        if frame.open_conditional == Some(query) {
            frame.open_conditional = None;
            self.backend.end_conditional_render(query)?;
        }
        Ok(())
    }

    fn begin_g_buffer(&mut self, frame: &mut FrameContext) -> Result<UpdateResult, DeferredError> {
        profiling::scope!("begin_g_buffer");

        self.backend.set_frame_params(&frame.frame_params);
        let buffer = if frame.settings.mrt_g_buffer {
            self.targets.mrt_g_buffer
        } else {
            self.targets.g_buffer
        };
        self.backend.bind_frame_buffer(buffer)?;
        self.backend.clear(Clear::all(Vec4::new(0.0, 0.0, 1.0, 0.0), 1.0, 0))?;
        Ok(UpdateResult::NEED_FLUSH)
    }

    fn finish_g_buffer(&mut self, frame: &mut FrameContext) -> Result<UpdateResult, DeferredError> {
        profiling::scope!("finish_g_buffer");

        let t = self.targets;
        self.backend.build_mip_sublevels(t.g_buffer_rt0)?;

        if frame.ssvo_enabled {
            self.apply(
                frame,
                PostProcess::Ssvo {
                    g_buffer: t.g_buffer_rt0,
                    depth: t.depth_stencil,
                    output: t.small_ssvo_tex,
                },
            )?;
        }

        if frame.indirect_lighting_enabled {
            self.build_multires_chains(frame)?;
        }

        let needs_depth_bounds = frame.settings.cascaded_shadow_type == CascadedShadowType::Sdsm
            && frame
                .lights
                .iter()
                .any(|l| l.enabled && l.kind.casts_shadow() && l.kind.light_type() == LightType::Directional);
        if needs_depth_bounds {
            frame.depth_bounds = Some(self.backend.reduce_depth_bounds(t.depth_stencil)?);
        }

        self.backend.bind_frame_buffer(t.lighting_buffer)?;

        let plan = build_pass_list(
            &frame.lights,
            self.volumes,
            PassListOptions {
                mrt_g_buffer: frame.settings.mrt_g_buffer,
                indirect_lighting: frame.indirect_lighting_enabled,
            },
        );
        log::trace!("Planned {} passes", plan.passes.len());
        frame.pass_list.extend(plan.passes);

        if frame.settings.visibility == VisibilityPolicy::OcclusionQuery {
            for query in &plan.volume_queries {
                self.volume_query(frame, query)?;
            }
        }

        Ok(UpdateResult::FLUSHED)
    }

    fn volume_query(&mut self, frame: &mut FrameContext, query: &VolumeQuery) -> Result<(), DeferredError> {
        let Some(light) = frame.lights.get(query.query.light as usize) else {
            return Err(DeferredError::UnknownLight(query.query.light as usize));
        };
        let mut params = light_params(frame, light, PassType::Lighting, query.query.index);
        params.volume_mv = frame.camera.view() * query.model;
        params.volume_mvp = frame.camera.proj() * params.volume_mv;
        self.backend.set_light_params(&params);

        frame.stats.queries += 1;
        self.backend.begin_query(query.query)?;
        self.render(frame, Technique::DepthOnly, query.volume)?;
        self.backend.end_query(query.query)?;
        Ok(())
    }

    fn build_multires_chains(&mut self, frame: &mut FrameContext) -> Result<(), DeferredError> {
        profiling::scope!("build_multires_chains");

        let t = self.targets;
        let chain = MipChain::new(t.size, t.multires_size());

        self.apply(
            frame,
            PostProcess::GBufferToDepthDerivative {
                g_buffer: t.g_buffer_rt0,
                output: t.depth_derivative_tex,
                delta_offset: chain.base_delta_offset,
            },
        )?;
        for (level, &delta_offset) in chain.level_delta_offsets.iter().enumerate() {
            self.apply(
                frame,
                PostProcess::DepthDerivativeMip {
                    texture: t.depth_derivative_tex,
                    level: level as u32,
                    delta_offset,
                },
            )?;
        }

        self.apply(
            frame,
            PostProcess::GBufferToNormalCone {
                g_buffer: t.g_buffer_rt0,
                output: t.normal_cone_tex,
                delta_offset: chain.base_delta_offset,
            },
        )?;
        for (level, &delta_offset) in chain.level_delta_offsets.iter().enumerate() {
            self.apply(
                frame,
                PostProcess::NormalConeMip {
                    texture: t.normal_cone_tex,
                    level: level as u32,
                    delta_offset,
                },
            )?;
        }

        frame.num_mipmap_levels = chain.num_levels();
        let far_plane = frame.depth_near_far_invfar().y;
        self.apply(
            frame,
            PostProcess::SetSubsplatStencil {
                depth_derivative: t.depth_derivative_tex,
                normal_cone: t.normal_cone_tex,
                output: t.multires_ds,
                num_levels: chain.num_levels(),
                depth_normal_threshold: subsplat_thresholds(),
                far_plane,
            },
        )
    }

    fn light_pass(
        &mut self,
        frame: &mut FrameContext,
        pass_type: PassType,
        light_index: usize,
        index: u32,
    ) -> Result<UpdateResult, DeferredError> {
        profiling::scope!("light_pass");

        let Some(light) = frame.lights.get(light_index).cloned() else {
            return Err(DeferredError::UnknownLight(light_index));
        };
        let light_type = light.kind.light_type();

        match pass_type {
            PassType::GenReflectiveShadowMap => {
                let params = light_params(frame, &light, pass_type, index);
                self.backend.set_light_params(&params);
                self.backend.bind_frame_buffer(self.shadow.rsm_buffer)?;
                self.backend.clear(Clear::all(Vec4::new(0.0, 0.0, 0.0, 1.0), 1.0, 0))?;
                frame.rsm_camera = light.shadow_cameras.get(0).cloned();
                frame.shadow_source = Some(self.shadow.rsm_ds);
                return Ok(UpdateResult::NEED_FLUSH);
            }
            PassType::IndirectLighting => {
                self.indirect_lighting(frame, &light)?;
                return Ok(UpdateResult::FLUSHED);
            }
            _ => {}
        }

        if (index > 0 || pass_type == PassType::Lighting) && light.kind.casts_shadow() {
            self.filter_shadow_map(frame, &light, light_index as u32, index)?;
        }

        if pass_type == PassType::GenShadowMap {
            if light_type == LightType::Directional {
                self.set_cascades(frame);
            }
            let params = light_params(frame, &light, pass_type, index);
            self.backend.set_light_params(&params);
            if light_type.has_volume() {
                self.begin_conditional(
                    frame,
                    QueryId {
                        light: light_index as u32,
                        index,
                    },
                )?;
            }
            self.backend.bind_frame_buffer(self.shadow.sm_buffer)?;
            self.backend.clear(Clear::depth(1.0))?;
            frame.shadow_source = Some(self.shadow.sm_depth);
            return Ok(UpdateResult::NEED_FLUSH);
        }

        self.lighting(frame, &light, light_index as u32, index)?;
        Ok(UpdateResult::FLUSHED)
    }

    /// Turns the depth drawn by the previous shadow pass of this light into a filtered
    /// variance shadow map, and closes that pass's conditional render.
    fn filter_shadow_map(
        &mut self,
        frame: &mut FrameContext,
        light: &FrameLight,
        light_index: u32,
        index: u32,
    ) -> Result<(), DeferredError> {
        let is_point = light.kind.light_type() == LightType::Point;
        let face = if is_point { index.saturating_sub(1) } else { 0 };
        let (near_q, inv_proj) = light
            .shadow_cameras
            .get(face)
            .map(|camera| (near_q(camera), camera.inv_proj()))
            .unwrap_or((Vec2::ZERO, Mat4::IDENTITY));

        self.apply(
            frame,
            PostProcess::DepthToVsm {
                input: frame.shadow_source.unwrap_or(self.shadow.sm_depth),
                output: self.shadow.sm_tex,
                near_q,
                inv_proj,
            },
        )?;

        let (output, slot, query) = if is_point {
            (self.shadow.sm_cube_tex, index, index.saturating_sub(1))
        } else {
            (self.shadow.blur_sm_tex, 0, index)
        };
        self.apply(
            frame,
            PostProcess::ShadowMapFilter {
                input: self.shadow.sm_tex,
                output,
                slot,
            },
        )?;
        self.end_conditional(
            frame,
            QueryId {
                light: light_index,
                index: query,
            },
        )
    }

    fn set_cascades(&mut self, frame: &FrameContext) {
        let (near, far) = frame.camera.near_far();
        let shadow_type = frame.settings.cascaded_shadow_type;
        let (begin, end) = match (shadow_type, frame.depth_bounds) {
            (CascadedShadowType::Sdsm, Some(bounds)) => {
                let begin = bounds.x.max(near);
                (begin, bounds.y.min(far).max(begin))
            }
            _ => (near, far),
        };
        self.backend.set_cascades(&CascadeParams {
            shadow_type,
            intervals: pssm_intervals(begin, end, frame.num_cascades, frame.pssm_lambda),
        });
    }

    fn lighting(
        &mut self,
        frame: &mut FrameContext,
        light: &FrameLight,
        light_index: u32,
        index: u32,
    ) -> Result<(), DeferredError> {
        let light_type = light.kind.light_type();
        let has_volume = light_type.has_volume();
        let volume = match light_type {
            LightType::Spot => VolumeKind::Cone,
            LightType::Point => VolumeKind::Box,
            LightType::Ambient | LightType::Directional => VolumeKind::Quad,
        };
        let query = QueryId {
            light: light_index,
            index,
        };

        // Shadowing
        self.backend.bind_frame_buffer(self.targets.shadowing_buffer)?;
        self.backend.clear(Clear::color(Vec4::ONE))?;
        let params = light_params(frame, light, PassType::Lighting, index);
        self.backend.set_light_params(&params);

        if has_volume {
            self.begin_conditional(frame, query)?;
        }
        self.render(frame, Technique::Shadowing(light_type), volume)?;
        if has_volume {
            self.end_conditional(frame, query)?;
        }

        // Lighting
        self.backend.bind_frame_buffer(self.targets.lighting_buffer)?;
        self.render(frame, Technique::ClearStencil, VolumeKind::Quad)?;

        if has_volume {
            self.begin_conditional(frame, query)?;
            let eye = frame.camera.location();
            let eye_in_volume = match &light.kind {
                LightKind::Spot(spot) => eye_in_spot_volume(eye, spot.position, spot.direction, params.cos_outer_inner.x),
                LightKind::Point(point) => eye_in_point_volume(eye, point.position),
                LightKind::Ambient(_) | LightKind::Directional(_) => false,
            };
            self.render(frame, Technique::LightStencil { eye_in_volume }, volume)?;
        }
        self.render(frame, Technique::Lighting(light_type), volume)?;
        if has_volume {
            self.end_conditional(frame, query)?;
        }

        frame.stats.lights += 1;
        Ok(())
    }

    fn indirect_lighting(&mut self, frame: &mut FrameContext, light: &FrameLight) -> Result<(), DeferredError> {
        profiling::scope!("indirect_lighting");

        let s = self.shadow;
        let t = self.targets;
        let Some(rsm_camera) = frame.rsm_camera.clone().or_else(|| light.shadow_cameras.get(0).cloned()) else {
            log::warn!("Indirect lighting pass for a light without a shadow camera, skipping");
            return Ok(());
        };

        // Extract VPLs
        self.backend.build_mip_sublevels(s.rsm_albedo)?;
        self.backend.build_mip_sublevels(s.rsm_normal)?;
        self.backend.build_mip_sublevels(s.rsm_depth)?;
        let params = VplParams::new(&rsm_camera, frame.camera.view(), &light.kind);
        self.apply(
            frame,
            PostProcess::RsmToVpls {
                rsm_albedo: s.rsm_albedo,
                rsm_normal: s.rsm_normal,
                rsm_depth: s.rsm_depth,
                output: s.vpl_tex,
                light_type: light.kind.light_type(),
                params: Box::new(params),
            },
        )?;

        // Gather them at every level. Later lights add to the levels of earlier
        // ones; the chain is upsampled once, before shading.
        let depth_near_far_invfar = frame.depth_near_far_invfar();
        self.apply(
            frame,
            PostProcess::VplsLighting {
                vpls: s.vpl_tex,
                g_buffer: t.g_buffer_rt0,
                output: t.indirect_lighting_tex,
                num_levels: frame.num_mipmap_levels,
                vpl_params: vpl_lighting_params(),
                depth_near_far_invfar,
                accumulate: frame.indirect_gathered,
            },
        )?;
        frame.indirect_gathered = true;
        Ok(())
    }

    /// Upsamples coarse levels into finer ones, coarsest first. Returns the texture
    /// whose level 0 holds the full indirect lighting.
    fn upsample_indirect(&mut self, frame: &mut FrameContext) -> Result<TextureId, DeferredError> {
        profiling::scope!("upsample_indirect");

        let t = self.targets;
        let (mut dst, mut src) = (t.indirect_lighting_tex, t.indirect_lighting_pingpong_tex);
        self.apply(frame, PostProcess::CopyTexture { input: dst, output: src })?;
        let steps: Vec<_> = self.layout.steps(frame.num_mipmap_levels, t.multires_size()).collect();
        for step in steps {
            std::mem::swap(&mut dst, &mut src);
            self.apply(
                frame,
                PostProcess::Upsample {
                    input: src,
                    output: dst,
                    step,
                },
            )?;
        }
        Ok(dst)
    }

    fn shading(&mut self, frame: &mut FrameContext, index: u32) -> Result<UpdateResult, DeferredError> {
        profiling::scope!("shading");

        if index > 0 {
            return self.finish_shading(frame);
        }

        let t = self.targets;
        let illum = frame.settings.display_illum;
        if frame.indirect_lighting_enabled && illum != DisplayIllum::DirectOnly && frame.indirect_gathered {
            let indirect = self.upsample_indirect(frame)?;
            let mode = match illum {
                DisplayIllum::IndirectOnly => IndirectComposite::IndirectOnly,
                _ => IndirectComposite::Additive,
            };
            self.apply(
                frame,
                PostProcess::CopyToLightBuffer {
                    indirect,
                    output: t.lighting_tex,
                    mode,
                    indirect_scale: frame.settings.indirect_scale,
                    inv_size: Vec2::ONE / t.size.as_vec2(),
                    depth_near_far_invfar: frame.depth_near_far_invfar(),
                },
            )?;
        }

        self.backend.bind_frame_buffer(t.shading_buffer)?;
        if frame.settings.mrt_g_buffer {
            self.render(frame, Technique::Shading, VolumeKind::Quad)?;
            Ok(UpdateResult::FLUSHED)
        } else {
            Ok(UpdateResult::NEED_FLUSH)
        }
    }

    fn finish_shading(&mut self, frame: &mut FrameContext) -> Result<UpdateResult, DeferredError> {
        let t = self.targets;
        let mut result = UpdateResult::FINISHED;

        if frame.settings.temporal_aa && !frame.viewport_attrib.contains(ViewportAttrib::NO_TAA) {
            self.apply(
                frame,
                PostProcess::TemporalAa {
                    current: t.shading_tex,
                    history: t.merged_shading[1 - self.merged_index],
                    output: t.merged_shading[self.merged_index],
                },
            )?;
        }

        if frame.settings.display != DisplayType::Final {
            self.apply(
                frame,
                PostProcess::Visualize {
                    display: frame.settings.display,
                    g_buffer: t.g_buffer_rt0,
                    output: t.shading_tex,
                },
            )?;
            result |= UpdateResult::SKIP_POSTPROCESS;
        }

        Ok(result)
    }
}

/// Light parameters of a pass, in the frame camera's view space.
pub(crate) fn light_params(frame: &FrameContext, light: &FrameLight, pass_type: PassType, index: u32) -> LightShaderParams {
    let view = frame.camera.view();
    let proj = frame.camera.proj();
    let kind = &light.kind;
    let light_type = kind.light_type();

    let face = match light_type {
        LightType::Point => index.min(5),
        _ => 0,
    };
    let camera: Option<&CameraManager> = light.shadow_cameras.get(face);
    let (view_to_light_clip, near_q) = camera
        .map(|c| (c.view_proj() * frame.camera.inv_view(), near_q(c)))
        .unwrap_or((Mat4::IDENTITY, Vec2::ZERO));

    let mut params = LightShaderParams {
        light_type,
        attrib: kind.attrib(),
        color: kind.color(),
        falloff: kind.falloff(),
        position_es: Vec3::ZERO,
        direction_es: Vec3::ZERO,
        cos_outer_inner: Vec4::ZERO,
        view_to_light_clip,
        volume_mv: frame.camera.inv_proj(),
        volume_mvp: Mat4::IDENTITY,
        near_q,
    };

    match kind {
        LightKind::Ambient(_) => {}
        LightKind::Directional(l) => {
            params.direction_es = view.transform_vector3(l.direction);
        }
        LightKind::Spot(l) => {
            params.position_es = view.transform_point3(l.position);
            params.direction_es = view.transform_vector3(l.direction);
            params.cos_outer_inner = l.cos_outer_inner();
            if let Some(camera) = camera {
                let model = spot_volume_model(camera.inv_view(), params.cos_outer_inner.w);
                params.volume_mv = view * model;
                params.volume_mvp = proj * params.volume_mv;
            }
        }
        LightKind::Point(l) => {
            params.position_es = view.transform_point3(l.position);
            let model = if pass_type == PassType::Lighting && index == POINT_LIGHT_VOLUME_QUERY {
                Mat4::from_translation(l.position)
            } else {
                let (look, _) = CubeFace::ALL[face as usize].view_vectors();
                params.direction_es = view.transform_vector3(look);
                camera.map(CameraManager::inv_view).unwrap_or(Mat4::from_translation(l.position))
            };
            params.volume_mv = view * model;
            params.volume_mvp = proj * params.volume_mv;
        }
    }

    params
}
