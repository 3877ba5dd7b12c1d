use deferred_types::{
    AmbientLight, DirectionalLight, Handedness, LightAttrib, LightChange, LightDesc, LightHandle, LightKind,
    LightSource, PointLight, SpotLight,
};
use glam::{UVec2, Vec3};

use crate::{
    backend::{RenderBackend, TextureId},
    builder::g_buffer_passes,
    cascade::{CascadedShadowType, MAX_CASCADES},
    format_sso,
    frame::{frame_params, FrameContext, FrameStatistics, UpdateResult},
    managers::{CameraManager, LightManager},
    multires::UpsampleLayout,
    pass::{PassCode, PassType},
    passes::PassRunner,
    scene::SceneManager,
    settings::{DeferredSettings, DisplayIllum, DisplayType},
    targets::{ShadowTargets, Viewport, ViewportAttrib},
    volume::LightVolumes,
    DeferredError,
};

/// The deferred lighting layer.
///
/// Owns the render targets and the registered lights, and turns a frame into a
/// list of passes the frame driver steps through with [`update`](Self::update):
///
/// ```ignore
/// let mut pass = 0;
/// loop {
///     let result = layer.update(&mut scene, pass)?;
///     if result.contains(UpdateResult::NEED_FLUSH) {
///         scene.draw_objects();
///     }
///     if result.contains(UpdateResult::FINISHED) {
///         break;
///     }
///     pass += 1;
/// }
/// ```
pub struct DeferredRenderingLayer<B: RenderBackend> {
    backend: B,
    handedness: Handedness,
    settings: DeferredSettings,

    lights: LightManager,
    viewport: Viewport,
    shadow_targets: ShadowTargets,
    volumes: LightVolumes,
    upsample_layout: UpsampleLayout,

    frame: Option<FrameContext>,
    curr_merged_buffer: usize,
    last_stats: Option<FrameStatistics>,
}

impl<B: RenderBackend> DeferredRenderingLayer<B> {
    /// Creates the shadow targets and uploads the light volumes. Screen sized
    /// targets are only created by [`on_resize`](Self::on_resize).
    pub fn new(mut backend: B, settings: DeferredSettings, handedness: Handedness) -> Result<Self, DeferredError> {
        profiling::scope!("DeferredRenderingLayer::new");

        let shadow_targets = ShadowTargets::new(&mut backend)?;
        let volumes = LightVolumes::new();
        for (kind, mesh) in volumes.iter() {
            if let Err(e) = backend.upload_volume(kind, mesh) {
                shadow_targets.release(&mut backend);
                return Err(e.into());
            }
        }

        log::debug!("Created deferred rendering layer with {settings:?}");

        Ok(Self {
            backend,
            handedness,
            settings,
            lights: LightManager::new(),
            viewport: Viewport::new(),
            shadow_targets,
            volumes,
            upsample_layout: UpsampleLayout::new(),
            frame: None,
            curr_merged_buffer: 0,
            last_stats: None,
        })
    }

    /// Runs pass `pass` of the current frame. Pass 0 starts a new frame.
    ///
    /// Any error ends the frame in flight.
    pub fn update(&mut self, scene: &mut impl SceneManager, pass: u32) -> Result<UpdateResult, DeferredError> {
        profiling::scope!("DeferredRenderingLayer::update");

        let result = if pass == 0 {
            self.begin_frame(scene).and_then(|()| self.run_pass(scene, pass))
        } else {
            self.run_pass(scene, pass)
        };

        match result {
            Ok(result) => {
                if result.contains(UpdateResult::FINISHED) {
                    self.end_frame();
                }
                Ok(result)
            }
            Err(e) => {
                log::warn!("Deferred pass {pass} failed, abandoning the frame: {e}");
                self.abandon_frame();
                Err(e)
            }
        }
    }

    fn begin_frame(&mut self, scene: &mut impl SceneManager) -> Result<(), DeferredError> {
        profiling::scope!("begin_frame");

        if self.frame.is_some() {
            log::warn!("Starting a new frame while the previous one has not finished");
            self.abandon_frame();
        }

        let targets = self.viewport.targets.as_ref().ok_or(DeferredError::TargetsNotCreated)?;
        let aspect_ratio = targets.size.x as f32 / targets.size.y as f32;
        let camera = CameraManager::new(scene.active_camera(), self.handedness, Some(aspect_ratio));
        let lights = self.lights.snapshot(&camera)?;
        let settings = self.settings.clone();
        let attrib = self.viewport.attrib;

        let indirect_lighting_enabled = settings.display_illum != DisplayIllum::DirectOnly
            && !attrib.contains(ViewportAttrib::NO_GI)
            && lights.iter().any(|l| l.enabled && l.kind.has_indirect_lighting());
        let ssvo_enabled = settings.ssvo_enabled && !attrib.contains(ViewportAttrib::NO_SSVO);

        let lighting_tex = targets.lighting_tex;
        let ssao_tex = ssvo_enabled.then_some(targets.small_ssvo_tex);
        scene.for_each_deferred_object(&mut |object| {
            object.lighting_tex(lighting_tex);
            object.ssao_tex(ssao_tex);
            object.ssao_enabled(ssvo_enabled);
        });

        log::trace!(
            "Beginning frame with {} lights, indirect lighting {indirect_lighting_enabled}",
            lights.len()
        );

        self.frame = Some(FrameContext {
            pass_list: g_buffer_passes(settings.mrt_g_buffer).to_vec(),
            lights,
            viewport_attrib: attrib,
            num_cascades: self.viewport.num_cascades,
            pssm_lambda: self.viewport.pssm_lambda,
            frame_params: frame_params(&camera),
            camera,
            settings,
            indirect_lighting_enabled,
            ssvo_enabled,
            num_mipmap_levels: 1,
            depth_bounds: None,
            rsm_camera: None,
            indirect_gathered: false,
            shadow_source: None,
            open_conditional: None,
            stats: FrameStatistics::default(),
        });
        Ok(())
    }

    fn run_pass(&mut self, scene: &mut impl SceneManager, pass: u32) -> Result<UpdateResult, DeferredError> {
        let frame = self.frame.as_mut().ok_or(DeferredError::FrameNotStarted { pass })?;
        let code = *frame.pass_list.get(pass as usize).ok_or(DeferredError::PassOutOfRange {
            pass,
            len: frame.pass_list.len(),
        })?;
        let targets = self.viewport.targets.as_ref().ok_or(DeferredError::TargetsNotCreated)?;

        let pass_type = code.pass_type();
        let layer_only = matches!(pass_type, PassType::Lighting | PassType::IndirectLighting)
            || (frame.settings.mrt_g_buffer && pass_type == PassType::Shading);
        if !layer_only {
            scene.for_each_deferred_object(&mut |object| object.pass(pass_type));
        }

        frame.stats.passes += 1;
        let mut runner = PassRunner {
            backend: &mut self.backend,
            targets,
            shadow: &self.shadow_targets,
            volumes: &self.volumes,
            layout: &self.upsample_layout,
            merged_index: self.curr_merged_buffer,
        };
        let result = runner.run(frame, code)?;
        if result.contains(UpdateResult::NEED_FLUSH) {
            frame.stats.flushes += 1;
        }
        Ok(result)
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.curr_merged_buffer = 1 - self.curr_merged_buffer;
            log::debug!("Deferred frame finished: {:?}", frame.stats);
            self.last_stats = Some(frame.stats);
        }
    }

    /// Drops the frame in flight, closing its conditional render if one is open.
    fn abandon_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        if let Some(query) = frame.open_conditional {
            if let Err(e) = self.backend.end_conditional_render(query) {
                log::warn!("Failed to end conditional render {query:?} of an abandoned frame: {e}");
            }
        }
    }

    /// Recreates every screen sized render target. Abandons the frame in flight.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<(), DeferredError> {
        profiling::scope!("DeferredRenderingLayer::on_resize");

        self.abandon_frame();
        log::debug!("Resizing deferred targets to {width}x{height}");
        self.viewport.resize(&mut self.backend, UVec2::new(width, height))
    }

    pub fn add_ambient_light(&mut self, color: Vec3) -> LightHandle {
        self.lights.add(LightKind::Ambient(AmbientLight { color }))
    }

    pub fn add_point_light(&mut self, attrib: LightAttrib, position: Vec3, color: Vec3, falloff: Vec3) -> LightHandle {
        self.lights.add(LightKind::Point(PointLight {
            attrib,
            color,
            falloff,
            position,
        }))
    }

    pub fn add_directional_light(
        &mut self,
        attrib: LightAttrib,
        direction: Vec3,
        color: Vec3,
        falloff: Vec3,
    ) -> LightHandle {
        self.lights.add(LightKind::Directional(DirectionalLight {
            attrib,
            color,
            falloff,
            direction: direction.normalize_or_zero(),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_spot_light(
        &mut self,
        attrib: LightAttrib,
        position: Vec3,
        direction: Vec3,
        outer_angle: f32,
        inner_angle: f32,
        color: Vec3,
        falloff: Vec3,
    ) -> LightHandle {
        self.lights.add(LightKind::Spot(SpotLight {
            attrib,
            color,
            falloff,
            position,
            direction: direction.normalize_or_zero(),
            outer_angle,
            inner_angle,
        }))
    }

    /// Registers a light described by data. Unknown raw light types are rejected here.
    pub fn add_light(&mut self, desc: LightDesc) -> Result<LightHandle, DeferredError> {
        Ok(self.lights.add(desc.into_light()?))
    }

    pub fn update_light(&mut self, handle: LightHandle, change: LightChange) -> Result<(), DeferredError> {
        self.lights.update(handle, change)
    }

    pub fn set_light_enabled(&mut self, handle: LightHandle, enabled: bool) -> Result<(), DeferredError> {
        self.lights.set_enabled(handle, enabled)
    }

    pub fn remove_light(&mut self, handle: LightHandle) -> Result<(), DeferredError> {
        self.lights.remove(handle).map(drop)
    }

    pub fn light(&self, handle: LightHandle) -> Option<&LightSource> {
        self.lights.get(handle)
    }

    pub fn lights(&self) -> &LightManager {
        &self.lights
    }

    pub fn settings(&self) -> &DeferredSettings {
        &self.settings
    }

    /// Replaces every setting at once.
    pub fn set_settings(&mut self, settings: DeferredSettings) {
        self.settings = settings;
    }

    pub fn ssao_enabled(&mut self, enabled: bool) {
        self.settings.ssvo_enabled = enabled;
    }

    pub fn set_cascaded_shadow_type(&mut self, ty: CascadedShadowType) {
        self.settings.cascaded_shadow_type = ty;
    }

    pub fn indirect_scale(&mut self, scale: f32) {
        self.settings.indirect_scale = scale;
    }

    /// 0 shows all lighting, 1 only direct lighting and 2 only indirect lighting.
    pub fn display_illum(&mut self, illum: i32) -> Result<(), DeferredError> {
        self.settings.display_illum = DisplayIllum::try_from(illum)?;
        Ok(())
    }

    pub fn display(&mut self, display: DisplayType) {
        self.settings.display = display;
    }

    pub fn temporal_aa_enabled(&mut self, enabled: bool) {
        self.settings.temporal_aa = enabled;
    }

    pub fn setup_viewport(&mut self, attrib: ViewportAttrib) {
        self.viewport.attrib = attrib;
    }

    pub fn set_viewport_cascades(&mut self, count: u32, pssm_lambda: f32) -> Result<(), DeferredError> {
        if !(1..=MAX_CASCADES as u32).contains(&count) {
            return Err(DeferredError::InvalidSetting(format_sso!(
                "cascade count {count} is not in 1..={MAX_CASCADES}"
            )));
        }
        if !(0.0..=1.0).contains(&pssm_lambda) {
            return Err(DeferredError::InvalidSetting(format_sso!(
                "pssm lambda {pssm_lambda} is not in 0..=1"
            )));
        }
        self.viewport.num_cascades = count;
        self.viewport.pssm_lambda = pssm_lambda;
        Ok(())
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Normal and depth channel of the G-buffer.
    pub fn g_buffer_tex(&self) -> Option<TextureId> {
        self.viewport.targets.as_ref().map(|t| t.g_buffer_rt0)
    }

    pub fn lighting_tex(&self) -> Option<TextureId> {
        self.viewport.targets.as_ref().map(|t| t.lighting_tex)
    }

    pub fn shading_tex(&self) -> Option<TextureId> {
        self.viewport.targets.as_ref().map(|t| t.shading_tex)
    }

    /// Output of the last finished frame: its temporal AA resolve when temporal AA
    /// is on, the shading buffer otherwise.
    pub fn curr_frame_shading_tex(&self) -> Option<TextureId> {
        let targets = self.viewport.targets.as_ref()?;
        if self.settings.temporal_aa && !self.viewport.attrib.contains(ViewportAttrib::NO_TAA) {
            Some(targets.merged_shading[1 - self.curr_merged_buffer])
        } else {
            Some(targets.shading_tex)
        }
    }

    /// Temporal AA resolve of the frame before the last finished one.
    pub fn prev_frame_shading_tex(&self) -> Option<TextureId> {
        self.viewport
            .targets
            .as_ref()
            .map(|t| t.merged_shading[self.curr_merged_buffer])
    }

    pub fn last_frame_statistics(&self) -> Option<FrameStatistics> {
        self.last_stats
    }

    /// Pass list of the frame in flight.
    pub fn pass_list(&self) -> Option<&[PassCode]> {
        self.frame.as_ref().map(|f| f.pass_list.as_slice())
    }

    pub fn frame_in_flight(&self) -> bool {
        self.frame.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Releases every render target and hands the backend back.
    pub fn into_backend(mut self) -> B {
        self.abandon_frame();
        if let Some(targets) = self.viewport.targets.take() {
            targets.release(&mut self.backend);
        }
        self.shadow_targets.release(&mut self.backend);
        self.backend
    }
}
