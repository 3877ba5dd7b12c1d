use std::collections::{HashMap, HashSet};

use deferred::{
    backend::{CascadeParams, FrameParams, LightShaderParams},
    volume::{VolumeKind, VolumeMesh},
    BackendError, Clear, FrameBufferDescriptor, FrameBufferId, PostProcess, QueryId, RenderBackend, Technique,
    TextureDescriptor, TextureId,
};
use deferred_types::TextureFormat;
use glam::Vec2;

/// One call the layer made into the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture(TextureId),
    DestroyTexture(TextureId),
    CreateFrameBuffer(FrameBufferId),
    DestroyFrameBuffer(FrameBufferId),
    UploadVolume(VolumeKind),
    BindFrameBuffer(FrameBufferId),
    Clear(Clear),
    SetFrameParams(FrameParams),
    SetLightParams(LightShaderParams),
    SetCascades(CascadeParams),
    Render { technique: Technique, volume: VolumeKind },
    BuildMipSublevels(TextureId),
    PostProcess(PostProcess),
    BeginQuery(QueryId),
    EndQuery(QueryId),
    BeginConditionalRender(QueryId),
    EndConditionalRender(QueryId),
    ReduceDepthBounds(TextureId),
}

/// Backend that records every call instead of talking to a GPU.
///
/// Also checks what a real device would reject: binding destroyed frame buffers,
/// nesting conditional renders and ending one that is not open. Violations are
/// collected in [`RecordingBackend::violations`].
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub commands: Vec<Command>,
    pub violations: Vec<String>,
    /// Returned from `reduce_depth_bounds`.
    pub depth_bounds: Vec2,

    unsupported: HashSet<TextureFormat>,
    textures: HashMap<TextureId, TextureDescriptor>,
    frame_buffers: HashMap<FrameBufferId, FrameBufferDescriptor>,
    next_id: u32,
    current: Option<FrameBufferId>,
    open_query: Option<QueryId>,
    open_conditional: Option<QueryId>,
    fail_post_process: Option<BackendError>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            depth_bounds: Vec2::new(1.0, 50.0),
            ..Self::default()
        }
    }

    pub fn with_unsupported_formats(mut self, formats: &[TextureFormat]) -> Self {
        self.set_unsupported_formats(formats);
        self
    }

    pub fn set_unsupported_formats(&mut self, formats: &[TextureFormat]) {
        self.unsupported = formats.iter().copied().collect();
    }

    /// The next post process fails with `error`.
    pub fn fail_next_post_process(&mut self, error: BackendError) {
        self.fail_post_process = Some(error);
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&id)
    }

    pub fn texture_by_label(&self, label: &str) -> Option<&TextureDescriptor> {
        self.textures.values().find(|desc| desc.label.as_str() == label)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_frame_buffers(&self) -> usize {
        self.frame_buffers.len()
    }

    pub fn conditional_open(&self) -> Option<QueryId> {
        self.open_conditional
    }

    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn violation(&mut self, message: String) {
        log::error!("{message}");
        self.violations.push(message);
    }
}

impl RenderBackend for RecordingBackend {
    fn supports_render_target_format(&self, format: TextureFormat) -> bool {
        !self.unsupported.contains(&format)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId, BackendError> {
        if self.unsupported.contains(&desc.format) {
            self.violation(format!("texture {} created with unsupported format {:?}", desc.label, desc.format));
        }
        let id = TextureId(self.id());
        self.textures.insert(id, desc.clone());
        self.commands.push(Command::CreateTexture(id));
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            self.violation(format!("destroyed unknown texture {texture:?}"));
        }
        self.commands.push(Command::DestroyTexture(texture));
    }

    fn create_frame_buffer(&mut self, desc: &FrameBufferDescriptor) -> Result<FrameBufferId, BackendError> {
        for color in &desc.color {
            if !self.textures.contains_key(color) {
                self.violation(format!("frame buffer {} attaches unknown texture {color:?}", desc.label));
            }
        }
        let id = FrameBufferId(self.id());
        self.frame_buffers.insert(id, desc.clone());
        self.commands.push(Command::CreateFrameBuffer(id));
        Ok(id)
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferId) {
        if self.frame_buffers.remove(&frame_buffer).is_none() {
            self.violation(format!("destroyed unknown frame buffer {frame_buffer:?}"));
        }
        if self.current == Some(frame_buffer) {
            self.current = None;
        }
        self.commands.push(Command::DestroyFrameBuffer(frame_buffer));
    }

    fn upload_volume(&mut self, kind: VolumeKind, mesh: &VolumeMesh) -> Result<(), BackendError> {
        if mesh.indices.iter().any(|&i| i as usize >= mesh.positions.len()) {
            self.violation(format!("{kind:?} volume indexes past its vertices"));
        }
        self.commands.push(Command::UploadVolume(kind));
        Ok(())
    }

    fn bind_frame_buffer(&mut self, frame_buffer: FrameBufferId) -> Result<(), BackendError> {
        if !self.frame_buffers.contains_key(&frame_buffer) {
            self.violation(format!("bound unknown frame buffer {frame_buffer:?}"));
        }
        self.current = Some(frame_buffer);
        self.commands.push(Command::BindFrameBuffer(frame_buffer));
        Ok(())
    }

    fn current_frame_buffer(&self) -> Option<FrameBufferId> {
        self.current
    }

    fn clear(&mut self, clear: Clear) -> Result<(), BackendError> {
        if self.current.is_none() {
            self.violation("cleared without a bound frame buffer".to_owned());
        }
        self.commands.push(Command::Clear(clear));
        Ok(())
    }

    fn set_frame_params(&mut self, params: &FrameParams) {
        self.commands.push(Command::SetFrameParams(*params));
    }

    fn set_light_params(&mut self, params: &LightShaderParams) {
        self.commands.push(Command::SetLightParams(*params));
    }

    fn set_cascades(&mut self, params: &CascadeParams) {
        self.commands.push(Command::SetCascades(params.clone()));
    }

    fn render(&mut self, technique: Technique, volume: VolumeKind) -> Result<(), BackendError> {
        self.commands.push(Command::Render { technique, volume });
        Ok(())
    }

    fn build_mip_sublevels(&mut self, texture: TextureId) -> Result<(), BackendError> {
        if !self.textures.contains_key(&texture) {
            self.violation(format!("built mips of unknown texture {texture:?}"));
        }
        self.commands.push(Command::BuildMipSublevels(texture));
        Ok(())
    }

    fn apply_post_process(&mut self, post_process: &PostProcess) -> Result<(), BackendError> {
        if let Some(error) = self.fail_post_process.take() {
            return Err(error);
        }
        self.commands.push(Command::PostProcess(post_process.clone()));
        Ok(())
    }

    fn begin_query(&mut self, query: QueryId) -> Result<(), BackendError> {
        if let Some(open) = self.open_query {
            self.violation(format!("began query {query:?} inside query {open:?}"));
        }
        self.open_query = Some(query);
        self.commands.push(Command::BeginQuery(query));
        Ok(())
    }

    fn end_query(&mut self, query: QueryId) -> Result<(), BackendError> {
        if self.open_query != Some(query) {
            self.violation(format!("ended query {query:?} while {:?} is open", self.open_query));
        }
        self.open_query = None;
        self.commands.push(Command::EndQuery(query));
        Ok(())
    }

    fn begin_conditional_render(&mut self, query: QueryId) -> Result<(), BackendError> {
        if let Some(open) = self.open_conditional {
            self.violation(format!("began conditional render {query:?} inside {open:?}"));
        }
        self.open_conditional = Some(query);
        self.commands.push(Command::BeginConditionalRender(query));
        Ok(())
    }

    fn end_conditional_render(&mut self, query: QueryId) -> Result<(), BackendError> {
        if self.open_conditional != Some(query) {
            self.violation(format!(
                "ended conditional render {query:?} while {:?} is open",
                self.open_conditional
            ));
        }
        self.open_conditional = None;
        self.commands.push(Command::EndConditionalRender(query));
        Ok(())
    }

    fn reduce_depth_bounds(&mut self, depth: TextureId) -> Result<Vec2, BackendError> {
        self.commands.push(Command::ReduceDepthBounds(depth));
        Ok(self.depth_bounds)
    }
}
