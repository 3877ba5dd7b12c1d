use std::ops::{Deref, DerefMut};

use anyhow::{bail, ensure, Context, Result};
use deferred::{DeferredRenderingLayer, DeferredSettings, PassCode, UpdateResult};
use deferred_types::{Camera, CameraProjection, Handedness, TextureFormat};
use glam::{Mat4, UVec2, Vec3};

use crate::{Command, RecordingBackend, TestScene};

/// Everything one frame did.
#[derive(Debug)]
pub struct FrameRecord {
    /// The complete pass list, as it stood when the frame finished.
    pub pass_list: Vec<PassCode>,
    /// The code and result of every pass that ran, in order.
    pub results: Vec<(PassCode, UpdateResult)>,
    pub commands: Vec<Command>,
}

impl FrameRecord {
    pub fn final_result(&self) -> Option<UpdateResult> {
        self.results.last().map(|(_, result)| *result)
    }

    pub fn result_of(&self, code: PassCode) -> Option<UpdateResult> {
        self.results.iter().find(|(c, _)| *c == code).map(|(_, result)| *result)
    }
}

/// Default viewer: at (0, 2, -5) looking at the origin.
pub fn default_camera(handedness: Handedness) -> Camera {
    let eye = Vec3::new(0.0, 2.0, -5.0);
    let view = match handedness {
        Handedness::Left => Mat4::look_at_lh(eye, Vec3::ZERO, Vec3::Y),
        Handedness::Right => Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
    };
    Camera {
        projection: CameraProjection::Perspective {
            vfov: 60.0,
            near: 0.1,
            far: 100.0,
        },
        view,
    }
}

pub struct TestRunnerBuilder {
    handedness: Handedness,
    settings: DeferredSettings,
    size: UVec2,
    objects: usize,
    unsupported: Vec<TextureFormat>,
}

impl TestRunnerBuilder {
    pub fn new() -> Self {
        Self {
            handedness: Handedness::Left,
            settings: DeferredSettings::default(),
            size: UVec2::new(256, 256),
            objects: 1,
            unsupported: Vec::new(),
        }
    }

    pub fn handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }

    pub fn settings(mut self, settings: DeferredSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = UVec2::new(width, height);
        self
    }

    pub fn objects(mut self, objects: usize) -> Self {
        self.objects = objects;
        self
    }

    pub fn unsupported_formats(mut self, formats: &[TextureFormat]) -> Self {
        self.unsupported = formats.to_vec();
        self
    }

    pub fn build(self) -> Result<TestRunner> {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = RecordingBackend::new().with_unsupported_formats(&self.unsupported);
        let mut layer = DeferredRenderingLayer::new(backend, self.settings, self.handedness)
            .context("Layer initialization failed")?;
        layer
            .on_resize(self.size.x, self.size.y)
            .context("Failed to create viewport targets")?;
        layer.backend_mut().take_commands();

        Ok(TestRunner {
            layer,
            scene: TestScene::new(default_camera(self.handedness), self.objects),
        })
    }
}

impl Default for TestRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A layer over a recording backend, with a scene to drive it with.
pub struct TestRunner {
    pub layer: DeferredRenderingLayer<RecordingBackend>,
    pub scene: TestScene,
}

impl Deref for TestRunner {
    type Target = DeferredRenderingLayer<RecordingBackend>;

    fn deref(&self) -> &Self::Target {
        &self.layer
    }
}

impl DerefMut for TestRunner {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.layer
    }
}

impl TestRunner {
    pub fn builder() -> TestRunnerBuilder {
        TestRunnerBuilder::new()
    }

    /// Runs a single pass, the way a frame driver does.
    pub fn update(&mut self, pass: u32) -> Result<UpdateResult, deferred::DeferredError> {
        self.layer.update(&mut self.scene, pass)
    }

    /// Drives a whole frame from pass 0 until the layer reports it finished.
    ///
    /// Fails if the layer errors, if the frame would need a pass past the end of its
    /// pass list, or if the backend saw an invalid call sequence.
    pub fn render_frame(&mut self) -> Result<FrameRecord> {
        self.layer.backend_mut().take_commands();

        let mut pass_list: Vec<PassCode> = Vec::new();
        let mut results = Vec::new();
        let mut pass = 0;
        loop {
            if pass > 0 {
                ensure!(
                    (pass as usize) < pass_list.len(),
                    "Frame did not finish within its {} passes",
                    pass_list.len()
                );
            }

            let result = self.update(pass).with_context(|| format!("Pass {pass} failed"))?;
            if let Some(list) = self.layer.pass_list() {
                pass_list = list.to_vec();
            }
            let Some(&code) = pass_list.get(pass as usize) else {
                bail!("Pass {pass} ran but is not in the pass list");
            };
            results.push((code, result));

            if result.contains(UpdateResult::FINISHED) {
                break;
            }
            pass += 1;
        }

        let backend = self.layer.backend_mut();
        ensure!(backend.violations.is_empty(), "Backend violations: {:#?}", backend.violations);
        ensure!(
            backend.conditional_open().is_none(),
            "Conditional render left open at the end of the frame"
        );

        Ok(FrameRecord {
            pass_list,
            results,
            commands: backend.take_commands(),
        })
    }
}
