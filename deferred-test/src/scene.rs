use deferred::{DeferredSceneObject, PassType, SceneManager, TextureId};
use deferred_types::Camera;

/// Something the layer told a scene object.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    Pass(PassType),
    LightingTex(TextureId),
    SsaoTex(Option<TextureId>),
    SsaoEnabled(bool),
}

#[derive(Debug, Default)]
pub struct TestObject {
    pub events: Vec<ObjectEvent>,
}

impl TestObject {
    pub fn passes(&self) -> Vec<PassType> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ObjectEvent::Pass(ty) => Some(*ty),
                _ => None,
            })
            .collect()
    }
}

impl DeferredSceneObject for TestObject {
    fn pass(&mut self, pass_type: PassType) {
        self.events.push(ObjectEvent::Pass(pass_type));
    }

    fn lighting_tex(&mut self, texture: TextureId) {
        self.events.push(ObjectEvent::LightingTex(texture));
    }

    fn ssao_tex(&mut self, texture: Option<TextureId>) {
        self.events.push(ObjectEvent::SsaoTex(texture));
    }

    fn ssao_enabled(&mut self, enabled: bool) {
        self.events.push(ObjectEvent::SsaoEnabled(enabled));
    }
}

#[derive(Debug, Default)]
pub struct TestScene {
    pub camera: Camera,
    pub objects: Vec<TestObject>,
}

impl TestScene {
    pub fn new(camera: Camera, object_count: usize) -> Self {
        Self {
            camera,
            objects: (0..object_count).map(|_| TestObject::default()).collect(),
        }
    }
}

impl SceneManager for TestScene {
    fn active_camera(&self) -> Camera {
        self.camera
    }

    fn for_each_deferred_object(&mut self, f: &mut dyn FnMut(&mut dyn DeferredSceneObject)) {
        for object in &mut self.objects {
            f(object);
        }
    }
}
