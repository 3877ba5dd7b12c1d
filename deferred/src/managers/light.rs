use deferred_types::{
    AmbientLight, LightChange, LightHandle, LightKind, LightSource, AMBIENT_LIGHT_HANDLE,
};
use glam::Vec3;

use crate::{
    managers::{
        shadow_camera::{directional_shadow_camera, point_shadow_cameras, spot_shadow_camera, DIRECTIONAL_SHADOW_DISTANCE},
        CameraManager,
    },
    pass::MAX_LIGHT_INDEX,
    targets::SM_SIZE,
    DeferredError,
};

/// Shadow cameras of one light for one frame.
#[derive(Debug, Clone)]
pub enum ShadowCameras {
    None,
    Single(CameraManager),
    Cube(Box<[CameraManager; 6]>),
}

impl ShadowCameras {
    /// Camera of a shadow pass. `face` is only meaningful for point lights.
    pub fn get(&self, face: u32) -> Option<&CameraManager> {
        match self {
            Self::None => None,
            Self::Single(camera) => Some(camera),
            Self::Cube(cameras) => cameras.get(face as usize),
        }
    }
}

/// A light as seen by a single frame.
#[derive(Debug, Clone)]
pub struct FrameLight {
    pub handle: LightHandle,
    pub kind: LightKind,
    pub enabled: bool,
    pub shadow_cameras: ShadowCameras,
}

/// Manages every registered light source.
///
/// Slot 0 always holds the single ambient light. Lights added after it keep their
/// slot until they are removed; removed slots are reused.
#[derive(Debug)]
pub struct LightManager {
    data: Vec<Option<LightSource>>,
}

impl LightManager {
    pub fn new() -> Self {
        Self {
            data: vec![Some(LightSource::new(LightKind::Ambient(AmbientLight { color: Vec3::ZERO })))],
        }
    }

    /// Registers a light. Ambient lights are merged into the existing one by adding
    /// their color, and the ambient handle is returned.
    pub fn add(&mut self, kind: LightKind) -> LightHandle {
        profiling::scope!("LightManager::add");

        if let LightKind::Ambient(new) = &kind {
            if let Some(LightSource {
                kind: LightKind::Ambient(ambient),
                ..
            }) = self.data[0].as_mut()
            {
                ambient.color += new.color;
            }
            return AMBIENT_LIGHT_HANDLE;
        }

        let idx = match self.data.iter().skip(1).position(Option::is_none) {
            Some(free) => free + 1,
            None => {
                self.data.push(None);
                self.data.len() - 1
            }
        };
        log::trace!("Adding {:?} light in slot {idx}", kind.light_type());
        self.data[idx] = Some(LightSource::new(kind));
        LightHandle::new(idx)
    }

    pub fn update(&mut self, handle: LightHandle, change: LightChange) -> Result<(), DeferredError> {
        self.get_mut(handle)?.kind.apply_change(change)?;
        Ok(())
    }

    pub fn set_enabled(&mut self, handle: LightHandle, enabled: bool) -> Result<(), DeferredError> {
        self.get_mut(handle)?.enabled = enabled;
        Ok(())
    }

    pub fn remove(&mut self, handle: LightHandle) -> Result<LightSource, DeferredError> {
        if handle == AMBIENT_LIGHT_HANDLE {
            return Err(DeferredError::CannotRemoveAmbient);
        }
        self.data
            .get_mut(handle.idx)
            .and_then(Option::take)
            .ok_or(DeferredError::UnknownLight(handle.idx))
    }

    pub fn get(&self, handle: LightHandle) -> Option<&LightSource> {
        self.data.get(handle.idx).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, handle: LightHandle) -> Result<&mut LightSource, DeferredError> {
        self.data
            .get_mut(handle.idx)
            .and_then(Option::as_mut)
            .ok_or(DeferredError::UnknownLight(handle.idx))
    }

    /// Number of registered lights, the ambient light included.
    pub fn len(&self) -> usize {
        self.data.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (LightHandle, &LightSource)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(idx, light)| light.as_ref().map(|light| (LightHandle::new(idx), light)))
    }

    /// Copies the registered lights in slot order for a new frame and computes the
    /// shadow cameras of the enabled ones. Pass codes index into the returned list.
    /// Freed slots are skipped, so a removal shifts the lights after it.
    pub fn snapshot(&self, user_camera: &CameraManager) -> Result<Vec<FrameLight>, DeferredError> {
        profiling::scope!("LightManager::snapshot");

        let count = self.len();
        let max = MAX_LIGHT_INDEX as usize + 1;
        if count > max {
            return Err(DeferredError::TooManyLights { count, max });
        }

        let handedness = user_camera.handedness();
        Ok(self
            .iter()
            .map(|(handle, light)| {
                let shadow_cameras = if !light.enabled {
                    ShadowCameras::None
                } else {
                    match &light.kind {
                        LightKind::Ambient(_) => ShadowCameras::None,
                        LightKind::Directional(l) => ShadowCameras::Single(directional_shadow_camera(
                            l.direction,
                            user_camera,
                            DIRECTIONAL_SHADOW_DISTANCE,
                            SM_SIZE,
                        )),
                        LightKind::Point(l) => ShadowCameras::Cube(Box::new(point_shadow_cameras(l, handedness))),
                        LightKind::Spot(l) => ShadowCameras::Single(spot_shadow_camera(l, handedness)),
                    }
                };
                FrameLight {
                    handle,
                    kind: light.kind.clone(),
                    enabled: light.enabled,
                    shadow_cameras,
                }
            })
            .collect())
    }
}

impl Default for LightManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use deferred_types::{
        AmbientLight, Camera, Handedness, LightAttrib, LightChange, LightKind, PointLight, PointLightChange,
        AMBIENT_LIGHT_HANDLE,
    };
    use glam::Vec3;

    use super::{LightManager, ShadowCameras};
    use crate::{managers::CameraManager, DeferredError};

    fn point(x: f32) -> LightKind {
        LightKind::Point(PointLight {
            attrib: LightAttrib::empty(),
            color: Vec3::ONE,
            falloff: Vec3::X,
            position: Vec3::new(x, 0.0, 0.0),
        })
    }

    #[test]
    fn ambient_accumulates_in_slot_zero() {
        let mut lights = LightManager::new();
        let a = lights.add(LightKind::Ambient(AmbientLight {
            color: Vec3::new(0.1, 0.2, 0.3),
        }));
        let b = lights.add(LightKind::Ambient(AmbientLight {
            color: Vec3::new(0.1, 0.0, 0.0),
        }));
        assert_eq!(a, AMBIENT_LIGHT_HANDLE);
        assert_eq!(b, AMBIENT_LIGHT_HANDLE);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights.get(a).unwrap().kind.color(), Vec3::new(0.2, 0.2, 0.3));
        assert!(matches!(
            lights.remove(AMBIENT_LIGHT_HANDLE),
            Err(DeferredError::CannotRemoveAmbient)
        ));
    }

    #[test]
    fn slots_are_reused() {
        let mut lights = LightManager::new();
        let first = lights.add(point(1.0));
        let second = lights.add(point(2.0));
        assert_eq!((first.idx, second.idx), (1, 2));

        lights.remove(first).unwrap();
        assert!(matches!(lights.remove(first), Err(DeferredError::UnknownLight(1))));
        assert_eq!(lights.add(point(3.0)).idx, 1);
    }

    #[test]
    fn update_and_disable() {
        let mut lights = LightManager::new();
        let handle = lights.add(point(1.0));
        lights
            .update(
                handle,
                LightChange::Point(PointLightChange {
                    color: Some(Vec3::Z),
                    ..Default::default()
                }),
            )
            .unwrap();
        lights.set_enabled(handle, false).unwrap();

        let camera = CameraManager::new(Camera::default(), Handedness::Left, None);
        let snapshot = lights.snapshot(&camera).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].kind.color(), Vec3::Z);
        assert!(!snapshot[1].enabled);
        assert!(matches!(snapshot[1].shadow_cameras, ShadowCameras::None));
    }

    #[test]
    fn point_lights_get_six_shadow_cameras() {
        let mut lights = LightManager::new();
        lights.add(point(1.0));
        let camera = CameraManager::new(Camera::default(), Handedness::Left, None);
        let snapshot = lights.snapshot(&camera).unwrap();
        let cameras = &snapshot[1].shadow_cameras;
        assert!(cameras.get(5).is_some());
        assert!(cameras.get(6).is_none());
    }
}
