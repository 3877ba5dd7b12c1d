use deferred_types::{Camera, CameraProjection, Handedness, PointLight, SpotLight};
use glam::{Mat4, Vec3, Vec3A};

use crate::managers::CameraManager;

/// Near plane of every perspective shadow camera.
pub const SHADOW_NEAR: f32 = 0.1;
/// Far plane of every perspective shadow camera.
pub const SHADOW_FAR: f32 = 500.0;
/// Size of the area around the viewer covered by a directional light's shadow.
pub const DIRECTIONAL_SHADOW_DISTANCE: f32 = 200.0;

/// Faces of a cube map, in the order their shadow passes run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [Self; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// `(look direction, up vector)` of the face's camera.
    pub fn view_vectors(self) -> (Vec3, Vec3) {
        match self {
            Self::PositiveX => (Vec3::X, Vec3::Y),
            Self::NegativeX => (Vec3::NEG_X, Vec3::Y),
            Self::PositiveY => (Vec3::Y, Vec3::NEG_Z),
            Self::NegativeY => (Vec3::NEG_Y, Vec3::Z),
            Self::PositiveZ => (Vec3::Z, Vec3::Y),
            Self::NegativeZ => (Vec3::NEG_Z, Vec3::Y),
        }
    }
}

fn look_at(handedness: Handedness) -> fn(Vec3, Vec3, Vec3) -> Mat4 {
    match handedness {
        Handedness::Left => Mat4::look_at_lh,
        Handedness::Right => Mat4::look_at_rh,
    }
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Perspective camera covering the outer cone of the spot light.
pub fn spot_shadow_camera(light: &SpotLight, handedness: Handedness) -> CameraManager {
    let view = look_at(handedness)(light.position, light.position + light.direction, up_for(light.direction));
    CameraManager::new(
        Camera {
            projection: CameraProjection::Perspective {
                vfov: (light.outer_angle * 2.0).to_degrees(),
                near: SHADOW_NEAR,
                far: SHADOW_FAR,
            },
            view,
        },
        handedness,
        None,
    )
}

/// One 90 degree camera per cube face.
pub fn point_shadow_cameras(light: &PointLight, handedness: Handedness) -> [CameraManager; 6] {
    CubeFace::ALL.map(|face| {
        let (look, up) = face.view_vectors();
        CameraManager::new(
            Camera {
                projection: CameraProjection::Perspective {
                    vfov: 90.0,
                    near: SHADOW_NEAR,
                    far: SHADOW_FAR,
                },
                view: look_at(handedness)(light.position, light.position + look, up),
            },
            handedness,
            None,
        )
    })
}

/// Orthographic camera centered on the viewer, snapped to whole shadow map texels so
/// the shadow does not shimmer when the viewer moves.
pub fn directional_shadow_camera(
    direction: Vec3,
    user_camera: &CameraManager,
    distance: f32,
    resolution: u32,
) -> CameraManager {
    let camera_location = user_camera.location();

    let shadow_texel_size = distance / resolution as f32;

    let look_at = look_at(user_camera.handedness());

    let origin_view = look_at(Vec3::ZERO, direction, up_for(direction));
    let camera_origin_view = origin_view.transform_point3(camera_location);

    let offset = camera_origin_view.truncate() % shadow_texel_size;
    let shadow_location = camera_origin_view - Vec3::from((offset, 0.0));

    let inv_origin_view = origin_view.inverse();
    let new_shadow_location = inv_origin_view.transform_point3(shadow_location);

    CameraManager::new(
        Camera {
            projection: CameraProjection::Orthographic {
                size: Vec3A::splat(distance),
            },
            view: look_at(new_shadow_location, new_shadow_location + direction, up_for(direction)),
        },
        user_camera.handedness(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use deferred_types::{Camera, CameraProjection, Handedness, LightAttrib, PointLight};
    use glam::{Mat4, Vec3};

    use super::*;

    #[test]
    fn cube_faces_look_along_axes() {
        let light = PointLight {
            attrib: LightAttrib::empty(),
            color: Vec3::ONE,
            falloff: Vec3::X,
            position: Vec3::new(0.0, 5.0, 0.0),
        };
        let cameras = point_shadow_cameras(&light, Handedness::Left);
        for (camera, face) in cameras.iter().zip(CubeFace::ALL) {
            let (look, _) = face.view_vectors();
            assert!((camera.location() - light.position).length() < 1e-4);
            assert!((camera.forward() - look).length() < 1e-4, "{face:?}");
        }
    }

    #[test]
    fn directional_snaps_to_texels() {
        let user = CameraManager::new(
            Camera {
                projection: CameraProjection::default(),
                view: Mat4::from_translation(Vec3::new(-0.013, 0.0, 0.0)),
            },
            Handedness::Left,
            None,
        );
        let shadow = directional_shadow_camera(Vec3::NEG_Y, &user, 512.0, 512);
        let location = shadow.location();
        // Texel size is exactly one unit.
        assert!((location.x - location.x.round()).abs() < 1e-4);
        assert!((location.z - location.z.round()).abs() < 1e-4);
    }
}
