//! Per frame pass list construction.
//!
//! Once the G-buffer is complete the rest of the frame is planned in one go: for
//! every enabled light, the shadow and lighting passes it needs in the order they
//! have to run, followed by the shading passes. Alongside the passes the builder
//! lists the light volume occlusion queries the layer issues before the first
//! light pass, in the order they are issued.

use deferred_types::{LightKind, LightType};
use glam::{Mat4, Vec3};

use crate::{
    backend::QueryId,
    managers::FrameLight,
    pass::{PassCode, PassType},
    volume::{Aabb, LightVolumes, VolumeKind},
};

/// Index of the query of a point light's box volume.
pub const POINT_LIGHT_VOLUME_QUERY: u32 = 6;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PassListOptions {
    pub mrt_g_buffer: bool,
    /// Indirect lighting is computed this frame.
    pub indirect_lighting: bool,
}

/// A depth only draw of a light volume inside an occlusion query.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VolumeQuery {
    pub query: QueryId,
    pub volume: VolumeKind,
    /// Light volume to world.
    pub model: Mat4,
    /// World space bounds of the transformed volume.
    pub bounds: Aabb,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassPlan {
    /// Passes following the G-buffer passes.
    pub passes: Vec<PassCode>,
    pub volume_queries: Vec<VolumeQuery>,
}

/// The two passes every frame starts with.
pub fn g_buffer_passes(mrt_g_buffer: bool) -> [PassCode; 2] {
    let ty = if mrt_g_buffer {
        PassType::MrtGBuffer
    } else {
        PassType::GBuffer
    };
    [PassCode::encode(ty, 0, 0), PassCode::encode(ty, 0, 1)]
}

/// Model matrix of a spot light's cone: the unit cone widened to the outer angle and
/// placed at the light's shadow camera.
pub fn spot_volume_model(light_to_world: Mat4, tan_outer: f32) -> Mat4 {
    light_to_world * Mat4::from_scale(Vec3::new(tan_outer, tan_outer, 1.0))
}

struct Planner<'a> {
    volumes: &'a LightVolumes,
    plan: PassPlan,
}

impl Planner<'_> {
    fn pass(&mut self, ty: PassType, light: usize, index: u32) {
        self.plan.passes.push(PassCode::encode(ty, light as u32, index));
    }

    fn query(&mut self, light: usize, index: u32, volume: VolumeKind, model: Mat4) {
        self.plan.volume_queries.push(VolumeQuery {
            query: QueryId {
                light: light as u32,
                index,
            },
            volume,
            model,
            bounds: self.volumes.get(volume).bounds.transform(model),
        });
    }
}

/// Plans the passes following the G-buffer.
///
/// The result depends only on the lights, their attributes and the options.
pub fn build_pass_list(lights: &[FrameLight], volumes: &LightVolumes, options: PassListOptions) -> PassPlan {
    profiling::scope!("build_pass_list");

    let mut planner = Planner {
        volumes,
        plan: PassPlan::default(),
    };

    for (i, light) in lights.iter().enumerate() {
        if !light.enabled {
            continue;
        }

        let casts_shadow = light.kind.casts_shadow();
        match &light.kind {
            LightKind::Spot(spot) => {
                if let Some(camera) = light.shadow_cameras.get(0) {
                    let model = spot_volume_model(camera.inv_view(), spot.cos_outer_inner().w);
                    planner.query(i, 0, VolumeKind::Cone, model);
                }

                let reflective = options.indirect_lighting && light.kind.has_indirect_lighting();
                if reflective {
                    planner.pass(PassType::GenReflectiveShadowMap, i, 0);
                    planner.pass(PassType::IndirectLighting, i, 0);
                }
                // The reflective shadow map doubles as the shadow map.
                if casts_shadow && !reflective {
                    planner.pass(PassType::GenShadowMap, i, 0);
                }
                planner.pass(PassType::Lighting, i, 0);
            }
            LightKind::Point(point) => {
                for face in 0..6 {
                    if casts_shadow {
                        planner.pass(PassType::GenShadowMap, i, face);
                    }
                    if let Some(camera) = light.shadow_cameras.get(face) {
                        planner.query(i, face, VolumeKind::Pyramid, camera.inv_view());
                    }
                }
                planner.query(
                    i,
                    POINT_LIGHT_VOLUME_QUERY,
                    VolumeKind::Box,
                    Mat4::from_translation(point.position),
                );
                planner.pass(PassType::Lighting, i, POINT_LIGHT_VOLUME_QUERY);
            }
            LightKind::Ambient(_) | LightKind::Directional(_) => {
                if casts_shadow {
                    planner.pass(PassType::GenShadowMap, i, 0);
                }
                planner.pass(PassType::Lighting, i, 0);
            }
        }

        debug_assert!(light.kind.light_type() != LightType::Ambient || i == 0);
    }

    planner.pass(PassType::Shading, 0, 0);
    if options.mrt_g_buffer {
        planner.pass(PassType::SpecialShading, 0, 0);
        planner.pass(PassType::SpecialShading, 0, 1);
    } else {
        planner.pass(PassType::Shading, 0, 1);
    }

    planner.plan
}

#[cfg(test)]
mod tests {
    use deferred_types::{
        AmbientLight, Camera, DirectionalLight, Handedness, LightAttrib, LightKind, PointLight, SpotLight,
    };
    use glam::Vec3;

    use super::*;
    use crate::managers::{CameraManager, LightManager};

    fn plan(kinds: Vec<LightKind>, options: PassListOptions) -> PassPlan {
        let mut manager = LightManager::new();
        for kind in kinds {
            manager.add(kind);
        }
        let camera = CameraManager::new(Camera::default(), Handedness::Left, None);
        let lights = manager.snapshot(&camera).unwrap();
        build_pass_list(&lights, &LightVolumes::new(), options)
    }

    fn codes(plan: &PassPlan) -> Vec<(PassType, u32, u32)> {
        plan.passes.iter().map(|p| p.decode()).collect()
    }

    fn spot(attrib: LightAttrib) -> LightKind {
        LightKind::Spot(SpotLight {
            attrib,
            color: Vec3::ONE,
            falloff: Vec3::X,
            position: Vec3::ZERO,
            direction: Vec3::Z,
            outer_angle: 0.6,
            inner_angle: 0.3,
        })
    }

    #[test]
    fn ambient_only() {
        let plan = plan(vec![], PassListOptions::default());
        assert_eq!(
            codes(&plan),
            [(PassType::Lighting, 0, 0), (PassType::Shading, 0, 0), (PassType::Shading, 0, 1)]
        );
        assert!(plan.volume_queries.is_empty());
    }

    #[test]
    fn shadowed_point_light() {
        let plan = plan(
            vec![LightKind::Point(PointLight {
                attrib: LightAttrib::empty(),
                color: Vec3::ONE,
                falloff: Vec3::X,
                position: Vec3::new(0.0, 3.0, 0.0),
            })],
            PassListOptions::default(),
        );
        let mut expected = vec![(PassType::Lighting, 0, 0)];
        expected.extend((0..6).map(|face| (PassType::GenShadowMap, 1, face)));
        expected.extend([(PassType::Lighting, 1, 6), (PassType::Shading, 0, 0), (PassType::Shading, 0, 1)]);
        assert_eq!(codes(&plan), expected);

        let queries: Vec<_> = plan.volume_queries.iter().map(|q| (q.query.index, q.volume)).collect();
        assert_eq!(queries.len(), 7);
        assert_eq!(queries[6], (6, VolumeKind::Box));
        assert!(plan.volume_queries[6].bounds.contains(Vec3::new(0.0, 3.0, 0.0)));
    }

    #[test]
    fn unshadowed_point_light_still_queries_faces() {
        let plan = plan(
            vec![LightKind::Point(PointLight {
                attrib: LightAttrib::NO_SHADOW,
                color: Vec3::ONE,
                falloff: Vec3::X,
                position: Vec3::ZERO,
            })],
            PassListOptions::default(),
        );
        assert_eq!(plan.passes.len(), 4);
        assert_eq!(plan.volume_queries.len(), 7);
    }

    #[test]
    fn indirect_spot_light_replaces_shadow_map() {
        let options = PassListOptions {
            indirect_lighting: true,
            ..Default::default()
        };
        let with_indirect = plan(vec![spot(LightAttrib::INDIRECT_LIGHTING)], options);
        assert_eq!(
            codes(&with_indirect)[1..4],
            [
                (PassType::GenReflectiveShadowMap, 1, 0),
                (PassType::IndirectLighting, 1, 0),
                (PassType::Lighting, 1, 0)
            ]
        );

        // Without indirect lighting the same light gets an ordinary shadow map.
        let without = plan(vec![spot(LightAttrib::INDIRECT_LIGHTING)], PassListOptions::default());
        assert_eq!(
            codes(&without)[1..3],
            [(PassType::GenShadowMap, 1, 0), (PassType::Lighting, 1, 0)]
        );
    }

    #[test]
    fn disabled_lights_and_mrt() {
        let mut manager = LightManager::new();
        let handle = manager.add(LightKind::Directional(DirectionalLight {
            attrib: LightAttrib::empty(),
            color: Vec3::ONE,
            falloff: Vec3::X,
            direction: Vec3::NEG_Y,
        }));
        manager.add(LightKind::Ambient(AmbientLight { color: Vec3::ONE }));
        manager.set_enabled(handle, false).unwrap();
        let camera = CameraManager::new(Camera::default(), Handedness::Left, None);
        let lights = manager.snapshot(&camera).unwrap();
        let options = PassListOptions {
            mrt_g_buffer: true,
            ..Default::default()
        };
        let plan = build_pass_list(&lights, &LightVolumes::new(), options);
        assert_eq!(
            codes(&plan),
            [
                (PassType::Lighting, 0, 0),
                (PassType::Shading, 0, 0),
                (PassType::SpecialShading, 0, 0),
                (PassType::SpecialShading, 0, 1)
            ]
        );
        assert_eq!(g_buffer_passes(true)[1].decode(), (PassType::MrtGBuffer, 0, 1));
    }
}
