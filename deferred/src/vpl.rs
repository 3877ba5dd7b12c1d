//! Virtual point lights.
//!
//! A reflective shadow map stores, per texel, the surface the light hits first:
//! its albedo, normal and depth. Sampling it on a regular grid gives a fixed set
//! of virtual point lights that bounce the light once more into the scene.
//!
//! The GPU pass runs as [`PostProcess::RsmToVpls`](crate::PostProcess::RsmToVpls).
//! [`extract_vpls`] computes the same records on the CPU from a read back or
//! synthesized map.

use bytemuck::{Pod, Zeroable};
use deferred_types::LightKind;
use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use crate::{managers::CameraManager, targets::RSM_SIZE};

/// VPLs along one edge of the sampling grid.
pub const VPL_COUNT_SQRT: u32 = 16;
/// VPLs extracted per indirect lighting pass.
pub const VPL_COUNT: u32 = VPL_COUNT_SQRT * VPL_COUNT_SQRT;
/// Texture coordinate distance between grid samples.
pub const VPL_DELTA: f32 = 1.0 / VPL_COUNT_SQRT as f32;
/// Offset of a sample inside its grid cell.
pub const VPL_OFFSET: f32 = VPL_DELTA / 3.0;

/// Mip level of the reflective shadow map that has one texel per VPL.
pub fn rsm_mip_level(rsm_size: u32) -> f32 {
    (rsm_size as f32).log2() - (VPL_COUNT_SQRT as f32).log2()
}

/// `(count, 1 / count, 0.5 / count)` as the VPL gathering pass consumes it.
pub fn vpl_lighting_params() -> Vec3 {
    Vec3::new(VPL_COUNT as f32, 1.0 / VPL_COUNT as f32, 0.5 / VPL_COUNT as f32)
}

/// Everything needed to turn a reflective shadow map into VPLs.
#[derive(Debug, Clone, PartialEq)]
pub struct VplParams {
    /// Light view space to eye view space.
    pub ls_to_es: Mat4,
    pub mip_level: f32,
    /// `(VPL_COUNT, VPL_COUNT_SQRT, VPL_DELTA, VPL_OFFSET)`
    pub vpl_params: Vec4,
    pub color: Vec3,
    pub cos_outer_inner: Vec4,
    pub falloff: Vec3,
    /// Far plane corners of the light's frustum in light view space: top left, top
    /// right, bottom left, bottom right.
    pub far_corners: [Vec3; 4],
    pub near_q: Vec2,
}

impl VplParams {
    pub fn new(rsm_camera: &CameraManager, view: Mat4, light: &LightKind) -> Self {
        let inv_proj = rsm_camera.inv_proj();
        let corner = |x: f32, y: f32| inv_proj.project_point3(Vec3::new(x, y, 1.0));
        let cos_outer_inner = match light {
            LightKind::Spot(spot) => spot.cos_outer_inner(),
            _ => Vec4::new(-1.0, -1.0, 0.0, 0.0),
        };

        Self {
            ls_to_es: view * rsm_camera.inv_view(),
            mip_level: rsm_mip_level(RSM_SIZE),
            vpl_params: Vec4::new(VPL_COUNT as f32, VPL_COUNT_SQRT as f32, VPL_DELTA, VPL_OFFSET),
            color: light.color(),
            cos_outer_inner,
            falloff: light.falloff(),
            far_corners: [corner(-1.0, 1.0), corner(1.0, 1.0), corner(-1.0, -1.0), corner(1.0, -1.0)],
            near_q: near_q(rsm_camera),
        }
    }
}

/// `(near * q, q)` with `q = far / (far - near)`.
pub fn near_q(camera: &CameraManager) -> Vec2 {
    let (near, far) = camera.near_far();
    let q = far / (far - near);
    Vec2::new(near * q, q)
}

/// One virtual point light, in eye view space.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vpl {
    pub position: Vec3,
    pub normal: Vec3,
    pub flux: Vec3,
}

/// One texel of a reflective shadow map.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct RsmTexel {
    pub albedo: Vec3,
    /// Light view space normal.
    pub normal: Vec3,
    /// Light view space linear depth.
    pub depth: f32,
}

/// CPU side reflective shadow map, row major, top row first.
#[derive(Debug, Clone)]
pub struct RsmImage {
    pub size: UVec2,
    pub texels: Vec<RsmTexel>,
}

impl RsmImage {
    pub fn filled(size: UVec2, texel: RsmTexel) -> Self {
        Self {
            size,
            texels: vec![texel; (size.x * size.y) as usize],
        }
    }

    fn texel(&self, x: u32, y: u32) -> RsmTexel {
        if self.size.x == 0 || self.size.y == 0 {
            return RsmTexel::default();
        }
        let x = x.min(self.size.x - 1);
        let y = y.min(self.size.y - 1);
        self.texels.get((y * self.size.x + x) as usize).copied().unwrap_or_default()
    }

    /// Box filtered sample of mip `level` at `tc`.
    fn sample_level(&self, tc: Vec2, level: u32) -> RsmTexel {
        let level = level.min(self.size.min_element().max(1).ilog2());
        let block = 1 << level;
        let level_size = (self.size >> level).max(UVec2::ONE);
        let texel = (tc * level_size.as_vec2()).as_uvec2().min(level_size - 1);

        let mut sum = RsmTexel::default();
        for y in 0..block {
            for x in 0..block {
                let t = self.texel(texel.x * block + x, texel.y * block + y);
                sum.albedo += t.albedo;
                sum.normal += t.normal;
                sum.depth += t.depth;
            }
        }
        let count = (block * block) as f32;
        RsmTexel {
            albedo: sum.albedo / count,
            normal: sum.normal.normalize_or_zero(),
            depth: sum.depth / count,
        }
    }
}

/// Extracts exactly [`VPL_COUNT`] VPLs from a reflective shadow map, one per grid
/// cell, row by row. Unlit texels produce VPLs with zero flux.
pub fn extract_vpls(rsm: &RsmImage, params: &VplParams) -> Vec<Vpl> {
    profiling::scope!("extract_vpls");

    let level = params.mip_level.max(0.0).round() as u32;
    let [top_left, top_right, bottom_left, bottom_right] = params.far_corners;
    let cos_outer = params.cos_outer_inner.x;
    let cos_inner = params.cos_outer_inner.y;

    let mut vpls = Vec::with_capacity(VPL_COUNT as usize);
    for y in 0..VPL_COUNT_SQRT {
        for x in 0..VPL_COUNT_SQRT {
            let tc = Vec2::new(x as f32, y as f32) * VPL_DELTA + VPL_OFFSET;
            let texel = rsm.sample_level(tc, level);

            let ray = top_left
                .lerp(top_right, tc.x)
                .lerp(bottom_left.lerp(bottom_right, tc.x), tc.y);
            let position_ls = if ray.z.abs() > f32::EPSILON {
                ray * (texel.depth / ray.z)
            } else {
                Vec3::ZERO
            };

            let cone = if cos_inner > cos_outer {
                let cos_direction = position_ls.normalize_or_zero().z.abs();
                ((cos_direction - cos_outer) / (cos_inner - cos_outer)).clamp(0.0, 1.0)
            } else {
                1.0
            };

            vpls.push(Vpl {
                position: params.ls_to_es.transform_point3(position_ls),
                normal: params.ls_to_es.transform_vector3(texel.normal).normalize_or_zero(),
                flux: texel.albedo * params.color * cone / VPL_COUNT as f32,
            });
        }
    }

    debug_assert_eq!(vpls.len(), VPL_COUNT as usize);
    vpls
}

#[cfg(test)]
mod tests {
    use deferred_types::{Camera, CameraProjection, Handedness, LightAttrib, LightKind, SpotLight};
    use glam::{Mat4, UVec2, Vec3};

    use super::*;
    use crate::managers::shadow_camera::spot_shadow_camera;

    fn spot() -> LightKind {
        LightKind::Spot(SpotLight {
            attrib: LightAttrib::INDIRECT_LIGHTING,
            color: Vec3::ONE,
            falloff: Vec3::X,
            position: Vec3::ZERO,
            direction: Vec3::Z,
            outer_angle: 0.7,
            inner_angle: 0.4,
        })
    }

    fn params() -> VplParams {
        let light = spot();
        let LightKind::Spot(s) = &light else { unreachable!() };
        let camera = spot_shadow_camera(s, Handedness::Left);
        VplParams::new(&camera, Mat4::IDENTITY, &light)
    }

    #[test]
    fn constants() {
        assert_eq!(VPL_COUNT, 256);
        assert_eq!(rsm_mip_level(RSM_SIZE), 5.0);
        assert_eq!(params().vpl_params, Vec4::new(256.0, 16.0, 1.0 / 16.0, 1.0 / 48.0));
        assert_eq!(vpl_lighting_params(), Vec3::new(256.0, 1.0 / 256.0, 0.5 / 256.0));
    }

    #[test]
    fn black_map_still_yields_every_vpl() {
        let rsm = RsmImage::filled(UVec2::splat(RSM_SIZE), RsmTexel::default());
        let vpls = extract_vpls(&rsm, &params());
        assert_eq!(vpls.len(), VPL_COUNT as usize);
        assert!(vpls.iter().all(|vpl| vpl.flux == Vec3::ZERO));
    }

    #[test]
    fn lit_map_places_vpls_at_depth() {
        let rsm = RsmImage::filled(
            UVec2::splat(64),
            RsmTexel {
                albedo: Vec3::ONE,
                normal: Vec3::NEG_Z,
                depth: 10.0,
            },
        );
        let vpls = extract_vpls(&rsm, &params());
        assert_eq!(vpls.len(), VPL_COUNT as usize);
        for vpl in &vpls {
            // The shadow camera sits at the origin looking down +Z, the same as the eye.
            assert!((vpl.position.z - 10.0).abs() < 1e-2, "{vpl:?}");
            assert!((vpl.normal - Vec3::NEG_Z).length() < 1e-4);
        }
        assert!(vpls.iter().any(|vpl| vpl.flux.x > 0.0));
    }

    #[test]
    fn ls_to_es_maps_light_space_into_eye_space() {
        let light = spot();
        let LightKind::Spot(s) = &light else { unreachable!() };
        let camera = spot_shadow_camera(s, Handedness::Left);
        let eye = crate::managers::CameraManager::new(
            Camera {
                projection: CameraProjection::default(),
                view: Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
            },
            Handedness::Left,
            None,
        );
        let params = VplParams::new(&camera, eye.view(), &light);
        let p = params.ls_to_es.transform_point3(Vec3::new(0.0, 0.0, 1.0));
        assert!((p - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-4);
    }
}
