//! Light volume geometry.
//!
//! Point and spot lights are drawn through closed meshes that bound the region
//! they can light: a cone for spot lights, one pyramid per cube face for point
//! light shadow culling and a box for point light lighting. The meshes are built
//! once in light space and uploaded to the backend; per light only a model
//! matrix changes.

use glam::{Mat4, Vec3};

/// Extent of every light volume in light space.
pub const VOLUME_EXTENT: f32 = 100.0;
/// Segment count of the spot light cone.
pub const CONE_SEGMENTS: u32 = 12;

/// Which of the shared volume meshes a draw uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    Cone,
    Pyramid,
    Box,
    /// Full screen quad, used by every screen space technique.
    Quad,
}

/// Axis aligned bounding box.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        };

        points.iter().skip(1).fold(
            Self {
                min: *first,
                max: *first,
            },
            |aabb, &p| Self {
                min: aabb.min.min(p),
                max: aabb.max.max(p),
            },
        )
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (l, h) = (self.min, self.max);
        [
            Vec3::new(l.x, l.y, l.z),
            Vec3::new(h.x, l.y, l.z),
            Vec3::new(l.x, h.y, l.z),
            Vec3::new(h.x, h.y, l.z),
            Vec3::new(l.x, l.y, h.z),
            Vec3::new(h.x, l.y, h.z),
            Vec3::new(l.x, h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
        ]
    }

    /// Bounds of this box after transforming it by `transform`.
    pub fn transform(&self, transform: Mat4) -> Self {
        let corners = self.corners().map(|c| transform.transform_point3(c));
        Self::from_points(&corners)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Triangle mesh of a light volume.
#[derive(Debug, Clone)]
pub struct VolumeMesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u16>,
    pub bounds: Aabb,
}

impl VolumeMesh {
    fn new(positions: Vec<Vec3>, indices: Vec<u16>) -> Self {
        let bounds = Aabb::from_points(&positions);
        Self {
            positions,
            indices,
            bounds,
        }
    }

    /// Cone with its apex at the origin, opening along +Z.
    ///
    /// The side and the cap keep their own copies of the rim so each face can be
    /// shaded flat.
    pub fn cone(radius: f32, height: f32, segments: u32) -> Self {
        let n = segments as u16;
        let rim = |i: u16| {
            let angle = i as f32 * std::f32::consts::TAU / segments as f32;
            Vec3::new(radius * angle.cos(), radius * angle.sin(), height)
        };

        let mut positions = Vec::with_capacity(3 * segments as usize + 1);
        positions.extend((0..n).map(rim));
        positions.extend((0..n).map(|_| Vec3::ZERO));
        positions.extend((0..n).map(rim));
        positions.push(Vec3::new(0.0, 0.0, height));

        let center = 3 * n;
        let mut indices = Vec::with_capacity(6 * segments as usize);
        for i in 0..n {
            let next = (i + 1) % n;
            indices.extend_from_slice(&[n + i, next, i]);
        }
        for i in 0..n {
            let next = (i + 1) % n;
            indices.extend_from_slice(&[center, 2 * n + i, 2 * n + next]);
        }

        Self::new(positions, indices)
    }

    /// Square pyramid with its apex at the origin, opening along +Z with a 90 degree
    /// field of view when `radius == height`.
    pub fn pyramid(radius: f32, height: f32) -> Self {
        let base = [
            Vec3::new(-radius, -radius, height),
            Vec3::new(radius, -radius, height),
            Vec3::new(radius, radius, height),
            Vec3::new(-radius, radius, height),
        ];

        let mut positions = Vec::with_capacity(13);
        let mut indices = Vec::with_capacity(24);
        for side in 0..4u16 {
            let first = positions.len() as u16;
            positions.extend_from_slice(&[Vec3::ZERO, base[(side as usize + 1) % 4], base[side as usize]]);
            indices.extend_from_slice(&[first, first + 1, first + 2]);
        }
        let center = positions.len() as u16;
        positions.push(Vec3::new(0.0, 0.0, height));
        for side in 0..4u16 {
            // Reuse the base corners of the side triangles.
            let corner = side * 3 + 2;
            let next_corner = ((side + 1) % 4) * 3 + 2;
            indices.extend_from_slice(&[center, corner, next_corner]);
        }

        Self::new(positions, indices)
    }

    /// Cube centered at the origin.
    pub fn cube_box(half_extent: f32) -> Self {
        let h = half_extent;
        let positions = Aabb {
            min: Vec3::splat(-h),
            max: Vec3::splat(h),
        }
        .corners()
        .to_vec();

        #[rustfmt::skip]
        let indices = vec![
            0, 2, 3, 0, 3, 1, // -z
            4, 5, 7, 4, 7, 6, // +z
            0, 4, 6, 0, 6, 2, // -x
            1, 3, 7, 1, 7, 5, // +x
            0, 1, 5, 0, 5, 4, // -y
            2, 6, 7, 2, 7, 3, // +y
        ];

        Self::new(positions, indices)
    }

    /// Full screen quad in normalized device coordinates.
    pub fn quad() -> Self {
        let positions = vec![
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ];
        Self::new(positions, vec![0, 1, 2, 2, 1, 3])
    }
}

/// The shared volume meshes.
#[derive(Debug, Clone)]
pub struct LightVolumes {
    pub cone: VolumeMesh,
    pub pyramid: VolumeMesh,
    pub cube: VolumeMesh,
    pub quad: VolumeMesh,
}

impl LightVolumes {
    pub fn new() -> Self {
        Self {
            cone: VolumeMesh::cone(VOLUME_EXTENT, VOLUME_EXTENT, CONE_SEGMENTS),
            pyramid: VolumeMesh::pyramid(VOLUME_EXTENT, VOLUME_EXTENT),
            cube: VolumeMesh::cube_box(VOLUME_EXTENT),
            quad: VolumeMesh::quad(),
        }
    }

    pub fn get(&self, kind: VolumeKind) -> &VolumeMesh {
        match kind {
            VolumeKind::Cone => &self.cone,
            VolumeKind::Pyramid => &self.pyramid,
            VolumeKind::Box => &self.cube,
            VolumeKind::Quad => &self.quad,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VolumeKind, &VolumeMesh)> {
        [VolumeKind::Cone, VolumeKind::Pyramid, VolumeKind::Box, VolumeKind::Quad]
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
    }
}

impl Default for LightVolumes {
    fn default() -> Self {
        Self::new()
    }
}

/// If the eye is inside the cone of a spot light. Decides whether the stencil pass
/// marks the volume from the inside or the outside.
///
/// The cone test is slightly widened so the near plane never clips a volume the
/// eye is just outside of.
pub fn eye_in_spot_volume(eye: Vec3, position: Vec3, direction: Vec3, cos_outer: f32) -> bool {
    let to_eye = eye - position;
    let cos_direction = to_eye.normalize_or_zero().dot(direction);
    cos_outer < cos_direction * 1.01 && to_eye.dot(direction) < VOLUME_EXTENT
}

/// If the eye is inside the box volume of a point light.
pub fn eye_in_point_volume(eye: Vec3, position: Vec3) -> bool {
    (eye - position).abs().max_element() < VOLUME_EXTENT
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};

    use super::*;

    #[test]
    fn mesh_sizes() {
        let cone = VolumeMesh::cone(1.0, 1.0, 12);
        assert_eq!(cone.positions.len(), 37);
        assert_eq!(cone.indices.len(), 72);

        let pyramid = VolumeMesh::pyramid(1.0, 1.0);
        assert_eq!(pyramid.positions.len(), 13);
        assert_eq!(pyramid.indices.len(), 24);

        let cube = VolumeMesh::cube_box(1.0);
        assert_eq!(cube.positions.len(), 8);
        assert_eq!(cube.indices.len(), 36);
    }

    #[test]
    fn indices_in_bounds() {
        let volumes = LightVolumes::new();
        for (_, mesh) in volumes.iter() {
            assert_eq!(mesh.indices.len() % 3, 0);
            assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.positions.len()));
        }
    }

    #[test]
    fn cone_bounds() {
        let cone = VolumeMesh::cone(2.0, 3.0, 12);
        assert!((cone.bounds.min - Vec3::new(-2.0, -2.0, 0.0)).abs().max_element() < 1e-5);
        assert!((cone.bounds.max - Vec3::new(2.0, 2.0, 3.0)).abs().max_element() < 1e-5);
    }

    #[test]
    fn aabb_transform() {
        let aabb = VolumeMesh::cube_box(1.0).bounds;
        let moved = aabb.transform(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(4.0, -1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(6.0, 1.0, 1.0));
        assert!(moved.contains(Vec3::new(5.0, 0.5, 0.0)));
        assert!(!moved.contains(Vec3::ZERO));
    }

    #[test]
    fn eye_in_volume() {
        let cos_outer = std::f32::consts::FRAC_PI_4.cos();
        assert!(eye_in_spot_volume(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Z, cos_outer));
        assert!(!eye_in_spot_volume(Vec3::new(0.0, 0.0, -10.0), Vec3::ZERO, Vec3::Z, cos_outer));
        assert!(!eye_in_spot_volume(Vec3::new(0.0, 0.0, 200.0), Vec3::ZERO, Vec3::Z, cos_outer));

        assert!(eye_in_point_volume(Vec3::new(10.0, -20.0, 99.0), Vec3::ZERO));
        assert!(!eye_in_point_volume(Vec3::new(10.0, -120.0, 0.0), Vec3::ZERO));
    }
}
