use deferred_types::{Camera, CameraProjection, Handedness};
use glam::{Mat4, Vec3, Vec4};

/// Manages a camera's location and projection settings.
///
/// Used both for the viewer and for every light's shadow cameras.
#[derive(Debug, Clone)]
pub struct CameraManager {
    handedness: Handedness,
    proj: Mat4,
    inv_proj: Mat4,
    inv_view: Mat4,
    data: Camera,
}
impl CameraManager {
    /// Builds a new camera, using the given aspect ratio. If no aspect ratio is
    /// given it is assumed that no aspect ratio scaling should be done.
    pub fn new(data: Camera, handedness: Handedness, aspect_ratio: Option<f32>) -> Self {
        profiling::scope!("CameraManager::new");

        let aspect_ratio = aspect_ratio.unwrap_or(1.0);
        let proj = compute_projection_matrix(data, handedness, aspect_ratio);

        Self {
            handedness,
            proj,
            inv_proj: proj.inverse(),
            inv_view: data.view.inverse(),
            data,
        }
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn view(&self) -> Mat4 {
        self.data.view
    }

    pub fn inv_view(&self) -> Mat4 {
        self.inv_view
    }

    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    pub fn inv_proj(&self) -> Mat4 {
        self.inv_proj
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.data.view
    }

    pub fn location(&self) -> Vec3 {
        self.inv_view.w_axis.truncate()
    }

    /// Direction the camera looks in, in world space.
    pub fn forward(&self) -> Vec3 {
        let forward = match self.handedness {
            Handedness::Left => Vec4::Z,
            Handedness::Right => Vec4::NEG_Z,
        };
        (self.inv_view * forward).truncate().normalize_or_zero()
    }

    /// Near and far plane distances. Orthographic boxes are centered on the eye;
    /// only their half in front of it counts, so near is 0.
    pub fn near_far(&self) -> (f32, f32) {
        match self.data.projection {
            CameraProjection::Orthographic { size } => (0.0, size.z * 0.5),
            CameraProjection::Perspective { near, far, .. } => (near, far),
            CameraProjection::Raw(proj) => raw_near_far(proj),
        }
    }

    /// `(near, far, 1 / far)`, the terms linear depth is reconstructed from.
    pub fn depth_near_far_invfar(&self) -> Vec3 {
        let (near, far) = self.near_far();
        Vec3::new(near, far, 1.0 / far)
    }
}

fn compute_projection_matrix(data: Camera, handedness: Handedness, aspect_ratio: f32) -> Mat4 {
    match data.projection {
        CameraProjection::Orthographic { size } => {
            let half = size * 0.5;
            if handedness == Handedness::Left {
                Mat4::orthographic_lh(-half.x, half.x, -half.y, half.y, -half.z, half.z)
            } else {
                Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -half.z, half.z)
            }
        }
        CameraProjection::Perspective { vfov, near, far } => {
            if handedness == Handedness::Left {
                Mat4::perspective_lh(vfov.to_radians(), aspect_ratio, near, far)
            } else {
                Mat4::perspective_rh(vfov.to_radians(), aspect_ratio, near, far)
            }
        }
        CameraProjection::Raw(proj) => proj,
    }
}

// Recovers the planes of a [0, 1] depth perspective matrix: depth is
// `(a * z + b) / z`, which is 0 at near and 1 at far.
fn raw_near_far(proj: Mat4) -> (f32, f32) {
    let a = proj.z_axis.z;
    let b = proj.w_axis.z;
    if a.abs() <= f32::EPSILON || (1.0 - a).abs() <= f32::EPSILON {
        return (0.1, 500.0);
    }
    ((-b / a).abs(), (b / (1.0 - a)).abs())
}

#[cfg(test)]
mod tests {
    use deferred_types::{Camera, CameraProjection, Handedness};
    use glam::{Mat4, Vec3};

    use super::CameraManager;

    #[test]
    fn raw_projection_planes() {
        let proj = Mat4::perspective_lh(1.0, 1.0, 0.5, 250.0);
        let camera = CameraManager::new(
            Camera {
                projection: CameraProjection::Raw(proj),
                view: Mat4::IDENTITY,
            },
            Handedness::Left,
            None,
        );
        let (near, far) = camera.near_far();
        assert!((near - 0.5).abs() < 1e-3);
        assert!((far - 250.0).abs() < 1e-1);
    }

    #[test]
    fn location_and_forward() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let camera = CameraManager::new(
            Camera {
                projection: CameraProjection::default(),
                view: Mat4::look_at_lh(eye, eye + Vec3::X, Vec3::Y),
            },
            Handedness::Left,
            Some(16.0 / 9.0),
        );
        assert!((camera.location() - eye).length() < 1e-5);
        assert!((camera.forward() - Vec3::X).length() < 1e-5);
        assert_eq!(camera.depth_near_far_invfar(), Vec3::new(0.1, 500.0, 1.0 / 500.0));
    }

    #[test]
    fn orthographic_planes_start_at_the_eye() {
        let camera = CameraManager::new(
            Camera {
                projection: CameraProjection::Orthographic {
                    size: glam::Vec3A::new(20.0, 20.0, 200.0),
                },
                view: Mat4::IDENTITY,
            },
            Handedness::Left,
            None,
        );
        assert_eq!(camera.near_far(), (0.0, 100.0));
        assert_eq!(camera.depth_near_far_invfar(), Vec3::new(0.0, 100.0, 0.01));
    }
}
