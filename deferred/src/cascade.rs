//! Cascade splits for directional light shadows.

use arrayvec::ArrayVec;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Most cascades a directional light shadow can be split into.
pub const MAX_CASCADES: usize = 4;
/// Blend between logarithmic (1.0) and uniform (0.0) splits.
pub const PSSM_DEFAULT_LAMBDA: f32 = 0.8;

/// How the cascade split range is found.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CascadedShadowType {
    /// Parallel split shadow maps over the camera's whole depth range.
    #[default]
    Pssm,
    /// Sample distribution shadow maps: splits cover only the depth range the
    /// G-buffer actually contains.
    Sdsm,
}

/// Practical split scheme: each split distance blends a logarithmic and a uniform
/// split of `[near, far]` by `lambda`.
///
/// `count` is clamped to `1..=MAX_CASCADES`. Returns `(begin, end)` per cascade.
/// Logarithmic splits need `near > 0`; otherwise the splits are uniform.
pub fn pssm_intervals(near: f32, far: f32, count: u32, lambda: f32) -> ArrayVec<Vec2, MAX_CASCADES> {
    let count = count.clamp(1, MAX_CASCADES as u32);
    let range = far - near;
    let ratio = far / near;
    let lambda = if near > 0.0 { lambda } else { 0.0 };

    let mut distances = ArrayVec::<f32, { MAX_CASCADES + 1 }>::new();
    distances.push(near);
    for i in 1..count {
        let p = i as f32 / count as f32;
        let uniform = near + range * p;
        if lambda > 0.0 {
            let log = near * ratio.powf(p);
            distances.push(lambda * (log - uniform) + uniform);
        } else {
            distances.push(uniform);
        }
    }
    distances.push(far);

    distances.windows(2).map(|w| Vec2::new(w[0], w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::pssm_intervals;

    #[test]
    fn intervals_cover_range_in_order() {
        let intervals = pssm_intervals(0.1, 500.0, 4, 0.8);
        assert_eq!(intervals.len(), 4);
        assert_eq!(intervals[0].x, 0.1);
        assert_eq!(intervals[3].y, 500.0);
        for w in intervals.windows(2) {
            assert_eq!(w[0].y, w[1].x);
            assert!(w[0].x < w[0].y);
        }
    }

    #[test]
    fn lambda_extremes() {
        let uniform = pssm_intervals(1.0, 101.0, 2, 0.0);
        assert!((uniform[0].y - 51.0).abs() < 1e-4);

        let log = pssm_intervals(1.0, 100.0, 2, 1.0);
        assert!((log[0].y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn zero_near_splits_uniformly() {
        let intervals = pssm_intervals(0.0, 100.0, 4, 0.8);
        let ends: Vec<f32> = intervals.iter().map(|i| i.y).collect();
        assert_eq!(ends, [25.0, 50.0, 75.0, 100.0]);
        assert_eq!(intervals[0].x, 0.0);
    }

    #[test]
    fn count_is_clamped() {
        assert_eq!(pssm_intervals(1.0, 10.0, 0, 0.8).len(), 1);
        assert_eq!(pssm_intervals(1.0, 10.0, 9, 0.8).len(), 4);
    }
}
