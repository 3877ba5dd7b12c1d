//! Multiresolution splatting of indirect lighting.
//!
//! Indirect lighting is gathered at a few resolutions at once. Pixels whose
//! neighborhood has smooth depth and normals are lit at a coarse level, the rest
//! at finer ones. A depth derivative chain and a normal cone chain are built
//! from the G-buffer, the subsplat stencil marks which level lights each pixel,
//! and after lighting the levels are upsampled into each other from the coarsest
//! to the finest.
//!
//! The levels sit next to each other in one atlas texture: level 0 fills the
//! left half, every following level sits to the right of the previous one at
//! half its size.

use arrayvec::ArrayVec;
use glam::{UVec2, Vec2, Vec4};

/// Most levels the indirect lighting is split into.
pub const MAX_IL_MIPMAP_LEVELS: u32 = 3;
/// Largest depth derivative a pixel can have and still be lit at a coarser level.
pub const SUBSPLAT_DEPTH_THRESHOLD: f32 = 0.001;
/// Smallest normal cone cosine a pixel can have and still be lit at a coarser level.
pub const SUBSPLAT_NORMAL_THRESHOLD: f32 = 0.77;

/// `(1 / w, 1 / h, 0.5 / w, 0.5 / h)` of a texture level.
pub fn delta_offset(size: UVec2) -> Vec4 {
    let delta = Vec2::ONE / size.max(UVec2::ONE).as_vec2();
    Vec4::new(delta.x, delta.y, delta.x * 0.5, delta.y * 0.5)
}

pub fn subsplat_thresholds() -> Vec2 {
    Vec2::new(SUBSPLAT_DEPTH_THRESHOLD, SUBSPLAT_NORMAL_THRESHOLD)
}

/// Size of mip `level` of a texture.
pub fn level_size(size: UVec2, level: u32) -> UVec2 {
    (size >> level).max(UVec2::ONE)
}

/// The levels of a depth derivative or normal cone chain.
#[derive(Debug, Clone, PartialEq)]
pub struct MipChain {
    /// Delta offset of the G-buffer the top level is built from.
    pub base_delta_offset: Vec4,
    /// For each level past the top, the delta offset of the level it is built from.
    /// Level `i + 1` is built from level `i` with `level_delta_offsets[i]`.
    pub level_delta_offsets: ArrayVec<Vec4, { MAX_IL_MIPMAP_LEVELS as usize }>,
}

impl MipChain {
    /// Builds levels until `MAX_IL_MIPMAP_LEVELS` is reached or the previous level is
    /// a single texel wide or high.
    pub fn new(g_buffer_size: UVec2, chain_size: UVec2) -> Self {
        let mut level_delta_offsets = ArrayVec::new();
        for i in 1..MAX_IL_MIPMAP_LEVELS {
            let prev = level_size(chain_size, i - 1);
            if prev.x == 1 || prev.y == 1 {
                break;
            }
            level_delta_offsets.push(delta_offset(prev));
        }

        Self {
            base_delta_offset: delta_offset(g_buffer_size),
            level_delta_offsets,
        }
    }

    pub fn num_levels(&self) -> u32 {
        self.level_delta_offsets.len() as u32 + 1
    }
}

/// Placement of every level in the indirect lighting atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsampleLayout {
    /// `(x, y, width, height)` of each level in normalized device coordinates.
    pub loc_size: [Vec4; MAX_IL_MIPMAP_LEVELS as usize],
    /// `(min u, min v, max u, max v)` of each level in texture coordinates.
    pub tc_min_max: [Vec4; MAX_IL_MIPMAP_LEVELS as usize],
}

impl UpsampleLayout {
    pub fn new() -> Self {
        let mut loc_size = [Vec4::new(-1.0, -1.0, 1.0, 2.0); MAX_IL_MIPMAP_LEVELS as usize];
        for i in 1..loc_size.len() {
            let prev = loc_size[i - 1];
            loc_size[i] = Vec4::new(prev.x + prev.z, prev.y, prev.z / 2.0, prev.w / 2.0);
        }

        let mut tc_min_max = [Vec4::new(0.0, 0.0, 0.5, 1.0); MAX_IL_MIPMAP_LEVELS as usize];
        for i in 1..tc_min_max.len() {
            let x = tc_min_max[i - 1].z;
            let y = tc_min_max[i - 1].y;
            tc_min_max[i] = Vec4::new(x, y, x + loc_size[i].z / 2.0, 1.0 - x);
        }

        Self { loc_size, tc_min_max }
    }

    /// Steps that upsample level `i + 1` into level `i`, coarsest first, for every
    /// level of a chain with `num_levels` levels.
    pub fn steps(&self, num_levels: u32, size: UVec2) -> impl Iterator<Item = UpsampleStep> + '_ {
        let delta = delta_offset(size);
        let finest_coarse = num_levels.min(MAX_IL_MIPMAP_LEVELS).saturating_sub(1);
        (0..finest_coarse).rev().map(move |i| {
            let i = i as usize;
            UpsampleStep {
                dst_level: i as u32,
                delta_offset: delta,
                dst_loc_size: self.loc_size[i],
                src_loc_size: self.loc_size[i + 1],
                dst_tc_min_max: self.tc_min_max[i],
                src_tc_min_max: self.tc_min_max[i + 1],
            }
        })
    }
}

impl Default for UpsampleLayout {
    fn default() -> Self {
        Self::new()
    }
}

/// One upsampling of level `dst_level + 1` into `dst_level`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UpsampleStep {
    pub dst_level: u32,
    pub delta_offset: Vec4,
    pub dst_loc_size: Vec4,
    pub src_loc_size: Vec4,
    pub dst_tc_min_max: Vec4,
    pub src_tc_min_max: Vec4,
}

#[cfg(test)]
mod tests {
    use glam::{UVec2, Vec4};

    use super::*;

    #[test]
    fn chain_stops_at_max_levels() {
        let chain = MipChain::new(UVec2::new(1280, 720), UVec2::new(640, 360));
        assert_eq!(chain.num_levels(), MAX_IL_MIPMAP_LEVELS);
        assert_eq!(chain.level_delta_offsets[0], delta_offset(UVec2::new(640, 360)));
        assert_eq!(chain.level_delta_offsets[1], delta_offset(UVec2::new(320, 180)));
    }

    #[test]
    fn chain_stops_at_single_texel() {
        assert_eq!(MipChain::new(UVec2::new(4, 2), UVec2::new(2, 1)).num_levels(), 1);
        assert_eq!(MipChain::new(UVec2::new(8, 4), UVec2::new(4, 2)).num_levels(), 2);
    }

    #[test]
    fn layout() {
        let layout = UpsampleLayout::new();
        assert_eq!(layout.loc_size[0], Vec4::new(-1.0, -1.0, 1.0, 2.0));
        assert_eq!(layout.loc_size[1], Vec4::new(0.0, -1.0, 0.5, 1.0));
        assert_eq!(layout.loc_size[2], Vec4::new(0.5, -1.0, 0.25, 0.5));
        assert_eq!(layout.tc_min_max[0], Vec4::new(0.0, 0.0, 0.5, 1.0));
        assert_eq!(layout.tc_min_max[1], Vec4::new(0.5, 0.0, 0.75, 0.5));
        assert_eq!(layout.tc_min_max[2], Vec4::new(0.75, 0.0, 0.875, 0.25));
    }

    #[test]
    fn steps_run_coarsest_first_without_gaps() {
        let layout = UpsampleLayout::new();
        let levels: Vec<u32> = layout.steps(3, UVec2::new(64, 64)).map(|s| s.dst_level).collect();
        assert_eq!(levels, [1, 0]);

        let first = layout.steps(3, UVec2::new(64, 64)).next().unwrap();
        assert_eq!(first.src_loc_size, layout.loc_size[2]);
        assert_eq!(first.dst_tc_min_max, layout.tc_min_max[1]);

        assert_eq!(layout.steps(1, UVec2::new(64, 64)).count(), 0);
    }
}
