//! Packed pass identifiers.
//!
//! Every pass of a frame is named by a 32-bit code:
//!
//! ```text
//!  31    28 27            16 15                             0
//! +--------+----------------+--------------------------------+
//! |  type  |  light index   |          index in pass          |
//! +--------+----------------+--------------------------------+
//! ```
//!
//! The light index names a light in the frame's light snapshot. The index in pass
//! is the pass-local sub index: the cube face of a point light shadow pass, or
//! the step of a two step pass such as the G-buffer.

use std::fmt;

/// Largest light index that fits in a pass code.
pub const MAX_LIGHT_INDEX: u32 = 0xFFF;
/// Largest pass-local index that fits in a pass code.
pub const MAX_INDEX_IN_PASS: u32 = 0xFFFF;

/// The kind of work a pass performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum PassType {
    GBuffer = 0,
    MrtGBuffer = 1,
    GenShadowMap = 2,
    GenReflectiveShadowMap = 3,
    Lighting = 4,
    IndirectLighting = 5,
    Shading = 6,
    SpecialShading = 7,
}

impl PassType {
    const ALL: [Self; 8] = [
        Self::GBuffer,
        Self::MrtGBuffer,
        Self::GenShadowMap,
        Self::GenReflectiveShadowMap,
        Self::Lighting,
        Self::IndirectLighting,
        Self::Shading,
        Self::SpecialShading,
    ];

    /// Converts the 4-bit type field back to the pass type.
    pub fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    pub fn is_g_buffer(self) -> bool {
        matches!(self, Self::GBuffer | Self::MrtGBuffer)
    }

    pub fn is_shading(self) -> bool {
        matches!(self, Self::Shading | Self::SpecialShading)
    }
}

/// A typed, packed pass identifier.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PassCode(u32);

impl PassCode {
    /// Packs a pass code.
    ///
    /// `light_index` must be at most [`MAX_LIGHT_INDEX`] and `index_in_pass` at most
    /// [`MAX_INDEX_IN_PASS`]. Out of range values are masked.
    pub fn encode(pass_type: PassType, light_index: u32, index_in_pass: u32) -> Self {
        debug_assert!(light_index <= MAX_LIGHT_INDEX, "light index {light_index} out of range");
        debug_assert!(index_in_pass <= MAX_INDEX_IN_PASS, "index in pass {index_in_pass} out of range");

        Self(((pass_type as u32) << 28) | ((light_index & MAX_LIGHT_INDEX) << 16) | (index_in_pass & MAX_INDEX_IN_PASS))
    }

    /// Reinterprets a raw code. Fails if the type field names no pass type.
    pub fn from_raw(raw: u32) -> Option<Self> {
        PassType::from_bits(raw >> 28).map(|_| Self(raw))
    }

    /// Unpacks into `(pass_type, light_index, index_in_pass)`.
    pub fn decode(self) -> (PassType, u32, u32) {
        (self.pass_type(), self.light_index(), self.index_in_pass())
    }

    pub fn pass_type(self) -> PassType {
        // Codes are only built by `encode` or validated by `from_raw`.
        PassType::from_bits(self.0 >> 28).unwrap_or(PassType::GBuffer)
    }

    pub fn light_index(self) -> u32 {
        (self.0 >> 16) & MAX_LIGHT_INDEX
    }

    pub fn index_in_pass(self) -> u32 {
        self.0 & MAX_INDEX_IN_PASS
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for PassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ty, light, index) = self.decode();
        write!(f, "{ty:?}@{light},{index}")
    }
}
