use bitflags::bitflags;
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of a light source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightType {
    Ambient = 0,
    Directional = 1,
    Point = 2,
    Spot = 3,
}

impl LightType {
    /// If lights of this type are drawn through a bounded light volume.
    pub fn has_volume(self) -> bool {
        matches!(self, Self::Point | Self::Spot)
    }
}

impl TryFrom<u32> for LightType {
    type Error = LightSourceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Ambient,
            1 => Self::Directional,
            2 => Self::Point,
            3 => Self::Spot,
            _ => return Err(LightSourceError::UnsupportedLightType(value)),
        })
    }
}

bitflags! {
    /// Per-light behavior flags.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct LightAttrib: u32 {
        /// The light casts no shadows, so no shadow map pass is scheduled for it.
        const NO_SHADOW = 1 << 0;
        const NO_DIFFUSE = 1 << 1;
        const NO_SPECULAR = 1 << 2;
        /// The light contributes one-bounce indirect lighting through a reflective shadow map.
        const INDIRECT_LIGHTING = 1 << 3;
    }
}

/// Error returned when registering or modifying a light source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LightSourceError {
    #[error("Light type {0} is not one of ambient (0), directional (1), point (2) or spot (3)")]
    UnsupportedLightType(u32),
    #[error("Light attribute bits {0:#x} contain unknown flags")]
    UnsupportedAttrib(u32),
    #[error("Change for a {found:?} light applied to a {expected:?} light")]
    KindMismatch { expected: LightType, found: LightType },
}

crate::changeable_struct! {
    /// Uniform light applied to every lit pixel. Only one exists per layer.
    pub struct AmbientLight <- AmbientLightChange {
        pub color: Vec3,
    }
}

crate::changeable_struct! {
    /// Infinitely distant light shining along a single direction.
    pub struct DirectionalLight <- DirectionalLightChange {
        pub attrib: LightAttrib,
        pub color: Vec3,
        /// Constant, linear and quadratic attenuation terms.
        pub falloff: Vec3,
        /// Direction the light travels in. Normalized on registration.
        pub direction: Vec3,
    }
}

crate::changeable_struct! {
    /// Omnidirectional light. Shadowed through six cube faces.
    pub struct PointLight <- PointLightChange {
        pub attrib: LightAttrib,
        pub color: Vec3,
        pub falloff: Vec3,
        pub position: Vec3,
    }
}

crate::changeable_struct! {
    /// Cone shaped light.
    pub struct SpotLight <- SpotLightChange {
        pub attrib: LightAttrib,
        pub color: Vec3,
        pub falloff: Vec3,
        pub position: Vec3,
        pub direction: Vec3,
        /// Half angle of the outer cone, in radians.
        pub outer_angle: f32,
        /// Half angle of the fully lit inner cone, in radians.
        pub inner_angle: f32,
    }
}

impl SpotLight {
    /// `(cos outer, cos inner, 1 / (cos inner - cos outer), tan outer)`, the falloff
    /// terms of the cone as the lighting shaders consume them.
    pub fn cos_outer_inner(&self) -> Vec4 {
        let cos_outer = self.outer_angle.cos();
        let cos_inner = self.inner_angle.cos();
        let range = cos_inner - cos_outer;
        let inv_range = if range.abs() > f32::EPSILON { 1.0 / range } else { 0.0 };
        Vec4::new(cos_outer, cos_inner, inv_range, self.outer_angle.tan())
    }
}

/// A light source together with the data of its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl LightKind {
    pub fn light_type(&self) -> LightType {
        match self {
            Self::Ambient(_) => LightType::Ambient,
            Self::Directional(_) => LightType::Directional,
            Self::Point(_) => LightType::Point,
            Self::Spot(_) => LightType::Spot,
        }
    }

    /// Ambient lights never cast shadows regardless of what they were built with.
    pub fn attrib(&self) -> LightAttrib {
        match self {
            Self::Ambient(_) => LightAttrib::NO_SHADOW,
            Self::Directional(l) => l.attrib,
            Self::Point(l) => l.attrib,
            Self::Spot(l) => l.attrib,
        }
    }

    pub fn color(&self) -> Vec3 {
        match self {
            Self::Ambient(l) => l.color,
            Self::Directional(l) => l.color,
            Self::Point(l) => l.color,
            Self::Spot(l) => l.color,
        }
    }

    pub fn falloff(&self) -> Vec3 {
        match self {
            Self::Ambient(_) => Vec3::X,
            Self::Directional(l) => l.falloff,
            Self::Point(l) => l.falloff,
            Self::Spot(l) => l.falloff,
        }
    }

    pub fn casts_shadow(&self) -> bool {
        !self.attrib().contains(LightAttrib::NO_SHADOW)
    }

    pub fn has_indirect_lighting(&self) -> bool {
        self.attrib().contains(LightAttrib::INDIRECT_LIGHTING)
    }

    /// Applies a change of the same kind. A change for another kind of light is rejected
    /// and leaves the light untouched.
    pub fn apply_change(&mut self, change: LightChange) -> Result<(), LightSourceError> {
        match (self, change) {
            (Self::Ambient(l), LightChange::Ambient(c)) => l.update_from_changes(c),
            (Self::Directional(l), LightChange::Directional(c)) => {
                l.update_from_changes(c);
                l.direction = l.direction.normalize_or_zero();
            }
            (Self::Point(l), LightChange::Point(c)) => l.update_from_changes(c),
            (Self::Spot(l), LightChange::Spot(c)) => {
                l.update_from_changes(c);
                l.direction = l.direction.normalize_or_zero();
            }
            (this, change) => {
                return Err(LightSourceError::KindMismatch {
                    expected: this.light_type(),
                    found: change.light_type(),
                })
            }
        }
        Ok(())
    }
}

/// A modification to one light, tagged with the kind of light it applies to.
#[derive(Debug, Clone)]
pub enum LightChange {
    Ambient(AmbientLightChange),
    Directional(DirectionalLightChange),
    Point(PointLightChange),
    Spot(SpotLightChange),
}

impl LightChange {
    pub fn light_type(&self) -> LightType {
        match self {
            Self::Ambient(_) => LightType::Ambient,
            Self::Directional(_) => LightType::Directional,
            Self::Point(_) => LightType::Point,
            Self::Spot(_) => LightType::Spot,
        }
    }
}

/// A registered light source.
#[derive(Debug, Clone, PartialEq)]
pub struct LightSource {
    pub kind: LightKind,
    /// Disabled lights stay registered but get no passes.
    pub enabled: bool,
}

impl LightSource {
    pub fn new(kind: LightKind) -> Self {
        Self { kind, enabled: true }
    }
}

fn default_falloff() -> Vec3 {
    Vec3::new(1.0, 0.0, 0.0)
}

fn default_direction() -> Vec3 {
    Vec3::Z
}

/// Untyped description of a light, used when lights come from data files.
///
/// Angles are in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightDesc {
    pub light_type: u32,
    #[serde(default)]
    pub attrib: u32,
    pub color: Vec3,
    #[serde(default = "default_falloff")]
    pub falloff: Vec3,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "default_direction")]
    pub direction: Vec3,
    #[serde(default)]
    pub outer_angle: f32,
    #[serde(default)]
    pub inner_angle: f32,
}

impl LightDesc {
    /// Validates the raw type and attribute bits and builds the typed light.
    pub fn into_light(self) -> Result<LightKind, LightSourceError> {
        let light_type = LightType::try_from(self.light_type)?;
        let attrib = LightAttrib::from_bits(self.attrib).ok_or(LightSourceError::UnsupportedAttrib(self.attrib))?;

        Ok(match light_type {
            LightType::Ambient => LightKind::Ambient(AmbientLight { color: self.color }),
            LightType::Directional => LightKind::Directional(DirectionalLight {
                attrib,
                color: self.color,
                falloff: self.falloff,
                direction: self.direction.normalize_or_zero(),
            }),
            LightType::Point => LightKind::Point(PointLight {
                attrib,
                color: self.color,
                falloff: self.falloff,
                position: self.position,
            }),
            LightType::Spot => LightKind::Spot(SpotLight {
                attrib,
                color: self.color,
                falloff: self.falloff,
                position: self.position,
                direction: self.direction.normalize_or_zero(),
                outer_angle: self.outer_angle,
                inner_angle: self.inner_angle,
            }),
        })
    }
}
