//! Layer configuration.
//!
//! Settings can be changed at any time. A frame reads them once, at pass 0, so
//! changes made while a frame is in flight apply from the next frame.

use serde::{Deserialize, Serialize};

use crate::{cascade::CascadedShadowType, format_sso, DeferredError};

/// Which lighting terms reach the shading buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayIllum {
    #[default]
    All,
    DirectOnly,
    IndirectOnly,
}

impl TryFrom<i32> for DisplayIllum {
    type Error = DeferredError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::All,
            1 => Self::DirectOnly,
            2 => Self::IndirectOnly,
            _ => {
                return Err(DeferredError::InvalidSetting(format_sso!(
                    "illumination mode {value} is not one of all (0), direct only (1) or indirect only (2)"
                )))
            }
        })
    }
}

/// What the shading pass finally shows. Everything but `Final` is a debug view of
/// one G-buffer channel and is not post processed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayType {
    #[default]
    Final,
    Position,
    Normal,
    Depth,
    Diffuse,
    Specular,
    Shininess,
    Occlusion,
    Edge,
    Ssvo,
}

/// How the layer decides whether a light volume is visible.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisibilityPolicy {
    /// Light volumes are depth tested in occlusion queries and the light's draws are
    /// predicated on them.
    #[default]
    OcclusionQuery,
    /// Every light is drawn. For backends without conditional rendering.
    AlwaysVisible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredSettings {
    /// The scene writes albedo and normals in a single multiple render target pass,
    /// and the layer draws the shading itself.
    pub mrt_g_buffer: bool,
    pub ssvo_enabled: bool,
    pub cascaded_shadow_type: CascadedShadowType,
    /// Multiplier of the indirect lighting added to the lighting buffer.
    pub indirect_scale: f32,
    pub display_illum: DisplayIllum,
    pub display: DisplayType,
    pub temporal_aa: bool,
    pub visibility: VisibilityPolicy,
}

impl Default for DeferredSettings {
    fn default() -> Self {
        Self {
            mrt_g_buffer: false,
            ssvo_enabled: true,
            cascaded_shadow_type: CascadedShadowType::Pssm,
            indirect_scale: 1.0,
            display_illum: DisplayIllum::All,
            display: DisplayType::Final,
            temporal_aa: false,
            visibility: VisibilityPolicy::OcclusionQuery,
        }
    }
}

impl DeferredSettings {
    /// Parses settings from json. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DeferredError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illum_modes() {
        assert_eq!(DisplayIllum::try_from(2).unwrap(), DisplayIllum::IndirectOnly);
        assert!(matches!(DisplayIllum::try_from(3), Err(DeferredError::InvalidSetting(_))));
    }

    #[test]
    fn json_fills_defaults() {
        let settings = DeferredSettings::from_json_str(r#"{ "mrt_g_buffer": true, "display_illum": "DirectOnly" }"#).unwrap();
        assert!(settings.mrt_g_buffer);
        assert_eq!(settings.display_illum, DisplayIllum::DirectOnly);
        assert_eq!(settings.indirect_scale, 1.0);
        assert_eq!(settings.visibility, VisibilityPolicy::OcclusionQuery);

        assert!(matches!(
            DeferredSettings::from_json_str(r#"{ "display": "Sparkles" }"#),
            Err(DeferredError::SettingsParse(_))
        ));
    }
}
