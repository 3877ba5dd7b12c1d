use deferred_types::{LightSourceError, TextureFormat};
use thiserror::Error;

use crate::util::typedefs::SsoString;

/// Failure reported by a [`RenderBackend`](crate::RenderBackend) call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("The device was lost")]
    DeviceLost,
    #[error("The device ran out of memory")]
    OutOfMemory,
    #[error("Backend error: {0}")]
    Internal(String),
}

/// Reason why a layer operation failed.
///
/// Errors returned from [`update`](crate::DeferredRenderingLayer::update) end the frame.
/// The next frame must start again at pass 0.
#[derive(Error, Debug)]
pub enum DeferredError {
    #[error("None of the formats {candidates:?} can be rendered to for render target {target}")]
    UnsupportedFormat {
        target: SsoString,
        candidates: Vec<TextureFormat>,
    },
    #[error("Invalid light")]
    InvalidLight(#[from] LightSourceError),
    #[error("No light is registered under handle index {0}")]
    UnknownLight(usize),
    #[error("The ambient light cannot be removed")]
    CannotRemoveAmbient,
    #[error("{count} lights are registered but pass codes can address at most {max}")]
    TooManyLights { count: usize, max: usize },
    #[error("Render targets have not been created, call on_resize before the first frame")]
    TargetsNotCreated,
    #[error("Pass {pass} was requested but no frame is in flight, frames start at pass 0")]
    FrameNotStarted { pass: u32 },
    #[error("Pass {pass} was requested but the frame only has {len} passes")]
    PassOutOfRange { pass: u32, len: usize },
    #[error("Invalid setting: {0}")]
    InvalidSetting(SsoString),
    #[error("Failed to parse settings")]
    SettingsParse(#[from] serde_json::Error),
    #[error("Render backend failed")]
    Backend(#[from] BackendError),
}
