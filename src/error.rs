//! Error types shared by the loaders, capture and audio devices and the renderer.
//!
//! None of these are fatal once a scene is running: the lifecycle logs them
//! and keeps drawing whatever part of the scene did come up.

use thiserror::Error;

/// Failure of a single asset load.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("could not read asset {source_name}: {inner}")]
    Io {
        source_name: String,
        #[source]
        inner: std::io::Error,
    },

    #[error("could not fetch asset {source_name}: {message}")]
    Fetch { source_name: String, message: String },

    #[error("could not decode asset {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    #[error("unsupported asset {source_name}: {reason}")]
    Unsupported { source_name: String, reason: String },

    /// The loader went away before the asset resolved.
    #[error("asset load for {0} was cancelled")]
    Cancelled(String),
}

impl AssetError {
    pub fn decode(source_name: &str, reason: impl ToString) -> Self {
        Self::Decode {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unsupported(source_name: &str, reason: impl ToString) -> Self {
        Self::Unsupported {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to open or drive a capture or audio output device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no device available: {0}")]
    Unavailable(String),

    #[error("access to the device was denied")]
    PermissionDenied,

    #[error("device stream failed: {0}")]
    Stream(String),
}

/// Failure while drawing a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),

    #[error("the renderer was used before it was initialized")]
    Uninitialized,
}

impl RenderError {
    /// Whether the surface has to be configured again before the next frame.
    pub fn needs_reconfigure(&self) -> bool {
        matches!(
            self,
            RenderError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)
        )
    }
}

pub type AssetResult<T> = Result<T, AssetError>;
