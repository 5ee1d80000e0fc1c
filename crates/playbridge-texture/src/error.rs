//! Error types for the texture output pipeline.

use thiserror::Error;

use playbridge_engine::NativeError;

/// Errors that can occur in the texture output pipeline.
#[derive(Debug, Error)]
pub enum TextureError {
    /// Surface registration with the compositor did not complete.
    #[error("surface registration failed: {0}")]
    Registration(String),

    /// The compositor rejected a resize.
    #[error("surface resize failed: {0}")]
    Resize(String),

    /// The requested dimensions do not fit a pixel buffer.
    #[error("surface dimensions overflow: {width}x{height}")]
    DimensionsOverflow { width: u32, height: u32 },

    /// The native engine rejected a render call.
    #[error(transparent)]
    Native(#[from] NativeError),

    /// The render worker is gone.
    #[error("render worker unavailable")]
    WorkerGone,

    /// A texture output already exists for this handle.
    #[error("texture output already exists for {0}")]
    AlreadyExists(playbridge_ipc::EngineHandle),
}

/// Result type for texture operations.
pub type TextureResult<T> = Result<T, TextureError>;
