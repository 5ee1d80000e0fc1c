//! Error types for the platform channel.

use thiserror::Error;

use playbridge_texture::TextureError;

/// Errors surfaced to the platform layer.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A texture output could not be created or resized.
    #[error(transparent)]
    Texture(#[from] TextureError),
}

/// Result type for platform channel operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
