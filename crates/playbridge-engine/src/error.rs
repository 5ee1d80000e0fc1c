//! Error types for the engine bridge.

use thiserror::Error;

/// A negative result code reported by the native engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("native engine error {code}: {message}")]
pub struct NativeError {
    /// Native result code, negative.
    pub code: i32,

    /// Human-readable description.
    pub message: String,
}

impl NativeError {
    /// Create a native error from a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can occur in the engine bridge.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The native engine rejected a call.
    #[error(transparent)]
    Native(#[from] NativeError),

    /// The playlist property re-read did not parse.
    #[error("malformed playlist property: {0}")]
    MalformedPlaylist(String),

    /// The player has been disposed.
    #[error("engine instance disposed")]
    Disposed,
}

/// Result type for engine bridge operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for raw native engine calls.
pub type NativeResult<T> = Result<T, NativeError>;
