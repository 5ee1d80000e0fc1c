//! Error types for the PiP bridge.

use thiserror::Error;

/// Errors that can occur talking to the system PiP compositor.
#[derive(Debug, Error)]
pub enum PipError {
    /// The compositing layer could not be attached.
    #[error("failed to attach PiP layer: {0}")]
    LayerAttach(String),

    /// A sample was rejected by the system buffer queue.
    #[error("failed to enqueue sample: {0}")]
    Enqueue(String),

    /// The system declined to start PiP.
    #[error("failed to start PiP: {0}")]
    Start(String),
}

/// Result type for PiP operations.
pub type PipResult<T> = Result<T, PipError>;
