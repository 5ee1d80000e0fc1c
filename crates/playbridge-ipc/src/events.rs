//! Events sent from the core to the platform layer.

use serde::{Deserialize, Serialize};

use crate::types::{EngineHandle, VideoRect};

/// Outbound notifications for the platform layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlatformEvent {
    /// Texture geometry or identity changed.
    ///
    /// The first non-degenerate rect for a handle marks "first frame
    /// rendered".
    Resize {
        handle: EngineHandle,

        /// New geometry.
        rect: VideoRect,

        /// Platform-assigned texture identifier, possibly new.
        texture_id: i64,
    },
}
