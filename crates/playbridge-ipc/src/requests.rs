//! Requests arriving on the platform texture/compositor channel.

use serde::{Deserialize, Serialize};

use crate::types::EngineHandle;

/// Methods exposed to the platform layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlatformRequest {
    /// Create the texture output for a handle.
    Create {
        handle: EngineHandle,

        /// Fixed width, or `None` to track the native video plane.
        width: Option<u32>,

        /// Fixed height, or `None` to track the native video plane.
        height: Option<u32>,

        /// Whether hardware-accelerated rendering may be used.
        enable_hardware_acceleration: bool,
    },

    /// Update the target size of an existing texture output.
    SetSize {
        handle: EngineHandle,
        width: Option<u32>,
        height: Option<u32>,
    },

    /// Re-publish the playback state to the PiP compositor.
    RefreshPlaybackState { handle: EngineHandle },

    /// Query PiP capability.
    IsPictureInPictureAvailable,

    /// Enable the PiP session for a handle.
    EnablePictureInPicture { handle: EngineHandle },

    /// Disable the PiP session for a handle.
    DisablePictureInPicture { handle: EngineHandle },

    /// Allow PiP to auto-start on backgrounding.
    EnableAutoPictureInPicture { handle: EngineHandle },

    /// Forbid PiP auto-start on backgrounding.
    DisableAutoPictureInPicture { handle: EngineHandle },

    /// Enter PiP immediately.
    EnterPictureInPicture { handle: EngineHandle },

    /// Tear down the texture output and PiP session for a handle.
    Dispose { handle: EngineHandle },
}
