//! Picture-in-picture bridge feeding rendered frames to the system
//! compositor.
//!
//! The system PiP surface is an external collaborator reached through the
//! [`PipCompositor`] trait; [`PipBridge`] owns the session, the cached video
//! format descriptor, and the backgrounding policy.

mod bridge;
mod error;

pub use bridge::{PipBridge, TimeRange};
pub use error::{PipError, PipResult};

use std::time::SystemTime;

use playbridge_ipc::{FrameBuffer, PixelFormat};

/// Describes the pixel layout of samples fed to the PiP compositor.
///
/// Cached per session and regenerated only when an incoming frame no longer
/// matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FormatDescriptor {
    /// Build a descriptor for a frame.
    pub fn for_frame(frame: &FrameBuffer) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: frame.format,
        }
    }

    /// Whether a frame still matches this descriptor.
    pub fn matches(&self, frame: &FrameBuffer) -> bool {
        self.width == frame.width && self.height == frame.height && self.format == frame.format
    }
}

/// One timed sample handed to the PiP compositor.
#[derive(Debug, Clone)]
pub struct TimedSample {
    /// Pixel data for this sample.
    pub frame: FrameBuffer,

    /// Format the sample was packed with.
    pub descriptor: FormatDescriptor,

    /// Wall-clock presentation timestamp.
    pub presentation: SystemTime,
}

/// System picture-in-picture boundary.
pub trait PipCompositor: Send + Sync {
    /// Whether the platform supports PiP at all.
    fn is_supported(&self) -> bool;

    /// Attach the invisible compositing layer backing the session.
    fn attach_layer(&self) -> PipResult<()>;

    /// Detach the compositing layer; late calls are no-ops.
    fn detach_layer(&self);

    /// Enqueue one timed sample.
    fn enqueue_sample(&self, sample: TimedSample) -> PipResult<()>;

    /// Ask the system to re-query playback state (pause/position).
    fn invalidate_playback_state(&self);

    /// Start the system PiP presentation immediately.
    fn start(&self) -> PipResult<()>;
}
