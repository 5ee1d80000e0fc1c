//! Shared value and message types for the playback bridge.
//!
//! This crate defines the types exchanged between the native engine bridge,
//! the texture output pipeline, and the platform channel surface, plus the
//! bounded channels that carry them.

mod events;
mod requests;
mod state;
mod types;

pub use events::PlatformEvent;
pub use requests::PlatformRequest;
pub use state::PlaybackState;
pub use types::{
    EndReason, EngineHandle, FrameBuffer, Media, NativeNotification, PixelFormat, Playlist,
    PropertyEvent, PropertyFormat, PropertyValue, VideoRect,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for native engine notifications (engine → translator).
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for platform events (core → platform layer).
pub const PLATFORM_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Creates a bounded notification channel.
pub fn notification_channel() -> (Sender<NativeNotification>, Receiver<NativeNotification>) {
    crossbeam_channel::bounded(NOTIFICATION_CHANNEL_CAPACITY)
}

/// Creates a bounded platform event channel.
pub fn platform_event_channel() -> (Sender<PlatformEvent>, Receiver<PlatformEvent>) {
    crossbeam_channel::bounded(PLATFORM_EVENT_CHANNEL_CAPACITY)
}
