//! Interface boundary to the native playback engine.

use playbridge_ipc::{PropertyFormat, PropertyValue};

use crate::error::NativeResult;

/// The properties observed at initialization, with their wire formats.
pub const OBSERVED_PROPERTIES: &[(&str, PropertyFormat)] = &[
    ("pause", PropertyFormat::Flag),
    ("time-pos", PropertyFormat::Double),
    ("duration", PropertyFormat::Double),
    ("playlist-pos-1", PropertyFormat::Int64),
    ("seekable", PropertyFormat::Flag),
    ("volume", PropertyFormat::Double),
    ("speed", PropertyFormat::Double),
    ("paused-for-cache", PropertyFormat::Flag),
];

/// A native render target handle for hardware-accelerated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// One native playback engine instance.
///
/// The decoding/demuxing engine itself is an external collaborator; this
/// trait is its full interface as seen by the bridge. Implementations must be
/// callable from any thread; notification delivery happens separately through
/// the bounded notification channel.
pub trait NativeEngine: Send + Sync {
    /// Issue a command as space-joined string tokens.
    fn command(&self, args: &[&str]) -> NativeResult<()>;

    /// Write a typed property.
    fn set_property(&self, name: &str, value: PropertyValue) -> NativeResult<()>;

    /// Read a property synchronously.
    fn get_property(&self, name: &str, format: PropertyFormat) -> NativeResult<PropertyValue>;

    /// Request change notifications for a property in the given format.
    fn observe_property(&self, name: &str, format: PropertyFormat) -> NativeResult<()>;

    /// Current video plane dimensions, `(0, 0)` before the first reconfig.
    fn video_dimensions(&self) -> (u32, u32);

    /// Render the current frame into a caller-owned pixel buffer.
    fn render_software(
        &self,
        width: u32,
        height: u32,
        stride: u32,
        pixels: &mut [u8],
    ) -> NativeResult<()>;

    /// Render the current frame into a platform GPU surface.
    fn render_hardware(&self, surface: SurfaceHandle, width: u32, height: u32) -> NativeResult<()>;
}
