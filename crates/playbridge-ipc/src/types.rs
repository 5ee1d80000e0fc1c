//! Core value types shared across the bridge.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque identifier for one native engine instance.
///
/// Owned by the player facade; every other component holds it as a copyable
/// lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineHandle(pub u64);

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// A single playable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Source URI (or bare file path, normalized by the player).
    pub uri: String,

    /// Loose per-item metadata (HTTP headers, start position, ...).
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl Media {
    /// Create a media item from a URI with no extras.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            extras: HashMap::new(),
        }
    }
}

/// An ordered set of media items plus the active index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    /// Items in playback order.
    pub medias: Vec<Media>,

    /// Index of the active item.
    pub index: usize,
}

impl Playlist {
    /// Create a playlist starting at the given index.
    pub fn new(medias: Vec<Media>, index: usize) -> Self {
        Self { medias, index }
    }
}

/// Wire format of an observed native engine property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyFormat {
    /// Boolean flag.
    Flag,

    /// 64-bit signed integer.
    Int64,

    /// Double-precision float.
    Double,

    /// UTF-8 string.
    Text,
}

/// A typed native engine property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Flag(bool),
    Int64(i64),
    Double(f64),
    Text(String),
}

impl PropertyValue {
    /// The wire format this value carries.
    pub fn format(&self) -> PropertyFormat {
        match self {
            Self::Flag(_) => PropertyFormat::Flag,
            Self::Int64(_) => PropertyFormat::Int64,
            Self::Double(_) => PropertyFormat::Double,
            Self::Text(_) => PropertyFormat::Text,
        }
    }
}

/// A property-change notification from the native engine.
///
/// The `format` field records the format the observer registered; events whose
/// value does not match it are dropped by the translator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEvent {
    /// Native property name (e.g. `time-pos`).
    pub name: String,

    /// Format registered when observation was requested.
    pub format: PropertyFormat,

    /// Reported value.
    pub value: PropertyValue,
}

/// Why the native engine ended the current media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Playback reached the end of the stream.
    EndOfStream,

    /// Playback was stopped by an explicit command.
    Stop,

    /// The engine is quitting.
    Quit,

    /// Playback aborted due to an error.
    Error,
}

/// A notification emitted by the native engine's event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NativeNotification {
    /// A new media started playing.
    StartOfMedia,

    /// The current media ended.
    EndOfMedia {
        /// Why playback ended.
        reason: EndReason,

        /// Negative native error code, when the reason carries one.
        error_code: Option<i32>,
    },

    /// An observed property changed.
    Property(PropertyEvent),

    /// The engine instance is shutting down; the translator exits.
    Shutdown,
}

/// Geometry reported to the platform layer alongside a texture identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl VideoRect {
    /// Create a rect anchored at the origin.
    pub fn with_size(width: f64, height: f64) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    /// Zero-area rects carry no renderable content.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Pixel layout of a rendered frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit BGRA, the compositor-native layout.
    Bgra8,

    /// 8-bit RGBA.
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel for this format.
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

/// One rendered video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Pixel data, `stride * height` bytes.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Row stride in bytes.
    pub stride: u32,

    /// Pixel layout.
    pub format: PixelFormat,
}
