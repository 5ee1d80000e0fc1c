//! Observable playback state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Playlist;

/// The authoritative playback state for one engine instance.
///
/// Mutated only by the event translator (from native notifications) or by
/// optimistic command echo before native confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Whether playback is currently running.
    ///
    /// Suppressed until playback has been explicitly started at least once,
    /// so property writes during setup never flip it.
    pub playing: bool,

    /// Whether the current media reached end of stream.
    pub completed: bool,

    /// Current position.
    pub position: Duration,

    /// Total duration of the current media.
    pub duration: Duration,

    /// Volume, 0.0 – 100.0.
    pub volume: f64,

    /// Playback rate multiplier.
    pub rate: f64,

    /// Pitch multiplier.
    pub pitch: f64,

    /// Whether the engine stalled waiting for the cache.
    pub buffering: bool,

    /// Whether the current media supports seeking.
    pub seekable: bool,

    /// Current playlist and active index.
    pub playlist: Playlist,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            completed: false,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            volume: 100.0,
            rate: 1.0,
            pitch: 1.0,
            buffering: false,
            seekable: false,
            playlist: Playlist::default(),
        }
    }
}
