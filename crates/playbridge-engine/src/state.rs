//! Authoritative playback state and per-field broadcast channels.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use playbridge_ipc::{PlaybackState, Playlist};

use crate::error::NativeError;
use crate::STATE_CHANNEL_CAPACITY;

/// Holds the current value of every observable field and publishes changes.
///
/// One broadcast channel per field plus one for the aggregate playlist and
/// one for native errors. Publishing with no subscribers is a silent no-op.
/// Snapshot reads are synchronous so point-in-time consumers (PiP timing
/// queries) never wait on a stream.
pub struct StateStore {
    current: Mutex<PlaybackState>,
    playing: broadcast::Sender<bool>,
    completed: broadcast::Sender<bool>,
    position: broadcast::Sender<Duration>,
    duration: broadcast::Sender<Duration>,
    volume: broadcast::Sender<f64>,
    rate: broadcast::Sender<f64>,
    pitch: broadcast::Sender<f64>,
    buffering: broadcast::Sender<bool>,
    seekable: broadcast::Sender<bool>,
    playlist: broadcast::Sender<Playlist>,
    errors: broadcast::Sender<NativeError>,
}

impl StateStore {
    /// Create a store with default playback state.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(PlaybackState::default()),
            playing: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            completed: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            position: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            duration: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            volume: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            rate: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            pitch: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            buffering: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            seekable: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            playlist: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
            errors: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
        }
    }

    /// Point-in-time copy of the full state.
    pub fn snapshot(&self) -> PlaybackState {
        self.current.lock().clone()
    }

    pub fn subscribe_playing(&self) -> broadcast::Receiver<bool> {
        self.playing.subscribe()
    }

    pub fn subscribe_completed(&self) -> broadcast::Receiver<bool> {
        self.completed.subscribe()
    }

    pub fn subscribe_position(&self) -> broadcast::Receiver<Duration> {
        self.position.subscribe()
    }

    pub fn subscribe_duration(&self) -> broadcast::Receiver<Duration> {
        self.duration.subscribe()
    }

    pub fn subscribe_volume(&self) -> broadcast::Receiver<f64> {
        self.volume.subscribe()
    }

    pub fn subscribe_rate(&self) -> broadcast::Receiver<f64> {
        self.rate.subscribe()
    }

    pub fn subscribe_pitch(&self) -> broadcast::Receiver<f64> {
        self.pitch.subscribe()
    }

    pub fn subscribe_buffering(&self) -> broadcast::Receiver<bool> {
        self.buffering.subscribe()
    }

    pub fn subscribe_seekable(&self) -> broadcast::Receiver<bool> {
        self.seekable.subscribe()
    }

    pub fn subscribe_playlist(&self) -> broadcast::Receiver<Playlist> {
        self.playlist.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<NativeError> {
        self.errors.subscribe()
    }

    pub fn set_playing(&self, value: bool) {
        self.current.lock().playing = value;
        let _ = self.playing.send(value);
    }

    pub fn set_completed(&self, value: bool) {
        self.current.lock().completed = value;
        let _ = self.completed.send(value);
    }

    pub fn set_position(&self, value: Duration) {
        self.current.lock().position = value;
        let _ = self.position.send(value);
    }

    pub fn set_duration(&self, value: Duration) {
        self.current.lock().duration = value;
        let _ = self.duration.send(value);
    }

    pub fn set_volume(&self, value: f64) {
        self.current.lock().volume = value;
        let _ = self.volume.send(value);
    }

    pub fn set_rate(&self, value: f64) {
        self.current.lock().rate = value;
        let _ = self.rate.send(value);
    }

    pub fn set_pitch(&self, value: f64) {
        self.current.lock().pitch = value;
        let _ = self.pitch.send(value);
    }

    pub fn set_buffering(&self, value: bool) {
        self.current.lock().buffering = value;
        let _ = self.buffering.send(value);
    }

    pub fn set_seekable(&self, value: bool) {
        self.current.lock().seekable = value;
        let _ = self.seekable.send(value);
    }

    /// Replace the whole playlist and publish the aggregate.
    pub fn set_playlist(&self, value: Playlist) {
        self.current.lock().playlist = value.clone();
        let _ = self.playlist.send(value);
    }

    /// Update only the active playlist index and publish the aggregate.
    pub fn set_playlist_index(&self, index: usize) {
        let playlist = {
            let mut state = self.current.lock();
            state.playlist.index = index;
            state.playlist.clone()
        };
        let _ = self.playlist.send(playlist);
    }

    /// Publish a native error. Never fatal; subscribers may be absent.
    pub fn publish_error(&self, error: NativeError) {
        trace!(code = error.code, message = %error.message, "publishing native error");
        let _ = self.errors.send(error);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_last_write() {
        let store = StateStore::new();
        store.set_volume(40.0);
        store.set_volume(70.0);
        assert_eq!(store.snapshot().volume, 70.0);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let store = StateStore::new();
        store.set_playing(true);
        store.publish_error(NativeError::new(-5, "whatever"));
        assert!(store.snapshot().playing);
    }

    #[tokio::test]
    async fn test_field_channel_delivers_in_order() {
        let store = StateStore::new();
        let mut rx = store.subscribe_position();
        store.set_position(Duration::from_secs(1));
        store.set_position(Duration::from_secs(2));
        assert_eq!(rx.recv().await.unwrap(), Duration::from_secs(1));
        assert_eq!(rx.recv().await.unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_playlist_index_publishes_aggregate() {
        let store = StateStore::new();
        let mut rx = store.subscribe_playlist();
        store.set_playlist_index(3);
        assert_eq!(rx.try_recv().unwrap().index, 3);
    }
}
