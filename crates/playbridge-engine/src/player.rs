//! Player facade owning one native engine instance.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use playbridge_ipc::{
    notification_channel, EngineHandle, Media, NativeNotification, Playlist, PropertyFormat,
    PropertyValue,
};

use crate::dispatcher::CommandDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::native::NativeEngine;
use crate::state::StateStore;
use crate::translator::EventTranslator;

/// Exclusive owner of one engine handle.
///
/// Wires the notification channel, translator thread, state store and command
/// dispatcher together and exposes the playback operations. Playlist
/// operations echo their effect into the local state before native
/// confirmation; the next matching notification is canonical, so local and
/// native state may briefly disagree.
pub struct Player {
    handle: EngineHandle,
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<StateStore>,
    started: Arc<AtomicBool>,
    notification_tx: Sender<NativeNotification>,
    translator: Mutex<Option<EventTranslator>>,
    disposed: AtomicBool,
}

impl Player {
    /// Create a player around a native engine instance and start its
    /// translator thread. The dispatcher gate stays closed until
    /// [`initialize`](Self::initialize).
    pub fn new(handle: EngineHandle, engine: Arc<dyn NativeEngine>) -> Self {
        let store = Arc::new(StateStore::new());
        let started = Arc::new(AtomicBool::new(false));
        let (notification_tx, notification_rx) = notification_channel();
        let translator =
            EventTranslator::spawn(handle, notification_rx, store.clone(), started.clone());
        let dispatcher = CommandDispatcher::new(engine, store.clone());

        Self {
            handle,
            dispatcher,
            store,
            started,
            notification_tx,
            translator: Mutex::new(Some(translator)),
            disposed: AtomicBool::new(false),
        }
    }

    /// The handle this player owns.
    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    /// The state store for this instance.
    pub fn state(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// The command dispatcher for this instance.
    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// Sender for the native notification callback to push into.
    pub fn notification_sender(&self) -> Sender<NativeNotification> {
        self.notification_tx.clone()
    }

    /// Register the initial property observations and open the command gate.
    #[instrument(name = "player_initialize", skip(self), fields(handle = %self.handle))]
    pub fn initialize(&self) -> EngineResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(EngineError::Disposed);
        }
        self.dispatcher.initialize()
    }

    /// Replace the playlist and select the item at `playlist.index`.
    #[instrument(name = "player_open", skip(self, playlist), fields(handle = %self.handle, items = playlist.medias.len()))]
    pub async fn open(&self, playlist: Playlist, play: bool) {
        info!(index = playlist.index, play, "opening playlist");

        self.dispatcher.command(&["playlist-clear"]).await;
        for media in &playlist.medias {
            let uri = normalize_uri(&media.uri);
            self.dispatcher.command(&["loadfile", &uri, "append"]).await;
        }

        // An empty playlist selects no entry.
        let selector = if playlist.medias.is_empty() {
            "none".to_string()
        } else {
            playlist
                .index
                .min(playlist.medias.len() - 1)
                .to_string()
        };
        self.store.set_playlist(playlist);

        if play {
            self.started.store(true, Ordering::Release);
            self.dispatcher
                .set_property("pause", PropertyValue::Flag(false))
                .await;
        } else {
            self.dispatcher
                .set_property("pause", PropertyValue::Flag(true))
                .await;
        }
        self.dispatcher
            .command(&["playlist-play-index", &selector])
            .await;
    }

    /// Start or resume playback. Marks playback as explicitly started, which
    /// lifts the suppression on `playing`/playlist-index notifications.
    pub async fn play(&self) {
        self.started.store(true, Ordering::Release);

        let snapshot = self.store.snapshot();
        if snapshot.completed {
            // Replay from the current entry rather than un-pausing at EOF.
            self.dispatcher
                .command(&[
                    "playlist-play-index",
                    &snapshot.playlist.index.to_string(),
                ])
                .await;
            self.store.set_completed(false);
        }
        self.dispatcher
            .set_property("pause", PropertyValue::Flag(false))
            .await;
    }

    /// Pause playback.
    pub async fn pause(&self) {
        self.dispatcher
            .set_property("pause", PropertyValue::Flag(true))
            .await;
    }

    /// Toggle between play and pause based on the current snapshot.
    pub async fn play_or_pause(&self) {
        if self.store.snapshot().playing {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    /// Jump to a playlist entry, optionally starting playback.
    ///
    /// The index is echoed locally before the native engine confirms it.
    #[instrument(name = "player_jump", skip(self), fields(handle = %self.handle))]
    pub async fn jump(&self, index: usize, play: bool) {
        let len = self.store.snapshot().playlist.medias.len();
        if index >= len {
            warn!(index, len, "jump index out of bounds, ignoring");
            return;
        }

        self.store.set_playlist_index(index);
        if play {
            self.started.store(true, Ordering::Release);
            self.dispatcher
                .set_property("pause", PropertyValue::Flag(false))
                .await;
        }
        self.dispatcher
            .set_property("playlist-pos-1", PropertyValue::Int64(index as i64 + 1))
            .await;
    }

    /// Advance to the next playlist entry.
    pub async fn next(&self) {
        self.dispatcher.command(&["playlist-next"]).await;
    }

    /// Return to the previous playlist entry.
    pub async fn previous(&self) {
        self.dispatcher.command(&["playlist-prev"]).await;
    }

    /// Append a media item to the playlist.
    pub async fn add(&self, media: Media) {
        let uri = normalize_uri(&media.uri);
        self.dispatcher.command(&["loadfile", &uri, "append"]).await;

        let mut playlist = self.store.snapshot().playlist;
        playlist.medias.push(media);
        self.store.set_playlist(playlist);
    }

    /// Remove the playlist entry at `index`.
    pub async fn remove(&self, index: usize) {
        let mut playlist = self.store.snapshot().playlist;
        if index >= playlist.medias.len() {
            warn!(index, len = playlist.medias.len(), "remove index out of bounds");
            return;
        }

        self.dispatcher
            .command(&["playlist-remove", &index.to_string()])
            .await;

        playlist.medias.remove(index);
        if playlist.index > index || playlist.index >= playlist.medias.len() {
            playlist.index = playlist.index.saturating_sub(1);
        }
        self.store.set_playlist(playlist);
    }

    /// Move the entry at `from` to sit before position `to`.
    pub async fn move_item(&self, from: usize, to: usize) {
        let mut playlist = self.store.snapshot().playlist;
        let len = playlist.medias.len();
        if from >= len || to > len || from == to {
            warn!(from, to, len, "move indices out of bounds, ignoring");
            return;
        }

        self.dispatcher
            .command(&["playlist-move", &from.to_string(), &to.to_string()])
            .await;

        let media = playlist.medias.remove(from);
        let target = if from < to { to - 1 } else { to };
        playlist.medias.insert(target, media);
        if playlist.index == from {
            playlist.index = target;
        } else {
            if from < playlist.index {
                playlist.index -= 1;
            }
            if target <= playlist.index {
                playlist.index += 1;
            }
        }
        self.store.set_playlist(playlist);
    }

    /// Seek to an absolute position.
    pub async fn seek(&self, position: Duration) {
        self.dispatcher
            .command(&[
                "seek",
                &format!("{:.3}", position.as_secs_f64()),
                "absolute",
            ])
            .await;
    }

    /// Set the volume, 0.0 – 100.0.
    pub async fn set_volume(&self, volume: f64) {
        self.dispatcher
            .set_property("volume", PropertyValue::Double(volume))
            .await;
    }

    /// Set the playback rate multiplier.
    pub async fn set_rate(&self, rate: f64) {
        if rate <= 0.0 {
            warn!(rate, "ignoring non-positive rate");
            return;
        }
        self.store.set_rate(rate);
        self.apply_tempo().await;
    }

    /// Set the pitch multiplier.
    pub async fn set_pitch(&self, pitch: f64) {
        if pitch <= 0.0 {
            warn!(pitch, "ignoring non-positive pitch");
            return;
        }
        self.store.set_pitch(pitch);
        self.apply_tempo().await;
    }

    /// Push the rate/pitch combination to the engine.
    ///
    /// Pitch shifting rides on the speed property with a compensating tempo
    /// filter at `scale = rate / pitch`. The compensation is an approximation
    /// and drifts when rate and pitch are adjusted simultaneously.
    async fn apply_tempo(&self) {
        let snapshot = self.store.snapshot();
        if (snapshot.pitch - 1.0).abs() < f64::EPSILON {
            self.dispatcher.set_property("af", PropertyValue::Text(String::new())).await;
            self.dispatcher
                .set_property("speed", PropertyValue::Double(snapshot.rate))
                .await;
        } else {
            let scale = snapshot.rate / snapshot.pitch;
            self.dispatcher
                .set_property("audio-pitch-correction", PropertyValue::Flag(false))
                .await;
            self.dispatcher
                .set_property(
                    "af",
                    PropertyValue::Text(format!("scaletempo:scale={scale:.8}")),
                )
                .await;
            self.dispatcher
                .set_property("speed", PropertyValue::Double(snapshot.pitch))
                .await;
        }
    }

    /// Shuffle the playlist, re-reading the native order afterwards.
    pub async fn shuffle(&self) {
        self.reorder("playlist-shuffle").await;
    }

    /// Restore the pre-shuffle playlist order.
    pub async fn unshuffle(&self) {
        self.reorder("playlist-unshuffle").await;
    }

    async fn reorder(&self, command: &str) {
        self.dispatcher.command(&[command]).await;

        let prior = self.store.snapshot().playlist;
        let reread = self
            .dispatcher
            .get_property("playlist", PropertyFormat::Text)
            .await;

        match reread {
            Some(PropertyValue::Text(raw)) => match parse_playlist_property(&raw, &prior) {
                Ok(playlist) => self.store.set_playlist(playlist),
                Err(e) => {
                    warn!(error = %e, "playlist re-read failed to parse, rolling back");
                    self.dispatcher.command(&["playlist-unshuffle"]).await;
                }
            },
            _ => {
                warn!("playlist re-read unavailable, rolling back");
                self.dispatcher.command(&["playlist-unshuffle"]).await;
            }
        }
    }

    /// Whether this player has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Shut the engine instance down. Idempotent; the translator thread is
    /// stopped and any further notifications for this handle are ignored.
    #[instrument(name = "player_dispose", skip(self), fields(handle = %self.handle))]
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            debug!("already disposed");
            return;
        }

        info!("disposing player");
        self.dispatcher.command(&["quit", "0"]).await;
        let _ = self.notification_tx.send(NativeNotification::Shutdown);
        if let Some(mut translator) = self.translator.lock().take() {
            translator.join();
        }
    }
}

/// Normalize a media URI: already-valid URLs pass through, absolute file
/// paths become `file://` URLs, anything else is forwarded raw.
fn normalize_uri(uri: &str) -> String {
    if Url::parse(uri).is_ok() {
        return uri.to_string();
    }
    Url::from_file_path(Path::new(uri))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| uri.to_string())
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    filename: String,
    #[serde(default)]
    current: bool,
}

/// Parse the native `playlist` property (a JSON array of entries) back into a
/// playlist, matching entries to known media by URI so extras survive a
/// reorder.
fn parse_playlist_property(raw: &str, prior: &Playlist) -> EngineResult<Playlist> {
    let entries: Vec<PlaylistEntry> =
        serde_json::from_str(raw).map_err(|e| EngineError::MalformedPlaylist(e.to_string()))?;

    let mut index = prior.index.min(entries.len().saturating_sub(1));
    let medias = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            if entry.current {
                index = i;
            }
            prior
                .medias
                .iter()
                .find(|m| m.uri == entry.filename || normalize_uri(&m.uri) == entry.filename)
                .cloned()
                .unwrap_or_else(|| Media::new(entry.filename.clone()))
        })
        .collect();

    Ok(Playlist::new(medias, index))
}
