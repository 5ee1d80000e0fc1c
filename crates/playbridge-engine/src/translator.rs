//! Single-threaded consumer of native engine notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info, trace, warn};

use playbridge_ipc::{
    EndReason, EngineHandle, NativeNotification, PropertyEvent, PropertyValue,
};

use crate::error::NativeError;
use crate::state::StateStore;

/// The sole consumer of one engine's notification stream.
///
/// Runs on a dedicated thread so consecutive notifications are processed
/// strictly in arrival order and never concurrently with each other. One bad
/// notification never stops the loop; it is logged, published on the error
/// channel where it carries a native code, and the next notification is
/// processed normally.
pub struct EventTranslator {
    thread: Option<JoinHandle<()>>,
}

impl EventTranslator {
    /// Spawn the consumer thread for a handle.
    ///
    /// `started` is the playback-ever-started gate shared with the player:
    /// until it is set, `playing` and playlist-index notifications are
    /// suppressed so property writes during setup cannot flip observable
    /// state.
    pub fn spawn(
        handle: EngineHandle,
        notifications: Receiver<NativeNotification>,
        store: Arc<StateStore>,
        started: Arc<AtomicBool>,
    ) -> Self {
        let thread = thread::Builder::new()
            .name(format!("event-translator-{}", handle.0))
            .spawn(move || {
                debug!(%handle, "event translator starting");
                for notification in notifications.iter() {
                    if matches!(notification, NativeNotification::Shutdown) {
                        break;
                    }
                    apply(&store, &started, notification);
                }
                info!(%handle, "event translator stopped");
            })
            .expect("failed to spawn event translator thread");

        Self {
            thread: Some(thread),
        }
    }

    /// Wait for the consumer thread to exit. Returns once the notification
    /// channel has disconnected or a shutdown notification was drained.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventTranslator {
    fn drop(&mut self) {
        self.join();
    }
}

/// Apply one notification to the store.
pub(crate) fn apply(store: &StateStore, started: &AtomicBool, notification: NativeNotification) {
    trace!(?notification, "applying notification");
    match notification {
        NativeNotification::StartOfMedia => {
            store.set_completed(false);
            if started.load(Ordering::Acquire) {
                store.set_playing(true);
            }
        }
        NativeNotification::EndOfMedia { reason, error_code } => {
            if let Some(code) = error_code.filter(|c| *c < 0) {
                store.publish_error(NativeError::new(code, format!("playback ended: {reason:?}")));
            }
            // Only a genuine end of stream flips completion; stop, quit and
            // error reasons leave it untouched.
            if reason == EndReason::EndOfStream {
                store.set_playing(false);
                store.set_completed(true);
                let duration = store.snapshot().duration;
                store.set_position(duration);
            }
        }
        NativeNotification::Property(event) => apply_property(store, started, event),
        NativeNotification::Shutdown => {}
    }
}

fn apply_property(store: &StateStore, started: &AtomicBool, event: PropertyEvent) {
    if event.value.format() != event.format {
        warn!(
            name = %event.name,
            registered = ?event.format,
            received = ?event.value.format(),
            "dropping property event with mismatched format"
        );
        return;
    }

    let started = started.load(Ordering::Acquire);
    match (event.name.as_str(), event.value) {
        ("pause", PropertyValue::Flag(paused)) => {
            if started {
                store.set_playing(!paused);
            }
        }
        ("time-pos", PropertyValue::Double(secs)) => match duration_from_secs(secs) {
            Some(position) => store.set_position(position),
            None => warn!(name = "time-pos", secs, "dropping unrepresentable value"),
        },
        ("duration", PropertyValue::Double(secs)) => match duration_from_secs(secs) {
            Some(duration) => store.set_duration(duration),
            None => warn!(name = "duration", secs, "dropping unrepresentable value"),
        },
        ("playlist-pos-1", PropertyValue::Int64(pos)) => {
            // 1-based; 0 means no active entry.
            if started && pos > 0 {
                store.set_playlist_index((pos - 1) as usize);
            }
        }
        ("seekable", PropertyValue::Flag(seekable)) => {
            store.set_seekable(seekable);
        }
        ("volume", PropertyValue::Double(volume)) => {
            store.set_volume(volume);
        }
        ("speed", PropertyValue::Double(speed)) => {
            store.set_rate(speed);
        }
        ("paused-for-cache", PropertyValue::Flag(buffering)) => {
            store.set_buffering(buffering);
        }
        // Unrecognized names are ignored for forward compatibility.
        (name, value) => {
            trace!(name, ?value, "ignoring unobserved property");
        }
    }
}

/// Convert reported seconds to a duration. Negative values clamp to zero;
/// infinite, NaN or overflowing values are unrepresentable and yield `None`.
fn duration_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use playbridge_ipc::{notification_channel, PropertyFormat};

    fn property(name: &str, format: PropertyFormat, value: PropertyValue) -> NativeNotification {
        NativeNotification::Property(PropertyEvent {
            name: name.into(),
            format,
            value,
        })
    }

    #[test]
    fn test_playing_suppressed_until_started() {
        let store = StateStore::new();
        let started = AtomicBool::new(false);

        // Setup writes report pause=false before anyone called play.
        apply(
            &store,
            &started,
            property("pause", PropertyFormat::Flag, PropertyValue::Flag(false)),
        );
        assert!(!store.snapshot().playing);

        started.store(true, Ordering::Release);
        apply(
            &store,
            &started,
            property("pause", PropertyFormat::Flag, PropertyValue::Flag(false)),
        );
        assert!(store.snapshot().playing);
    }

    #[test]
    fn test_completed_only_on_end_of_stream() {
        let store = StateStore::new();
        let started = AtomicBool::new(true);

        for reason in [EndReason::Error, EndReason::Stop, EndReason::Quit] {
            apply(
                &store,
                &started,
                NativeNotification::EndOfMedia {
                    reason,
                    error_code: None,
                },
            );
            assert!(!store.snapshot().completed, "{reason:?} must not complete");
        }

        apply(
            &store,
            &started,
            NativeNotification::EndOfMedia {
                reason: EndReason::EndOfStream,
                error_code: None,
            },
        );
        let state = store.snapshot();
        assert!(state.completed);
        assert!(!state.playing);
    }

    #[test]
    fn test_end_of_media_error_code_published_not_fatal() {
        let store = StateStore::new();
        let started = AtomicBool::new(true);
        let mut errors = store.subscribe_errors();

        apply(
            &store,
            &started,
            NativeNotification::EndOfMedia {
                reason: EndReason::Error,
                error_code: Some(-2),
            },
        );
        assert_eq!(errors.try_recv().unwrap().code, -2);

        // Subsequent notifications still processed.
        apply(
            &store,
            &started,
            property("volume", PropertyFormat::Double, PropertyValue::Double(55.0)),
        );
        assert_eq!(store.snapshot().volume, 55.0);
    }

    #[test]
    fn test_mismatched_format_dropped() {
        let store = StateStore::new();
        let started = AtomicBool::new(true);

        apply(
            &store,
            &started,
            property("volume", PropertyFormat::Double, PropertyValue::Flag(true)),
        );
        assert_eq!(store.snapshot().volume, 100.0);
    }

    #[test]
    fn test_unknown_property_ignored() {
        let store = StateStore::new();
        let started = AtomicBool::new(true);
        let before = store.snapshot();

        apply(
            &store,
            &started,
            property(
                "sub-visibility",
                PropertyFormat::Flag,
                PropertyValue::Flag(true),
            ),
        );
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_fields_track_last_notification_in_order() {
        let store = StateStore::new();
        let started = AtomicBool::new(true);

        for secs in [1.0, 2.0, 3.5] {
            apply(
                &store,
                &started,
                property(
                    "time-pos",
                    PropertyFormat::Double,
                    PropertyValue::Double(secs),
                ),
            );
        }
        assert_eq!(store.snapshot().position, Duration::from_secs_f64(3.5));
    }

    #[test]
    fn test_non_finite_seconds_dropped_and_loop_survives() {
        let store = Arc::new(StateStore::new());
        let started = Arc::new(AtomicBool::new(true));
        let (tx, rx) = notification_channel();
        let mut translator =
            EventTranslator::spawn(EngineHandle(1), rx, store.clone(), started);

        for secs in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, f64::MAX] {
            tx.send(property(
                "time-pos",
                PropertyFormat::Double,
                PropertyValue::Double(secs),
            ))
            .unwrap();
            tx.send(property(
                "duration",
                PropertyFormat::Double,
                PropertyValue::Double(secs),
            ))
            .unwrap();
        }
        // The thread must still be draining after the bad values.
        tx.send(property(
            "volume",
            PropertyFormat::Double,
            PropertyValue::Double(55.0),
        ))
        .unwrap();
        tx.send(NativeNotification::Shutdown).unwrap();
        translator.join();

        let state = store.snapshot();
        assert_eq!(state.volume, 55.0);
        // NaN clamps to zero; the rest never reached the store.
        assert_eq!(state.position, Duration::ZERO);
        assert_eq!(state.duration, Duration::ZERO);
    }

    #[test]
    fn test_translator_thread_drains_in_order_and_shuts_down() {
        let store = Arc::new(StateStore::new());
        let started = Arc::new(AtomicBool::new(true));
        let (tx, rx) = notification_channel();
        let mut translator =
            EventTranslator::spawn(EngineHandle(1), rx, store.clone(), started);

        tx.send(property(
            "duration",
            PropertyFormat::Double,
            PropertyValue::Double(120.0),
        ))
        .unwrap();
        tx.send(NativeNotification::EndOfMedia {
            reason: EndReason::EndOfStream,
            error_code: None,
        })
        .unwrap();
        tx.send(NativeNotification::Shutdown).unwrap();
        translator.join();

        let state = store.snapshot();
        assert!(state.completed);
        assert_eq!(state.position, Duration::from_secs(120));
    }
}
