//! PiP session management and backgrounding policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use playbridge_engine::{CommandDispatcher, StateStore};
use playbridge_ipc::{FrameBuffer, PropertyValue};
use playbridge_texture::{FrameSink, TextureOutput};

use crate::{FormatDescriptor, PipCompositor, TimedSample};

/// Playback window reported to the PiP compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Current position within the media.
    pub position: Duration,

    /// Total media duration.
    pub duration: Duration,
}

/// The active PiP compositing state.
struct PipSession {
    /// Cached descriptor; regenerated when a frame stops matching.
    descriptor: Option<FormatDescriptor>,
}

/// Feeds rendered frames into the system PiP compositor and answers its
/// synchronous queries from the playback state snapshot.
///
/// All entry points are non-blocking: queries read the snapshot, commands go
/// through the dispatcher's immediate path, and enqueue failures are logged
/// rather than propagated.
pub struct PipBridge {
    compositor: Arc<dyn PipCompositor>,
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<StateStore>,
    output: Arc<TextureOutput>,
    session: Mutex<Option<PipSession>>,
    auto_enabled: AtomicBool,
}

impl PipBridge {
    /// Create a bridge for one engine instance. No session exists until
    /// [`enable`](Self::enable).
    pub fn new(
        compositor: Arc<dyn PipCompositor>,
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<StateStore>,
        output: Arc<TextureOutput>,
    ) -> Arc<Self> {
        Arc::new(Self {
            compositor,
            dispatcher,
            store,
            output,
            session: Mutex::new(None),
            auto_enabled: AtomicBool::new(false),
        })
    }

    /// Construct the PiP session and attach the compositing layer.
    ///
    /// Idempotent; returns `false` when the platform does not support PiP,
    /// without creating a session and without erroring.
    #[instrument(name = "pip_enable", skip(self))]
    pub fn enable(&self) -> bool {
        if !self.compositor.is_supported() {
            debug!("PiP unsupported on this platform");
            return false;
        }

        let mut session = self.session.lock();
        if session.is_some() {
            debug!("PiP already enabled");
            return true;
        }

        if let Err(e) = self.compositor.attach_layer() {
            warn!(error = %e, "failed to attach PiP layer");
            return false;
        }

        info!("PiP session created");
        *session = Some(PipSession { descriptor: None });
        true
    }

    /// Tear down the session. Idempotent.
    #[instrument(name = "pip_disable", skip(self))]
    pub fn disable(&self) {
        if self.session.lock().take().is_some() {
            info!("PiP session destroyed");
            self.compositor.detach_layer();
        }
    }

    /// Whether a session is active.
    pub fn is_enabled(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Allow or forbid PiP auto-start on backgrounding. Returns `false`
    /// when the platform does not support PiP.
    pub fn set_auto_enabled(&self, enabled: bool) -> bool {
        if !self.compositor.is_supported() {
            return false;
        }
        self.auto_enabled.store(enabled, Ordering::Release);
        true
    }

    /// Whether PiP may auto-start on backgrounding.
    pub fn is_auto_enabled(&self) -> bool {
        self.auto_enabled.load(Ordering::Acquire)
    }

    /// Enter PiP immediately. Enables the session first if needed.
    pub fn enter(&self) -> bool {
        if !self.enable() {
            return false;
        }
        match self.compositor.start() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to enter PiP");
                false
            }
        }
    }

    /// Current playback window, from the state snapshot. Never blocks on an
    /// engine round-trip.
    pub fn time_range(&self) -> TimeRange {
        let snapshot = self.store.snapshot();
        TimeRange {
            position: snapshot.position,
            duration: snapshot.duration,
        }
    }

    /// Whether playback is paused, from the state snapshot.
    pub fn is_paused(&self) -> bool {
        !self.store.snapshot().playing
    }

    /// Play/pause command issued on behalf of the PiP controls.
    pub fn set_playing(&self, playing: bool) {
        self.dispatcher
            .set_property_now("pause", PropertyValue::Flag(!playing));
    }

    /// Re-publish playback state to the system PiP controls.
    pub fn refresh_playback_state(&self) {
        self.compositor.invalidate_playback_state();
    }

    /// Host application resigned active state.
    ///
    /// With an active or auto-startable session the texture output drops to
    /// software rendering so PiP keeps receiving frames while hardware
    /// surfaces are suspended; otherwise running playback is paused so audio
    /// does not continue with no visible surface.
    #[instrument(name = "pip_background", skip(self))]
    pub fn on_background(&self) {
        if self.is_auto_enabled() || self.is_enabled() {
            debug!("backgrounding with PiP, switching to software rendering");
            self.output.switch_rendering(false);
        } else if self.store.snapshot().playing {
            debug!("backgrounding without PiP, pausing playback");
            self.dispatcher
                .set_property_now("pause", PropertyValue::Flag(true));
        }
    }

    /// Host application became active again.
    pub fn on_foreground(&self) {
        self.output.switch_rendering(true);
    }
}

impl FrameSink for PipBridge {
    /// Feed one rendered frame into the session, if any.
    ///
    /// The format descriptor is regenerated only when the frame stops
    /// matching the cached one; enqueue failures are logged and swallowed.
    fn submit_frame(&self, frame: &FrameBuffer) {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else {
            return;
        };

        let descriptor = match session.descriptor {
            Some(descriptor) if descriptor.matches(frame) => descriptor,
            _ => {
                let descriptor = FormatDescriptor::for_frame(frame);
                debug!(
                    width = descriptor.width,
                    height = descriptor.height,
                    "regenerating PiP format descriptor"
                );
                session.descriptor = Some(descriptor);
                descriptor
            }
        };

        let sample = TimedSample {
            frame: frame.clone(),
            descriptor,
            presentation: SystemTime::now(),
        };
        if let Err(e) = self.compositor.enqueue_sample(sample) {
            warn!(error = %e, "failed to enqueue PiP sample");
        }
    }
}
