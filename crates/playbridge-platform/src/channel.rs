//! Request routing for the platform texture/compositor channel.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use playbridge_engine::Player;
use playbridge_ipc::{EngineHandle, PlatformEvent, PlatformRequest, PropertyValue};
use playbridge_pip::{PipBridge, PipCompositor};
use playbridge_texture::{Compositor, FrameSink, OutputRegistry, TextureOutput};

use crate::error::PlatformResult;

/// Reply to a platform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformResponse {
    /// Nothing to report.
    None,

    /// Identifier of a freshly created texture output.
    TextureId(i64),

    /// Result of a capability or toggle request.
    Bool(bool),
}

/// Everything the channel holds for one engine handle.
struct Session {
    player: Arc<Player>,
    output: Option<Arc<TextureOutput>>,
    pip: Option<Arc<PipBridge>>,
}

/// Routes platform requests to per-handle sessions.
///
/// Owns the output registry and the per-handle wiring between player, texture
/// output and PiP bridge. The PiP bridge is created lazily on the first PiP
/// request and stays wired as the output's frame sink until disposal.
/// Requests naming an unknown handle return [`PlatformResponse::None`] (or
/// `false` for boolean requests) instead of erroring.
pub struct PlatformChannel {
    compositor: Arc<dyn Compositor>,
    pip_compositor: Arc<dyn PipCompositor>,
    registry: Arc<OutputRegistry>,
    event_tx: Sender<PlatformEvent>,
    sessions: Mutex<HashMap<EngineHandle, Session>>,
}

impl PlatformChannel {
    /// Create a channel publishing outbound events on `event_tx`.
    pub fn new(
        compositor: Arc<dyn Compositor>,
        pip_compositor: Arc<dyn PipCompositor>,
        event_tx: Sender<PlatformEvent>,
    ) -> Self {
        Self {
            compositor,
            pip_compositor,
            registry: Arc::new(OutputRegistry::new()),
            event_tx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The registry of live texture outputs.
    pub fn registry(&self) -> &Arc<OutputRegistry> {
        &self.registry
    }

    /// Make a player addressable by platform requests.
    ///
    /// Replaces a stale session for the same handle, disposing whatever it
    /// still held.
    pub fn register_player(&self, player: Arc<Player>) {
        let handle = player.handle();
        debug!(%handle, "registering player session");
        let previous = self.sessions.lock().insert(
            handle,
            Session {
                player,
                output: None,
                pip: None,
            },
        );
        if let Some(previous) = previous {
            warn!(%handle, "replacing existing session");
            tear_down(previous);
        }
    }

    /// Remove a player session, disposing its texture output and PiP
    /// session. Unknown handles are no-ops.
    pub fn remove_player(&self, handle: EngineHandle) {
        if let Some(session) = self.sessions.lock().remove(&handle) {
            info!(%handle, "removing player session");
            tear_down(session);
        }
    }

    /// Route a native frame callback to the owning output. Callbacks for
    /// disposed or unknown handles are dropped.
    pub fn notify_frame_ready(&self, handle: EngineHandle) {
        if let Some(output) = self.registry.get(handle) {
            output.schedule_render();
        }
    }

    /// Host application resigned active state.
    ///
    /// Sessions with a PiP bridge follow its backgrounding policy; sessions
    /// without one pause running playback so audio does not continue with no
    /// visible surface.
    #[instrument(name = "platform_background", skip(self))]
    pub fn notify_app_background(&self) {
        for session in self.sessions.lock().values() {
            match &session.pip {
                Some(pip) => pip.on_background(),
                None => {
                    if session.player.state().snapshot().playing {
                        session
                            .player
                            .dispatcher()
                            .set_property_now("pause", PropertyValue::Flag(true));
                    }
                }
            }
        }
    }

    /// Host application became active again; hardware rendering may resume.
    pub fn notify_app_foreground(&self) {
        for session in self.sessions.lock().values() {
            match (&session.pip, &session.output) {
                (Some(pip), _) => pip.on_foreground(),
                (None, Some(output)) => output.switch_rendering(true),
                (None, None) => {}
            }
        }
    }

    /// Handle one platform request.
    #[instrument(name = "platform_request", skip(self, request))]
    pub async fn handle_request(
        &self,
        request: PlatformRequest,
    ) -> PlatformResult<PlatformResponse> {
        debug!(?request, "handling platform request");
        match request {
            PlatformRequest::Create {
                handle,
                width,
                height,
                enable_hardware_acceleration,
            } => {
                self.create_output(handle, width, height, enable_hardware_acceleration)
                    .await
            }
            PlatformRequest::SetSize {
                handle,
                width,
                height,
            } => {
                if let Some(output) = self.output_of(handle) {
                    output.set_size(width, height);
                }
                Ok(PlatformResponse::None)
            }
            PlatformRequest::RefreshPlaybackState { handle } => {
                if let Some(pip) = self.pip_of(handle) {
                    pip.refresh_playback_state();
                }
                Ok(PlatformResponse::None)
            }
            PlatformRequest::IsPictureInPictureAvailable => Ok(PlatformResponse::Bool(
                self.pip_compositor.is_supported(),
            )),
            PlatformRequest::EnablePictureInPicture { handle } => {
                let enabled = self
                    .ensure_pip(handle)
                    .map(|pip| pip.enable())
                    .unwrap_or(false);
                Ok(PlatformResponse::Bool(enabled))
            }
            PlatformRequest::DisablePictureInPicture { handle } => {
                if let Some(pip) = self.pip_of(handle) {
                    pip.disable();
                }
                Ok(PlatformResponse::None)
            }
            PlatformRequest::EnableAutoPictureInPicture { handle } => {
                let enabled = self
                    .ensure_pip(handle)
                    .map(|pip| pip.set_auto_enabled(true))
                    .unwrap_or(false);
                Ok(PlatformResponse::Bool(enabled))
            }
            PlatformRequest::DisableAutoPictureInPicture { handle } => {
                if let Some(pip) = self.pip_of(handle) {
                    pip.set_auto_enabled(false);
                }
                Ok(PlatformResponse::None)
            }
            PlatformRequest::EnterPictureInPicture { handle } => {
                let entered = self
                    .ensure_pip(handle)
                    .map(|pip| pip.enter())
                    .unwrap_or(false);
                Ok(PlatformResponse::Bool(entered))
            }
            PlatformRequest::Dispose { handle } => {
                let mut sessions = self.sessions.lock();
                if let Some(session) = sessions.get_mut(&handle) {
                    if let Some(pip) = session.pip.take() {
                        pip.disable();
                    }
                    if let Some(output) = session.output.take() {
                        output.set_frame_sink(None);
                        output.dispose();
                    }
                }
                Ok(PlatformResponse::None)
            }
        }
    }

    async fn create_output(
        &self,
        handle: EngineHandle,
        width: Option<u32>,
        height: Option<u32>,
        enable_hardware_acceleration: bool,
    ) -> PlatformResult<PlatformResponse> {
        let player = match self.sessions.lock().get(&handle) {
            Some(session) => session.player.clone(),
            None => {
                warn!(%handle, "create request for unknown handle");
                return Ok(PlatformResponse::None);
            }
        };

        let output = TextureOutput::create(
            handle,
            player.dispatcher().engine().clone(),
            self.compositor.clone(),
            self.registry.clone(),
            self.event_tx.clone(),
            width,
            height,
            enable_hardware_acceleration,
        )
        .await?;
        let texture_id = output.texture_state().texture_id;

        // The session may have been removed while the rendezvous was pending.
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&handle) {
            Some(session) => session.output = Some(output),
            None => output.dispose(),
        }
        Ok(PlatformResponse::TextureId(texture_id))
    }

    fn output_of(&self, handle: EngineHandle) -> Option<Arc<TextureOutput>> {
        self.sessions
            .lock()
            .get(&handle)
            .and_then(|session| session.output.clone())
    }

    fn pip_of(&self, handle: EngineHandle) -> Option<Arc<PipBridge>> {
        self.sessions
            .lock()
            .get(&handle)
            .and_then(|session| session.pip.clone())
    }

    /// Lazily build the PiP bridge for a handle and wire it as the output's
    /// frame sink. `None` when the handle is unknown or has no output yet.
    fn ensure_pip(&self, handle: EngineHandle) -> Option<Arc<PipBridge>> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&handle)?;
        if let Some(pip) = &session.pip {
            return Some(pip.clone());
        }

        let output = match &session.output {
            Some(output) => output.clone(),
            None => {
                warn!(%handle, "PiP requested before texture output exists");
                return None;
            }
        };

        let pip = PipBridge::new(
            self.pip_compositor.clone(),
            session.player.dispatcher().clone(),
            session.player.state().clone(),
            output.clone(),
        );
        output.set_frame_sink(Some(pip.clone() as Arc<dyn FrameSink>));
        session.pip = Some(pip.clone());
        Some(pip)
    }
}

fn tear_down(session: Session) {
    if let Some(pip) = session.pip {
        pip.disable();
    }
    if let Some(output) = session.output {
        output.set_frame_sink(None);
        output.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    use playbridge_engine::{NativeEngine, NativeError, NativeResult, SurfaceHandle};
    use playbridge_ipc::{
        platform_event_channel, FrameBuffer, PropertyFormat, PropertyValue,
    };
    use playbridge_pip::{PipResult, TimedSample};
    use playbridge_texture::{
        SurfaceDescriptor, SurfaceIds, TextureError, TextureResult,
    };

    #[derive(Default)]
    struct FakeEngine {
        video_width: AtomicU32,
        video_height: AtomicU32,
        properties: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn with_video(width: u32, height: u32) -> Arc<Self> {
            let engine = Self::default();
            engine.video_width.store(width, Ordering::Relaxed);
            engine.video_height.store(height, Ordering::Relaxed);
            Arc::new(engine)
        }
    }

    impl NativeEngine for FakeEngine {
        fn command(&self, _args: &[&str]) -> NativeResult<()> {
            Ok(())
        }

        fn set_property(&self, name: &str, value: PropertyValue) -> NativeResult<()> {
            self.properties.lock().push(format!("{name}={value:?}"));
            Ok(())
        }

        fn get_property(&self, _name: &str, _format: PropertyFormat) -> NativeResult<PropertyValue> {
            Err(NativeError::new(-1, "unknown"))
        }

        fn observe_property(&self, _name: &str, _format: PropertyFormat) -> NativeResult<()> {
            Ok(())
        }

        fn video_dimensions(&self) -> (u32, u32) {
            (
                self.video_width.load(Ordering::Relaxed),
                self.video_height.load(Ordering::Relaxed),
            )
        }

        fn render_software(
            &self,
            _width: u32,
            _height: u32,
            _stride: u32,
            pixels: &mut [u8],
        ) -> NativeResult<()> {
            pixels.fill(0xCD);
            Ok(())
        }

        fn render_hardware(
            &self,
            _surface: SurfaceHandle,
            _width: u32,
            _height: u32,
        ) -> NativeResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCompositor {
        next_id: AtomicU32,
        frames_available: Mutex<Vec<i64>>,
        unregistered: Mutex<Vec<i64>>,
    }

    impl Compositor for FakeCompositor {
        fn supports_hardware_surfaces(&self) -> bool {
            false
        }

        fn register_surface(
            &self,
            _desc: SurfaceDescriptor,
            on_assigned: Box<dyn FnOnce(SurfaceIds) + Send>,
        ) {
            let texture_id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1) as i64;
            on_assigned(SurfaceIds {
                texture_id,
                surface: None,
            });
        }

        fn resize_surface(
            &self,
            texture_id: i64,
            _width: u32,
            _height: u32,
        ) -> TextureResult<SurfaceIds> {
            Ok(SurfaceIds {
                texture_id,
                surface: None,
            })
        }

        fn unregister_surface(&self, texture_id: i64) {
            self.unregistered.lock().push(texture_id);
        }

        fn present_software_frame(&self, _texture_id: i64, _frame: &FrameBuffer) {}

        fn mark_frame_available(&self, texture_id: i64) {
            self.frames_available.lock().push(texture_id);
        }
    }

    struct FakePip {
        supported: bool,
        attached: AtomicUsize,
        detached: AtomicUsize,
    }

    impl FakePip {
        fn supported() -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                attached: AtomicUsize::new(0),
                detached: AtomicUsize::new(0),
            })
        }

        fn unsupported() -> Arc<Self> {
            Arc::new(Self {
                supported: false,
                attached: AtomicUsize::new(0),
                detached: AtomicUsize::new(0),
            })
        }
    }

    impl PipCompositor for FakePip {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn attach_layer(&self) -> PipResult<()> {
            self.attached.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn detach_layer(&self) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }

        fn enqueue_sample(&self, _sample: TimedSample) -> PipResult<()> {
            Ok(())
        }

        fn invalidate_playback_state(&self) {}

        fn start(&self) -> PipResult<()> {
            Ok(())
        }
    }

    struct Harness {
        channel: PlatformChannel,
        engine: Arc<FakeEngine>,
        compositor: Arc<FakeCompositor>,
        pip: Arc<FakePip>,
        player: Arc<Player>,
    }

    fn harness(pip: Arc<FakePip>) -> Harness {
        let engine = FakeEngine::with_video(640, 480);
        let compositor = Arc::new(FakeCompositor::default());
        let (event_tx, _event_rx) = platform_event_channel();
        let channel = PlatformChannel::new(compositor.clone(), pip.clone(), event_tx);

        let player = Arc::new(Player::new(EngineHandle(1), engine.clone()));
        player.initialize().unwrap();
        channel.register_player(player.clone());

        Harness {
            channel,
            engine,
            compositor,
            pip,
            player,
        }
    }

    fn create_request(handle: u64) -> PlatformRequest {
        PlatformRequest::Create {
            handle: EngineHandle(handle),
            width: None,
            height: None,
            enable_hardware_acceleration: false,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_texture_and_registers() {
        let h = harness(FakePip::supported());

        let response = h.channel.handle_request(create_request(1)).await.unwrap();
        assert_eq!(response, PlatformResponse::TextureId(1));
        assert!(h.channel.registry().get(EngineHandle(1)).is_some());
    }

    #[tokio::test]
    async fn test_create_unknown_handle_is_noop() {
        let h = harness(FakePip::supported());

        let response = h.channel.handle_request(create_request(7)).await.unwrap();
        assert_eq!(response, PlatformResponse::None);
        assert!(h.channel.registry().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let h = harness(FakePip::supported());
        h.channel.handle_request(create_request(1)).await.unwrap();

        let second = h.channel.handle_request(create_request(1)).await;
        assert!(matches!(
            second,
            Err(crate::PlatformError::Texture(TextureError::AlreadyExists(_)))
        ));
    }

    #[tokio::test]
    async fn test_set_size_unknown_handle_is_noop() {
        let h = harness(FakePip::supported());

        let response = h
            .channel
            .handle_request(PlatformRequest::SetSize {
                handle: EngineHandle(9),
                width: Some(100),
                height: Some(100),
            })
            .await
            .unwrap();
        assert_eq!(response, PlatformResponse::None);
    }

    #[tokio::test]
    async fn test_pip_availability_reflects_compositor() {
        let h = harness(FakePip::unsupported());
        let response = h
            .channel
            .handle_request(PlatformRequest::IsPictureInPictureAvailable)
            .await
            .unwrap();
        assert_eq!(response, PlatformResponse::Bool(false));

        let h = harness(FakePip::supported());
        let response = h
            .channel
            .handle_request(PlatformRequest::IsPictureInPictureAvailable)
            .await
            .unwrap();
        assert_eq!(response, PlatformResponse::Bool(true));
    }

    #[tokio::test]
    async fn test_enable_pip_before_output_returns_false() {
        let h = harness(FakePip::supported());

        let response = h
            .channel
            .handle_request(PlatformRequest::EnablePictureInPicture {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();
        assert_eq!(response, PlatformResponse::Bool(false));
        assert_eq!(h.pip.attached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enable_pip_attaches_layer() {
        let h = harness(FakePip::supported());
        h.channel.handle_request(create_request(1)).await.unwrap();

        let response = h
            .channel
            .handle_request(PlatformRequest::EnablePictureInPicture {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();
        assert_eq!(response, PlatformResponse::Bool(true));
        assert_eq!(h.pip.attached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disable_pip_detaches_layer() {
        let h = harness(FakePip::supported());
        h.channel.handle_request(create_request(1)).await.unwrap();
        h.channel
            .handle_request(PlatformRequest::EnablePictureInPicture {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();

        h.channel
            .handle_request(PlatformRequest::DisablePictureInPicture {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();
        assert_eq!(h.pip.detached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispose_unregisters_output() {
        let h = harness(FakePip::supported());
        h.channel.handle_request(create_request(1)).await.unwrap();

        h.channel
            .handle_request(PlatformRequest::Dispose {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();
        assert!(h.channel.registry().is_empty());
        assert_eq!(h.compositor.unregistered.lock().as_slice(), &[1]);
    }

    #[tokio::test]
    async fn test_frame_ready_routes_to_output() {
        let h = harness(FakePip::supported());
        h.channel.handle_request(create_request(1)).await.unwrap();

        h.channel.notify_frame_ready(EngineHandle(1));
        // Unknown handles are dropped without touching any output.
        h.channel.notify_frame_ready(EngineHandle(5));

        for _ in 0..50 {
            if !h.compositor.frames_available.lock().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(h.compositor.frames_available.lock().as_slice(), &[1]);
    }

    #[tokio::test]
    async fn test_background_pauses_playing_session_without_pip() {
        let h = harness(FakePip::supported());
        h.player.state().set_playing(true);

        h.channel.notify_app_background();

        let properties = h.engine.properties.lock();
        let pauses = properties
            .iter()
            .filter(|p| p.contains("pause=Flag(true)"))
            .count();
        assert_eq!(pauses, 1);
    }

    #[tokio::test]
    async fn test_auto_pip_gated_on_capability() {
        let h = harness(FakePip::unsupported());
        h.channel.handle_request(create_request(1)).await.unwrap();

        let response = h
            .channel
            .handle_request(PlatformRequest::EnableAutoPictureInPicture {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();
        assert_eq!(response, PlatformResponse::Bool(false));
    }

    #[tokio::test]
    async fn test_remove_player_tears_down_session() {
        let h = harness(FakePip::supported());
        h.channel.handle_request(create_request(1)).await.unwrap();
        h.channel
            .handle_request(PlatformRequest::EnablePictureInPicture {
                handle: EngineHandle(1),
            })
            .await
            .unwrap();

        h.channel.remove_player(EngineHandle(1));

        assert!(h.channel.registry().is_empty());
        assert_eq!(h.pip.detached.load(Ordering::SeqCst), 1);
        // A second removal is a no-op.
        h.channel.remove_player(EngineHandle(1));
        assert_eq!(h.pip.detached.load(Ordering::SeqCst), 1);
    }
}
