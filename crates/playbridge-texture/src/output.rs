//! Per-handle texture output and its render worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

use playbridge_engine::NativeEngine;
use playbridge_ipc::{EngineHandle, PlatformEvent, PropertyValue, VideoRect};

use crate::backend::{create_backend, RenderBackend};
use crate::error::{TextureError, TextureResult};
use crate::registry::OutputRegistry;
use crate::{Compositor, FrameSink, RENDER_CHANNEL_CAPACITY};

/// Snapshot of one texture output's published identity and geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureState {
    pub texture_id: i64,
    pub width: u32,
    pub height: u32,
    pub hardware_accelerated: bool,
    pub disposed: bool,
}

enum WorkerMessage {
    Init {
        prefer_hardware: bool,
        ready: oneshot::Sender<TextureResult<i64>>,
    },
    Tick,
    SwitchRendering {
        allow_hardware: bool,
    },
    Dispose,
}

/// State shared between the output facade and its render worker.
struct Shared {
    handle: EngineHandle,
    /// Fixed size override; `None` per axis tracks the native video plane.
    target: Mutex<(Option<u32>, Option<u32>)>,
    state: Mutex<TextureState>,
    disposed: AtomicBool,
    /// Whether hardware acceleration was enabled at creation; when false,
    /// rendering-mode switches are no-ops.
    hardware_enabled: bool,
    first_frame: AtomicBool,
    frame_sink: Mutex<Option<Arc<dyn FrameSink>>>,
}

/// Owns one render surface per engine handle.
///
/// All surface work happens on a dedicated worker thread fed through a
/// bounded mailbox, so render ticks are serialized and never run on the
/// caller's thread. [`create`](Self::create) is the only suspension point: it
/// resolves once the compositor has assigned a texture identifier.
pub struct TextureOutput {
    handle: EngineHandle,
    registry: Arc<OutputRegistry>,
    worker_tx: Sender<WorkerMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl TextureOutput {
    /// Allocate the texture output for a handle.
    ///
    /// Registers the surface with the compositor and resolves once the
    /// platform has assigned a texture identifier. The handle's registry slot
    /// is claimed before registration starts and fulfilled (or released, on
    /// failure) after the rendezvous, keeping the one-output-per-handle rule
    /// intact across the suspension.
    #[instrument(name = "texture_create", skip_all, fields(%handle))]
    pub async fn create(
        handle: EngineHandle,
        engine: Arc<dyn NativeEngine>,
        compositor: Arc<dyn Compositor>,
        registry: Arc<OutputRegistry>,
        event_tx: Sender<PlatformEvent>,
        width: Option<u32>,
        height: Option<u32>,
        enable_hardware_acceleration: bool,
    ) -> TextureResult<Arc<Self>> {
        // Claim the handle before the asynchronous registration starts, so a
        // concurrent create for the same handle fails instead of racing past
        // the rendezvous.
        if !registry.reserve(handle) {
            return Err(TextureError::AlreadyExists(handle));
        }

        let shared = Arc::new(Shared {
            handle,
            target: Mutex::new((width, height)),
            state: Mutex::new(TextureState {
                texture_id: 0,
                width: width.unwrap_or(0),
                height: height.unwrap_or(0),
                hardware_accelerated: false,
                disposed: false,
            }),
            disposed: AtomicBool::new(false),
            hardware_enabled: enable_hardware_acceleration,
            first_frame: AtomicBool::new(false),
            frame_sink: Mutex::new(None),
        });

        let (worker_tx, worker_rx) = crossbeam_channel::bounded(RENDER_CHANNEL_CAPACITY);
        let spawned = {
            let shared = shared.clone();
            let event_tx = event_tx.clone();
            thread::Builder::new()
                .name(format!("render-worker-{}", handle.0))
                .spawn(move || worker_loop(worker_rx, engine, compositor, shared, event_tx))
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                registry.remove(handle);
                return Err(TextureError::Registration(e.to_string()));
            }
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        if worker_tx
            .send(WorkerMessage::Init {
                prefer_hardware: enable_hardware_acceleration,
                ready: ready_tx,
            })
            .is_err()
        {
            registry.remove(handle);
            return Err(TextureError::WorkerGone);
        }

        let texture_id = match ready_rx.await {
            Ok(Ok(texture_id)) => texture_id,
            Ok(Err(e)) => {
                let _ = worker.join();
                registry.remove(handle);
                return Err(e);
            }
            Err(_) => {
                registry.remove(handle);
                return Err(TextureError::WorkerGone);
            }
        };

        info!(texture_id, "texture output created");
        let output = Arc::new(Self {
            handle,
            registry: registry.clone(),
            worker_tx,
            worker: Mutex::new(Some(worker)),
            shared,
        });
        registry.fulfill(handle, output.clone());
        Ok(output)
    }

    /// The handle this output belongs to.
    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    /// Published identity and geometry.
    pub fn texture_state(&self) -> TextureState {
        let mut state = self.shared.state.lock().clone();
        state.disposed = self.shared.disposed.load(Ordering::Acquire);
        state
    }

    /// Whether the first non-degenerate frame has been rendered.
    pub fn first_frame_rendered(&self) -> bool {
        self.shared.first_frame.load(Ordering::Acquire)
    }

    /// Attach or detach the rendered-frame consumer (the PiP feed).
    pub fn set_frame_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        *self.shared.frame_sink.lock() = sink;
    }

    /// Update the target size. `None` per axis tracks the native video
    /// plane. A target equal to the current one is a no-op, so redundant
    /// calls never reallocate the surface.
    pub fn set_size(&self, width: Option<u32>, height: Option<u32>) {
        if self.shared.disposed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut target = self.shared.target.lock();
            if *target == (width, height) {
                debug!(handle = %self.handle, "set_size target unchanged, skipping");
                return;
            }
            *target = (width, height);
        }
        self.schedule_render();
    }

    /// Queue one render tick. Coalesced: when the mailbox is full a render
    /// is already pending and this signal is dropped.
    pub fn schedule_render(&self) {
        if self.shared.disposed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.worker_tx.try_send(WorkerMessage::Tick);
    }

    /// Switch between hardware and software rendering.
    ///
    /// No-op when hardware acceleration is disabled for this output or the
    /// requested mode is already active; otherwise the worker rebuilds the
    /// backend variant with native video output muted across the swap.
    pub fn switch_rendering(&self, allow_hardware: bool) {
        if self.shared.disposed.load(Ordering::Acquire) {
            return;
        }
        if !self.shared.hardware_enabled {
            debug!(handle = %self.handle, "hardware acceleration disabled, ignoring switch");
            return;
        }
        let _ = self
            .worker_tx
            .send(WorkerMessage::SwitchRendering { allow_hardware });
    }

    /// Tear the output down. Idempotent; late render ticks and platform
    /// callbacks for this handle become silent no-ops.
    #[instrument(name = "texture_dispose", skip(self), fields(handle = %self.handle))]
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            debug!("already disposed");
            return;
        }

        info!("disposing texture output");
        self.registry.remove(self.handle);
        let _ = self.worker_tx.send(WorkerMessage::Dispose);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        self.shared.state.lock().disposed = true;
    }
}

impl Drop for TextureOutput {
    fn drop(&mut self) {
        if !self.shared.disposed.swap(true, Ordering::AcqRel) {
            self.registry.remove(self.handle);
            let _ = self.worker_tx.send(WorkerMessage::Dispose);
        }
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    messages: Receiver<WorkerMessage>,
    engine: Arc<dyn NativeEngine>,
    compositor: Arc<dyn Compositor>,
    shared: Arc<Shared>,
    event_tx: Sender<PlatformEvent>,
) {
    debug!(handle = %shared.handle, "render worker starting");
    let mut backend: Option<Box<dyn RenderBackend>> = None;

    while let Ok(message) = messages.recv() {
        match message {
            WorkerMessage::Init {
                prefer_hardware,
                ready,
            } => {
                let (width, height) = {
                    let target = shared.target.lock();
                    (target.0.unwrap_or(0), target.1.unwrap_or(0))
                };
                match create_backend(
                    shared.handle,
                    compositor.as_ref(),
                    width,
                    height,
                    prefer_hardware,
                ) {
                    Ok(created) => {
                        update_state(&shared, created.as_ref());
                        if width > 0 && height > 0 {
                            publish_resize(&shared, &event_tx, created.as_ref());
                        }
                        let _ = ready.send(Ok(created.texture_id()));
                        backend = Some(created);
                    }
                    Err(e) => {
                        let _ = ready.send(Err(e));
                        return;
                    }
                }
            }
            WorkerMessage::Tick => {
                if let Some(backend) = backend.as_mut() {
                    render_tick(
                        backend,
                        engine.as_ref(),
                        compositor.as_ref(),
                        &shared,
                        &event_tx,
                    );
                }
            }
            WorkerMessage::SwitchRendering { allow_hardware } => {
                backend = backend.and_then(|current| {
                    switch_backend(
                        current,
                        allow_hardware,
                        engine.as_ref(),
                        compositor.as_ref(),
                        &shared,
                        &event_tx,
                    )
                });
            }
            WorkerMessage::Dispose => {
                if let Some(mut backend) = backend.take() {
                    backend.dispose(compositor.as_ref());
                }
                break;
            }
        }
    }
    debug!(handle = %shared.handle, "render worker stopped");
}

/// One resize+render+notify pass.
fn render_tick(
    backend: &mut Box<dyn RenderBackend>,
    engine: &dyn NativeEngine,
    compositor: &dyn Compositor,
    shared: &Shared,
    event_tx: &Sender<PlatformEvent>,
) {
    let (target_w, target_h) = *shared.target.lock();
    let (video_w, video_h) = engine.video_dimensions();
    let width = target_w.unwrap_or(video_w);
    let height = target_h.unwrap_or(video_h);

    if width == 0 || height == 0 {
        trace!(handle = %shared.handle, "degenerate size, skipping render");
        return;
    }

    // Last gate before touching the surface: a tick racing dispose must not
    // render or notify.
    if shared.disposed.load(Ordering::Acquire) {
        return;
    }

    if (width, height) != backend.dimensions() {
        if let Err(e) = backend.resize(compositor, width, height) {
            warn!(handle = %shared.handle, error = %e, "surface resize failed");
            return;
        }
        update_state(shared, backend.as_ref());
        publish_resize(shared, event_tx, backend.as_ref());
    }

    if let Err(e) = backend.render(engine, compositor) {
        warn!(handle = %shared.handle, error = %e, "render failed");
        return;
    }
    compositor.mark_frame_available(backend.texture_id());

    let sink = shared.frame_sink.lock().clone();
    if let Some(sink) = sink {
        if let Some(frame) = backend.copy_frame_buffer() {
            sink.submit_frame(&frame);
        }
    }
}

/// Rebuild the backend in the other acceleration mode.
fn switch_backend(
    current: Box<dyn RenderBackend>,
    allow_hardware: bool,
    engine: &dyn NativeEngine,
    compositor: &dyn Compositor,
    shared: &Shared,
    event_tx: &Sender<PlatformEvent>,
) -> Option<Box<dyn RenderBackend>> {
    if current.is_hardware_accelerated() == allow_hardware {
        trace!(handle = %shared.handle, allow_hardware, "rendering mode already matches");
        return Some(current);
    }

    info!(handle = %shared.handle, allow_hardware, "switching rendering backend");

    // Mute video output across the swap so no corrupt frame becomes visible.
    if let Err(e) = engine.set_property("vid", PropertyValue::Text("no".into())) {
        warn!(handle = %shared.handle, error = %e, "failed to mute video output");
    }

    let (width, height) = current.dimensions();
    let mut current = current;
    current.dispose(compositor);

    let replacement =
        match create_backend(shared.handle, compositor, width, height, allow_hardware) {
            Ok(replacement) => {
                update_state(shared, replacement.as_ref());
                if width > 0 && height > 0 {
                    publish_resize(shared, event_tx, replacement.as_ref());
                }
                Some(replacement)
            }
            Err(e) => {
                warn!(handle = %shared.handle, error = %e, "backend rebuild failed");
                None
            }
        };

    if let Err(e) = engine.set_property("vid", PropertyValue::Text("auto".into())) {
        warn!(handle = %shared.handle, error = %e, "failed to restore video output");
    }
    replacement
}

fn update_state(shared: &Shared, backend: &dyn RenderBackend) {
    let (width, height) = backend.dimensions();
    let mut state = shared.state.lock();
    state.texture_id = backend.texture_id();
    state.width = width;
    state.height = height;
    state.hardware_accelerated = backend.is_hardware_accelerated();
}

fn publish_resize(shared: &Shared, event_tx: &Sender<PlatformEvent>, backend: &dyn RenderBackend) {
    let (width, height) = backend.dimensions();
    let rect = VideoRect::with_size(width as f64, height as f64);
    if !rect.is_degenerate() {
        shared.first_frame.store(true, Ordering::Release);
    }
    let event = PlatformEvent::Resize {
        handle: shared.handle,
        rect,
        texture_id: backend.texture_id(),
    };
    if event_tx.try_send(event).is_err() {
        warn!(handle = %shared.handle, "platform event channel full, dropping resize");
    }
}
