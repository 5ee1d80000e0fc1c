//! Serialized command dispatch gated on engine initialization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

use playbridge_ipc::{PropertyFormat, PropertyValue};

use crate::error::EngineResult;
use crate::native::{NativeEngine, OBSERVED_PROPERTIES};
use crate::state::StateStore;

/// Serializes mutating calls to the native engine and holds them back until
/// initialization has completed.
///
/// Commands from one caller are forwarded in dispatch order; no ordering is
/// guaranteed between concurrent callers, and the native engine is not
/// assumed to process them atomically. Native failures are published on the
/// error channel rather than returned, so dispatch stays fire-and-forget.
pub struct CommandDispatcher {
    engine: Arc<dyn NativeEngine>,
    store: Arc<StateStore>,
    initialized: AtomicBool,
    init_notify: Notify,
}

impl CommandDispatcher {
    /// Create a dispatcher for an engine instance. Not ready until
    /// [`initialize`](Self::initialize) runs.
    pub fn new(engine: Arc<dyn NativeEngine>, store: Arc<StateStore>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            store,
            initialized: AtomicBool::new(false),
            init_notify: Notify::new(),
        })
    }

    /// Register the initial property observations and open the gate.
    ///
    /// Runs once per handle lifetime; repeated calls are no-ops.
    #[instrument(name = "dispatcher_initialize", skip(self))]
    pub fn initialize(&self) -> EngineResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            debug!("already initialized");
            return Ok(());
        }

        for (name, format) in OBSERVED_PROPERTIES {
            self.engine.observe_property(name, *format)?;
        }

        self.initialized.store(true, Ordering::Release);
        self.init_notify.notify_waiters();
        debug!("dispatcher initialized");
        Ok(())
    }

    /// The native engine behind this dispatcher.
    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    /// Whether initialization has completed.
    pub fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Suspend until the engine handle and initial observations are
    /// established. Resolves immediately once initialization has happened.
    pub async fn ready(&self) {
        loop {
            let notified = self.init_notify.notified();
            tokio::pin!(notified);
            // Register the waiter before re-checking the flag, so an
            // initialize() landing in between still wakes this task.
            notified.as_mut().enable();
            if self.initialized.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Issue a space-joined token command once ready.
    pub async fn command(&self, args: &[&str]) {
        self.ready().await;
        self.forward_command(args);
    }

    /// Write a typed property once ready.
    pub async fn set_property(&self, name: &str, value: PropertyValue) {
        self.ready().await;
        self.forward_set_property(name, value);
    }

    /// Read a property once ready. Synchronous relative to the native call;
    /// native failures are published and yield `None`.
    pub async fn get_property(&self, name: &str, format: PropertyFormat) -> Option<PropertyValue> {
        self.ready().await;
        self.get_property_now(name, format)
    }

    /// Issue a command without suspending. Dropped with a warning when the
    /// gate is still closed; intended for callers that only exist after
    /// initialization (PiP queries, lifecycle hooks).
    pub fn command_now(&self, args: &[&str]) {
        if !self.is_ready() {
            warn!(?args, "command dropped before initialization");
            return;
        }
        self.forward_command(args);
    }

    /// Write a property without suspending; same gate policy as
    /// [`command_now`](Self::command_now).
    pub fn set_property_now(&self, name: &str, value: PropertyValue) {
        if !self.is_ready() {
            warn!(name, "property write dropped before initialization");
            return;
        }
        self.forward_set_property(name, value);
    }

    /// Read a property without suspending.
    pub fn get_property_now(&self, name: &str, format: PropertyFormat) -> Option<PropertyValue> {
        if !self.is_ready() {
            warn!(name, "property read dropped before initialization");
            return None;
        }
        match self.engine.get_property(name, format) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(name, error = %e, "property read failed");
                self.store.publish_error(e);
                None
            }
        }
    }

    fn forward_command(&self, args: &[&str]) {
        debug!(?args, "forwarding command");
        if let Err(e) = self.engine.command(args) {
            warn!(?args, error = %e, "command failed");
            self.store.publish_error(e);
        }
    }

    fn forward_set_property(&self, name: &str, value: PropertyValue) {
        debug!(name, ?value, "forwarding property write");
        if let Err(e) = self.engine.set_property(name, value) {
            warn!(name, error = %e, "property write failed");
            self.store.publish_error(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NativeError, NativeResult};
    use crate::native::SurfaceHandle;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeEngine {
        commands: Mutex<Vec<Vec<String>>>,
        observed: Mutex<Vec<(String, PropertyFormat)>>,
        fail_commands: bool,
    }

    impl NativeEngine for FakeEngine {
        fn command(&self, args: &[&str]) -> NativeResult<()> {
            if self.fail_commands {
                return Err(NativeError::new(-10, "command rejected"));
            }
            self.commands
                .lock()
                .push(args.iter().map(|s| s.to_string()).collect());
            Ok(())
        }

        fn set_property(&self, name: &str, value: PropertyValue) -> NativeResult<()> {
            self.commands
                .lock()
                .push(vec!["set".into(), name.into(), format!("{value:?}")]);
            Ok(())
        }

        fn get_property(&self, _name: &str, _format: PropertyFormat) -> NativeResult<PropertyValue> {
            Ok(PropertyValue::Double(42.0))
        }

        fn observe_property(&self, name: &str, format: PropertyFormat) -> NativeResult<()> {
            self.observed.lock().push((name.to_string(), format));
            Ok(())
        }

        fn video_dimensions(&self) -> (u32, u32) {
            (0, 0)
        }

        fn render_software(
            &self,
            _width: u32,
            _height: u32,
            _stride: u32,
            _pixels: &mut [u8],
        ) -> NativeResult<()> {
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

    #[tokio::test]
    async fn test_ready_resolves_after_initialize() {
        let engine = Arc::new(FakeEngine::default());
        let store = Arc::new(StateStore::new());
        let dispatcher = CommandDispatcher::new(engine.clone(), store);

        let waiter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.ready().await })
        };

        dispatcher.initialize().unwrap();
        waiter.await.unwrap();

        // Late awaiters resolve immediately.
        dispatcher.ready().await;
        assert_eq!(engine.observed.lock().len(), OBSERVED_PROPERTIES.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ready_never_hangs_when_racing_initialize() {
        // Many waiters racing the gate opening; a lost wakeup shows up as a
        // timeout.
        for _ in 0..100 {
            let engine = Arc::new(FakeEngine::default());
            let store = Arc::new(StateStore::new());
            let dispatcher = CommandDispatcher::new(engine, store);

            let waiters: Vec<_> = (0..4)
                .map(|_| {
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move { dispatcher.ready().await })
                })
                .collect();

            let initializer = {
                let dispatcher = dispatcher.clone();
                tokio::task::spawn_blocking(move || dispatcher.initialize())
            };

            for waiter in waiters {
                tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
                    .await
                    .expect("ready() lost the initialize wakeup")
                    .unwrap();
            }
            initializer.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_commands_forward_in_dispatch_order() {
        let engine = Arc::new(FakeEngine::default());
        let store = Arc::new(StateStore::new());
        let dispatcher = CommandDispatcher::new(engine.clone(), store);
        dispatcher.initialize().unwrap();

        dispatcher.command(&["seek", "1", "absolute"]).await;
        dispatcher.command(&["seek", "2", "absolute"]).await;

        let commands = engine.commands.lock();
        assert_eq!(commands[0], vec!["seek", "1", "absolute"]);
        assert_eq!(commands[1], vec!["seek", "2", "absolute"]);
    }

    #[tokio::test]
    async fn test_native_failure_publishes_error() {
        let engine = Arc::new(FakeEngine {
            fail_commands: true,
            ..Default::default()
        });
        let store = Arc::new(StateStore::new());
        let mut errors = store.subscribe_errors();
        let dispatcher = CommandDispatcher::new(engine, store);
        dispatcher.initialize().unwrap();

        dispatcher.command(&["playlist-clear"]).await;
        assert_eq!(errors.try_recv().unwrap().code, -10);
    }

    #[test]
    fn test_command_now_dropped_before_initialize() {
        let engine = Arc::new(FakeEngine::default());
        let store = Arc::new(StateStore::new());
        let dispatcher = CommandDispatcher::new(engine.clone(), store);

        dispatcher.command_now(&["playlist-clear"]);
        assert!(engine.commands.lock().is_empty());
    }
}
