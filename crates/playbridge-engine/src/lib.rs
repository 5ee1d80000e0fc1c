//! Event-to-state bridge and command dispatch for the native playback engine.
//!
//! The native engine is an external collaborator reached through the
//! [`NativeEngine`] trait. This crate owns the pieces that sit between it and
//! the rest of the system: the [`CommandDispatcher`] serializing mutating
//! calls behind a one-time readiness gate, the [`EventTranslator`] draining
//! the engine's notification stream on a dedicated thread, the [`StateStore`]
//! publishing per-field playback state, and the [`Player`] facade that owns
//! the engine handle.

mod dispatcher;
mod error;
mod native;
mod player;
mod state;
mod translator;

pub use dispatcher::CommandDispatcher;
pub use error::{EngineError, EngineResult, NativeError, NativeResult};
pub use native::{NativeEngine, SurfaceHandle, OBSERVED_PROPERTIES};
pub use player::Player;
pub use state::StateStore;
pub use translator::EventTranslator;

/// Capacity of each per-field broadcast channel.
pub const STATE_CHANNEL_CAPACITY: usize = 64;
