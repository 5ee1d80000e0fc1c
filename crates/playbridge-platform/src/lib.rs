//! Platform texture/compositor channel.
//!
//! One [`PlatformChannel`] per process routes [`PlatformRequest`]s to the
//! per-handle session (player, texture output, PiP bridge) and forwards the
//! host application's lifecycle transitions. Requests naming an unknown
//! handle are silent no-ops.
//!
//! [`PlatformRequest`]: playbridge_ipc::PlatformRequest

mod channel;
mod error;

pub use channel::{PlatformChannel, PlatformResponse};
pub use error::{PlatformError, PlatformResult};
