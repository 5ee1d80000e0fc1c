//! Per-instance texture outputs bridging decoded frames to the platform
//! compositor.
//!
//! Each engine handle owns at most one [`TextureOutput`], which runs a
//! dedicated render worker, keeps the surface sized to the active video plane
//! (or a fixed override), and publishes geometry/identity changes to the
//! platform layer. The [`OutputRegistry`] routes late native callbacks to the
//! right instance.

mod backend;
mod error;
mod output;
mod registry;

pub use backend::{HardwareTexture, RenderBackend, SoftwareTexture};
pub use error::{TextureError, TextureResult};
pub use output::{TextureOutput, TextureState};
pub use registry::OutputRegistry;

use playbridge_ipc::{EngineHandle, FrameBuffer};
use playbridge_engine::SurfaceHandle;

/// Capacity of the render worker mailbox. Ticks are coalesced: a full
/// mailbox means a render is already pending, so further ticks are dropped.
pub const RENDER_CHANNEL_CAPACITY: usize = 4;

/// Which kind of surface to register with the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// GPU-backed surface rendered into directly by the native engine.
    Hardware,

    /// CPU pixel buffer uploaded by the compositor.
    Software,
}

/// Parameters for a surface registration.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDescriptor {
    pub handle: EngineHandle,
    pub width: u32,
    pub height: u32,
    pub kind: SurfaceKind,
}

/// Identifiers assigned by the compositor for a registered surface.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceIds {
    /// Platform-assigned texture identifier.
    pub texture_id: i64,

    /// Native GPU surface to render into; absent for software surfaces.
    pub surface: Option<SurfaceHandle>,
}

/// Platform compositor boundary.
///
/// Registration is asynchronous on the platform side: the compositor invokes
/// `on_assigned` once the texture identifier exists. The platform layer only
/// ever reads published geometry and identifiers, never the surface itself.
pub trait Compositor: Send + Sync {
    /// Whether this platform can host GPU surfaces (false in simulated
    /// environments, forcing the software path).
    fn supports_hardware_surfaces(&self) -> bool;

    /// Register a surface; `on_assigned` fires once identifiers exist.
    fn register_surface(&self, desc: SurfaceDescriptor, on_assigned: Box<dyn FnOnce(SurfaceIds) + Send>);

    /// Resize a registered surface. May hand back new identifiers.
    fn resize_surface(&self, texture_id: i64, width: u32, height: u32) -> TextureResult<SurfaceIds>;

    /// Remove a surface. Late calls for unknown identifiers are no-ops.
    fn unregister_surface(&self, texture_id: i64);

    /// Publish a software frame for upload.
    fn present_software_frame(&self, texture_id: i64, frame: &FrameBuffer);

    /// Tell the platform a new frame can be composited.
    fn mark_frame_available(&self, texture_id: i64);
}

/// Consumer of rendered frames (the picture-in-picture feed).
pub trait FrameSink: Send + Sync {
    /// Offer one rendered frame. Implementations must not block the render
    /// worker.
    fn submit_frame(&self, frame: &FrameBuffer);
}
