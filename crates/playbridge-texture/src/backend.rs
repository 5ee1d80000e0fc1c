//! Hardware and software render backends behind one capability interface.

use bytes::Bytes;
use tracing::{debug, info, warn};

use playbridge_engine::{NativeEngine, SurfaceHandle};
use playbridge_ipc::{EngineHandle, FrameBuffer, PixelFormat};

use crate::error::{TextureError, TextureResult};
use crate::{Compositor, SurfaceDescriptor, SurfaceIds, SurfaceKind};

/// One render surface variant.
///
/// `switch_rendering` reconstructs the variant rather than mutating it in
/// place, so implementations never change acceleration mode after creation.
pub trait RenderBackend: Send {
    /// Platform-assigned texture identifier.
    fn texture_id(&self) -> i64;

    /// Current backing surface dimensions.
    fn dimensions(&self) -> (u32, u32);

    /// Whether this variant renders through a GPU surface.
    fn is_hardware_accelerated(&self) -> bool;

    /// Reallocate the backing surface for a new size.
    fn resize(&mut self, compositor: &dyn Compositor, width: u32, height: u32)
        -> TextureResult<()>;

    /// Render the engine's current frame into the surface.
    fn render(&mut self, engine: &dyn NativeEngine, compositor: &dyn Compositor)
        -> TextureResult<()>;

    /// Copy of the last rendered frame, if this variant can read it back.
    fn copy_frame_buffer(&self) -> Option<FrameBuffer>;

    /// Release the surface. Called at most once, from the owning worker.
    fn dispose(&mut self, compositor: &dyn Compositor);
}

/// Pick a backend, preferring hardware with a logged software fallback.
///
/// Blocks the calling (worker) thread on the compositor's registration
/// callback; the caller-facing rendezvous happens one level up.
pub(crate) fn create_backend(
    handle: EngineHandle,
    compositor: &dyn Compositor,
    width: u32,
    height: u32,
    prefer_hardware: bool,
) -> TextureResult<Box<dyn RenderBackend>> {
    if prefer_hardware && compositor.supports_hardware_surfaces() {
        match HardwareTexture::create(handle, compositor, width, height) {
            Ok(backend) => {
                info!(%handle, "using hardware-accelerated texture");
                return Ok(Box::new(backend));
            }
            Err(e) => {
                warn!(%handle, error = %e, "hardware surface unavailable, falling back to software");
            }
        }
    }
    let backend = SoftwareTexture::create(handle, compositor, width, height)?;
    info!(%handle, "using software texture");
    Ok(Box::new(backend))
}

fn register(
    compositor: &dyn Compositor,
    desc: SurfaceDescriptor,
) -> TextureResult<SurfaceIds> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    compositor.register_surface(
        desc,
        Box::new(move |ids| {
            let _ = tx.send(ids);
        }),
    );
    rx.recv()
        .map_err(|_| TextureError::Registration("registration callback abandoned".into()))
}

/// GPU-backed surface the native engine renders into directly.
pub struct HardwareTexture {
    texture_id: i64,
    surface: SurfaceHandle,
    width: u32,
    height: u32,
}

impl HardwareTexture {
    pub(crate) fn create(
        handle: EngineHandle,
        compositor: &dyn Compositor,
        width: u32,
        height: u32,
    ) -> TextureResult<Self> {
        let ids = register(
            compositor,
            SurfaceDescriptor {
                handle,
                width,
                height,
                kind: SurfaceKind::Hardware,
            },
        )?;
        let surface = ids
            .surface
            .ok_or_else(|| TextureError::Registration("no GPU surface assigned".into()))?;

        debug!(%handle, texture_id = ids.texture_id, "hardware surface registered");
        Ok(Self {
            texture_id: ids.texture_id,
            surface,
            width,
            height,
        })
    }
}

impl RenderBackend for HardwareTexture {
    fn texture_id(&self) -> i64 {
        self.texture_id
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_hardware_accelerated(&self) -> bool {
        true
    }

    fn resize(
        &mut self,
        compositor: &dyn Compositor,
        width: u32,
        height: u32,
    ) -> TextureResult<()> {
        let ids = compositor.resize_surface(self.texture_id, width, height)?;
        self.texture_id = ids.texture_id;
        if let Some(surface) = ids.surface {
            self.surface = surface;
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn render(
        &mut self,
        engine: &dyn NativeEngine,
        _compositor: &dyn Compositor,
    ) -> TextureResult<()> {
        engine.render_hardware(self.surface, self.width, self.height)?;
        Ok(())
    }

    fn copy_frame_buffer(&self) -> Option<FrameBuffer> {
        // GPU surfaces cannot be read back here; consumers needing pixels
        // switch the output to the software variant first.
        None
    }

    fn dispose(&mut self, compositor: &dyn Compositor) {
        compositor.unregister_surface(self.texture_id);
    }
}

/// CPU pixel buffer the native engine renders into, uploaded by the
/// compositor.
pub struct SoftwareTexture {
    texture_id: i64,
    width: u32,
    height: u32,
    stride: u32,
    pixels: Vec<u8>,
}

impl SoftwareTexture {
    pub(crate) fn create(
        handle: EngineHandle,
        compositor: &dyn Compositor,
        width: u32,
        height: u32,
    ) -> TextureResult<Self> {
        let (stride, pixels) = buffer_for(width, height)?;
        let ids = register(
            compositor,
            SurfaceDescriptor {
                handle,
                width,
                height,
                kind: SurfaceKind::Software,
            },
        )?;

        debug!(%handle, texture_id = ids.texture_id, "software surface registered");
        Ok(Self {
            texture_id: ids.texture_id,
            width,
            height,
            stride,
            pixels,
        })
    }
}

/// Row stride and a zeroed pixel buffer for the given dimensions, with the
/// byte count computed in `usize`. Dimensions whose buffer size is not
/// representable are rejected rather than wrapped.
fn buffer_for(width: u32, height: u32) -> TextureResult<(u32, Vec<u8>)> {
    let overflow = || TextureError::DimensionsOverflow { width, height };
    let stride = width
        .checked_mul(PixelFormat::Bgra8.bytes_per_pixel())
        .ok_or_else(overflow)?;
    let bytes = (stride as usize)
        .checked_mul(height as usize)
        .ok_or_else(overflow)?;
    Ok((stride, vec![0; bytes]))
}

impl RenderBackend for SoftwareTexture {
    fn texture_id(&self) -> i64 {
        self.texture_id
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_hardware_accelerated(&self) -> bool {
        false
    }

    fn resize(
        &mut self,
        compositor: &dyn Compositor,
        width: u32,
        height: u32,
    ) -> TextureResult<()> {
        let (stride, pixels) = buffer_for(width, height)?;
        let ids = compositor.resize_surface(self.texture_id, width, height)?;
        self.texture_id = ids.texture_id;
        self.width = width;
        self.height = height;
        self.stride = stride;
        self.pixels = pixels;
        Ok(())
    }

    fn render(
        &mut self,
        engine: &dyn NativeEngine,
        compositor: &dyn Compositor,
    ) -> TextureResult<()> {
        engine.render_software(self.width, self.height, self.stride, &mut self.pixels)?;
        if let Some(frame) = self.copy_frame_buffer() {
            compositor.present_software_frame(self.texture_id, &frame);
        }
        Ok(())
    }

    fn copy_frame_buffer(&self) -> Option<FrameBuffer> {
        if self.pixels.is_empty() {
            return None;
        }
        Some(FrameBuffer {
            data: Bytes::copy_from_slice(&self.pixels),
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: PixelFormat::Bgra8,
        })
    }

    fn dispose(&mut self, compositor: &dyn Compositor) {
        compositor.unregister_surface(self.texture_id);
        self.pixels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_layout_for_normal_dimensions() {
        let (stride, pixels) = buffer_for(640, 480).unwrap();
        assert_eq!(stride, 640 * 4);
        assert_eq!(pixels.len(), (640 * 4 * 480) as usize);
    }

    #[test]
    fn test_buffer_layout_rejects_overflowing_dimensions() {
        assert!(matches!(
            buffer_for(u32::MAX, 2),
            Err(TextureError::DimensionsOverflow { .. })
        ));
    }
}
