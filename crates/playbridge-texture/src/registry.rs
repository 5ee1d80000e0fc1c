//! Handle → texture output lookup.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use playbridge_ipc::EngineHandle;

use crate::output::TextureOutput;

/// Maps engine handles to their texture outputs.
///
/// An explicitly owned instance with its lifetime tied to the session object,
/// not a process-wide singleton. Keys are claimed with [`reserve`] in one
/// lock scope before any asynchronous surface registration starts, so two
/// concurrent creations for the same handle cannot both proceed; a
/// reservation is fulfilled with the finished output or rolled back with
/// [`remove`]. Entries are touched only by the owning output's lifecycle
/// methods (single-writer discipline); the platform callback path only looks
/// up. Lookups after removal, or against a still-pending reservation, return
/// `None` so late native callbacks degrade to no-ops.
///
/// [`reserve`]: Self::reserve
/// [`remove`]: Self::remove
pub struct OutputRegistry {
    entries: Mutex<HashMap<EngineHandle, Option<Arc<TextureOutput>>>>,
}

impl OutputRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a handle before its output exists. Returns `false` when the
    /// handle is already reserved or live.
    pub(crate) fn reserve(&self, handle: EngineHandle) -> bool {
        match self.entries.lock().entry(handle) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(%handle, "reserving texture output slot");
                slot.insert(None);
                true
            }
        }
    }

    /// Fulfill a reservation with the finished output.
    pub(crate) fn fulfill(&self, handle: EngineHandle, output: Arc<TextureOutput>) {
        debug!(%handle, "registering texture output");
        self.entries.lock().insert(handle, Some(output));
    }

    /// Remove the entry (or unfulfilled reservation) for a handle.
    pub(crate) fn remove(&self, handle: EngineHandle) {
        debug!(%handle, "removing texture output");
        self.entries.lock().remove(&handle);
    }

    /// Look up the output for a handle.
    pub fn get(&self, handle: EngineHandle) -> Option<Arc<TextureOutput>> {
        self.entries.lock().get(&handle).and_then(|slot| slot.clone())
    }

    /// Number of live or pending outputs.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no outputs are live or pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}
