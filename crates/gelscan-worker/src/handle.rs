//! Displayable image handles.
//!
//! Processed rasters are published as opaque handles rather than pixel
//! buffers. The encoded PNG lives in a [`HandleStore`] until the handle is
//! revoked, which the coordinator does exactly once, right after the
//! handle has been replaced by a newer publication of the same output.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Opaque reference to a displayable PNG, e.g. `handle:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHandle(String);

impl ImageHandle {
    /// The handle as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage behind published handles.
pub trait HandleStore {
    /// Store encoded PNG bytes and return a fresh handle to them.
    fn create(&self, png: Vec<u8>) -> ImageHandle;

    /// Release a handle. Returns `false` if it was not live.
    fn revoke(&self, handle: &ImageHandle) -> bool;
}

#[derive(Debug, Default)]
struct HandleTable {
    next: u64,
    live: HashMap<ImageHandle, Arc<[u8]>>,
}

/// In-memory handle store, shareable between the worker thread and the
/// host.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandles {
    table: Arc<Mutex<HandleTable>>,
}

impl MemoryHandles {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The PNG bytes behind `handle`, or `None` once it has been revoked.
    #[must_use]
    pub fn resolve(&self, handle: &ImageHandle) -> Option<Arc<[u8]>> {
        self.lock().live.get(handle).cloned()
    }

    /// Number of handles created and not yet revoked.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> MutexGuard<'_, HandleTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HandleStore for MemoryHandles {
    fn create(&self, png: Vec<u8>) -> ImageHandle {
        let mut table = self.lock();
        let handle = ImageHandle(format!("handle:{}", table.next));
        table.next = table.next.saturating_add(1);
        table.live.insert(handle.clone(), png.into());
        handle
    }

    fn revoke(&self, handle: &ImageHandle) -> bool {
        self.lock().live.remove(handle).is_some()
    }
}
