// src/engine/identity.rs
//
// Process-wide image ids and stale-id notification.
//
// Ids come from one atomic counter and are never reused within a process.
// Caches that key entries by id register a listener and are told when an
// id goes stale; they never hold a reference to the image itself.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique image identifier. Zero is never handed out.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    pub fn next() -> Self {
        ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageId({})", self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type StaleListener = Arc<dyn Fn(ImageId) + Send + Sync>;

/// Returned by [`register_stale_listener`]; pass back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

fn listeners() -> &'static RwLock<Vec<(u64, StaleListener)>> {
    static LISTENERS: OnceLock<RwLock<Vec<(u64, StaleListener)>>> = OnceLock::new();
    LISTENERS.get_or_init(|| RwLock::new(Vec::new()))
}

pub fn register_stale_listener<F>(listener: F) -> ListenerHandle
where
    F: Fn(ImageId) + Send + Sync + 'static,
{
    let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
    listeners().write().push((id, Arc::new(listener)));
    ListenerHandle(id)
}

pub fn unregister_stale_listener(handle: ListenerHandle) -> bool {
    let mut guard = listeners().write();
    let before = guard.len();
    guard.retain(|(id, _)| *id != handle.0);
    guard.len() != before
}

/// Tell every registered listener that `id` is stale.
pub fn notify_stale(id: ImageId) {
    // Snapshot so listeners may (un)register without deadlocking.
    let snapshot: Vec<StaleListener> = listeners()
        .read()
        .iter()
        .map(|(_, l)| Arc::clone(l))
        .collect();
    trace!(image_id = id.get(), listeners = snapshot.len(), "stale image id");
    for listener in snapshot {
        listener(id);
    }
}
