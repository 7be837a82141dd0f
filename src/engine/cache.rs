// src/engine/cache.rs
//
// Process-wide raster cache for lazily generated images.
//
// Entries are keyed by ImageId and hold only the decoded pixels. The cache
// learns about dead images through the stale-id listener; it never points
// back at an Image.

use crate::engine::config::PipelineConfig;
use crate::engine::identity::{register_stale_listener, ImageId};
use crate::engine::pixmap::Pixmap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::trace;

#[derive(Debug)]
struct Entry {
    pixmap: Pixmap,
    bytes: usize,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ImageId, Entry>,
    total_bytes: usize,
    tick: u64,
}

#[derive(Debug)]
pub struct BitmapCache {
    budget_bytes: usize,
    state: Mutex<CacheState>,
}

impl BitmapCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The shared cache, purged on stale-id notifications.
    pub fn global() -> &'static BitmapCache {
        static GLOBAL: OnceLock<BitmapCache> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            register_stale_listener(|id| {
                BitmapCache::global().purge(id);
            });
            BitmapCache::new(PipelineConfig::global().raster_cache_bytes)
        })
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn find(&self, id: ImageId) -> Option<Pixmap> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        let entry = state.entries.get_mut(&id)?;
        entry.last_used = tick;
        trace!(image_id = id.get(), "raster cache hit");
        Some(entry.pixmap.clone())
    }

    /// Insert pixels for `id`. Returns false when they exceed the whole budget.
    pub fn insert(&self, id: ImageId, pixmap: Pixmap) -> bool {
        let bytes = pixmap.byte_size();
        if bytes > self.budget_bytes {
            return false;
        }
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        if let Some(old) = state.entries.insert(
            id,
            Entry {
                pixmap,
                bytes,
                last_used: tick,
            },
        ) {
            state.total_bytes -= old.bytes;
        }
        state.total_bytes += bytes;
        while state.total_bytes > self.budget_bytes {
            let victim = state
                .entries
                .iter()
                .filter(|(key, _)| **key != id)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(key, _)| *key);
            let Some(victim) = victim else { break };
            if let Some(evicted) = state.entries.remove(&victim) {
                state.total_bytes -= evicted.bytes;
                trace!(image_id = victim.get(), bytes = evicted.bytes, "raster cache evict");
            }
        }
        true
    }

    pub fn purge(&self, id: ImageId) -> bool {
        let mut state = self.state.lock();
        match state.entries.remove(&id) {
            Some(entry) => {
                state.total_bytes -= entry.bytes;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.state.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }
}
