// src/engine/memory.rs
//
// Byte-weighted backpressure for read-back buffers.
//
// Every asynchronous read-back holds a permit sized to the buffers it
// allocates, so a burst of large requests queues instead of exhausting memory.

use crate::engine::color::ImageInfo;
use crate::engine::config::PipelineConfig;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, OnceLock};

/// Lower bound for any weight to avoid zero-ish permits
const MIN_PERMIT_BYTES: u64 = 4 * 1024;

/// Capacity used when the config does not set a budget.
const FALLBACK_SEMAPHORE_CAPACITY: u64 = 1024 * 1024 * 1024;

/// In-memory weighted semaphore for byte-based backpressure
#[derive(Debug)]
pub struct WeightedSemaphore {
    capacity: u64,
    state: Mutex<u64>, // available bytes
    cvar: Condvar,
}

#[derive(Debug)]
pub struct MemoryPermit {
    sem: Arc<WeightedSemaphore>,
    weight: u64,
}

impl MemoryPermit {
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

impl WeightedSemaphore {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            state: Mutex::new(capacity),
            cvar: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        *self.state.lock()
    }

    pub fn acquire(self: &Arc<Self>, weight: u64) -> MemoryPermit {
        let mut available = self.state.lock();
        // clamp absurd weights to capacity to avoid deadlock
        let need = weight.min(self.capacity);
        while *available < need {
            self.cvar.wait(&mut available);
        }
        *available -= need;
        MemoryPermit {
            sem: Arc::clone(self),
            weight: need,
        }
    }

    pub fn try_acquire(self: &Arc<Self>, weight: u64) -> Option<MemoryPermit> {
        let mut available = self.state.lock();
        let need = weight.min(self.capacity);
        if *available < need {
            return None;
        }
        *available -= need;
        Some(MemoryPermit {
            sem: Arc::clone(self),
            weight: need,
        })
    }

    fn release(&self, weight: u64) {
        let mut available = self.state.lock();
        let freed = (*available).saturating_add(weight).min(self.capacity);
        *available = freed;
        // Waiters have heterogeneous weights; notify_one could starve a small one.
        self.cvar.notify_all();
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.sem.release(self.weight);
    }
}

/// Bytes a read-back into `dst` from a `src_width` x `src_height` region
/// allocates: the native copy plus the destination buffer.
pub fn estimate_readback_bytes(src_width: i32, src_height: i32, dst: &ImageInfo) -> u64 {
    let src = src_width.max(0) as u64 * src_height.max(0) as u64 * 4;
    let out = dst.min_row_bytes64().saturating_mul(dst.height().max(0) as u64);
    src.saturating_add(out).max(MIN_PERMIT_BYTES)
}

static GLOBAL_READBACK_SEMAPHORE: OnceLock<Arc<WeightedSemaphore>> = OnceLock::new();

/// Get global weighted semaphore for read-back backpressure
pub fn readback_semaphore() -> Arc<WeightedSemaphore> {
    GLOBAL_READBACK_SEMAPHORE
        .get_or_init(|| {
            let capacity = PipelineConfig::global()
                .readback_budget_bytes
                .unwrap_or(FALLBACK_SEMAPHORE_CAPACITY)
                .max(MIN_PERMIT_BYTES);
            Arc::new(WeightedSemaphore::new(capacity))
        })
        .clone()
}
