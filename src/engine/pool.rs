// src/engine/pool.rs
//
// Global thread pool for backend queue work (asynchronous read-back).
//
// A single pool is shared by every host backend so that concurrent
// contexts do not oversubscribe the CPU.
//
// - Uses std::thread::available_parallelism() to respect cgroup/CPU quota
// - SHARED_IMAGE_READBACK_THREADS overrides the detected count
// - Pool is initialized lazily on first use; later config changes have no effect

use crate::engine::config::PipelineConfig;
use rayon::ThreadPool;
use std::sync::OnceLock;
use tracing::warn;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn thread_count() -> usize {
    PipelineConfig::global().readback_threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_RAYON_THREADS)
    })
}

/// The dedicated pool, or `None` if no pool could be built.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = thread_count().max(MIN_RAYON_THREADS);
            let built = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("shared-image-readback-{i}"))
                .build()
                .or_else(|e| {
                    warn!(error = %e, num_threads, "falling back to a single read-back thread");
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(MIN_RAYON_THREADS)
                        .build()
                });
            match built {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "no dedicated read-back pool; using rayon's global pool");
                    None
                }
            }
        })
        .as_ref()
}

/// Run `job` on the read-back pool.
pub fn spawn<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    match get_pool() {
        Some(pool) => pool.spawn(job),
        None => rayon::spawn(job),
    }
}
