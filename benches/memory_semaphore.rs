use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use shared_image::engine::memory::estimate_readback_bytes;
use shared_image::engine::WeightedSemaphore;
use shared_image::ImageInfo;
use std::sync::{Arc, Condvar as StdCondvar, Mutex as StdMutex};
use std::thread;

// Baseline: std::sync semaphore with the same acquire/release protocol
#[derive(Debug)]
struct StdWeightedSemaphore {
    capacity: u64,
    state: StdMutex<u64>,
    cvar: StdCondvar,
}

impl StdWeightedSemaphore {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            state: StdMutex::new(capacity),
            cvar: StdCondvar::new(),
        }
    }

    fn acquire(&self, weight: u64) {
        let mut available = self.state.lock().unwrap();
        let need = weight.min(self.capacity);
        while *available < need {
            available = self.cvar.wait(available).unwrap();
        }
        *available -= need;
    }

    fn release(&self, weight: u64) {
        let mut available = self.state.lock().unwrap();
        let freed = (*available).saturating_add(weight).min(self.capacity);
        *available = freed;
        self.cvar.notify_all();
    }
}

fn hammer_semaphore_std(iterations: usize, threads: usize) {
    let sem = Arc::new(StdWeightedSemaphore::new(threads as u64));
    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let sem = Arc::clone(&sem);
        handles.push(thread::spawn(move || {
            for _ in 0..iterations {
                sem.acquire(1);
                sem.release(1);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn hammer_semaphore_readback(iterations: usize, threads: usize) {
    let sem = Arc::new(WeightedSemaphore::new(threads as u64));
    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let sem = Arc::clone(&sem);
        handles.push(thread::spawn(move || {
            for _ in 0..iterations {
                // permit is released on drop
                drop(sem.acquire(1));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn hammer_weighted_mix(iterations: usize, threads: usize) {
    // large and small read-backs contending for one budget
    let sem = Arc::new(WeightedSemaphore::new(64 * 1024 * 1024));
    let info = ImageInfo::n32_premul(512, 512);
    let mut handles = Vec::with_capacity(threads);
    for t in 0..threads {
        let sem = Arc::clone(&sem);
        let info = info.clone();
        handles.push(thread::spawn(move || {
            let side = if t % 4 == 0 { 4096 } else { 256 };
            let weight = estimate_readback_bytes(side, side, &info);
            for _ in 0..iterations {
                drop(sem.acquire(weight));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn bench_contention(c: &mut Criterion) {
    // 64 threads × 2_000 iterations = 128k acquire/release pairs
    let iterations = 2_000;
    let threads = 64;

    c.bench_function("std_mutex_semaphore", |b| {
        b.iter_batched(
            || (),
            |_| hammer_semaphore_std(iterations, threads),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("readback_semaphore", |b| {
        b.iter_batched(
            || (),
            |_| hammer_semaphore_readback(iterations, threads),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("readback_semaphore_weighted_mix", |b| {
        b.iter_batched(
            || (),
            |_| hammer_weighted_mix(iterations / 4, threads),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(memory_semaphore, bench_contention);
criterion_main!(memory_semaphore);
