//! Benchmarks for the concurrent queue and signal dispatch
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sliceflow::pipeline::{slot_fn, Signal};
use sliceflow::queue::{ConcurrentQueue, QueueControl};
use sliceflow::record::{Data, DataHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bench_single_thread_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_single_thread");
    group.throughput(Throughput::Elements(1));

    let queue = ConcurrentQueue::<u64>::unbounded();
    let mut i = 0u64;
    group.bench_function("push_try_pop", |b| {
        b.iter(|| {
            queue.push(black_box(i)).ok();
            black_box(queue.try_pop().ok());
            i = i.wrapping_add(1);
        });
    });

    group.finish();
}

fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_cross_thread");
    group.sample_size(20);

    for capacity in [0usize, 16, 1024].iter() {
        let items = 10_000u64;
        group.throughput(Throughput::Elements(items));
        group.bench_with_input(BenchmarkId::new("spsc", capacity), capacity, |b, &capacity| {
            b.iter(|| {
                let queue = Arc::new(if capacity == 0 {
                    ConcurrentQueue::<u64>::unbounded()
                } else {
                    ConcurrentQueue::<u64>::bounded(capacity)
                });
                let consumer = {
                    let queue = queue.clone();
                    thread::spawn(move || {
                        let mut sum = 0u64;
                        while let Ok(item) = queue.pop_timed(Duration::from_millis(100)) {
                            sum = sum.wrapping_add(item);
                        }
                        sum
                    })
                };
                for item in 0..items {
                    queue.push(item).ok();
                }
                queue.close();
                black_box(consumer.join().ok());
            });
        });
    }

    group.finish();
}

fn bench_signal_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_dispatch");
    group.throughput(Throughput::Elements(1));

    for fan_out in [1usize, 4, 16].iter() {
        let signal = Signal::<DataHandle>::new("data");
        let counter = Arc::new(AtomicU64::new(0));
        for i in 0..*fan_out {
            let counter = counter.clone();
            signal
                .connect(&slot_fn::<DataHandle, _>(&format!("sink{}", i), move |handle| {
                    counter.fetch_add(handle.sequence(), Ordering::Relaxed);
                    Ok(())
                }))
                .ok();
        }
        signal.port().seal();

        let handle = DataHandle::new(Data::new(1));
        group.bench_with_input(BenchmarkId::new("emit", fan_out), &handle, |b, handle| {
            b.iter(|| signal.emit(black_box(handle)).ok());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_push_pop,
    bench_cross_thread,
    bench_signal_dispatch
);
criterion_main!(benches);
