//! Benchmarks for the queue and dispatch hot paths.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use procpool::pool::{
    Dispatcher, Handler, QueuedRequest, StatsTracker, Transport, WorkQueue, WorkerId, WorkerPool,
};
use procpool::worker::TerminationReason;
use serde_json::{Value, json};
use std::hint::black_box;
use std::io;
use std::time::Duration;

/// Transport that accepts every send.
struct Sink;

impl Transport for Sink {
    fn send(&mut self, _worker: WorkerId, action: &Value) -> io::Result<()> {
        black_box(action);
        Ok(())
    }

    fn termination(&mut self, _worker: WorkerId) -> Option<TerminationReason> {
        None
    }

    fn shutdown(&mut self, _grace: Duration) {}
}

fn noop() -> Handler<u64> {
    Box::new(|_, _| Ok(()))
}

fn ready_pool(size: u32) -> WorkerPool<u64> {
    let mut pool = WorkerPool::new();
    for raw in 1..=size {
        let id = WorkerId::new(raw);
        pool.register(id);
        pool.complete_handshake(id).unwrap();
    }
    pool
}

fn bench_queue(c: &mut Criterion) {
    c.bench_function("queue_push_pop_1000", |b| {
        b.iter(|| {
            let mut queue = WorkQueue::new();
            for n in 0..1000u64 {
                queue.push_back(QueuedRequest::new(json!(n), n, noop()));
            }
            while let Some(request) = queue.pop_front() {
                black_box(request);
            }
        })
    });
}

fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release");
    for size in [1u32, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut pool = ready_pool(size);
            b.iter(|| {
                let id = pool.acquire_free().unwrap();
                pool.release(black_box(id)).unwrap();
            })
        });
    }
    group.finish();
}

/// One full cycle: queue `size` requests, drain them into `size` workers,
/// then answer every one.
fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_and_complete");
    for size in [1u32, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut pool = ready_pool(size);
            let mut queue = WorkQueue::new();
            let mut dispatcher = Dispatcher::new(false);
            let mut stats = StatsTracker::new();
            let mut transport = Sink;
            b.iter(|| {
                for n in 0..size as u64 {
                    queue.push_back(QueuedRequest::new(json!({"n": n}), n, noop()));
                }
                let outcome = dispatcher
                    .try_dispatch(&mut queue, &mut pool, &mut transport, &mut stats)
                    .unwrap();
                for id in outcome.dispatched {
                    let binding = pool.take_binding(id).unwrap().unwrap();
                    pool.release(id).unwrap();
                    binding.complete(Value::Null).unwrap();
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queue, bench_acquire_release, bench_drain);
criterion_main!(benches);
