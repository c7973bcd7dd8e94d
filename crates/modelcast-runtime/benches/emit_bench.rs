//! Benchmarks for the emit/broadcast hot path.
//!
//! Run with: cargo bench -p modelcast-runtime --bench emit_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use modelcast_core::Model;
use modelcast_runtime::{ConcurrentStreamFactory, StreamFactory, Subscription};

#[derive(Debug, Clone, PartialEq)]
struct Tick {
    id: u32,
    seq: u64,
}

impl Model for Tick {
    type Id = u32;

    fn id(&self) -> &u32 {
        &self.id
    }
}

// =============================================================================
// Fan-out
// =============================================================================

const FAN_OUT: &[usize] = &[1, 16, 256];

fn bench_emit_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit/fan_out");

    for &subscribers in FAN_OUT {
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("concurrent", subscribers),
            &subscribers,
            |b, &subscribers| {
                let factory = ConcurrentStreamFactory::<Tick>::new();
                let conn = factory.connect(1);
                let sum = Arc::new(AtomicU64::new(0));
                let _subs: Vec<Subscription> = (0..subscribers)
                    .map(|_| {
                        let sum = Arc::clone(&sum);
                        conn.subscribe(move |t: &Tick| {
                            sum.fetch_add(t.seq, Ordering::Relaxed);
                        })
                        .expect("subscribe")
                    })
                    .collect();

                let mut seq = 0u64;
                b.iter(|| {
                    seq += 1;
                    conn.emit(black_box(Tick { id: 1, seq })).expect("emit");
                });
                black_box(sum.load(Ordering::Relaxed));
            },
        );
    }

    group.finish();
}

// =============================================================================
// Registry churn
// =============================================================================

fn bench_connect_dispose(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/connect_dispose");

    group.bench_function("local", |b| {
        let factory = StreamFactory::<Tick>::new();
        let mut key = 0u32;
        b.iter(|| {
            key = key.wrapping_add(1) % 64;
            let conn = factory.connect(black_box(key));
            drop(conn);
        });
    });

    group.bench_function("concurrent", |b| {
        let factory = ConcurrentStreamFactory::<Tick>::new();
        let _anchor = factory.connect(0);
        b.iter(|| {
            let conn = factory.connect(black_box(0));
            drop(conn);
        });
    });

    group.finish();
}

// =============================================================================
// Suppression
// =============================================================================

fn bench_suppressed_emit(c: &mut Criterion) {
    c.bench_function("emit/suppressed_duplicate", |b| {
        let factory = StreamFactory::<Tick>::new();
        let conn = factory.connect(1);
        conn.emit(Tick { id: 1, seq: 0 }).expect("emit");
        b.iter(|| conn.emit(black_box(Tick { id: 1, seq: 0 })).expect("emit"));
    });
}

criterion_group!(
    benches,
    bench_emit_fan_out,
    bench_connect_dispose,
    bench_suppressed_emit
);
criterion_main!(benches);
