use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use filament_core::store::{DiffCache, Store};
use filament_core::{batch, Effect, Memo, Root, Signal};
use serde_json::json;

/// A chain of `depth` memos over one signal, observed by one effect.
fn build_chain(depth: usize) -> (Root, Signal<u64>) {
    let (root, source) = Root::new(|| {
        let source = Signal::new(0_u64);
        let read = source.clone();
        let mut last = Memo::new(move |_| read.get());
        for _ in 0..depth {
            let prev = last.clone();
            last = Memo::new(move |_| prev.get().wrapping_add(1));
        }
        let _effect = Effect::new(move |_| {
            black_box(last.get());
        });
        source
    });
    (root, source)
}

/// One signal read by `width` effects.
fn build_fan_out(width: usize) -> (Root, Signal<u64>) {
    Root::new(|| {
        let source = Signal::new(0_u64);
        for _ in 0..width {
            let read = source.clone();
            let _effect = Effect::new(move |_| {
                black_box(read.get());
            });
        }
        source
    })
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");
    group.measurement_time(Duration::from_secs(3));

    for &depth in &[10_usize, 100, 1_000] {
        group.bench_function(format!("chain(depth={depth})"), |b| {
            let (root, source) = build_chain(depth);
            let mut next = 0_u64;
            b.iter(|| {
                next += 1;
                source.set(next);
            });
            root.dispose();
        });
    }

    for &width in &[10_usize, 1_000] {
        group.bench_function(format!("fan_out(width={width})"), |b| {
            let (root, source) = build_fan_out(width);
            let mut next = 0_u64;
            b.iter(|| {
                next += 1;
                source.set(next);
            });
            root.dispose();
        });
    }

    group.bench_function("batched_writes(n=100)", |b| {
        let (root, source) = build_fan_out(10);
        let mut next = 0_u64;
        b.iter(|| {
            batch(|| {
                for _ in 0..100 {
                    next += 1;
                    source.set(next);
                }
            })
        });
        root.dispose();
    });

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_diff");

    group.bench_function("nested_write(items=1000)", |b| {
        b.iter_batched(
            || {
                let items: Vec<_> = (0..1_000).map(|i| json!({ "id": i, "done": false })).collect();
                let store = Store::new(json!({ "todos": items }).into());
                let mut cache = DiffCache::new();
                cache.compare(&store.snapshot());
                (store, cache)
            },
            |(store, mut cache)| {
                store.set("todos[500].done", true.into()).ok();
                black_box(cache.compare(&store.snapshot()));
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_propagation, bench_diff);
criterion_main!(benches);
