//! Criterion benchmarks for ruthenium-node bookkeeping.
//!
//! Covers: outbound selection over a large neighborhood and tick scheduling.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ruthenium_core::testing::{ManualClock, StubNeighbor};
use ruthenium_core::traits::Neighborhood;
use ruthenium_node_lib::{StaticNeighborhood, TickEngine};

fn bench_synchronize(c: &mut Criterion) {
    let neighborhood = StaticNeighborhood::new(8);
    for index in 0..1_000 {
        neighborhood.add(Arc::new(StubNeighbor::new(format!("10.0.0.{index}:8106"), Vec::new())));
    }
    for index in (0..1_000).step_by(3) {
        neighborhood.incentive(&format!("10.0.0.{index}:8106"));
    }

    c.bench_function("synchronize_1000_neighbors", |b| {
        b.iter(|| {
            neighborhood.synchronize();
            black_box(neighborhood.neighbors().len())
        })
    });
}

fn bench_ticks(c: &mut Criterion) {
    let engine = TickEngine::new(
        "verification",
        Arc::new(ManualClock::new(0)),
        Duration::from_secs(60),
        6,
        1,
    );

    c.bench_function("ticks_after", |b| {
        b.iter(|| engine.ticks_after(black_box(1_700_000_000_123_456_789)))
    });
}

criterion_group!(benches, bench_synchronize, bench_ticks);
criterion_main!(benches);
