//! Criterion benchmarks for ruthenium-consensus critical operations.
//!
//! Covers: closing local blocks and verifying a neighbor chain from genesis.
//! Uses the in-memory doubles of ruthenium-core.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use ruthenium_consensus::{AddressRegistry, Blockchain};
use ruthenium_core::crypto::KeyPair;
use ruthenium_core::ledger::Ledger;
use ruthenium_core::settings::ProtocolSettings;
use ruthenium_core::testing::{StubNeighbor, StubNeighborhood, StubOracle};
use ruthenium_core::traits::Neighborhood;
use ruthenium_core::types::{Address, Transaction};
use ruthenium_decay::HalfLifeModel;

const SECOND: i64 = 1_000_000_000;
const BLOCKS: i64 = 50;

fn settings() -> ProtocolSettings {
    ProtocolSettings {
        validation_interval_in_seconds: 1,
        ..ProtocolSettings::default()
    }
}

fn blockchain(neighbors: Vec<Arc<StubNeighbor>>, validator: &Address) -> Blockchain {
    let settings = settings();
    Blockchain::new(
        settings.clone(),
        Arc::new(Ledger::new()),
        Arc::new(AddressRegistry::new()),
        Arc::new(HalfLifeModel::from_settings(&settings)),
        Arc::new(StubNeighborhood::new(neighbors)) as Arc<dyn Neighborhood>,
        Arc::new(StubOracle::new([validator.clone()])),
    )
}

async fn fill(chain: &Blockchain, validator: &Address, count: i64) {
    let genesis = Transaction::reward(validator.clone(), true, 0, chain.settings().genesis_amount);
    chain
        .add_block(0, vec![genesis], std::slice::from_ref(validator))
        .await
        .expect("genesis block");
    for height in 1..count {
        let timestamp = height * SECOND;
        let reward = Transaction::reward(validator.clone(), false, timestamp, 0);
        chain.add_block(timestamp, vec![reward], &[]).await.expect("empty block");
    }
}

fn bench_add_block(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let validator = KeyPair::from_secret_bytes([1; 32]).address();

    c.bench_function("add_50_blocks", |b| {
        b.iter(|| {
            let chain = blockchain(Vec::new(), &validator);
            runtime.block_on(fill(&chain, &validator, black_box(BLOCKS)));
            chain
        })
    });
}

fn bench_update(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let validator = KeyPair::from_secret_bytes([1; 32]).address();
    let peer = blockchain(Vec::new(), &validator);
    runtime.block_on(fill(&peer, &validator, BLOCKS));
    let neighbor = Arc::new(StubNeighbor::new("peer", peer.blocks(0)));

    c.bench_function("update_from_empty_50_blocks", |b| {
        b.iter(|| {
            let chain = blockchain(vec![Arc::clone(&neighbor)], &validator);
            runtime.block_on(chain.update(black_box(BLOCKS * SECOND)))
        })
    });
}

criterion_group!(benches, bench_add_block, bench_update);
criterion_main!(benches);
