// Consensus engine benchmarks for the Tessera protocol.
//
// Covers block digest computation, signing and verification, leader
// election over a populated validator set, and end-to-end block admission.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parking_lot::RwLock;

use tessera_protocol::consensus::{EngineConfig, UpbftEngine};
use tessera_protocol::crypto::{sha256, TesseraKeypair};
use tessera_protocol::ledger::{Block, DagLedger, LedgerConfig};
use tessera_protocol::trust::TrustModel;

/// Builds a trust model, ledger, and engine over `n` validators with
/// healthy pinned scores.
fn setup_stack(n: usize) -> (UpbftEngine, DagLedger, Arc<RwLock<TrustModel>>) {
    let validators: Vec<String> = (0..n).map(|i| format!("Node{}", i)).collect();
    let trust = Arc::new(RwLock::new(TrustModel::default()));
    for v in &validators {
        trust.write().set_score(v, 0.9);
    }
    let keypair = Arc::new(TesseraKeypair::generate());
    let ledger = DagLedger::new(Arc::clone(&trust), keypair, LedgerConfig::default());
    let engine = UpbftEngine::new(validators, Arc::clone(&trust), EngineConfig::default());
    (engine, ledger, trust)
}

fn bench_block_digest(c: &mut Criterion) {
    c.bench_function("crypto/sha256_1kb", |b| {
        let data = vec![0xABu8; 1024];
        b.iter(|| sha256(&data));
    });
}

fn bench_block_construction(c: &mut Criterion) {
    let keypair = TesseraKeypair::generate();
    let parents = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
    let txs: Vec<String> = (0..10).map(|i| format!("Tx{}", i)).collect();

    c.bench_function("ledger/block_construct_and_sign", |b| {
        b.iter(|| {
            Block::new(
                42,
                parents.clone(),
                txs.clone(),
                "Node0",
                0.9,
                &keypair,
            )
        });
    });
}

fn bench_signature_verification(c: &mut Criterion) {
    let keypair = TesseraKeypair::generate();
    let block = Block::new(1, vec![[0u8; 32]], vec!["Tx1".into()], "Node0", 0.9, &keypair);
    let public_key = keypair.public_key();

    c.bench_function("ledger/block_verify_signature", |b| {
        b.iter(|| block.verify_signature(&public_key));
    });
}

fn bench_leader_election(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus/elect_leader");

    for validator_count in [4, 16, 64] {
        group.throughput(Throughput::Elements(validator_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(validator_count),
            &validator_count,
            |b, &n| {
                let (mut engine, ledger, _trust) = setup_stack(n);
                b.iter(|| engine.elect_leader(&ledger));
            },
        );
    }

    group.finish();
}

fn bench_three_phase_round(c: &mut Criterion) {
    let (mut engine, ledger, _trust) = setup_stack(4);
    engine.elect_leader(&ledger).expect("leader");

    c.bench_function("consensus/three_phase_round", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let envelope = engine.pre_prepare(&format!("Tx{}", i)).unwrap();
            let prepares = engine.prepare(&envelope);
            engine.commit(&envelope, &prepares).unwrap()
        });
    });
}

fn bench_block_admission(c: &mut Criterion) {
    c.bench_function("ledger/add_block", |b| {
        let mut i = 0u64;
        b.iter_with_setup(
            || setup_stack(4),
            |(_engine, mut ledger, trust)| {
                i += 1;
                trust.write().set_score("Node0", 0.9);
                ledger
                    .add_block(vec![format!("Tx{}", i)], "Node0")
                    .unwrap()
            },
        );
    });
}

criterion_group!(
    benches,
    bench_block_digest,
    bench_block_construction,
    bench_signature_verification,
    bench_leader_election,
    bench_three_phase_round,
    bench_block_admission,
);
criterion_main!(benches);
