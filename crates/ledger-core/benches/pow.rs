use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{mine::mine_parallel, Block, CancelFlag, Transaction, TxKind};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn sample_block() -> Block {
    let mut rng = StdRng::seed_from_u64(42);
    let txs: Vec<Transaction> = (0..10)
        .map(|i| {
            Transaction::new_at(
                Some(format!("alice-{i}")),
                "bob",
                rng.gen_range(1..10),
                TxKind::Transfer,
                1_600_000_000 + i,
            )
        })
        .collect();
    Block::new_at(1, txs, "0", 1_600_000_000)
}

fn bench_pow(c: &mut Criterion) {
    let block = sample_block();
    let cancel = CancelFlag::new();

    c.bench_function("mine_block_difficulty_4", |b| {
        b.iter(|| {
            let mut candidate = block.clone();
            candidate.mine(4, &cancel).expect("mined");
        });
    });

    c.bench_function("mine_parallel_difficulty_4", |b| {
        b.iter(|| {
            let _mined = mine_parallel(block.clone(), 4, &cancel).expect("mined");
        });
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
