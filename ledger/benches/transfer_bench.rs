// Transfer engine benchmarks for the VEGA ledger.
//
// Covers account provisioning, the committed transfer path (including its
// durability flush), idempotent replay reads, and journal history scans at
// increasing page sizes.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use vega_ledger::account::{AccountStore, ReceiverRef};
use vega_ledger::journal::Journal;
use vega_ledger::storage::VegaDB;
use vega_ledger::transfer::{LedgerEngine, TransferRequest};

/// Brings up the full ledger stack on a temporary database.
fn setup_stack() -> (VegaDB, Arc<AccountStore>, Arc<Journal>, LedgerEngine) {
    let db = VegaDB::open_temporary().expect("temp db");
    let accounts = Arc::new(AccountStore::new(&db));
    let journal = Arc::new(Journal::new(&db));
    let engine = LedgerEngine::new(Arc::clone(&accounts), Arc::clone(&journal));
    (db, accounts, journal, engine)
}

fn bench_provision(c: &mut Criterion) {
    let (_db, accounts, _journal, _engine) = setup_stack();

    c.bench_function("account/provision", |b| {
        b.iter(|| accounts.create(None).unwrap());
    });
}

fn bench_commit_roundtrip(c: &mut Criterion) {
    let (_db, accounts, _journal, engine) = setup_stack();
    let alice = accounts.create_funded(None, 1 << 40).expect("alice");
    let bob = accounts.create_funded(None, 1 << 40).expect("bob");

    // A pays B and B pays A back, so balances are identical at the start of
    // every iteration no matter how many samples criterion takes.
    c.bench_function("transfer/commit_roundtrip", |b| {
        b.iter(|| {
            engine
                .transfer(&TransferRequest::new(
                    alice.account_id,
                    ReceiverRef::ById(bob.account_id),
                    1,
                ))
                .unwrap();
            engine
                .transfer(&TransferRequest::new(
                    bob.account_id,
                    ReceiverRef::ById(alice.account_id),
                    1,
                ))
                .unwrap()
        });
    });
}

fn bench_idempotent_replay(c: &mut Criterion) {
    let (_db, accounts, _journal, engine) = setup_stack();
    let alice = accounts.create_funded(None, 1 << 40).expect("alice");
    let bob = accounts.create_funded(None, 1 << 40).expect("bob");

    // Commit once; every iteration after that is the read-only replay path.
    let request = TransferRequest::new(alice.account_id, ReceiverRef::ById(bob.account_id), 1)
        .with_idempotency_key("bench-replay");
    engine.transfer(&request).expect("first commit");

    c.bench_function("transfer/idempotent_replay", |b| {
        b.iter(|| engine.transfer(&request).unwrap());
    });
}

fn bench_history_scan(c: &mut Criterion) {
    let (_db, accounts, journal, engine) = setup_stack();
    let alice = accounts.create_funded(None, 1 << 40).expect("alice");
    let bob = accounts.create_funded(None, 1 << 40).expect("bob");

    // Seed a deep shared history once; every scan reads from its newest end.
    for _ in 0..1_000 {
        engine
            .transfer(&TransferRequest::new(
                alice.account_id,
                ReceiverRef::ById(bob.account_id),
                1,
            ))
            .expect("seed transfer");
    }

    let mut group = c.benchmark_group("journal/history_scan");
    for limit in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(limit as u64));
        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, &limit| {
            b.iter(|| {
                journal
                    .list_for_account(&alice.account_id, Some(limit))
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_provision,
    bench_commit_roundtrip,
    bench_idempotent_replay,
    bench_history_scan,
);
criterion_main!(benches);
