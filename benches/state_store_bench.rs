// benches/state_store_bench.rs
//! Tenant state store benchmarks
//!
//! Lock lookup for known and first-seen tenants, plus result recording
//! against a full history ring.

use agent_engine::model::ExecutionResult;
use agent_engine::state::{ExecutionState, TenantStateStore};
use agent_engine::AgentState;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::time::Duration;

fn bench_state_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/state_lock");

    for tenants in [1usize, 100, 10_000] {
        let store = TenantStateStore::new(100, 100);
        for i in 0..tenants {
            store.state_lock(&format!("user-{}", i));
        }

        group.bench_with_input(BenchmarkId::new("existing", tenants), &store, |b, store| {
            b.iter(|| store.state_lock(black_box("user-0")));
        });
    }

    group.bench_function("first_access", |b| {
        b.iter_batched(
            || TenantStateStore::new(100, 100),
            |store| store.state_lock(black_box("new-user")),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_record_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("state/record_result");

    for capacity in [10usize, 100, 1_000] {
        let mut state = ExecutionState::new(capacity, 100);
        let result = ExecutionResult::success(
            "echo",
            "run-1",
            Duration::from_millis(5),
            AgentState::new().with("echo", "hello"),
        );
        for _ in 0..capacity {
            state.record_result(result.clone());
        }

        group.bench_function(BenchmarkId::from_parameter(capacity), |b| {
            b.iter(|| state.record_result(black_box(result.clone())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_state_lock, bench_record_result);
criterion_main!(benches);
