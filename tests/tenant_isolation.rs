// tests/tenant_isolation.rs
//! Per-tenant isolation and bounded history

mod common;

use agent_engine::agents::register_builtins;
use agent_engine::events::ChannelTransport;
use agent_engine::model::ExecutionResult;
use agent_engine::state::{ExecutionState, TenantStateStore};
use agent_engine::{AgentState, EngineBuilder, EventNotifier, InMemoryAgentRegistry};
use common::{tenant, test_config, Harness};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_distinct_tenants_get_distinct_state() {
    let store = TenantStateStore::default();
    let alice = store.execution_state("alice");
    let bob = store.execution_state("bob");

    assert!(!Arc::ptr_eq(&alice, &bob));
    alice.lock().record_retry();
    assert_eq!(bob.lock().stats.retries, 0);
    assert!(Arc::ptr_eq(&alice, &store.state_lock("alice")));
}

#[test]
fn test_concurrent_first_access_creates_one_lock() {
    let store = Arc::new(TenantStateStore::default());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.state_lock("carol"))
        })
        .collect();

    let locks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(locks.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_events_reach_only_their_tenant() {
    let transport = Arc::new(ChannelTransport::new());
    let mut alice_rx = transport.connect("alice");
    let mut bob_rx = transport.connect("bob");

    let notifier = Arc::new(EventNotifier::new(transport.clone()));
    let registry = Arc::new(InMemoryAgentRegistry::new());
    register_builtins(&registry, Arc::clone(&notifier));
    let engine = EngineBuilder::new()
        .config(test_config())
        .registry(registry)
        .notifier(notifier)
        .build()
        .unwrap();

    let alice = tenant("alice");
    let bob = tenant("bob");
    let (a, b) = tokio::join!(
        engine.execute_agent(engine.context(&alice, "echo"), &alice),
        engine.execute_agent(engine.context(&bob, "echo"), &bob),
    );
    assert!(a.unwrap().success);
    assert!(b.unwrap().success);

    let mut alice_events = Vec::new();
    while let Ok(event) = alice_rx.try_recv() {
        alice_events.push(event);
    }
    let mut bob_events = Vec::new();
    while let Ok(event) = bob_rx.try_recv() {
        bob_events.push(event);
    }

    assert_eq!(alice_events.len(), 5);
    assert_eq!(bob_events.len(), 5);
    assert!(alice_events.iter().all(|e| e.user_id == "alice" && e.run_id == "alice-run"));
    assert!(bob_events.iter().all(|e| e.user_id == "bob" && e.run_id == "bob-run"));
}

#[tokio::test]
async fn test_history_is_per_tenant_and_bounded() {
    let mut config = test_config();
    config.execution.max_history_size = 5;
    let h = Harness::new(config);
    let alice = tenant("alice");
    let bob = tenant("bob");

    for i in 0..8 {
        h.engine
            .execute_agent_with_state(
                h.engine.context(&alice, "echo"),
                &alice,
                AgentState::new().with("message", i),
            )
            .await
            .unwrap();
    }
    h.engine
        .execute_agent(h.engine.context(&bob, "echo"), &bob)
        .await
        .unwrap();

    let history = h.engine.get_run_history("alice");
    let echoed: Vec<_> = history
        .iter()
        .map(|r| r.state.as_ref().unwrap().get("echo").cloned().unwrap())
        .collect();
    assert_eq!(echoed, vec![json!(3), json!(4), json!(5), json!(6), json!(7)]);

    assert_eq!(h.engine.get_run_history("bob").len(), 1);
    assert_eq!(h.engine.get_tenant_stats("alice").unwrap().total_executions, 8);
    assert_eq!(h.engine.get_tenant_stats("bob").unwrap().total_executions, 1);

    let stats = h.engine.get_execution_stats();
    assert_eq!(stats.total_executions, 9);
    assert_eq!(stats.active_tenants, 2);
}

fn result(index: usize) -> ExecutionResult {
    ExecutionResult::success(format!("agent-{}", index), "run", Duration::from_millis(1), AgentState::new())
}

proptest! {
    #[test]
    fn prop_history_keeps_most_recent_in_order(capacity in 1usize..32, extra in 0usize..64) {
        let mut state = ExecutionState::new(capacity, 16);
        let inserted = capacity + extra;
        for i in 0..inserted {
            state.push_history(result(i));
        }

        prop_assert_eq!(state.history_len(), capacity);
        let names: Vec<String> = state.history().map(|r| r.agent_name.clone()).collect();
        let expected: Vec<String> = (extra..inserted).map(|i| format!("agent-{}", i)).collect();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn prop_history_never_exceeds_capacity(capacity in 1usize..16, inserted in 0usize..48) {
        let mut state = ExecutionState::new(capacity, 16);
        for i in 0..inserted {
            state.push_history(result(i));
            prop_assert!(state.history_len() <= capacity);
        }
        prop_assert_eq!(state.history_len(), inserted.min(capacity));
    }
}
