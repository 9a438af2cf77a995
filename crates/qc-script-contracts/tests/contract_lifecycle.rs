//! # Contract Lifecycle Tests
//!
//! End-to-end behaviour of the contract service against an in-memory store.
//!
//! ## Test Categories
//!
//! 1. **Lifecycle** - deploy, invoke, query, single Init
//! 2. **Commit Semantics** - discard on failure, query purity, nested atomicity
//! 3. **Resource Bounds** - steps, memory, call depth, nesting, copy cost,
//!    stored value limits
//! 4. **Isolation** - namespaces, reserved keys, reentrancy
//! 5. **Determinism and Concurrency** - replay, cache eviction, parallel calls

use qc_script_contracts::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// TEST HELPERS
// =============================================================================

const TOKEN: &str = r#"
    function Init(args) {
        PutState(args.owner, 100);
        return true;
    }

    function Invoke(method, args) {
        if (method != "transfer") { return false; }
        let from = Caller();
        let balance = GetState(from);
        if (balance == null || balance < args.amt) { return false; }
        PutState(from, balance - args.amt);
        PutState(args.to, (GetState(args.to) || 0) + args.amt);
        return true;
    }

    function Query(args) { return GetState(args.who); }
"#;

const COUNTER: &str = r#"
    function Init(args) { PutState("n", 0); return true; }
    function Invoke(method, args) {
        if (method == "inc") { PutState("n", GetState("n") + 1); return true; }
        if (method == "fail") { PutState("n", 999); throw "nope"; }
        return false;
    }
    function Query(args) { return GetState("n"); }
"#;

fn service_with(config: ServiceConfig) -> (ContractService, Arc<InMemoryStateStore>) {
    let store = Arc::new(InMemoryStateStore::new());
    let service = ContractService::new(config, Arc::new(MiniScriptEngine::new()), store.clone());
    (service, store)
}

async fn deploy(service: &ContractService, source: &str, args: Value) -> ContractId {
    let result = service.deploy(DeployRequest::new(source, args)).await;
    assert!(result.success, "deploy failed: {:?}", result.error);
    result.contract_id
}

async fn query(service: &ContractService, id: ContractId, args: Value) -> Value {
    let result = service.query(QueryRequest::new(id, args)).await;
    assert!(result.error.is_none(), "query failed: {:?}", result.error);
    result.return_value.unwrap_or_default()
}

fn who(name: &str) -> Value {
    Value::map([("who", Value::from(name))])
}

fn snapshot_digest(store: &InMemoryStateStore) -> [u8; 32] {
    let snapshot: BTreeMap<NamespacedKey, Vec<u8>> = store.snapshot();
    let mut hasher = Sha256::new();
    for (key, value) in &snapshot {
        hasher.update(key.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(value);
        hasher.update([0]);
    }
    hasher.finalize().into()
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_token_transfer_scenario() {
    let (service, _) = create_test_service();
    let id = deploy(&service, TOKEN, Value::map([("owner", Value::from("A"))])).await;
    assert_eq!(query(&service, id, who("A")).await, Value::Int(100));

    let transfer = service
        .invoke(
            InvokeRequest::new(
                id,
                "transfer",
                Value::map([("to", Value::from("B")), ("amt", Value::Int(30))]),
            )
            .with_caller("A"),
        )
        .await;
    assert!(transfer.success, "{:?}", transfer.error);
    assert_eq!(transfer.return_value, Some(Value::Bool(true)));
    assert!(transfer.steps_used() > 0);

    assert_eq!(query(&service, id, who("A")).await, Value::Int(70));
    assert_eq!(query(&service, id, who("B")).await, Value::Int(30));
}

#[tokio::test]
async fn test_overdraft_returns_falsy_and_changes_nothing() {
    let (service, store) = create_test_service();
    let id = deploy(&service, TOKEN, Value::map([("owner", Value::from("A"))])).await;
    let before = store.snapshot();

    let result = service
        .invoke(
            InvokeRequest::new(
                id,
                "transfer",
                Value::map([("to", Value::from("B")), ("amt", Value::Int(500))]),
            )
            .with_caller("A"),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error, None);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_init_runs_once_per_source() {
    let (service, store) = create_test_service();
    let id = deploy(&service, COUNTER, Value::Null).await;
    service.invoke(InvokeRequest::new(id, "inc", Value::Null)).await;
    let before = store.snapshot();

    let again = service.deploy(DeployRequest::new(COUNTER, Value::Null)).await;
    assert_eq!(again.contract_id, id);
    assert_eq!(again.error, Some(ContractError::AlreadyDeployed(id)));
    assert_eq!(store.snapshot(), before);
    assert_eq!(query(&service, id, Value::Null).await, Value::Int(1));
}

#[tokio::test]
async fn test_load_failures() {
    let (service, store) = create_test_service();

    let forbidden = service
        .deploy(DeployRequest::new(
            "function Init(a) { PutState(\"t\", now()); return true; }",
            Value::Null,
        ))
        .await;
    assert_eq!(
        forbidden.error,
        Some(ContractError::Load(LoadError::ForbiddenGlobal("now".into())))
    );

    let malformed = service
        .deploy(DeployRequest::new("function Init(a) { return ", Value::Null))
        .await;
    assert!(matches!(
        malformed.error,
        Some(ContractError::Load(LoadError::Compile(_)))
    ));

    let oversized = service
        .deploy(DeployRequest::new("x".repeat(limits::MAX_SCRIPT_SIZE + 1), Value::Null))
        .await;
    assert!(matches!(
        oversized.error,
        Some(ContractError::Load(LoadError::InvalidSize { .. }))
    ));

    let empty = service.deploy(DeployRequest::new("", Value::Null)).await;
    assert!(matches!(
        empty.error,
        Some(ContractError::Load(LoadError::InvalidSize { size: 0, .. }))
    ));

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_entry_points() {
    let (service, _) = create_test_service();
    let id = deploy(&service, "function Init(a) { return true; }", Value::Null).await;

    let invoke = service.invoke(InvokeRequest::new(id, "x", Value::Null)).await;
    assert_eq!(
        invoke.error,
        Some(ContractError::MissingEntryPoint(EntryPoint::Invoke))
    );

    let query = service.query(QueryRequest::new(id, Value::Null)).await;
    assert_eq!(
        query.error,
        Some(ContractError::MissingEntryPoint(EntryPoint::Query))
    );
}

// =============================================================================
// COMMIT SEMANTICS
// =============================================================================

#[tokio::test]
async fn test_script_error_discards_all_writes() {
    let (service, store) = create_test_service();
    let id = deploy(&service, COUNTER, Value::Null).await;
    let before = store.snapshot();

    let result = service.invoke(InvokeRequest::new(id, "fail", Value::Null)).await;
    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(ContractError::script("uncaught exception: nope"))
    );
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_query_is_pure_and_idempotent() {
    let (service, store) = create_test_service();
    let source = r#"
        function Init(a) { PutState("n", 5); return true; }
        function Query(a) {
            PutState("n", GetState("n") + 1);
            return GetState("n");
        }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();
    let commits = store.commit_count();

    let first = query(&service, id, Value::Null).await;
    let second = query(&service, id, Value::Null).await;
    assert_eq!(first, Value::Int(6));
    assert_eq!(first, second);
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.commit_count(), commits);
}

const CALLEE: &str = r#"
    function Init(a) { return true; }
    function Invoke(method, args) {
        PutState("seen", Caller());
        PutState("count", (GetState("count") || 0) + 1);
        if (method == "refuse") { return false; }
        if (method == "explode") { throw "callee exploded"; }
        return GetState("count");
    }
    function Query(a) { return [GetState("seen"), GetState("count")]; }
"#;

const CALLER: &str = r#"
    function Init(a) { return true; }
    function Invoke(method, args) {
        PutState("before", true);
        let r = CallContract(args.target, args.method, null);
        PutState("result", r);
        if (method == "then_fail") { throw "outer failed"; }
        return true;
    }
    function Query(a) { return [GetState("before"), GetState("result")]; }
"#;

fn call_args(target: ContractId, method: &str) -> Value {
    Value::map([
        ("target", Value::Str(target.to_hex())),
        ("method", Value::from(method)),
    ])
}

#[tokio::test]
async fn test_nested_call_commits_both_namespaces() {
    let (service, _) = create_test_service();
    let callee = deploy(&service, CALLEE, Value::Null).await;
    let caller = deploy(&service, CALLER, Value::Null).await;

    let result = service
        .invoke(InvokeRequest::new(caller, "go", call_args(callee, "ping")))
        .await;
    assert!(result.success, "{:?}", result.error);

    assert_eq!(
        query(&service, callee, Value::Null).await,
        Value::List(vec![Value::Str(caller.to_hex()), Value::Int(1)])
    );
    assert_eq!(
        query(&service, caller, Value::Null).await,
        Value::List(vec![Value::Bool(true), Value::Int(1)])
    );
}

#[tokio::test]
async fn test_outer_failure_discards_nested_writes() {
    let (service, store) = create_test_service();
    let callee = deploy(&service, CALLEE, Value::Null).await;
    let caller = deploy(&service, CALLER, Value::Null).await;
    let before = store.snapshot();

    let result = service
        .invoke(InvokeRequest::new(caller, "then_fail", call_args(callee, "ping")))
        .await;
    assert!(result.error.is_some());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_nested_failure_propagates() {
    let (service, store) = create_test_service();
    let callee = deploy(&service, CALLEE, Value::Null).await;
    let caller = deploy(&service, CALLER, Value::Null).await;
    let before = store.snapshot();

    let result = service
        .invoke(InvokeRequest::new(caller, "go", call_args(callee, "explode")))
        .await;
    assert_eq!(
        result.error,
        Some(ContractError::script("uncaught exception: callee exploded"))
    );
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_falsy_nested_call_rolls_back_only_callee() {
    let (service, _) = create_test_service();
    let callee = deploy(&service, CALLEE, Value::Null).await;
    let caller = deploy(&service, CALLER, Value::Null).await;

    let result = service
        .invoke(InvokeRequest::new(caller, "go", call_args(callee, "refuse")))
        .await;
    assert!(result.success, "{:?}", result.error);

    assert_eq!(
        query(&service, callee, Value::Null).await,
        Value::List(vec![Value::Null, Value::Null])
    );
    assert_eq!(
        query(&service, caller, Value::Null).await,
        Value::List(vec![Value::Bool(true), Value::Bool(false)])
    );
}

#[tokio::test]
async fn test_nested_call_from_query_cannot_commit() {
    let (service, store) = create_test_service();
    let callee = deploy(&service, CALLEE, Value::Null).await;
    let source = r#"
        function Init(a) { return true; }
        function Query(a) { return CallContract(a, "ping", null); }
    "#;
    let reader = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let result = service
        .query(QueryRequest::new(reader, Value::Str(callee.to_hex())))
        .await;
    assert_eq!(result.return_value, Some(Value::Int(1)));
    assert_eq!(store.snapshot(), before);
}

// =============================================================================
// RESOURCE BOUNDS
// =============================================================================

#[tokio::test]
async fn test_infinite_loop_exhausts_steps() {
    let mut config = ServiceConfig::default();
    config.invoke_budget.max_steps = 10_000;
    let (service, store) = service_with(config);
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) {
            let i = 0;
            while (true) { PutState("i", i); i += 1; }
        }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let result = service.invoke(InvokeRequest::new(id, "spin", Value::Null)).await;
    assert!(matches!(
        result.error,
        Some(ContractError::ResourceExhausted { resource: Resource::Steps, limit: 10_000, .. })
    ));
    assert!(result.steps_used() > 10_000);
    assert_eq!(store.snapshot(), before);
    assert_eq!(service.stats().await.resource_exhausted, 1);
}

#[tokio::test]
async fn test_unbounded_allocation_exhausts_memory() {
    let (service, store) = create_test_service();
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) {
            let s = "abcdefgh";
            while (true) { s = s + s; }
        }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let result = service.invoke(InvokeRequest::new(id, "grow", Value::Null)).await;
    assert!(matches!(
        result.error,
        Some(ContractError::ResourceExhausted { resource: Resource::Memory, .. })
    ));
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_unbounded_recursion_exhausts_call_depth() {
    let (service, _) = create_test_service();
    let source = r#"
        function Init(a) { return true; }
        function down(n) { return down(n + 1); }
        function Invoke(m, a) { return down(0); }
    "#;
    let id = deploy(&service, source, Value::Null).await;

    let result = service.invoke(InvokeRequest::new(id, "dive", Value::Null)).await;
    assert!(matches!(
        result.error,
        Some(ContractError::ResourceExhausted { resource: Resource::CallDepth, .. })
    ));
}

#[tokio::test]
async fn test_oversized_state_value_is_rejected() {
    let (service, store) = create_test_service();
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) {
            let s = "0123456789abcdef";
            let i = 0;
            while (i < 10) { s = s + s; i += 1; }
            PutState("big", s);
            return true;
        }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let result = service.invoke(InvokeRequest::new(id, "big", Value::Null)).await;
    assert!(matches!(result.error, Some(ContractError::ScriptExecution(_))));
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_deepest_nesting_is_bounded_on_a_small_stack() {
    let nested = format!("{}dive(n + 1){}", "1 + (".repeat(60), ")".repeat(60));
    let source = format!(
        "function Init(a) {{ return true; }}\n\
         function dive(n) {{ if (n > 60) {{ return 0; }} return {nested}; }}\n\
         function Invoke(m, a) {{ return dive(0); }}\n"
    );

    // blocking pool threads get 2 MiB by default
    let result = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || {
            let dispatcher = Dispatcher::new(
                ServiceConfig::default(),
                Arc::new(MiniScriptEngine::new()),
                Arc::new(InMemoryStateStore::new()),
            );
            let deployed = dispatcher.deploy(&DeployRequest::new(source, Value::Null));
            assert!(deployed.success, "deploy failed: {:?}", deployed.error);
            dispatcher.invoke(&InvokeRequest::new(deployed.contract_id, "dive", Value::Null))
        })
        .unwrap()
        .join()
        .unwrap();

    assert!(matches!(
        result.error,
        Some(ContractError::ResourceExhausted { resource: Resource::Nesting, .. })
    ));
}

#[tokio::test]
async fn test_copying_a_large_value_is_metered_by_size() {
    let (service, store) = create_test_service();
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) {
            let s = "0123456789abcdef";
            let i = 0;
            while (i < 17) { s = s + s; i += 1; }
            while (true) { let t = s; let u = s; let w = s; }
        }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let started = Instant::now();
    let result = service.invoke(InvokeRequest::new(id, "copy", Value::Null)).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result.error,
        Some(ContractError::ResourceExhausted { resource: Resource::Steps, .. })
    ));
    // a 2 MiB copy costs 32 Ki steps, so the budget allows only a few dozen
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
    assert_eq!(store.snapshot(), before);
}

const STORE: &str = r#"
    function Init(a) { return true; }
    function Invoke(m, a) {
        if (m == "deep") {
            let v = "leaf";
            let i = 0;
            while (i < a) { v = [v]; i += 1; }
            PutState("deep", v);
            return true;
        }
        PutState(m, a);
        return true;
    }
    function Query(a) { return GetState(a); }
"#;

fn nested_value(depth: usize) -> Value {
    (0..depth).fold(Value::from("leaf"), |inner, _| Value::List(vec![inner]))
}

#[tokio::test]
async fn test_stored_values_read_back_at_the_limits() {
    let (service, store) = create_test_service();
    let id = deploy(&service, STORE, Value::Null).await;

    let depth = i64::try_from(limits::MAX_VALUE_DEPTH).unwrap();
    let result = service.invoke(InvokeRequest::new(id, "deep", Value::Int(depth))).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        query(&service, id, Value::from("deep")).await,
        nested_value(limits::MAX_VALUE_DEPTH)
    );

    // encoded as a JSON string: two quote bytes
    let largest = Value::from("x".repeat(limits::MAX_STATE_VALUE_SIZE - 2));
    let result = service.invoke(InvokeRequest::new(id, "big", largest.clone())).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(query(&service, id, Value::from("big")).await, largest);

    let before = store.snapshot();
    for depth in [depth + 1, 200] {
        let result = service.invoke(InvokeRequest::new(id, "deep", Value::Int(depth))).await;
        assert!(matches!(result.error, Some(ContractError::ScriptExecution(_))));
    }
    let oversized = Value::from("x".repeat(limits::MAX_STATE_VALUE_SIZE - 1));
    let result = service.invoke(InvokeRequest::new(id, "big", oversized)).await;
    assert!(matches!(result.error, Some(ContractError::ScriptExecution(_))));
    assert_eq!(store.snapshot(), before);
    assert_eq!(
        query(&service, id, Value::from("deep")).await,
        nested_value(limits::MAX_VALUE_DEPTH)
    );
}

#[tokio::test]
async fn test_state_write_count_is_limited_per_call() {
    let mut config = ServiceConfig::default();
    config.max_state_writes = 3;
    let (service, store) = service_with(config);
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) {
            let i = 0;
            while (i < a) { PutState("k" + i, i); PutState("k" + i, i + 1); i += 1; }
            return true;
        }
        function Query(a) { return GetState(a); }
    "#;
    let id = deploy(&service, source, Value::Null).await;

    let result = service.invoke(InvokeRequest::new(id, "fill", Value::Int(3))).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(query(&service, id, Value::from("k2")).await, Value::Int(3));

    let before = store.snapshot();
    let result = service.invoke(InvokeRequest::new(id, "fill", Value::Int(4))).await;
    assert!(matches!(
        result.error,
        Some(ContractError::ResourceExhausted { resource: Resource::StateWrites, limit: 3, .. })
    ));
    assert_eq!(store.snapshot(), before);
}

// =============================================================================
// ISOLATION
// =============================================================================

#[tokio::test]
async fn test_foreign_namespace_access_is_a_violation() {
    let (service, store) = create_test_service();
    let victim = deploy(&service, TOKEN, Value::map([("owner", Value::from("A"))])).await;
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) { return GetState(a); }
        function Query(a) { return GetState(a); }
    "#;
    let thief = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let foreign = Value::Str(format!("{}/A", victim.to_hex()));
    let result = service
        .invoke(InvokeRequest::new(thief, "read", foreign.clone()))
        .await;
    assert!(matches!(
        result.error,
        Some(ContractError::NamespaceViolation { .. })
    ));

    let result = service.query(QueryRequest::new(thief, foreign)).await;
    assert!(matches!(
        result.error,
        Some(ContractError::NamespaceViolation { .. })
    ));

    let reserved = Value::from(CONTRACT_CODE_KEY);
    let result = service.query(QueryRequest::new(thief, reserved)).await;
    assert!(matches!(
        result.error,
        Some(ContractError::NamespaceViolation { .. })
    ));

    assert_eq!(store.snapshot(), before);
    assert_eq!(service.stats().await.security_incidents, 3);
}

#[tokio::test]
async fn test_slash_in_a_plain_key_is_a_script_error() {
    let (service, _) = create_test_service();
    let source = r#"
        function Init(a) { return true; }
        function Query(a) { return GetState(a); }
    "#;
    let id = deploy(&service, source, Value::Null).await;

    let result = service.query(QueryRequest::new(id, Value::from("a/b"))).await;
    assert!(matches!(result.error, Some(ContractError::ScriptExecution(_))));
    assert_eq!(service.stats().await.security_incidents, 0);
}

#[tokio::test]
async fn test_own_qualified_key_is_allowed() {
    let (service, _) = create_test_service();
    let source = r#"
        function Init(a) { PutState(ContractId() + "/k", "v"); return true; }
        function Query(a) { return GetState("k"); }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    assert_eq!(query(&service, id, Value::Null).await, Value::from("v"));
}

#[tokio::test]
async fn test_reentrant_call_is_rejected() {
    let (service, store) = create_test_service();
    let source = r#"
        function Init(a) { return true; }
        function Invoke(m, a) {
            PutState("x", 1);
            return CallContract(ContractId(), "again", null);
        }
    "#;
    let id = deploy(&service, source, Value::Null).await;
    let before = store.snapshot();

    let result = service.invoke(InvokeRequest::new(id, "go", Value::Null)).await;
    assert!(matches!(result.error, Some(ContractError::ScriptExecution(msg)) if msg.contains("reentrant")));
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_unknown_contract() {
    let (service, _) = create_test_service();
    let ghost = ContractId::from_source(b"function Init(a) { return true; }");
    let result = service.invoke(InvokeRequest::new(ghost, "x", Value::Null)).await;
    assert_eq!(result.error, Some(ContractError::ContractNotFound(ghost)));
}

// =============================================================================
// DETERMINISM AND CONCURRENCY
// =============================================================================

async fn replay() -> ([u8; 32], Vec<Option<Value>>) {
    let (service, store) = create_test_service();
    let id = deploy(&service, TOKEN, Value::map([("owner", Value::from("A"))])).await;
    let mut returns = Vec::new();
    for (caller, to, amt) in [("A", "B", 10), ("B", "C", 4), ("A", "C", 200), ("C", "A", 1)] {
        let result = service
            .invoke(
                InvokeRequest::new(
                    id,
                    "transfer",
                    Value::map([("to", Value::from(to)), ("amt", Value::Int(amt))]),
                )
                .with_caller(caller)
                .at_height(7),
            )
            .await;
        returns.push(result.return_value);
    }
    (snapshot_digest(&store), returns)
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let (digest_a, returns_a) = replay().await;
    let (digest_b, returns_b) = replay().await;
    assert_eq!(digest_a, digest_b);
    assert_eq!(returns_a, returns_b);
    assert_eq!(returns_a[2], Some(Value::Bool(false)));
}

#[tokio::test]
async fn test_evicted_contracts_reload_from_code_record() {
    let mut config = ServiceConfig::default();
    config.cache_capacity = 1;
    let (service, _) = service_with(config);

    let counter = deploy(&service, COUNTER, Value::Null).await;
    let token = deploy(&service, TOKEN, Value::map([("owner", Value::from("A"))])).await;
    assert!(!service.dispatcher().loader().contains(&counter));

    let result = service.invoke(InvokeRequest::new(counter, "inc", Value::Null)).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(query(&service, counter, Value::Null).await, Value::Int(1));
    assert_eq!(query(&service, token, who("A")).await, Value::Int(100));
    assert!(service.loader_stats().evictions >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_calls_on_distinct_contracts() {
    let (service, _) = create_test_service();
    let service = Arc::new(service);

    let mut ids = Vec::new();
    for tag in 0..4 {
        let source = format!("{COUNTER}\n// instance {tag}\n");
        ids.push(deploy(&service, &source, Value::Null).await);
    }

    let mut handles = Vec::new();
    for &id in &ids {
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .invoke(InvokeRequest::new(id, "inc", Value::Null))
                    .await
                    .success
            }));
        }
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    for id in ids {
        assert_eq!(query(&service, id, Value::Null).await, Value::Int(8));
    }
}
