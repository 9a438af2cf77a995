//! # Script Contract Service
//!
//! Async front of the execution core. Implements [`ContractApi`].
//!
//! ## Concurrency
//!
//! - Calls on the same contract are serialized by a per-contract lock; the
//!   lock is dropped from the table once no call holds or awaits it
//! - Calls on different contracts run in parallel on the blocking pool
//! - Commit-time read-set validation catches conflicts that cross
//!   contracts through nested calls

use crate::adapters::InMemoryStateStore;
use crate::config::ServiceConfig;
use crate::dispatcher::Dispatcher;
use crate::domain::value_objects::ContractId;
use crate::engine::MiniScriptEngine;
use crate::errors::ContractError;
use crate::loader::LoaderStats;
use crate::metrics;
use crate::ports::inbound::{
    ContractApi, DeployRequest, DeployResult, InvokeRequest, InvokeResult, QueryRequest,
    QueryResult,
};
use crate::ports::outbound::{ScriptEngine, StateStore};
use crate::sandbox::meter::MeterUsage;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Statistics for the contract service.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServiceStats {
    /// Deploy calls received.
    pub deploys: u64,
    /// Invoke calls received.
    pub invokes: u64,
    /// Query calls received.
    pub queries: u64,
    /// Calls that committed (deploy, invoke) or returned (query).
    pub successful: u64,
    /// Calls that failed or returned falsy.
    pub failed: u64,
    /// Calls aborted by a budget ceiling.
    pub resource_exhausted: u64,
    /// Namespace violations observed.
    pub security_incidents: u64,
    /// Total steps consumed.
    pub total_steps: u64,
}

impl ServiceStats {
    fn record(
        &mut self,
        kind: &str,
        success: bool,
        error: Option<&ContractError>,
        usage: &MeterUsage,
    ) {
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        if let Some(e) = error {
            if e.is_resource_exhaustion() {
                self.resource_exhausted += 1;
            }
            if e.is_security_fault() {
                self.security_incidents += 1;
                metrics::record_security_incident();
            }
        }
        self.total_steps += usage.steps;

        let outcome = match error {
            Some(e) => e.kind(),
            None if success => "ok",
            None => "falsy",
        };
        metrics::record_call(kind, outcome, usage.steps);
    }
}

/// The contract execution service.
pub struct ContractService {
    dispatcher: Arc<Dispatcher>,
    /// One lock per contract id with a call in flight.
    locks: Mutex<HashMap<ContractId, Arc<Mutex<()>>>>,
    stats: Arc<RwLock<ServiceStats>>,
}

impl ContractService {
    /// Create a new service over a script engine and a state store.
    pub fn new(
        config: ServiceConfig,
        engine: Arc<dyn ScriptEngine>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        info!(
            engine = engine.name(),
            cache_capacity = config.cache_capacity,
            max_script_size = config.max_script_size,
            "Starting contract service"
        );
        Self {
            dispatcher: Arc::new(Dispatcher::new(config, engine, store)),
            locks: Mutex::new(HashMap::new()),
            stats: Arc::new(RwLock::new(ServiceStats::default())),
        }
    }

    /// The synchronous dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get current service statistics.
    pub async fn stats(&self) -> ServiceStats {
        self.stats.read().await.clone()
    }

    /// Loader cache statistics.
    #[must_use]
    pub fn loader_stats(&self) -> LoaderStats {
        self.dispatcher.loader().stats()
    }

    /// Contract locks currently tracked.
    pub async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn contract_lock(&self, id: ContractId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` on the blocking pool while holding the contract's lock.
    async fn run_locked<T, F>(&self, id: ContractId, f: F) -> Result<T, ContractError>
    where
        T: Send + 'static,
        F: FnOnce(&Dispatcher) -> T + Send + 'static,
    {
        let lock = self.contract_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::task::spawn_blocking(move || f(&dispatcher))
                .await
                .map_err(|e| {
                    error!(contract = %id, error = %e, "Dispatcher task did not complete");
                    ContractError::InvariantViolated(format!("dispatcher task failed: {e}"))
                })
        };
        drop(lock);
        self.release_lock(id).await;
        result
    }

    /// Removes the contract's lock once only the table references it.
    async fn release_lock(&self, id: ContractId) {
        let mut locks = self.locks.lock().await;
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }
}

/// Create a service with the reference engine and an in-memory store.
#[must_use]
pub fn create_test_service() -> (ContractService, Arc<InMemoryStateStore>) {
    let store = Arc::new(InMemoryStateStore::new());
    let service = ContractService::new(
        ServiceConfig::default(),
        Arc::new(MiniScriptEngine::new()),
        store.clone(),
    );
    (service, store)
}

// =============================================================================
// ContractApi Implementation
// =============================================================================

#[async_trait]
impl ContractApi for ContractService {
    #[instrument(skip(self, request), fields(correlation_id = %Uuid::new_v4(), caller = %request.caller))]
    async fn deploy(&self, request: DeployRequest) -> DeployResult {
        let contract_id = ContractId::from_source(&request.source);
        let result = self
            .run_locked(contract_id, move |d| d.deploy(&request))
            .await
            .unwrap_or_else(|e| DeployResult {
                contract_id,
                success: false,
                error: Some(e),
                usage: MeterUsage::default(),
                trace: Vec::new(),
            });

        let mut stats = self.stats.write().await;
        stats.deploys += 1;
        stats.record("deploy", result.success, result.error.as_ref(), &result.usage);
        metrics::set_cache_entries(self.dispatcher.loader().stats().entries);
        debug!(
            contract = %contract_id,
            success = result.success,
            steps = result.steps_used(),
            "Deploy completed"
        );
        result
    }

    #[instrument(skip(self, request), fields(correlation_id = %Uuid::new_v4(), contract = %request.contract_id, method = %request.method))]
    async fn invoke(&self, request: InvokeRequest) -> InvokeResult {
        let contract_id = request.contract_id;
        let result = self
            .run_locked(contract_id, move |d| d.invoke(&request))
            .await
            .unwrap_or_else(|e| InvokeResult {
                success: false,
                return_value: None,
                error: Some(e),
                usage: MeterUsage::default(),
                trace: Vec::new(),
            });

        let mut stats = self.stats.write().await;
        stats.invokes += 1;
        stats.record("invoke", result.success, result.error.as_ref(), &result.usage);
        debug!(
            success = result.success,
            steps = result.steps_used(),
            "Invoke completed"
        );
        result
    }

    #[instrument(skip(self, request), fields(correlation_id = %Uuid::new_v4(), contract = %request.contract_id))]
    async fn query(&self, request: QueryRequest) -> QueryResult {
        let contract_id = request.contract_id;
        let result = self
            .run_locked(contract_id, move |d| d.query(&request))
            .await
            .unwrap_or_else(|e| QueryResult {
                return_value: None,
                error: Some(e),
                usage: MeterUsage::default(),
                trace: Vec::new(),
            });

        let mut stats = self.stats.write().await;
        stats.queries += 1;
        stats.record("query", result.error.is_none(), result.error.as_ref(), &result.usage);
        debug!(steps = result.steps_used(), "Query completed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Value;

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

    #[tokio::test]
    async fn test_token_scenario() {
        let (service, _) = create_test_service();

        let deployed = service
            .deploy(DeployRequest::new(TOKEN, Value::map([("owner", Value::from("A"))])).with_caller("A"))
            .await;
        assert!(deployed.success, "{:?}", deployed.error);
        let id = deployed.contract_id;

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

        let a = service
            .query(QueryRequest::new(id, Value::map([("who", Value::from("A"))])))
            .await;
        assert_eq!(a.return_value, Some(Value::Int(70)));
        let b = service
            .query(QueryRequest::new(id, Value::map([("who", Value::from("B"))])))
            .await;
        assert_eq!(b.return_value, Some(Value::Int(30)));
    }

    #[tokio::test]
    async fn test_stats_track_outcomes() {
        let (service, _) = create_test_service();
        let id = service
            .deploy(DeployRequest::new(TOKEN, Value::map([("owner", Value::from("A"))])))
            .await
            .contract_id;

        let _ = service
            .invoke(InvokeRequest::new(id, "mint", Value::Null))
            .await;
        let _ = service
            .query(QueryRequest::new(id, Value::map([("who", Value::from("A"))])))
            .await;

        let stats = service.stats().await;
        assert_eq!(stats.deploys, 1);
        assert_eq!(stats.invokes, 1);
        assert_eq!(stats.queries, 1);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert!(stats.total_steps > 0);
    }

    #[tokio::test]
    async fn test_security_incident_is_counted() {
        let (service, store) = create_test_service();
        let source = r#"
            function Init(a) { return true; }
            function Invoke(m, a) { PutState(a, 1); return true; }
        "#;
        let id = service
            .deploy(DeployRequest::new(source, Value::Null))
            .await
            .contract_id;
        let before = store.snapshot();

        let foreign = format!("{}/balance", ContractId::from_source(b"victim").to_hex());
        let result = service
            .invoke(InvokeRequest::new(id, "steal", Value::Str(foreign)))
            .await;
        assert!(matches!(
            result.error,
            Some(ContractError::NamespaceViolation { .. })
        ));
        assert_eq!(store.snapshot(), before);
        assert_eq!(service.stats().await.security_incidents, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_invokes_on_one_contract_serialize() {
        let (service, _) = create_test_service();
        let service = Arc::new(service);
        let source = r#"
            function Init(a) { PutState("n", 0); return true; }
            function Invoke(m, a) { PutState("n", GetState("n") + 1); return true; }
            function Query(a) { return GetState("n"); }
        "#;
        let id = service
            .deploy(DeployRequest::new(source, Value::Null))
            .await
            .contract_id;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .invoke(InvokeRequest::new(id, "inc", Value::Null))
                        .await
                        .success
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let n = service.query(QueryRequest::new(id, Value::Null)).await;
        assert_eq!(n.return_value, Some(Value::Int(16)));
        assert_eq!(service.tracked_locks().await, 0);
    }

    #[tokio::test]
    async fn test_lock_table_does_not_grow_with_unknown_ids() {
        let (service, _) = create_test_service();
        for tag in 0..64u32 {
            let ghost = ContractId::from_source(&tag.to_be_bytes());
            let result = service.invoke(InvokeRequest::new(ghost, "x", Value::Null)).await;
            assert_eq!(result.error, Some(ContractError::ContractNotFound(ghost)));
            let _ = service.query(QueryRequest::new(ghost, Value::Null)).await;
        }
        let _ = service.deploy(DeployRequest::new("not a script", Value::Null)).await;
        assert_eq!(service.tracked_locks().await, 0);
    }
}
