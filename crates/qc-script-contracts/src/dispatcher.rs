//! # Call Dispatcher
//!
//! Drives one deploy, invoke or query through its lifecycle:
//!
//! ```text
//! Idle -> Loading -> Executing -> Committing -> Idle     (deploy, truthy Init)
//! Idle -> Executing -> Committing -> Idle                (invoke, truthy)
//! Idle -> Executing -> Discarding -> Idle                (query, falsy, failure)
//! Idle -> Loading -> Idle                                (load failure, already deployed)
//! Committing -> Discarding -> Idle                       (invariant or commit failure)
//! ```
//!
//! A contract is deployed when its code record exists in committed state.
//! The loader cache is only an accelerator: a cache miss reloads the unit
//! from the code record.

use crate::bridge::StateBridge;
use crate::config::ServiceConfig;
use crate::domain::entities::{CallKind, ContractCode, ExecutionContext, CONTRACT_CODE_KEY};
use crate::domain::invariants::{check_all_invariants, CommitCandidate, InvariantCheckResult};
use crate::domain::services::code_record_key;
use crate::domain::state_view::StateView;
use crate::domain::value_objects::{ContractId, Value};
use crate::errors::{ContractError, LoadError, StateError};
use crate::loader::{ContractUnit, ScriptLoader};
use crate::ports::inbound::{
    DeployRequest, DeployResult, InvokeRequest, InvokeResult, QueryRequest, QueryResult,
};
use crate::ports::outbound::{ScriptEngine, StateStore};
use crate::sandbox::meter::{Budget, MeterUsage};
use crate::sandbox::{ContractResolver, Sandbox, SandboxOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

// =============================================================================
// DISPATCH PHASES
// =============================================================================

/// Lifecycle phase of a single call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchPhase {
    /// No call in progress.
    Idle,
    /// Validating and compiling the source.
    Loading,
    /// Entry point running in the sandbox.
    Executing,
    /// Flushing the state view.
    Committing,
    /// Dropping the state view.
    Discarding,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records phase transitions and rejects illegal ones.
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    phase: DispatchPhase,
    trace: Vec<DispatchPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    /// Starts in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: DispatchPhase::Idle,
            trace: vec![DispatchPhase::Idle],
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> DispatchPhase {
        self.phase
    }

    /// Returns true if `from -> to` is a legal transition.
    #[must_use]
    pub const fn is_legal(from: DispatchPhase, to: DispatchPhase) -> bool {
        use DispatchPhase::{Committing, Discarding, Executing, Idle, Loading};
        matches!(
            (from, to),
            (Idle, Loading | Executing)
                | (Loading, Executing | Idle)
                | (Executing, Committing | Discarding)
                | (Committing, Idle | Discarding)
                | (Discarding, Idle)
        )
    }

    /// Moves to `to`.
    pub fn transition(&mut self, to: DispatchPhase) -> Result<(), ContractError> {
        if !Self::is_legal(self.phase, to) {
            return Err(ContractError::InvariantViolated(format!(
                "illegal dispatch transition {} -> {to}",
                self.phase
            )));
        }
        debug!(from = %self.phase, to = %to, "Dispatch phase transition");
        self.phase = to;
        self.trace.push(to);
        Ok(())
    }

    /// Returns to `Idle` and yields the visited phases.
    #[must_use]
    pub fn finish(mut self) -> Vec<DispatchPhase> {
        if self.phase != DispatchPhase::Idle {
            self.trace.push(DispatchPhase::Idle);
        }
        self.trace
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// How a call settled.
#[derive(Debug)]
struct Settled {
    success: bool,
    return_value: Option<Value>,
    error: Option<ContractError>,
}

impl Settled {
    fn failed(error: ContractError) -> Self {
        Self {
            success: false,
            return_value: None,
            error: Some(error),
        }
    }
}

/// Synchronous core behind [`crate::ContractService`].
pub struct Dispatcher {
    config: ServiceConfig,
    loader: ScriptLoader,
    bridge: StateBridge,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("loader", &self.loader)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over a script engine and a state store.
    pub fn new(
        config: ServiceConfig,
        engine: Arc<dyn ScriptEngine>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let loader = ScriptLoader::new(
            engine,
            config.max_script_size,
            config.forbidden_globals.iter().cloned(),
            config.cache_capacity,
        );
        let bridge = StateBridge::new(store, config.state_limits());
        Self {
            config,
            loader,
            bridge,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The script loader.
    #[must_use]
    pub const fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    /// The state bridge.
    #[must_use]
    pub const fn bridge(&self) -> &StateBridge {
        &self.bridge
    }

    /// Returns true if a code record exists for `id`.
    pub fn is_deployed(&self, id: &ContractId) -> Result<bool, ContractError> {
        Ok(self.code_record(id)?.is_some())
    }

    /// Loads a contract and runs `Init` once for its identity.
    pub fn deploy(&self, request: &DeployRequest) -> DeployResult {
        let contract_id = ContractId::from_source(&request.source);
        let mut tracker = PhaseTracker::new();
        let mut usage = MeterUsage::default();

        let settled = self
            .run_deploy(contract_id, request, &mut tracker, &mut usage)
            .unwrap_or_else(Settled::failed);

        DeployResult {
            contract_id,
            success: settled.success,
            error: settled.error,
            usage,
            trace: tracker.finish(),
        }
    }

    /// Runs `Invoke(method, args)` on a deployed contract.
    pub fn invoke(&self, request: &InvokeRequest) -> InvokeResult {
        let mut tracker = PhaseTracker::new();
        let mut usage = MeterUsage::default();

        let settled = self
            .run_invoke(request, &mut tracker, &mut usage)
            .unwrap_or_else(Settled::failed);

        InvokeResult {
            success: settled.success,
            return_value: settled.return_value,
            error: settled.error,
            usage,
            trace: tracker.finish(),
        }
    }

    /// Runs `Query(args)` on a deployed contract. Never commits.
    pub fn query(&self, request: &QueryRequest) -> QueryResult {
        let mut tracker = PhaseTracker::new();
        let mut usage = MeterUsage::default();

        let settled = self
            .run_query(request, &mut tracker, &mut usage)
            .unwrap_or_else(Settled::failed);

        QueryResult {
            return_value: settled.return_value,
            error: settled.error,
            usage,
            trace: tracker.finish(),
        }
    }

    fn run_deploy(
        &self,
        contract_id: ContractId,
        request: &DeployRequest,
        tracker: &mut PhaseTracker,
        usage: &mut MeterUsage,
    ) -> Result<Settled, ContractError> {
        tracker.transition(DispatchPhase::Loading)?;

        if self.is_deployed(&contract_id)? {
            tracker.transition(DispatchPhase::Idle)?;
            debug!(contract = %contract_id, "Rejected redeploy");
            return Err(ContractError::AlreadyDeployed(contract_id));
        }

        let unit = match self.loader.load(&request.source) {
            Ok(unit) => unit,
            Err(e) => {
                tracker.transition(DispatchPhase::Idle)?;
                warn!(contract = %contract_id, error = %e, "Contract failed to load");
                return Err(e.into());
            }
        };
        let code = std::str::from_utf8(&request.source)
            .map_err(|e| LoadError::Malformed(e.to_string()))?;

        tracker.transition(DispatchPhase::Executing)?;
        let context = ExecutionContext::for_deploy(
            contract_id,
            request.caller.clone(),
            request.args.clone(),
            request.block_height,
        );
        let budget = self.config.deploy_budget;
        let output = self.execute(&unit, context, StateView::new(), budget);
        *usage = output.usage;

        let settled = self.settle(CallKind::Deploy, contract_id, tracker, output, &budget, Some(code))?;
        if !settled.success {
            self.loader.evict(&contract_id);
        }
        Ok(settled)
    }

    fn run_invoke(
        &self,
        request: &InvokeRequest,
        tracker: &mut PhaseTracker,
        usage: &mut MeterUsage,
    ) -> Result<Settled, ContractError> {
        let unit = self.resolve(&request.contract_id)?;

        tracker.transition(DispatchPhase::Executing)?;
        let context = ExecutionContext::for_invoke(
            request.contract_id,
            request.caller.clone(),
            request.method.clone(),
            request.args.clone(),
            request.block_height,
        );
        let budget = self.config.invoke_budget;
        let output = self.execute(&unit, context, StateView::new(), budget);
        *usage = output.usage;

        self.settle(CallKind::Invoke, request.contract_id, tracker, output, &budget, None)
    }

    fn run_query(
        &self,
        request: &QueryRequest,
        tracker: &mut PhaseTracker,
        usage: &mut MeterUsage,
    ) -> Result<Settled, ContractError> {
        let unit = self.resolve(&request.contract_id)?;

        tracker.transition(DispatchPhase::Executing)?;
        let context = ExecutionContext::for_query(
            request.contract_id,
            request.caller.clone(),
            request.args.clone(),
            request.block_height,
        );
        let budget = self.config.query_budget;
        let output = self.execute(&unit, context, StateView::read_only(), budget);
        *usage = output.usage;

        self.settle(CallKind::Query, request.contract_id, tracker, output, &budget, None)
    }

    fn execute(
        &self,
        unit: &ContractUnit,
        context: ExecutionContext,
        view: StateView,
        budget: Budget,
    ) -> SandboxOutput {
        Sandbox::new(&self.bridge, self, self.config.check_interval).execute(
            unit, context, view, budget,
        )
    }

    /// Commits or discards the call's state view.
    fn settle(
        &self,
        kind: CallKind,
        contract: ContractId,
        tracker: &mut PhaseTracker,
        output: SandboxOutput,
        budget: &Budget,
        code: Option<&str>,
    ) -> Result<Settled, ContractError> {
        let SandboxOutput {
            result,
            mut view,
            usage,
            executed,
            logs,
        } = output;
        debug!(
            contract = %contract,
            kind = %kind,
            steps = usage.steps,
            memory = usage.memory_bytes,
            logs = logs.len(),
            "Entry point finished"
        );

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                report_failure(kind, contract, &e);
                tracker.transition(DispatchPhase::Discarding)?;
                self.bridge.discard(view);
                return Ok(Settled::failed(e));
            }
        };

        if kind.is_read_only() || !value.is_truthy() {
            tracker.transition(DispatchPhase::Discarding)?;
            self.bridge.discard(view);
            return Ok(Settled {
                success: false,
                return_value: Some(value),
                error: None,
            });
        }

        tracker.transition(DispatchPhase::Committing)?;
        if let Some(code) = code {
            self.stage_code_record(&mut view, contract, code)?;
        }

        let candidate = CommitCandidate {
            kind,
            succeeded: true,
            writes: view.pending_writes(),
            executed: &executed,
            max_depth: usage.max_depth,
            depth_limit: budget.max_call_depth,
        };
        if let InvariantCheckResult::Invalid(violations) = check_all_invariants(&candidate) {
            let message = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            error!(contract = %contract, %message, "Commit invariant violated");
            tracker.transition(DispatchPhase::Discarding)?;
            self.bridge.discard(view);
            return Ok(Settled::failed(ContractError::InvariantViolated(message)));
        }

        match self.bridge.commit(view) {
            Ok(writes) => {
                debug!(contract = %contract, kind = %kind, writes = writes.len(), "Call committed");
                Ok(Settled {
                    success: true,
                    return_value: Some(value),
                    error: None,
                })
            }
            Err(e) => {
                warn!(contract = %contract, error = %e, "Commit failed, state unchanged");
                tracker.transition(DispatchPhase::Discarding)?;
                Ok(Settled::failed(e))
            }
        }
    }

    /// Adds the code record to a deploy's writes. The recorded absent read
    /// makes two racing deploys of the same source conflict at commit.
    fn stage_code_record(
        &self,
        view: &mut StateView,
        contract: ContractId,
        code: &str,
    ) -> Result<(), ContractError> {
        let namespace = contract.namespace();
        let record = ContractCode {
            engine: self.loader.engine_name().to_string(),
            code: code.to_string(),
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| ContractError::InvariantViolated(format!("code record: {e}")))?;
        view.record_read(code_record_key(&namespace), None);
        view.put(namespace, CONTRACT_CODE_KEY.to_string(), bytes);
        Ok(())
    }

    fn code_record(&self, id: &ContractId) -> Result<Option<ContractCode>, ContractError> {
        let key = code_record_key(&id.namespace());
        let Some(bytes) = self.bridge.read_committed(&key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| {
                ContractError::State(StateError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
    }
}

impl ContractResolver for Dispatcher {
    fn resolve(&self, id: &ContractId) -> Result<ContractUnit, ContractError> {
        let Some(record) = self.code_record(id)? else {
            return Err(ContractError::ContractNotFound(*id));
        };
        if let Some(unit) = self.loader.get(id) {
            return Ok(unit);
        }

        let running = self.loader.engine_name();
        if record.engine != running {
            return Err(LoadError::EngineMismatch {
                stored: record.engine,
                running: running.to_string(),
            }
            .into());
        }

        debug!(contract = %id, "Reloading contract from code record");
        let unit = self.loader.load(record.code.as_bytes())?;
        if unit.id != *id {
            self.loader.evict(&unit.id);
            return Err(ContractError::State(StateError::Corrupted {
                key: code_record_key(&id.namespace()).to_string(),
                reason: format!("code hashes to {}", unit.id),
            }));
        }
        Ok(unit)
    }
}

fn report_failure(kind: CallKind, contract: ContractId, e: &ContractError) {
    if e.is_security_fault() {
        error!(
            security_incident = true,
            contract = %contract,
            kind = %kind,
            error = %e,
            "Contract attempted access outside its namespace"
        );
    } else if e.is_resource_exhaustion() {
        warn!(contract = %contract, kind = %kind, error = %e, "Contract exhausted its budget");
    } else {
        debug!(contract = %contract, kind = %kind, error = %e, "Contract call failed");
    }
}
