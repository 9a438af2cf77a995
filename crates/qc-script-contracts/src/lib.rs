//! # QC Script Contracts - Contract Execution Core
//!
//! **Status:** Production-Ready
//!
//! ## Purpose
//!
//! Executes untrusted, script-defined contracts deterministically. Every node
//! running the same calls against the same committed state produces the same
//! results and the same state changes.
//!
//! A contract is a script that defines up to three entry points:
//!
//! | Entry Point | Called By | Effect |
//! |-------------|-----------|--------|
//! | `Init(args)` | `deploy`, once per source | truthy result commits |
//! | `Invoke(method, args)` | `invoke` and nested `CallContract` | truthy result commits |
//! | `Query(args)` | `query` | never commits |
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Query Purity | `domain/invariants.rs` - `check_query_purity_invariant()` |
//! | Discard Law | `domain/invariants.rs` - `check_discard_law_invariant()` |
//! | Namespace Ownership | `domain/services.rs` - `resolve_script_key()` |
//! | Call Depth Limit | `sandbox/meter.rs` - `ResourceMeter::enter_frame()` |
//! | Single Init | `dispatcher.rs` - code record check before `Loading` |
//!
//! ## Components
//!
//! | Component | Location | Purpose |
//! |-----------|----------|---------|
//! | Script Loader | `loader.rs` | Size check, compile, forbidden globals, LRU cache |
//! | Sandbox | `sandbox/mod.rs` | Runs one entry point, contains engine panics |
//! | Host Bindings | `sandbox/host.rs` | `GetState`, `PutState`, `CallContract`, ... |
//! | Resource Meter | `sandbox/meter.rs` | Steps, memory, call depth |
//! | State Bridge | `bridge.rs` | Namespaced access, commit and discard |
//! | Dispatcher | `dispatcher.rs` | Deploy, invoke and query lifecycles |
//! | Service | `service.rs` | Async [`ContractApi`](ports::inbound::ContractApi) with per-contract locks |
//! | Reference Engine | `engine/` | Deterministic JavaScript-flavoured interpreter |
//!
//! ## Execution Safety Limits
//!
//! | Limit | Default | Purpose |
//! |-------|---------|---------|
//! | `max_script_size` | 10 KB | Limit contract size |
//! | `max_state_key_length` | 256 bytes | Limit key size |
//! | `max_state_value_size` | 10 KB | Limit value size |
//! | `invoke_budget.max_steps` | 1,000,000 | Bound runtime |
//! | `invoke_budget.max_memory_bytes` | 8 MB | Bound allocation |
//! | `max_call_depth` | 64 | Bound recursion and nested calls |
//!
//! ## Usage Example
//!
//! ```ignore
//! use qc_script_contracts::prelude::*;
//!
//! let (service, _store) = create_test_service();
//! let deployed = service
//!     .deploy(DeployRequest::new(source, Value::map([("owner", Value::from("A"))])))
//!     .await;
//!
//! let result = service
//!     .invoke(InvokeRequest::new(deployed.contract_id, "transfer", args).with_caller("A"))
//!     .await;
//! if result.success {
//!     println!("Steps used: {}", result.steps_used());
//! }
//! ```

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod loader;
pub mod metrics;
pub mod ports;
pub mod sandbox;
pub mod service;

pub use service::ContractService;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Domain entities
    pub use crate::domain::entities::{
        CallKind, ContractCode, EntryPoint, EntryPointSet, ExecutionContext, WriteOp, WriteSet,
        CONTRACT_CODE_KEY,
    };

    // Value objects
    pub use crate::domain::value_objects::{ContractId, Namespace, NamespacedKey, Value};

    // State view
    pub use crate::domain::state_view::StateView;

    // Invariants
    pub use crate::domain::invariants::{
        check_all_invariants, limits, InvariantCheckResult, InvariantViolation,
    };

    // Ports
    pub use crate::ports::inbound::{
        ContractApi, DeployRequest, DeployResult, InvokeRequest, InvokeResult, QueryRequest,
        QueryResult,
    };
    pub use crate::ports::outbound::{Executable, HostApi, ScriptEngine, StateStore};

    // Errors
    pub use crate::errors::{CompileError, ConfigError, ContractError, LoadError, StateError};

    // Core components
    pub use crate::bridge::{StateBridge, StateLimits};
    pub use crate::dispatcher::{DispatchPhase, Dispatcher};
    pub use crate::loader::{ContractUnit, LoaderStats, ScriptLoader};
    pub use crate::sandbox::meter::{Budget, MeterUsage, Resource, ResourceMeter};

    // Engine
    pub use crate::engine::{MiniScriptEngine, ENGINE_NAME};

    // Adapters
    pub use crate::adapters::InMemoryStateStore;

    // Service
    pub use crate::config::ServiceConfig;
    pub use crate::service::{create_test_service, ContractService, ServiceStats};
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// TESTS
// =============================================================================
