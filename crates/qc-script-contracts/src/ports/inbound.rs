//! # Driving Ports (API - Inbound)
//!
//! The call surface the host node uses to deploy, invoke and query contracts.
//! Every failure is reported inside the result; the methods themselves never
//! fail.

use crate::dispatcher::DispatchPhase;
use crate::domain::value_objects::{ContractId, Value};
use crate::errors::ContractError;
use crate::sandbox::meter::MeterUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// REQUESTS
// =============================================================================

/// Deploy a contract and run its `Init`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Deploying account.
    pub caller: String,
    /// Contract source.
    pub source: Vec<u8>,
    /// Argument passed to `Init`.
    pub args: Value,
    /// Current block height.
    pub block_height: u64,
}

impl DeployRequest {
    /// Creates a request with an empty caller at height 0.
    #[must_use]
    pub fn new(source: impl Into<Vec<u8>>, args: Value) -> Self {
        Self {
            caller: String::new(),
            source: source.into(),
            args,
            block_height: 0,
        }
    }

    /// Sets the calling account.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Sets the block height.
    #[must_use]
    pub const fn at_height(mut self, block_height: u64) -> Self {
        self.block_height = block_height;
        self
    }
}

/// Run `Invoke(method, args)` on a deployed contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Calling account.
    pub caller: String,
    /// Target contract.
    pub contract_id: ContractId,
    /// Method name.
    pub method: String,
    /// Argument value.
    pub args: Value,
    /// Current block height.
    pub block_height: u64,
}

impl InvokeRequest {
    /// Creates a request with an empty caller at height 0.
    #[must_use]
    pub fn new(contract_id: ContractId, method: impl Into<String>, args: Value) -> Self {
        Self {
            caller: String::new(),
            contract_id,
            method: method.into(),
            args,
            block_height: 0,
        }
    }

    /// Sets the calling account.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Sets the block height.
    #[must_use]
    pub const fn at_height(mut self, block_height: u64) -> Self {
        self.block_height = block_height;
        self
    }
}

/// Run `Query(args)` on a deployed contract. Never changes state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Calling account.
    pub caller: String,
    /// Target contract.
    pub contract_id: ContractId,
    /// Argument value.
    pub args: Value,
    /// Current block height.
    pub block_height: u64,
}

impl QueryRequest {
    /// Creates a request with an empty caller at height 0.
    #[must_use]
    pub fn new(contract_id: ContractId, args: Value) -> Self {
        Self {
            caller: String::new(),
            contract_id,
            args,
            block_height: 0,
        }
    }

    /// Sets the calling account.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Sets the block height.
    #[must_use]
    pub const fn at_height(mut self, block_height: u64) -> Self {
        self.block_height = block_height;
        self
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Outcome of a deploy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployResult {
    /// Content-addressed identity of the source (set even on failure).
    pub contract_id: ContractId,
    /// `Init` returned truthy and state was committed.
    pub success: bool,
    /// Failure cause. `None` when `Init` merely returned falsy.
    pub error: Option<ContractError>,
    /// Resources consumed.
    pub usage: MeterUsage,
    /// Dispatcher phases visited.
    pub trace: Vec<DispatchPhase>,
}

impl DeployResult {
    /// Steps consumed.
    #[must_use]
    pub const fn steps_used(&self) -> u64 {
        self.usage.steps
    }
}

/// Outcome of an invoke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeResult {
    /// `Invoke` returned truthy and state was committed.
    pub success: bool,
    /// Value returned by `Invoke`, when it returned.
    pub return_value: Option<Value>,
    /// Failure cause. `None` when `Invoke` merely returned falsy.
    pub error: Option<ContractError>,
    /// Resources consumed.
    pub usage: MeterUsage,
    /// Dispatcher phases visited.
    pub trace: Vec<DispatchPhase>,
}

impl InvokeResult {
    /// Steps consumed.
    #[must_use]
    pub const fn steps_used(&self) -> u64 {
        self.usage.steps
    }
}

/// Outcome of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryResult {
    /// Value returned by `Query`.
    pub return_value: Option<Value>,
    /// Failure cause.
    pub error: Option<ContractError>,
    /// Resources consumed.
    pub usage: MeterUsage,
    /// Dispatcher phases visited.
    pub trace: Vec<DispatchPhase>,
}

impl QueryResult {
    /// Steps consumed.
    #[must_use]
    pub const fn steps_used(&self) -> u64 {
        self.usage.steps
    }
}

// =============================================================================
// CONTRACT API
// =============================================================================

/// Host-facing contract execution API.
#[async_trait]
pub trait ContractApi: Send + Sync {
    /// Loads a contract and runs `Init` exactly once for its identity.
    async fn deploy(&self, request: DeployRequest) -> DeployResult;

    /// Runs `Invoke`. Truthy result commits, anything else discards.
    async fn invoke(&self, request: InvokeRequest) -> InvokeResult;

    /// Runs `Query`. Never commits.
    async fn query(&self, request: QueryRequest) -> QueryResult;
}
