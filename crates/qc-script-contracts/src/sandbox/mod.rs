//! # Deterministic Runtime Sandbox
//!
//! Runs exactly one entry point of a [`ContractUnit`] under a fresh
//! [`ResourceMeter`] and a fresh host.
//!
//! ## Guarantees
//!
//! - Scripts see no clock, entropy, filesystem or network: the host bindings
//!   in [`host`] are their only capabilities
//! - State is reached only through the [`StateBridge`]
//! - Script faults and engine panics become [`ContractError`] values

pub mod host;
pub mod meter;

use crate::bridge::StateBridge;
use crate::domain::entities::ExecutionContext;
use crate::domain::state_view::StateView;
use crate::domain::value_objects::{ContractId, Namespace, Value};
use crate::errors::ContractError;
use crate::loader::ContractUnit;
use host::SandboxHost;
use meter::{Budget, MeterUsage, ResourceMeter};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Resolves deployed contracts for nested calls.
pub trait ContractResolver {
    /// Returns the unit of a deployed contract, or `ContractNotFound`.
    fn resolve(&self, id: &ContractId) -> Result<ContractUnit, ContractError>;
}

/// Result of one sandboxed execution.
#[derive(Debug)]
pub struct SandboxOutput {
    /// Entry point return value or failure.
    pub result: Result<Value, ContractError>,
    /// The call's state view, to be committed or discarded.
    pub view: StateView,
    /// Resources consumed.
    pub usage: MeterUsage,
    /// Namespaces of every contract that ran.
    pub executed: BTreeSet<Namespace>,
    /// Lines emitted through `Log`.
    pub logs: Vec<String>,
}

/// Builds a fresh host per call.
pub struct Sandbox<'a> {
    bridge: &'a StateBridge,
    resolver: &'a dyn ContractResolver,
    check_interval: u64,
}

impl<'a> Sandbox<'a> {
    /// Creates a sandbox factory.
    pub fn new(
        bridge: &'a StateBridge,
        resolver: &'a dyn ContractResolver,
        check_interval: u64,
    ) -> Self {
        Self {
            bridge,
            resolver,
            check_interval,
        }
    }

    /// Executes the entry point selected by `context`.
    pub fn execute(
        &self,
        unit: &ContractUnit,
        context: ExecutionContext,
        view: StateView,
        budget: Budget,
    ) -> SandboxOutput {
        let entry = context.entry_point();
        let args = context.entry_args();
        let contract = context.contract_id;
        let meter = ResourceMeter::new(budget, self.check_interval);
        let mut host = SandboxHost::new(meter, self.bridge, self.resolver, view, context);

        let result = if unit.has_entry_point(entry) {
            let executable = &unit.executable;
            catch_unwind(AssertUnwindSafe(|| executable.call(entry, args, &mut host)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(contract = %contract, %message, "Script engine panicked");
                    Err(ContractError::script(format!("engine panic: {message}")))
                })
        } else {
            Err(ContractError::MissingEntryPoint(entry))
        };

        let parts = host.into_parts();
        SandboxOutput {
            result,
            usage: parts.meter.usage(),
            view: parts.view,
            executed: parts.executed,
            logs: parts.logs,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
