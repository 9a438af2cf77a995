//! # Sandbox Host
//!
//! The only capabilities a running script has. Bindings are looked up by
//! name at call time; an unknown name is a script error, never a no-op.
//!
//! | Binding | Semantics |
//! |---------|-----------|
//! | `GetState(key)` | value or `null` |
//! | `PutState(key, value)` | buffer a write |
//! | `DelState(key)` | buffer a delete |
//! | `Caller()` | calling account |
//! | `ContractId()` | hex id of the executing contract |
//! | `BlockHeight()` | block height supplied by the host |
//! | `CallContract(id, method, args)` | nested `Invoke` of another contract |
//! | `Log(...)` | debug trace line, no consensus effect |

use crate::bridge::StateBridge;
use crate::domain::entities::{EntryPoint, ExecutionContext};
use crate::domain::state_view::StateView;
use crate::domain::value_objects::{ContractId, Namespace, Value};
use crate::errors::ContractError;
use crate::ports::outbound::HostApi;
use crate::sandbox::meter::ResourceMeter;
use crate::sandbox::ContractResolver;
use std::collections::BTreeSet;
use tracing::debug;

/// Host bindings exposed to scripts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostBinding {
    /// `GetState(key)`
    GetState,
    /// `PutState(key, value)`
    PutState,
    /// `DelState(key)`
    DelState,
    /// `Caller()`
    Caller,
    /// `ContractId()`
    ContractId,
    /// `BlockHeight()`
    BlockHeight,
    /// `CallContract(id, method, args)`
    CallContract,
    /// `Log(...)`
    Log,
}

impl HostBinding {
    /// All bindings.
    pub const ALL: [HostBinding; 8] = [
        Self::GetState,
        Self::PutState,
        Self::DelState,
        Self::Caller,
        Self::ContractId,
        Self::BlockHeight,
        Self::CallContract,
        Self::Log,
    ];

    /// Script-visible name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetState => "GetState",
            Self::PutState => "PutState",
            Self::DelState => "DelState",
            Self::Caller => "Caller",
            Self::ContractId => "ContractId",
            Self::BlockHeight => "BlockHeight",
            Self::CallContract => "CallContract",
            Self::Log => "Log",
        }
    }

    /// Looks up a binding by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|binding| binding.name() == name)
    }

    /// Step cost charged before the binding runs.
    #[must_use]
    pub const fn step_cost(self) -> u64 {
        match self {
            Self::Caller | Self::ContractId | Self::BlockHeight | Self::Log => 1,
            Self::GetState => 10,
            Self::PutState | Self::DelState => 20,
            Self::CallContract => 50,
        }
    }
}

/// Per-call host: meter, state view and the stack of execution contexts.
pub struct SandboxHost<'a> {
    meter: ResourceMeter,
    bridge: &'a StateBridge,
    resolver: &'a dyn ContractResolver,
    view: StateView,
    frames: Vec<ExecutionContext>,
    executed: BTreeSet<Namespace>,
    logs: Vec<String>,
}

/// What is left of a host after execution.
#[derive(Debug)]
pub struct HostParts {
    /// Meter with final usage.
    pub meter: ResourceMeter,
    /// Buffered writes and recorded reads.
    pub view: StateView,
    /// Namespaces of every contract that ran.
    pub executed: BTreeSet<Namespace>,
    /// Lines emitted through `Log`.
    pub logs: Vec<String>,
}

impl<'a> SandboxHost<'a> {
    /// Creates the host for a top-level context.
    pub fn new(
        meter: ResourceMeter,
        bridge: &'a StateBridge,
        resolver: &'a dyn ContractResolver,
        view: StateView,
        context: ExecutionContext,
    ) -> Self {
        let mut executed = BTreeSet::new();
        executed.insert(context.namespace.clone());
        Self {
            meter,
            bridge,
            resolver,
            view,
            frames: vec![context],
            executed,
            logs: Vec::new(),
        }
    }

    /// Consumes the host.
    #[must_use]
    pub fn into_parts(self) -> HostParts {
        HostParts {
            meter: self.meter,
            view: self.view,
            executed: self.executed,
            logs: self.logs,
        }
    }

    fn current(&self) -> Result<&ExecutionContext, ContractError> {
        self.frames
            .last()
            .ok_or_else(|| ContractError::InvariantViolated("sandbox has no execution context".into()))
    }

    fn current_namespace(&self) -> Result<Namespace, ContractError> {
        Ok(self.current()?.namespace.clone())
    }

    fn get_state(&mut self, key: &str) -> Result<Value, ContractError> {
        let ns = self.current_namespace()?;
        let value = self.bridge.get(&mut self.view, &ns, key)?;
        self.meter.charge_memory(value.approx_size())?;
        Ok(value)
    }

    fn put_state(&mut self, key: &str, value: &Value) -> Result<Value, ContractError> {
        let ns = self.current_namespace()?;
        let size = self.bridge.set(&mut self.view, &ns, key, value)?;
        self.meter.charge_memory(size)?;
        Ok(Value::Bool(true))
    }

    fn del_state(&mut self, key: &str) -> Result<Value, ContractError> {
        let ns = self.current_namespace()?;
        self.bridge.delete(&mut self.view, &ns, key)?;
        Ok(Value::Bool(true))
    }

    fn call_contract(
        &mut self,
        target: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, ContractError> {
        let callee = ContractId::from_hex(target)
            .map_err(|_| ContractError::script(format!("CallContract: invalid contract id {target:?}")))?;
        if self.frames.iter().any(|frame| frame.contract_id == callee) {
            return Err(ContractError::script(format!(
                "CallContract: reentrant call into {callee}"
            )));
        }

        let unit = self.resolver.resolve(&callee)?;
        if !unit.has_entry_point(EntryPoint::Invoke) {
            return Err(ContractError::MissingEntryPoint(EntryPoint::Invoke));
        }

        let child = self.current()?.child_invoke(callee, method, args);
        let entry_args = child.entry_args();
        debug!(
            caller = %child.caller,
            callee = %callee,
            method,
            depth = child.depth,
            "Nested contract call"
        );

        let checkpoint = self.view.checkpoint();
        self.executed.insert(child.namespace.clone());
        self.frames.push(child);
        let result = unit.executable.call(EntryPoint::Invoke, entry_args, self);
        self.frames.pop();

        let value = result?;
        if !value.is_truthy() {
            debug!(callee = %callee, "Nested call returned falsy, rolling back its writes");
            self.view.rollback(checkpoint);
        }
        Ok(value)
    }

    fn log(&mut self, args: &[Value]) -> Result<Value, ContractError> {
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        self.meter.charge_memory(line.len() as u64)?;
        debug!(contract = %self.current()?.contract_id, "script: {line}");
        self.logs.push(line);
        Ok(Value::Null)
    }
}

impl HostApi for SandboxHost<'_> {
    fn meter(&mut self) -> &mut ResourceMeter {
        &mut self.meter
    }

    fn has_binding(&self, name: &str) -> bool {
        HostBinding::from_name(name).is_some()
    }

    fn call_binding(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ContractError> {
        let binding = HostBinding::from_name(name)
            .ok_or_else(|| ContractError::script(format!("unknown host binding `{name}`")))?;
        self.meter.charge_steps(binding.step_cost())?;

        match binding {
            HostBinding::GetState => {
                let [key] = take_args::<1>(binding, args)?;
                self.get_state(key_str(binding, &key)?)
            }
            HostBinding::PutState => {
                let [key, value] = take_args::<2>(binding, args)?;
                self.put_state(key_str(binding, &key)?, &value)
            }
            HostBinding::DelState => {
                let [key] = take_args::<1>(binding, args)?;
                self.del_state(key_str(binding, &key)?)
            }
            HostBinding::Caller => {
                let [] = take_args::<0>(binding, args)?;
                Ok(Value::Str(self.current()?.caller.clone()))
            }
            HostBinding::ContractId => {
                let [] = take_args::<0>(binding, args)?;
                Ok(Value::Str(self.current()?.contract_id.to_hex()))
            }
            HostBinding::BlockHeight => {
                let [] = take_args::<0>(binding, args)?;
                let height = self.current()?.block_height;
                Ok(Value::Int(i64::try_from(height).unwrap_or(i64::MAX)))
            }
            HostBinding::CallContract => {
                let [target, method, call_args] = take_args::<3>(binding, args)?;
                let target = key_str(binding, &target)?.to_string();
                let method = key_str(binding, &method)?.to_string();
                self.call_contract(&target, &method, call_args)
            }
            HostBinding::Log => self.log(&args),
        }
    }
}

fn take_args<const N: usize>(binding: HostBinding, args: Vec<Value>) -> Result<[Value; N], ContractError> {
    args.try_into().map_err(|args: Vec<Value>| {
        ContractError::script(format!(
            "{}() expects {N} argument(s), got {}",
            binding.name(),
            args.len()
        ))
    })
}

fn key_str(binding: HostBinding, value: &Value) -> Result<&str, ContractError> {
    value.as_str().ok_or_else(|| {
        ContractError::script(format!(
            "{}() expects a string, got {}",
            binding.name(),
            value.type_name()
        ))
    })
}
