//! # Driven Ports (SPI - Outbound)
//!
//! Interfaces the contract execution core depends on:
//! - Persistent key-value state
//! - An embeddable script engine
//!
//! Both are synchronous. Execution runs on blocking worker threads and never
//! waits on network I/O from inside a sandbox.

use crate::domain::entities::{EntryPoint, EntryPointSet, WriteSet};
use crate::domain::value_objects::{NamespacedKey, Value};
use crate::errors::{CompileError, ContractError, StateError};
use crate::sandbox::meter::ResourceMeter;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

// =============================================================================
// STATE STORE
// =============================================================================

/// Committed key-value state.
///
/// ## Implementation Notes
///
/// `commit` must be atomic across every namespace in the write set: either
/// all mutations become visible or none do.
pub trait StateStore: Send + Sync {
    /// Reads a committed value.
    fn get(&self, key: &NamespacedKey) -> Result<Option<Vec<u8>>, StateError>;

    /// Atomically applies a write set.
    fn commit(&self, writes: &WriteSet) -> Result<(), StateError>;
}

impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    fn get(&self, key: &NamespacedKey) -> Result<Option<Vec<u8>>, StateError> {
        (**self).get(key)
    }

    fn commit(&self, writes: &WriteSet) -> Result<(), StateError> {
        (**self).commit(writes)
    }
}

// =============================================================================
// SCRIPT ENGINE
// =============================================================================

/// Capabilities the sandbox hands to a running script.
///
/// Engines charge every step and allocation through [`HostApi::meter`] and
/// route every name they cannot resolve inside the script to
/// [`HostApi::call_binding`].
pub trait HostApi {
    /// Meter for the current call.
    fn meter(&mut self) -> &mut ResourceMeter;

    /// Returns true if `name` is a host binding.
    fn has_binding(&self, name: &str) -> bool;

    /// Calls a host binding by name. Unknown names are script errors.
    fn call_binding(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ContractError>;
}

/// A compiled, immutable contract program.
///
/// Shared between calls. Every call re-evaluates top-level bindings, so no
/// execution state survives between calls.
pub trait Executable: Send + Sync + Debug {
    /// Entry points declared by the program.
    fn entry_points(&self) -> EntryPointSet;

    /// Free identifiers the program references (not declared in the program).
    fn referenced_globals(&self) -> BTreeSet<String>;

    /// Runs one entry point with positional arguments.
    fn call(
        &self,
        entry: EntryPoint,
        args: Vec<Value>,
        host: &mut dyn HostApi,
    ) -> Result<Value, ContractError>;
}

/// Compiles source into an [`Executable`].
pub trait ScriptEngine: Send + Sync {
    /// Engine name, stored in the code record.
    fn name(&self) -> &'static str;

    /// Parses and compiles a source text.
    fn compile(&self, source: &str) -> Result<Arc<dyn Executable>, CompileError>;
}
