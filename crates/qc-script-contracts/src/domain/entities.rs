//! # Core Domain Entities
//!
//! Main business entities for contract execution: entry points, per-call
//! execution contexts, and the write sets produced by successful calls.

use crate::domain::value_objects::{ContractId, Namespace, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved key holding the deployed code record inside a contract namespace.
pub const CONTRACT_CODE_KEY: &str = "__CONTRACT_CODE_KEY__";

/// Keys starting with this prefix belong to the host, never to scripts.
pub const RESERVED_KEY_PREFIX: &str = "__";

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// The three lifecycle entry points a contract may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryPoint {
    /// Runs once at deploy time.
    Init,
    /// State-changing call.
    Invoke,
    /// Read-only lookup.
    Query,
}

impl EntryPoint {
    /// All entry points in declaration order.
    pub const ALL: [EntryPoint; 3] = [Self::Init, Self::Invoke, Self::Query];

    /// Name of the top-level binding in the script.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Invoke => "Invoke",
            Self::Query => "Query",
        }
    }

    /// Looks up an entry point by binding name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entry| entry.name() == name)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of entry points a compiled script declares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryPointSet {
    /// `Init` is declared.
    pub init: bool,
    /// `Invoke` is declared.
    pub invoke: bool,
    /// `Query` is declared.
    pub query: bool,
}

impl EntryPointSet {
    /// Builds the set from the names of declared top-level functions.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::default();
        for name in names {
            match EntryPoint::from_name(name) {
                Some(EntryPoint::Init) => set.init = true,
                Some(EntryPoint::Invoke) => set.invoke = true,
                Some(EntryPoint::Query) => set.query = true,
                None => {}
            }
        }
        set
    }

    /// Returns true if the entry point is declared.
    #[must_use]
    pub const fn contains(&self, entry: EntryPoint) -> bool {
        match entry {
            EntryPoint::Init => self.init,
            EntryPoint::Invoke => self.invoke,
            EntryPoint::Query => self.query,
        }
    }
}

// =============================================================================
// CALL KIND
// =============================================================================

/// Class of host call. Selects the entry point and the budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    /// Contract deployment, runs `Init`.
    Deploy,
    /// State-changing call, runs `Invoke`.
    Invoke,
    /// Read-only call, runs `Query`.
    Query,
}

impl CallKind {
    /// Entry point dispatched for this call kind.
    #[must_use]
    pub const fn entry_point(self) -> EntryPoint {
        match self {
            Self::Deploy => EntryPoint::Init,
            Self::Invoke => EntryPoint::Invoke,
            Self::Query => EntryPoint::Query,
        }
    }

    /// Query calls never flush state.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Query)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deploy => "deploy",
            Self::Invoke => "invoke",
            Self::Query => "query",
        };
        f.write_str(name)
    }
}

// =============================================================================
// EXECUTION CONTEXT
// =============================================================================

/// Ephemeral record for one entry point execution.
///
/// Created at dispatch time and dropped when the call completes.
/// Nested contract calls get a child context with `depth + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Contract being executed.
    pub contract_id: ContractId,
    /// Namespace the contract owns.
    pub namespace: Namespace,
    /// Calling account (or calling contract id for nested calls).
    pub caller: String,
    /// Call kind.
    pub kind: CallKind,
    /// Method name for `Invoke`.
    pub method: Option<String>,
    /// Argument value.
    pub args: Value,
    /// Block height supplied by the host.
    pub block_height: u64,
    /// Nesting depth, 0 for top-level calls.
    pub depth: u16,
}

impl ExecutionContext {
    fn new(
        contract_id: ContractId,
        caller: String,
        kind: CallKind,
        method: Option<String>,
        args: Value,
        block_height: u64,
    ) -> Self {
        Self {
            namespace: contract_id.namespace(),
            contract_id,
            caller,
            kind,
            method,
            args,
            block_height,
            depth: 0,
        }
    }

    /// Context for running `Init`.
    #[must_use]
    pub fn for_deploy(
        contract_id: ContractId,
        caller: impl Into<String>,
        args: Value,
        block_height: u64,
    ) -> Self {
        Self::new(contract_id, caller.into(), CallKind::Deploy, None, args, block_height)
    }

    /// Context for running `Invoke(method, args)`.
    #[must_use]
    pub fn for_invoke(
        contract_id: ContractId,
        caller: impl Into<String>,
        method: impl Into<String>,
        args: Value,
        block_height: u64,
    ) -> Self {
        Self::new(
            contract_id,
            caller.into(),
            CallKind::Invoke,
            Some(method.into()),
            args,
            block_height,
        )
    }

    /// Context for running `Query(args)`.
    #[must_use]
    pub fn for_query(
        contract_id: ContractId,
        caller: impl Into<String>,
        args: Value,
        block_height: u64,
    ) -> Self {
        Self::new(contract_id, caller.into(), CallKind::Query, None, args, block_height)
    }

    /// Child context for a nested contract call.
    ///
    /// The callee sees the calling contract as its caller. A nested call
    /// from a query stays read-only.
    #[must_use]
    pub fn child_invoke(&self, callee: ContractId, method: impl Into<String>, args: Value) -> Self {
        let kind = if self.kind.is_read_only() {
            CallKind::Query
        } else {
            CallKind::Invoke
        };
        Self {
            namespace: callee.namespace(),
            contract_id: callee,
            caller: self.contract_id.to_hex(),
            kind,
            method: Some(method.into()),
            args,
            block_height: self.block_height,
            depth: self.depth.saturating_add(1),
        }
    }

    /// Entry point to dispatch. Nested calls always run `Invoke`.
    #[must_use]
    pub fn entry_point(&self) -> EntryPoint {
        if self.depth > 0 {
            EntryPoint::Invoke
        } else {
            self.kind.entry_point()
        }
    }

    /// Positional arguments passed to the entry point.
    #[must_use]
    pub fn entry_args(&self) -> Vec<Value> {
        match self.entry_point() {
            EntryPoint::Invoke => vec![
                Value::Str(self.method.clone().unwrap_or_default()),
                self.args.clone(),
            ],
            EntryPoint::Init | EntryPoint::Query => vec![self.args.clone()],
        }
    }
}

// =============================================================================
// WRITE SET
// =============================================================================

/// A buffered state mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Store encoded bytes.
    Put(Vec<u8>),
    /// Remove the key.
    Delete,
}

/// Ordered set of mutations produced by one successful call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSet {
    /// Mutations grouped by namespace, then key.
    pub entries: BTreeMap<Namespace, BTreeMap<String, WriteOp>>,
}

impl WriteSet {
    /// Creates an empty write set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mutation, replacing any earlier one for the same key.
    pub fn insert(&mut self, namespace: Namespace, key: String, op: WriteOp) {
        self.entries.entry(namespace).or_default().insert(key, op);
    }

    /// Looks up the pending mutation for a key.
    #[must_use]
    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<&WriteOp> {
        self.entries.get(namespace).and_then(|keys| keys.get(key))
    }

    /// Total number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns true if there are no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Namespaces touched by this write set.
    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.entries.keys()
    }

    /// Iterates `(namespace, key, op)` in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&Namespace, &String, &WriteOp)> {
        self.entries
            .iter()
            .flat_map(|(ns, keys)| keys.iter().map(move |(key, op)| (ns, key, op)))
    }

    /// SHA-256 digest over the ordered mutations.
    ///
    /// Two nodes executing the same call against the same pre-state must
    /// produce the same digest.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (ns, key, op) in self.iter() {
            hasher.update((ns.as_str().len() as u64).to_be_bytes());
            hasher.update(ns.as_str().as_bytes());
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key.as_bytes());
            match op {
                WriteOp::Put(bytes) => {
                    hasher.update([1u8]);
                    hasher.update((bytes.len() as u64).to_be_bytes());
                    hasher.update(bytes);
                }
                WriteOp::Delete => hasher.update([0u8]),
            }
        }
        hasher.finalize().into()
    }
}

// =============================================================================
// CODE RECORD
// =============================================================================

/// Code record stored under [`CONTRACT_CODE_KEY`] by a successful deploy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCode {
    /// Engine that compiled the code.
    pub engine: String,
    /// Contract source.
    pub code: String,
}

// =============================================================================
// TESTS
// =============================================================================
