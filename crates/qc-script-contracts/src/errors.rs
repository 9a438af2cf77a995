//! # Error Types
//!
//! All error types for contract loading, sandboxed execution and state access.
//!
//! Every failure inside a call ends up as a [`ContractError`] inside a
//! structured result. Nothing raised by a script is allowed to escape as a
//! host fault.

use crate::domain::entities::EntryPoint;
use crate::domain::value_objects::{ContractId, Namespace};
use crate::sandbox::meter::Resource;
use thiserror::Error;

// =============================================================================
// COMPILE ERRORS
// =============================================================================

/// Grammar violation reported by a script engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at line {line}, column {column}")]
pub struct CompileError {
    /// Human readable description.
    pub message: String,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl CompileError {
    /// Creates a compile error at a source position.
    #[must_use]
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

// =============================================================================
// LOAD ERRORS
// =============================================================================

/// Errors raised by the script loader. Fatal to the deploy, no state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Source is empty or larger than the configured maximum.
    #[error("script size illegal: {size} bytes, max is {max} bytes")]
    InvalidSize { size: usize, max: usize },

    /// Source is not valid UTF-8.
    #[error("malformed script: {0}")]
    Malformed(String),

    /// Source does not parse under the engine grammar.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// Source references a host-forbidden global.
    #[error("script references forbidden global `{0}`")]
    ForbiddenGlobal(String),

    /// Stored code record was written by another engine.
    #[error("engine mismatch: code stored for `{stored}`, loader runs `{running}`")]
    EngineMismatch { stored: String, running: String },
}

// =============================================================================
// STATE ERRORS
// =============================================================================

/// Errors from the persistent state collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// State backend cannot be reached.
    #[error("state backend unavailable")]
    Unavailable,

    /// Backend refused the atomic commit.
    #[error("commit rejected: {0}")]
    CommitRejected(String),

    /// A stored value could not be decoded.
    #[error("corrupted state at {key}: {reason}")]
    Corrupted { key: String, reason: String },

    /// Other backend error.
    #[error("state error: {0}")]
    Other(String),
}

// =============================================================================
// CONTRACT ERRORS
// =============================================================================

/// Structured failure of a deploy, invoke or query call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Script failed to load.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// The contract does not define the entry point being called.
    #[error("missing entry point: {0}")]
    MissingEntryPoint(EntryPoint),

    /// Uncaught script-level fault (throw, type error, unknown binding).
    #[error("script execution error: {0}")]
    ScriptExecution(String),

    /// Step, memory or call-depth ceiling crossed.
    #[error("resource exhausted: {resource} used {used} > limit {limit}")]
    ResourceExhausted {
        resource: Resource,
        used: u64,
        limit: u64,
    },

    /// Access to a key outside the executing contract's namespace.
    #[error("namespace violation: contract {namespace} accessed key {key:?}")]
    NamespaceViolation { namespace: Namespace, key: String },

    /// `Init` already ran for this contract identity.
    #[error("contract already deployed: {0}")]
    AlreadyDeployed(ContractId),

    /// No deployed contract with this identity.
    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    /// Persistent state collaborator failure.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Committed state changed under a key this call read.
    #[error("state conflict on key {key}")]
    StateConflict { key: String },

    /// A domain invariant failed right before commit.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

impl ContractError {
    /// Shorthand for a script-level fault.
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::ScriptExecution(message.into())
    }

    /// Returns true for faults that indicate a bridge bug or a sandbox escape
    /// attempt. These are reported separately from ordinary failures.
    #[must_use]
    pub fn is_security_fault(&self) -> bool {
        matches!(self, Self::NamespaceViolation { .. })
    }

    /// Returns true when the caller supplied bad input and no state changed.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Load(_) | Self::AlreadyDeployed(_) | Self::ContractNotFound(_)
        )
    }

    /// Returns true when a retry with a larger budget could succeed.
    #[must_use]
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Stable, machine-readable error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load(_) => "load_error",
            Self::MissingEntryPoint(_) => "missing_entry_point",
            Self::ScriptExecution(_) => "script_execution_error",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::NamespaceViolation { .. } => "namespace_violation",
            Self::AlreadyDeployed(_) => "already_deployed",
            Self::ContractNotFound(_) => "contract_not_found",
            Self::State(_) => "state_error",
            Self::StateConflict { .. } => "state_conflict",
            Self::InvariantViolated(_) => "invariant_violated",
        }
    }
}

// =============================================================================
// CONFIG ERRORS
// =============================================================================

/// Errors from building a [`crate::config::ServiceConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),

    /// A field holds an unusable value.
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_display() {
        let err = ContractError::ResourceExhausted {
            resource: Resource::Steps,
            used: 1001,
            limit: 1000,
        };
        assert_eq!(err.to_string(), "resource exhausted: steps used 1001 > limit 1000");

        let err = ContractError::MissingEntryPoint(EntryPoint::Init);
        assert_eq!(err.to_string(), "missing entry point: Init");
    }

    #[test]
    fn test_classification() {
        let violation = ContractError::NamespaceViolation {
            namespace: Namespace::new("aa"),
            key: "bb/x".into(),
        };
        assert!(violation.is_security_fault());
        assert!(!violation.is_caller_error());

        let missing = ContractError::ContractNotFound(ContractId::from_source(b"x"));
        assert!(missing.is_caller_error());
        assert!(!missing.is_security_fault());

        assert!(!ContractError::script("boom").is_resource_exhaustion());
    }

    #[test]
    fn test_load_error_conversion() {
        let err: ContractError = LoadError::ForbiddenGlobal("Date".into()).into();
        assert_eq!(err.kind(), "load_error");

        let err: LoadError = CompileError::new("unexpected `}`", 3, 7).into();
        assert_eq!(
            err.to_string(),
            "compile error: unexpected `}` at line 3, column 7"
        );
    }

    #[test]
    fn test_state_error_conversion() {
        let err: ContractError = StateError::Unavailable.into();
        assert!(matches!(err, ContractError::State(StateError::Unavailable)));
    }
}
