//! # Domain Invariants
//!
//! Invariants that must hold before a call's write set reaches committed
//! state. They are checked by the dispatcher right before commit; any
//! violation turns the commit into a discard.
//!
//! - Query Purity: a query never produces a write set
//! - Discard Law: a failed call never produces a write set
//! - Namespace Ownership: every written namespace belongs to a contract that
//!   executed in the call
//! - Call Depth Limit: nesting never exceeded the budget

use crate::domain::entities::{CallKind, WriteSet};
use crate::domain::value_objects::Namespace;
use std::collections::BTreeSet;

/// What the dispatcher is about to flush, and why.
#[derive(Clone, Debug)]
pub struct CommitCandidate<'a> {
    /// Call kind of the top-level call.
    pub kind: CallKind,
    /// Entry point returned a truthy value without error.
    pub succeeded: bool,
    /// Writes about to be flushed.
    pub writes: &'a WriteSet,
    /// Namespaces of every contract that executed during the call.
    pub executed: &'a BTreeSet<Namespace>,
    /// Deepest nesting reached.
    pub max_depth: u16,
    /// Depth ceiling from the budget.
    pub depth_limit: u16,
}

// =============================================================================
// INVARIANT CHECKS
// =============================================================================

/// Query Purity: queries never flush.
#[must_use]
pub fn check_query_purity_invariant(candidate: &CommitCandidate<'_>) -> bool {
    !candidate.kind.is_read_only()
}

/// Discard Law: only successful calls flush.
#[must_use]
pub fn check_discard_law_invariant(candidate: &CommitCandidate<'_>) -> bool {
    candidate.succeeded
}

/// Namespace Ownership: nothing is written outside the executed contracts.
#[must_use]
pub fn check_namespace_ownership_invariant(candidate: &CommitCandidate<'_>) -> bool {
    candidate
        .writes
        .namespaces()
        .all(|ns| candidate.executed.contains(ns))
}

/// Call Depth Limit.
#[must_use]
pub fn check_call_depth_invariant(candidate: &CommitCandidate<'_>) -> bool {
    candidate.max_depth <= candidate.depth_limit
}

/// Check all invariants at once.
#[must_use]
pub fn check_all_invariants(candidate: &CommitCandidate<'_>) -> InvariantCheckResult {
    let mut violations = Vec::new();

    if !check_query_purity_invariant(candidate) {
        violations.push(InvariantViolation::QueryWouldCommit {
            writes: candidate.writes.len(),
        });
    }

    if !check_discard_law_invariant(candidate) {
        violations.push(InvariantViolation::FailedCallWouldCommit {
            writes: candidate.writes.len(),
        });
    }

    if !check_namespace_ownership_invariant(candidate) {
        let foreign = candidate
            .writes
            .namespaces()
            .filter(|ns| !candidate.executed.contains(*ns))
            .cloned()
            .collect();
        violations.push(InvariantViolation::ForeignNamespaceWrite { namespaces: foreign });
    }

    if !check_call_depth_invariant(candidate) {
        violations.push(InvariantViolation::CallDepthExceeded {
            depth: candidate.max_depth,
            max: candidate.depth_limit,
        });
    }

    if violations.is_empty() {
        InvariantCheckResult::Valid
    } else {
        InvariantCheckResult::Invalid(violations)
    }
}

// =============================================================================
// INVARIANT TYPES
// =============================================================================

/// Result of checking all invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantCheckResult {
    /// All invariants hold.
    Valid,
    /// One or more invariants violated.
    Invalid(Vec<InvariantViolation>),
}

impl InvariantCheckResult {
    /// Returns true if all invariants hold.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Specific invariant violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A query call reached the commit path.
    QueryWouldCommit { writes: usize },
    /// A failed call reached the commit path.
    FailedCallWouldCommit { writes: usize },
    /// Writes target a namespace no executed contract owns.
    ForeignNamespaceWrite { namespaces: Vec<Namespace> },
    /// Call depth exceeded.
    CallDepthExceeded { depth: u16, max: u16 },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueryWouldCommit { writes } => {
                write!(f, "query attempted to commit {writes} writes")
            }
            Self::FailedCallWouldCommit { writes } => {
                write!(f, "failed call attempted to commit {writes} writes")
            }
            Self::ForeignNamespaceWrite { namespaces } => {
                let list: Vec<&str> = namespaces.iter().map(Namespace::as_str).collect();
                write!(f, "writes to foreign namespaces: {}", list.join(", "))
            }
            Self::CallDepthExceeded { depth, max } => {
                write!(f, "call depth exceeded: {depth} > {max}")
            }
        }
    }
}

// =============================================================================
// EXECUTION LIMIT CONSTANTS
// =============================================================================

/// Default execution limits.
pub mod limits {
    /// Maximum script size in bytes.
    pub const MAX_SCRIPT_SIZE: usize = 10_240;

    /// Maximum state key length in bytes.
    pub const MAX_STATE_KEY_LENGTH: usize = 256;

    /// Maximum encoded state value size in bytes.
    pub const MAX_STATE_VALUE_SIZE: usize = 10_240;

    /// Default maximum call depth.
    pub const MAX_CALL_DEPTH: u16 = 64;

    /// Parser nesting limit for the reference engine.
    pub const MAX_PARSE_DEPTH: usize = 64;

    /// Default loader cache capacity.
    pub const CACHE_CAPACITY: usize = 256;

    /// Maximum list/map nesting of a stored or JSON-encoded value. Kept well
    /// under the JSON decoder's recursion limit so every stored value reads
    /// back.
    pub const MAX_VALUE_DEPTH: usize = 64;

    /// Default maximum distinct state keys written by one top-level call.
    pub const MAX_STATE_WRITES: usize = 10_000;

    /// Combined statement/expression nesting for one top-level call. Sized
    /// so the deepest evaluation fits a 2 MiB thread stack in debug builds.
    pub const MAX_EVAL_NESTING: u32 = 256;

    /// Value bytes copied per charged step.
    pub const COPY_BYTES_PER_STEP: u64 = 64;
}

// =============================================================================
// TESTS
// =============================================================================
