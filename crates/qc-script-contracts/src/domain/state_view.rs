//! # State View
//!
//! Per-call overlay over committed state. Writes are buffered, reads fall
//! through to committed state and the first committed value seen for each
//! key is remembered for commit-time validation.

use crate::domain::entities::{WriteOp, WriteSet};
use crate::domain::value_objects::{Namespace, NamespacedKey};
use std::collections::BTreeMap;

/// Snapshot of the buffered writes, used to roll back a nested call.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    writes: WriteSet,
}

/// Namespaced read/write overlay scoped to one top-level call.
#[derive(Debug, Default)]
pub struct StateView {
    writes: WriteSet,
    reads: BTreeMap<NamespacedKey, Option<Vec<u8>>>,
    read_only: bool,
}

impl StateView {
    /// Creates a flushable view for deploy and invoke calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a view that can never produce a write set.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Returns true if this view can never be flushed.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Resolves a key from the overlay without touching committed state.
    ///
    /// `Some(v)` means the overlay knows the answer: a pending write or a
    /// previously observed committed value. `None` means the caller must
    /// fall through to committed state and call [`StateView::record_read`].
    #[must_use]
    pub fn lookup(&self, key: &NamespacedKey) -> Option<Option<Vec<u8>>> {
        if let Some(op) = self.writes.get(&key.namespace, &key.key) {
            return Some(match op {
                WriteOp::Put(bytes) => Some(bytes.clone()),
                WriteOp::Delete => None,
            });
        }
        self.reads.get(key).cloned()
    }

    /// Remembers the committed value observed for a key. Only the first
    /// observation is kept.
    pub fn record_read(&mut self, key: NamespacedKey, committed: Option<Vec<u8>>) {
        self.reads.entry(key).or_insert(committed);
    }

    /// Buffers a write.
    pub fn put(&mut self, namespace: Namespace, key: String, value: Vec<u8>) {
        self.writes.insert(namespace, key, WriteOp::Put(value));
    }

    /// Buffers a delete.
    pub fn delete(&mut self, namespace: Namespace, key: String) {
        self.writes.insert(namespace, key, WriteOp::Delete);
    }

    /// Captures the current buffered writes.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            writes: self.writes.clone(),
        }
    }

    /// Restores buffered writes to a checkpoint. Recorded reads are kept:
    /// the call still depended on them.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.writes = checkpoint.writes;
    }

    /// Buffered writes, regardless of flushability.
    #[must_use]
    pub const fn pending_writes(&self) -> &WriteSet {
        &self.writes
    }

    /// Committed values first observed by this call.
    #[must_use]
    pub const fn read_set(&self) -> &BTreeMap<NamespacedKey, Option<Vec<u8>>> {
        &self.reads
    }

    /// Consumes the view, yielding read set and write set.
    ///
    /// Returns `None` for read-only views.
    #[must_use]
    #[allow(clippy::type_complexity)]
    pub fn into_parts(self) -> Option<(BTreeMap<NamespacedKey, Option<Vec<u8>>>, WriteSet)> {
        if self.read_only {
            None
        } else {
            Some((self.reads, self.writes))
        }
    }
}
