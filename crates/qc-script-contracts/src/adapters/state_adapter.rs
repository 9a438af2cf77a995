//! # State Adapter
//!
//! In-memory state store for testing and embedding.
//! A production node would back [`StateStore`] with its ledger database.

use crate::domain::entities::{WriteOp, WriteSet};
use crate::domain::value_objects::{Namespace, NamespacedKey};
use crate::errors::StateError;
use crate::ports::outbound::StateStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory committed state.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: RwLock<BTreeMap<NamespacedKey, Vec<u8>>>,
    commits: AtomicU64,
    fail_commits: AtomicBool,
}

impl InMemoryStateStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value directly, bypassing commit.
    pub fn insert(&self, key: NamespacedKey, value: impl Into<Vec<u8>>) {
        self.entries.write().insert(key, value.into());
    }

    /// Removes a value directly, bypassing commit.
    pub fn remove(&self, key: &NamespacedKey) {
        self.entries.write().remove(key);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes every following commit fail with `CommitRejected`.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Copy of all committed entries.
    pub fn snapshot(&self) -> BTreeMap<NamespacedKey, Vec<u8>> {
        self.entries.read().clone()
    }

    /// Committed entries of one namespace, keyed by relative key.
    pub fn namespace_entries(&self, namespace: &Namespace) -> BTreeMap<String, Vec<u8>> {
        self.entries
            .read()
            .iter()
            .filter(|(key, _)| &key.namespace == namespace)
            .map(|(key, value)| (key.key.clone(), value.clone()))
            .collect()
    }

    /// Total number of committed keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is committed.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &NamespacedKey) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn commit(&self, writes: &WriteSet) -> Result<(), StateError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StateError::CommitRejected("store is refusing commits".into()));
        }

        // Single write guard: readers see all of the write set or none of it.
        let mut entries = self.entries.write();
        for (namespace, key, op) in writes.iter() {
            let full_key = namespace.key(key.clone());
            match op {
                WriteOp::Put(bytes) => {
                    entries.insert(full_key, bytes.clone());
                }
                WriteOp::Delete => {
                    entries.remove(&full_key);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
