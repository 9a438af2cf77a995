//! # State Access Bridge
//!
//! Mediates every read and write between a sandbox and committed state.
//!
//! ## Rules
//!
//! - Scripts address keys relative to their own namespace; foreign and
//!   host-reserved keys are rejected with `NamespaceViolation`
//! - Reads see pending writes first, then committed state
//! - Writes only ever land in the call's [`StateView`], and one call may
//!   touch at most `max_state_writes` distinct keys
//! - `commit` validates the read set and flushes atomically under a
//!   single-writer lock; `discard` drops the view

use crate::domain::entities::WriteSet;
use crate::domain::services::{decode_state_value, encode_state_value, resolve_script_key};
use crate::domain::state_view::StateView;
use crate::domain::value_objects::{Namespace, NamespacedKey, Value};
use crate::errors::ContractError;
use crate::ports::outbound::StateStore;
use crate::sandbox::meter::Resource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Size limits applied to script state access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLimits {
    /// Maximum relative key length in bytes.
    pub max_key_length: usize,
    /// Maximum encoded value size in bytes.
    pub max_value_size: usize,
    /// Maximum distinct keys written or deleted by one top-level call.
    pub max_state_writes: usize,
}

impl Default for StateLimits {
    fn default() -> Self {
        use crate::domain::invariants::limits;
        Self {
            max_key_length: limits::MAX_STATE_KEY_LENGTH,
            max_value_size: limits::MAX_STATE_VALUE_SIZE,
            max_state_writes: limits::MAX_STATE_WRITES,
        }
    }
}

/// Narrow, namespace-checked access to committed state.
pub struct StateBridge {
    store: Arc<dyn StateStore>,
    limits: StateLimits,
    commit_lock: Mutex<()>,
}

impl std::fmt::Debug for StateBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBridge")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl StateBridge {
    /// Creates a bridge over a state store.
    pub fn new(store: Arc<dyn StateStore>, limits: StateLimits) -> Self {
        Self {
            store,
            limits,
            commit_lock: Mutex::new(()),
        }
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> &StateLimits {
        &self.limits
    }

    /// Reads a script key for the contract owning `own`.
    ///
    /// Missing keys read as `Null`.
    pub fn get(
        &self,
        view: &mut StateView,
        own: &Namespace,
        raw_key: &str,
    ) -> Result<Value, ContractError> {
        let key = resolve_script_key(own, raw_key, self.limits.max_key_length)?;
        match self.read_through(view, key.clone())? {
            Some(bytes) => decode_state_value(&key, &bytes),
            None => Ok(Value::Null),
        }
    }

    /// Buffers a write of `value` under a script key.
    pub fn set(
        &self,
        view: &mut StateView,
        own: &Namespace,
        raw_key: &str,
        value: &Value,
    ) -> Result<u64, ContractError> {
        let key = resolve_script_key(own, raw_key, self.limits.max_key_length)?;
        let bytes = encode_state_value(value, self.limits.max_value_size)?;
        self.check_write_count(view, &key)?;
        let size = bytes.len() as u64;
        view.put(key.namespace, key.key, bytes);
        Ok(size)
    }

    /// Buffers a delete of a script key.
    pub fn delete(
        &self,
        view: &mut StateView,
        own: &Namespace,
        raw_key: &str,
    ) -> Result<(), ContractError> {
        let key = resolve_script_key(own, raw_key, self.limits.max_key_length)?;
        self.check_write_count(view, &key)?;
        view.delete(key.namespace, key.key);
        Ok(())
    }

    /// Rewriting a key already in the view is always allowed.
    fn check_write_count(&self, view: &StateView, key: &NamespacedKey) -> Result<(), ContractError> {
        let pending = view.pending_writes();
        if pending.get(&key.namespace, &key.key).is_some() {
            return Ok(());
        }
        if pending.len() >= self.limits.max_state_writes {
            return Err(ContractError::ResourceExhausted {
                resource: Resource::StateWrites,
                used: pending.len() as u64 + 1,
                limit: self.limits.max_state_writes as u64,
            });
        }
        Ok(())
    }

    /// Reads a fully qualified key, host side. Not recorded in any read set.
    pub fn read_committed(&self, key: &NamespacedKey) -> Result<Option<Vec<u8>>, ContractError> {
        Ok(self.store.get(key)?)
    }

    /// Resolves a key through the overlay, recording committed reads.
    pub fn read_through(
        &self,
        view: &mut StateView,
        key: NamespacedKey,
    ) -> Result<Option<Vec<u8>>, ContractError> {
        if let Some(known) = view.lookup(&key) {
            return Ok(known);
        }
        let committed = self.store.get(&key)?;
        view.record_read(key, committed.clone());
        Ok(committed)
    }

    /// Validates the read set and atomically flushes the buffered writes.
    ///
    /// Returns the flushed write set.
    pub fn commit(&self, view: StateView) -> Result<WriteSet, ContractError> {
        let Some((reads, writes)) = view.into_parts() else {
            return Err(ContractError::InvariantViolated(
                "read-only state view cannot be committed".into(),
            ));
        };

        let _guard = self.commit_lock.lock();

        for (key, observed) in &reads {
            let current = self.store.get(key)?;
            if &current != observed {
                warn!(key = %key, "Read set no longer matches committed state");
                return Err(ContractError::StateConflict {
                    key: key.to_string(),
                });
            }
        }

        if !writes.is_empty() {
            self.store.commit(&writes)?;
        }

        debug!(
            writes = writes.len(),
            reads = reads.len(),
            digest = %hex::encode(writes.digest()),
            "State view committed"
        );
        Ok(writes)
    }

    /// Drops a state view without touching committed state.
    pub fn discard(&self, view: StateView) {
        debug!(
            pending = view.pending_writes().len(),
            read_only = view.is_read_only(),
            "State view discarded"
        );
        drop(view);
    }
}
