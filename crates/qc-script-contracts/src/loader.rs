//! # Script Loader
//!
//! Validates and compiles contract sources into immutable [`ContractUnit`]s
//! and caches them by content hash.
//!
//! ## Load Order
//!
//! 1. Size check (non-empty, at most `max_script_size`)
//! 2. Content hash, cache lookup
//! 3. UTF-8 check
//! 4. Engine compile
//! 5. Forbidden global scan
//!
//! Loading never executes script code and never touches state.

use crate::domain::entities::{EntryPoint, EntryPointSet};
use crate::domain::value_objects::ContractId;
use crate::errors::LoadError;
use crate::ports::outbound::{Executable, ScriptEngine};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

// =============================================================================
// CONTRACT UNIT
// =============================================================================

/// A loaded contract: identity plus shared compiled program.
#[derive(Clone, Debug)]
pub struct ContractUnit {
    /// Content-addressed identity.
    pub id: ContractId,
    /// Compiled program, shared by every call.
    pub executable: Arc<dyn Executable>,
    /// Declared entry points.
    pub entry_points: EntryPointSet,
    /// Engine that compiled the program.
    pub engine: &'static str,
    /// Source size in bytes.
    pub source_len: usize,
    /// Host wall-clock load time in milliseconds. Never visible to scripts.
    pub loaded_at_ms: u64,
}

impl ContractUnit {
    /// Returns true if the program declares the entry point.
    #[must_use]
    pub fn has_entry_point(&self, entry: EntryPoint) -> bool {
        self.entry_points.contains(entry)
    }
}

// =============================================================================
// LOADER
// =============================================================================

/// Loader cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Units currently cached.
    pub entries: usize,
    /// Cache capacity.
    pub capacity: usize,
    /// Cache hits.
    pub hits: u64,
    /// Cache misses.
    pub misses: u64,
    /// Sources compiled.
    pub compiled: u64,
    /// Units pushed out by cache pressure.
    pub evictions: u64,
}

/// Compiles and caches contract units.
pub struct ScriptLoader {
    engine: Arc<dyn ScriptEngine>,
    max_script_size: usize,
    forbidden_globals: BTreeSet<String>,
    cache: Mutex<LruCache<ContractId, ContractUnit>>,
    stats: Mutex<LoaderStats>,
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("engine", &self.engine.name())
            .field("max_script_size", &self.max_script_size)
            .finish_non_exhaustive()
    }
}

impl ScriptLoader {
    /// Creates a loader. A zero capacity is treated as 1.
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        max_script_size: usize,
        forbidden_globals: impl IntoIterator<Item = String>,
        cache_capacity: usize,
    ) -> Self {
        let cap = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            max_script_size,
            forbidden_globals: forbidden_globals.into_iter().collect(),
            cache: Mutex::new(LruCache::new(cap)),
            stats: Mutex::new(LoaderStats::default()),
        }
    }

    /// Name of the engine this loader compiles with.
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Loads a source, reusing the cached unit for identical content.
    pub fn load(&self, source: &[u8]) -> Result<ContractUnit, LoadError> {
        if source.is_empty() || source.len() > self.max_script_size {
            return Err(LoadError::InvalidSize {
                size: source.len(),
                max: self.max_script_size,
            });
        }

        let id = ContractId::from_source(source);
        if let Some(unit) = self.get(&id) {
            return Ok(unit);
        }

        let text = std::str::from_utf8(source).map_err(|e| LoadError::Malformed(e.to_string()))?;
        let executable = self.engine.compile(text)?;

        if let Some(name) = executable
            .referenced_globals()
            .into_iter()
            .find(|name| self.forbidden_globals.contains(name))
        {
            warn!(contract = %id, global = %name, "Rejected script referencing forbidden global");
            return Err(LoadError::ForbiddenGlobal(name));
        }

        let unit = ContractUnit {
            id,
            entry_points: executable.entry_points(),
            executable,
            engine: self.engine.name(),
            source_len: source.len(),
            loaded_at_ms: now_ms(),
        };

        let pushed_out = self.cache.lock().push(id, unit.clone());
        let mut stats = self.stats.lock();
        stats.compiled += 1;
        if matches!(pushed_out, Some((old, _)) if old != id) {
            stats.evictions += 1;
        }
        debug!(contract = %id, size = source.len(), engine = unit.engine, "Compiled contract");
        Ok(unit)
    }

    /// Returns a cached unit.
    pub fn get(&self, id: &ContractId) -> Option<ContractUnit> {
        let unit = self.cache.lock().get(id).cloned();
        let mut stats = self.stats.lock();
        if unit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        unit
    }

    /// Drops a unit from the cache. Returns true if it was cached.
    pub fn evict(&self, id: &ContractId) -> bool {
        let removed = self.cache.lock().pop(id).is_some();
        if removed {
            debug!(contract = %id, "Evicted contract unit");
        }
        removed
    }

    /// Returns true if the unit is cached, without touching LRU order.
    #[must_use]
    pub fn contains(&self, id: &ContractId) -> bool {
        self.cache.lock().contains(id)
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> LoaderStats {
        let cache = self.cache.lock();
        LoaderStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            ..*self.stats.lock()
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
