//! # Contract Execution Metrics
//!
//! Prometheus metrics for the contract service.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-script-contracts = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `contracts_calls_total` - Counter of calls (by kind and outcome)
//! - `contracts_steps_total` - Counter of metered steps
//! - `contracts_security_incidents_total` - Counter of namespace violations
//! - `contracts_loader_cache_entries` - Gauge of cached contract units

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Calls, labeled by kind and outcome
    pub static ref CALLS: IntCounterVec = register_int_counter_vec!(
        "contracts_calls_total",
        "Total number of contract calls",
        &["kind", "outcome"]
    )
    .expect("Failed to create CALLS metric");

    /// Metered steps
    pub static ref STEPS: IntCounter = register_int_counter!(
        "contracts_steps_total",
        "Total number of metered steps"
    )
    .expect("Failed to create STEPS metric");

    /// Namespace violations
    pub static ref SECURITY_INCIDENTS: IntCounter = register_int_counter!(
        "contracts_security_incidents_total",
        "Total number of namespace violations"
    )
    .expect("Failed to create SECURITY_INCIDENTS metric");

    /// Cached contract units
    pub static ref CACHE_ENTRIES: IntGauge = register_int_gauge!(
        "contracts_loader_cache_entries",
        "Number of contract units in the loader cache"
    )
    .expect("Failed to create CACHE_ENTRIES metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a finished call
#[cfg(feature = "metrics")]
pub fn record_call(kind: &str, outcome: &str, steps: u64) {
    CALLS.with_label_values(&[kind, outcome]).inc();
    STEPS.inc_by(steps);
}

/// Record a namespace violation
#[cfg(feature = "metrics")]
pub fn record_security_incident() {
    SECURITY_INCIDENTS.inc();
}

/// Update the loader cache gauge
#[cfg(feature = "metrics")]
pub fn set_cache_entries(entries: usize) {
    CACHE_ENTRIES.set(i64::try_from(entries).unwrap_or(i64::MAX));
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

/// Record a finished call
#[cfg(not(feature = "metrics"))]
pub fn record_call(_kind: &str, _outcome: &str, _steps: u64) {}

/// Record a namespace violation
#[cfg(not(feature = "metrics"))]
pub fn record_security_incident() {}

/// Update the loader cache gauge
#[cfg(not(feature = "metrics"))]
pub fn set_cache_entries(_entries: usize) {}
