//! # Service Configuration
//!
//! Limits and budgets for the execution core. Built from defaults, a JSON
//! document, or `QC_CONTRACT_*` environment variables, then validated.

use crate::bridge::StateLimits;
use crate::domain::invariants::limits;
use crate::errors::ConfigError;
use crate::sandbox::meter::Budget;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Hard ceiling for any configured call depth.
pub const MAX_CONFIGURABLE_CALL_DEPTH: u16 = 256;

/// Globals a script may never reference (clock, entropy, I/O, reflection).
pub const DEFAULT_FORBIDDEN_GLOBALS: [&str; 21] = [
    "Date",
    "Math",
    "random",
    "now",
    "sleep",
    "setTimeout",
    "setInterval",
    "require",
    "eval",
    "Function",
    "Reflect",
    "Proxy",
    "globalThis",
    "process",
    "console",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "io",
    "os",
    "fs",
];

/// Contract execution configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Maximum contract source size in bytes (default: 10 KiB).
    pub max_script_size: usize,
    /// Maximum relative state key length (default: 256).
    pub max_state_key_length: usize,
    /// Maximum encoded state value size (default: 10 KiB).
    pub max_state_value_size: usize,
    /// Maximum distinct state keys one call may write (default: 10,000).
    pub max_state_writes: usize,
    /// Loader cache capacity in contract units.
    pub cache_capacity: usize,
    /// Step ceiling is compared every `check_interval` charges.
    pub check_interval: u64,
    /// Budget for `Init`.
    pub deploy_budget: Budget,
    /// Budget for `Invoke`.
    pub invoke_budget: Budget,
    /// Budget for `Query`.
    pub query_budget: Budget,
    /// Globals rejected at load time.
    pub forbidden_globals: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_script_size: limits::MAX_SCRIPT_SIZE,
            max_state_key_length: limits::MAX_STATE_KEY_LENGTH,
            max_state_value_size: limits::MAX_STATE_VALUE_SIZE,
            max_state_writes: limits::MAX_STATE_WRITES,
            cache_capacity: limits::CACHE_CAPACITY,
            check_interval: 1,
            deploy_budget: Budget::new(2_000_000, 16 * 1024 * 1024, limits::MAX_CALL_DEPTH),
            invoke_budget: Budget::new(1_000_000, 8 * 1024 * 1024, limits::MAX_CALL_DEPTH),
            query_budget: Budget::new(500_000, 8 * 1024 * 1024, limits::MAX_CALL_DEPTH),
            forbidden_globals: DEFAULT_FORBIDDEN_GLOBALS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }
}

impl ServiceConfig {
    /// Parses a JSON document. Missing fields keep their defaults.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_CONTRACT_MAX_SCRIPT_SIZE`
    /// - `QC_CONTRACT_MAX_KEY_LENGTH`
    /// - `QC_CONTRACT_MAX_VALUE_SIZE`
    /// - `QC_CONTRACT_MAX_STATE_WRITES`
    /// - `QC_CONTRACT_CACHE_CAPACITY`
    /// - `QC_CONTRACT_CHECK_INTERVAL`
    /// - `QC_CONTRACT_DEPLOY_STEPS`, `QC_CONTRACT_INVOKE_STEPS`, `QC_CONTRACT_QUERY_STEPS`
    /// - `QC_CONTRACT_MAX_MEMORY`: memory ceiling for every call kind
    /// - `QC_CONTRACT_MAX_CALL_DEPTH`: depth ceiling for every call kind
    /// - `QC_CONTRACT_FORBIDDEN_GLOBALS`: comma-separated, replaces the default list
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_overrides(|name| env::var(name).ok())
    }

    /// Applies `QC_CONTRACT_*` overrides from any lookup, then validates.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_MAX_SCRIPT_SIZE")? {
            self.max_script_size = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_MAX_KEY_LENGTH")? {
            self.max_state_key_length = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_MAX_VALUE_SIZE")? {
            self.max_state_value_size = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_MAX_STATE_WRITES")? {
            self.max_state_writes = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_CACHE_CAPACITY")? {
            self.cache_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_CHECK_INTERVAL")? {
            self.check_interval = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_DEPLOY_STEPS")? {
            self.deploy_budget.max_steps = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_INVOKE_STEPS")? {
            self.invoke_budget.max_steps = v;
        }
        if let Some(v) = parse_var(&lookup, "QC_CONTRACT_QUERY_STEPS")? {
            self.query_budget.max_steps = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "QC_CONTRACT_MAX_MEMORY")? {
            for budget in self.budgets_mut() {
                budget.max_memory_bytes = v;
            }
        }
        if let Some(v) = parse_var::<u16, _>(&lookup, "QC_CONTRACT_MAX_CALL_DEPTH")? {
            for budget in self.budgets_mut() {
                budget.max_call_depth = v;
            }
        }
        if let Some(list) = lookup("QC_CONTRACT_FORBIDDEN_GLOBALS") {
            self.forbidden_globals = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        self.validate()?;
        Ok(self)
    }

    /// Rejects unusable limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_script_size", self.max_script_size as u64)?;
        positive("max_state_key_length", self.max_state_key_length as u64)?;
        positive("max_state_value_size", self.max_state_value_size as u64)?;
        positive("max_state_writes", self.max_state_writes as u64)?;
        positive("cache_capacity", self.cache_capacity as u64)?;
        positive("check_interval", self.check_interval)?;

        for (field, budget) in [
            ("deploy_budget", &self.deploy_budget),
            ("invoke_budget", &self.invoke_budget),
            ("query_budget", &self.query_budget),
        ] {
            positive(field, budget.max_steps)?;
            positive(field, budget.max_memory_bytes)?;
            positive(field, u64::from(budget.max_call_depth))?;
            if budget.max_call_depth > MAX_CONFIGURABLE_CALL_DEPTH {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!(
                        "max_call_depth {} exceeds {MAX_CONFIGURABLE_CALL_DEPTH}",
                        budget.max_call_depth
                    ),
                });
            }
        }
        Ok(())
    }

    /// Limits handed to the state bridge.
    #[must_use]
    pub const fn state_limits(&self) -> StateLimits {
        StateLimits {
            max_key_length: self.max_state_key_length,
            max_value_size: self.max_state_value_size,
            max_state_writes: self.max_state_writes,
        }
    }

    fn budgets_mut(&mut self) -> [&mut Budget; 3] {
        [
            &mut self.deploy_budget,
            &mut self.invoke_budget,
            &mut self.query_budget,
        ]
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_script_size, 10_240);
        assert_eq!(config.max_state_key_length, 256);
        assert_eq!(config.invoke_budget.max_steps, 1_000_000);
        assert!(config.forbidden_globals.iter().any(|g| g == "Date"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_keeps_defaults_for_missing_fields() {
        let config = ServiceConfig::from_json(r#"{"cache_capacity": 8}"#).unwrap();
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.max_script_size, 10_240);

        let round = ServiceConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(round, config);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            ServiceConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json(r#"{"check_interval": 0}"#),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::default()
            .apply_overrides(lookup(&[
                ("QC_CONTRACT_INVOKE_STEPS", "500"),
                ("QC_CONTRACT_MAX_CALL_DEPTH", "8"),
                ("QC_CONTRACT_MAX_STATE_WRITES", "16"),
                ("QC_CONTRACT_FORBIDDEN_GLOBALS", "Date, eval,,"),
            ]))
            .unwrap();
        assert_eq!(config.invoke_budget.max_steps, 500);
        assert_eq!(config.query_budget.max_call_depth, 8);
        assert_eq!(config.state_limits().max_state_writes, 16);
        assert_eq!(config.forbidden_globals, vec!["Date", "eval"]);
    }

    #[test]
    fn test_env_override_errors() {
        let err = ServiceConfig::default()
            .apply_overrides(lookup(&[("QC_CONTRACT_CACHE_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "QC_CONTRACT_CACHE_CAPACITY"));

        let err = ServiceConfig::default()
            .apply_overrides(lookup(&[("QC_CONTRACT_MAX_CALL_DEPTH", "1000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
