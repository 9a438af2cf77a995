//! # Resource Metering
//!
//! Step, memory and call-depth accounting for one top-level call.
//!
//! ## Invariants
//! - A ceiling crossing aborts with `ResourceExhausted`
//! - Steps are compared every `check_interval` charges, so the overshoot is
//!   bounded by `check_interval - 1`
//! - Memory, depth and evaluation nesting are compared on every charge
//! - Copying a value costs steps in proportion to its size, so wall time
//!   stays proportional to the step budget

use crate::domain::invariants::limits;
use crate::errors::ContractError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The metered resource that ran out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    /// Interpreted statements and expressions.
    Steps,
    /// Cumulative allocated bytes.
    Memory,
    /// Function frames, nested contract calls included.
    CallDepth,
    /// Nested statement and expression evaluation across all frames.
    Nesting,
    /// Distinct state keys written by one call.
    StateWrites,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Steps => "steps",
            Self::Memory => "memory",
            Self::CallDepth => "call depth",
            Self::Nesting => "evaluation nesting",
            Self::StateWrites => "state writes",
        };
        f.write_str(name)
    }
}

/// Ceilings installed before a sandboxed execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum interpreted steps.
    pub max_steps: u64,
    /// Maximum cumulative allocation in bytes.
    pub max_memory_bytes: u64,
    /// Maximum frame depth.
    pub max_call_depth: u16,
}

impl Budget {
    /// Creates a budget.
    #[must_use]
    pub const fn new(max_steps: u64, max_memory_bytes: u64, max_call_depth: u16) -> Self {
        Self {
            max_steps,
            max_memory_bytes,
            max_call_depth,
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(1_000_000, 8 * 1024 * 1024, 64)
    }
}

/// Resources consumed by a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterUsage {
    /// Steps charged.
    pub steps: u64,
    /// Bytes allocated.
    pub memory_bytes: u64,
    /// Deepest frame reached.
    pub max_depth: u16,
}

/// Tracks consumption against a [`Budget`].
#[derive(Clone, Debug)]
pub struct ResourceMeter {
    budget: Budget,
    check_interval: u64,
    steps: u64,
    unchecked: u64,
    memory: u64,
    depth: u16,
    max_depth: u16,
    nesting: u32,
}

impl ResourceMeter {
    /// Installs a budget. A zero interval is treated as 1.
    #[must_use]
    pub fn new(budget: Budget, check_interval: u64) -> Self {
        Self {
            budget,
            check_interval: check_interval.max(1),
            steps: 0,
            unchecked: 0,
            memory: 0,
            depth: 0,
            max_depth: 0,
            nesting: 0,
        }
    }

    /// Installed budget.
    #[must_use]
    pub const fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Charges interpreted steps.
    pub fn charge_steps(&mut self, steps: u64) -> Result<(), ContractError> {
        self.steps = self.steps.saturating_add(steps);
        self.unchecked = self.unchecked.saturating_add(steps);
        if self.unchecked >= self.check_interval {
            self.unchecked = 0;
            if self.steps > self.budget.max_steps {
                return Err(ContractError::ResourceExhausted {
                    resource: Resource::Steps,
                    used: self.steps,
                    limit: self.budget.max_steps,
                });
            }
        }
        Ok(())
    }

    /// Charges the step cost of copying `bytes` of value data.
    pub fn charge_copy(&mut self, bytes: u64) -> Result<(), ContractError> {
        let steps = bytes / limits::COPY_BYTES_PER_STEP;
        if steps == 0 {
            return Ok(());
        }
        self.charge_steps(steps)
    }

    /// Charges an allocation.
    pub fn charge_memory(&mut self, bytes: u64) -> Result<(), ContractError> {
        self.memory = self.memory.saturating_add(bytes);
        if self.memory > self.budget.max_memory_bytes {
            return Err(ContractError::ResourceExhausted {
                resource: Resource::Memory,
                used: self.memory,
                limit: self.budget.max_memory_bytes,
            });
        }
        Ok(())
    }

    /// Enters a function frame.
    pub fn enter_frame(&mut self) -> Result<(), ContractError> {
        let depth = self.depth.saturating_add(1);
        if depth > self.budget.max_call_depth {
            return Err(ContractError::ResourceExhausted {
                resource: Resource::CallDepth,
                used: u64::from(depth),
                limit: u64::from(self.budget.max_call_depth),
            });
        }
        self.depth = depth;
        self.max_depth = self.max_depth.max(depth);
        Ok(())
    }

    /// Leaves a function frame.
    pub fn exit_frame(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Enters one level of statement or expression evaluation.
    ///
    /// The ceiling bounds host stack use for any mix of recursion and
    /// deeply nested source, nested contract calls included.
    pub fn enter_nesting(&mut self) -> Result<(), ContractError> {
        let nesting = self.nesting.saturating_add(1);
        if nesting > limits::MAX_EVAL_NESTING {
            return Err(ContractError::ResourceExhausted {
                resource: Resource::Nesting,
                used: u64::from(nesting),
                limit: u64::from(limits::MAX_EVAL_NESTING),
            });
        }
        self.nesting = nesting;
        Ok(())
    }

    /// Leaves one level of evaluation.
    pub fn exit_nesting(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    /// Current evaluation nesting.
    #[must_use]
    pub const fn nesting(&self) -> u32 {
        self.nesting
    }

    /// Current frame depth.
    #[must_use]
    pub const fn depth(&self) -> u16 {
        self.depth
    }

    /// Steps left before the ceiling.
    #[must_use]
    pub const fn remaining_steps(&self) -> u64 {
        self.budget.max_steps.saturating_sub(self.steps)
    }

    /// Consumption so far.
    #[must_use]
    pub const fn usage(&self) -> MeterUsage {
        MeterUsage {
            steps: self.steps,
            memory_bytes: self.memory,
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ceiling() {
        let mut meter = ResourceMeter::new(Budget::new(10, 100, 4), 1);
        for _ in 0..10 {
            meter.charge_steps(1).unwrap();
        }
        let err = meter.charge_steps(1).unwrap_err();
        assert_eq!(
            err,
            ContractError::ResourceExhausted {
                resource: Resource::Steps,
                used: 11,
                limit: 10,
            }
        );
    }

    #[test]
    fn test_check_interval_bounds_overshoot() {
        let mut meter = ResourceMeter::new(Budget::new(10, 100, 4), 4);
        let mut charged = 0;
        while meter.charge_steps(1).is_ok() {
            charged += 1;
            assert!(charged < 100);
        }
        let used = meter.usage().steps;
        assert!(used > 10 && used <= 10 + 4);
    }

    #[test]
    fn test_memory_ceiling() {
        let mut meter = ResourceMeter::new(Budget::new(10, 100, 4), 1);
        meter.charge_memory(60).unwrap();
        assert!(matches!(
            meter.charge_memory(41),
            Err(ContractError::ResourceExhausted {
                resource: Resource::Memory,
                used: 101,
                limit: 100
            })
        ));
    }

    #[test]
    fn test_depth_ceiling() {
        let mut meter = ResourceMeter::new(Budget::new(10, 100, 2), 1);
        meter.enter_frame().unwrap();
        meter.enter_frame().unwrap();
        assert!(meter.enter_frame().is_err());
        assert_eq!(meter.depth(), 2);
        meter.exit_frame();
        meter.exit_frame();
        assert_eq!(meter.depth(), 0);
        assert_eq!(meter.usage().max_depth, 2);
    }

    #[test]
    fn test_nesting_ceiling() {
        let mut meter = ResourceMeter::new(Budget::default(), 1);
        for _ in 0..limits::MAX_EVAL_NESTING {
            meter.enter_nesting().unwrap();
        }
        assert!(matches!(
            meter.enter_nesting(),
            Err(ContractError::ResourceExhausted {
                resource: Resource::Nesting,
                ..
            })
        ));
        assert_eq!(meter.nesting(), limits::MAX_EVAL_NESTING);
        meter.exit_nesting();
        assert!(meter.enter_nesting().is_ok());
    }

    #[test]
    fn test_copy_cost_scales_with_size() {
        let mut meter = ResourceMeter::new(Budget::new(100, 1 << 20, 4), 1);
        meter.charge_copy(limits::COPY_BYTES_PER_STEP - 1).unwrap();
        assert_eq!(meter.usage().steps, 0);
        meter.charge_copy(limits::COPY_BYTES_PER_STEP * 40).unwrap();
        assert_eq!(meter.usage().steps, 40);
        assert!(meter.charge_copy(limits::COPY_BYTES_PER_STEP * 61).is_err());
    }
}
