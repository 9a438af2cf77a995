//! # Adapters Layer (Outer Hexagon)
//!
//! Adapters connect the execution core to external systems.
//!
//! - Adapters implement outbound ports
//! - The script engine adapter lives in [`crate::engine`]

pub mod state_adapter;

pub use state_adapter::*;
