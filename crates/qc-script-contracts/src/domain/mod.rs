//! # Domain Layer (Inner Hexagon)
//!
//! Pure business logic for contract execution.
//! NO I/O, NO async.
//!
//! - All types here are pure domain concepts.
//! - Dependencies point INWARD only (adapters depend on this, not vice versa).

pub mod entities;
pub mod invariants;
pub mod services;
pub mod state_view;
pub mod value_objects;

pub use entities::*;
pub use invariants::*;
pub use services::*;
pub use state_view::*;
pub use value_objects::*;
