//! Shared types for the tickworld crates.
//!
//! # Invariants
//! - Identifiers are `Ord` so every container keyed by them iterates deterministically.

mod role;
mod types;

pub use role::WorldRole;
pub use types::{EntityId, Transform};
