//! Domain model for capacity-bearing resources and their assignments.
//!
//! # Responsibility
//! - Define canonical data structures used by registry and ledger logic.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - `Resource::assigned` is a cached count owned by the assignment ledger.

pub mod assignment;
pub mod resource;
