//! Repository layer: resource registry and assignment ledger.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Keep SQL, locking and the storage gate inside the persistence boundary.
//!
//! # Invariants
//! - Every mutation of `assignments` or `resources.assigned` happens inside a
//!   `LedgerTransaction`.
//! - Repository APIs return semantic errors (`NotFound`, `CapacityExceeded`,
//!   `InvariantViolation`, `Busy`) in addition to DB transport errors.

pub mod assignment_repo;
pub mod error;
pub mod ledger_tx;
pub mod resource_repo;
