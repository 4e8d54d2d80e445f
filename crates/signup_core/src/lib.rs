//! Capacity-constrained signup ledger.
//! This crate is the single source of truth for the occupancy invariant:
//! every resource's `assigned` equals its live assignment count and never
//! exceeds its capacity.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::DbOptions;
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::assignment::{Assignment, AssignmentId, ParticipantId};
pub use model::resource::{CapacitySnapshot, Resource, ResourceId, ResourceValidationError};
pub use repo::assignment_repo::{
    AssignmentLedger, LedgerAudit, MoveOutcome, SqliteAssignmentLedger,
};
pub use repo::error::{LedgerError, LedgerResult, MissingEntity};
pub use repo::resource_repo::{
    DecrementOutcome, RecountReport, ResourceRepository, SqliteResourceRepository,
};
pub use service::ledger_service::LedgerService;
pub use service::registry_service::RegistryService;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
