//! Signup use-case service over the assignment ledger.
//!
//! # Responsibility
//! - Provide signup/cancel/reassign entry points for request handlers.
//! - Emit one metadata-only log line per mutation with outcome and duration.
//!
//! # Invariants
//! - Service APIs never bypass the ledger protocol.
//! - Errors are returned unchanged; nothing is retried here.

use crate::model::assignment::{Assignment, AssignmentId, ParticipantId};
use crate::model::resource::ResourceId;
use crate::repo::assignment_repo::{AssignmentLedger, LedgerAudit, MoveOutcome};
use crate::repo::error::{LedgerError, LedgerResult};
use log::{error, info, warn};
use std::time::Instant;

/// Use-case service wrapper for ledger operations.
pub struct LedgerService<L: AssignmentLedger> {
    ledger: L,
}

impl<L: AssignmentLedger> LedgerService<L> {
    /// Creates a service using the provided ledger implementation.
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Signs a participant up for a resource.
    ///
    /// # Contract
    /// - Capacity is re-validated under the ledger lock; callers must not
    ///   pre-check with a snapshot.
    /// - Full resource -> `CapacityExceeded`; missing -> `NotFound`;
    ///   already signed up -> `Conflict`.
    pub fn signup(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Assignment> {
        let started_at = Instant::now();
        let result = self
            .ledger
            .create_assignment(resource_uuid, participant_uuid);
        log_outcome("ledger_create", resource_uuid, started_at, &result);
        result
    }

    /// Cancels one assignment by ID. Never blocked by capacity.
    pub fn cancel(&self, assignment_uuid: AssignmentId) -> LedgerResult<Assignment> {
        let started_at = Instant::now();
        let result = self.ledger.delete_assignment(assignment_uuid);
        let resource = result
            .as_ref()
            .map(|assignment| assignment.resource_uuid.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        log_outcome("ledger_delete", resource, started_at, &result);
        result
    }

    /// Cancels the assignment binding `participant_uuid` to `resource_uuid`.
    pub fn cancel_participant(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Assignment> {
        let started_at = Instant::now();
        let result = self
            .ledger
            .cancel_participant(resource_uuid, participant_uuid);
        log_outcome("ledger_delete", resource_uuid, started_at, &result);
        result
    }

    /// Moves an assignment to another resource atomically.
    ///
    /// # Contract
    /// - Same target -> `MoveOutcome::Unchanged`, no writes.
    /// - Rejected target leaves the original assignment in place.
    pub fn reassign(
        &self,
        assignment_uuid: AssignmentId,
        new_resource_uuid: ResourceId,
    ) -> LedgerResult<MoveOutcome> {
        let started_at = Instant::now();
        let result = self
            .ledger
            .move_assignment(assignment_uuid, new_resource_uuid);
        log_outcome("ledger_move", new_resource_uuid, started_at, &result);
        result
    }

    /// Gets one assignment by ID.
    pub fn get_assignment(&self, assignment_uuid: AssignmentId) -> LedgerResult<Option<Assignment>> {
        self.ledger.get_assignment(assignment_uuid)
    }

    /// Finds the assignment of a participant on a resource.
    pub fn find_assignment(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Option<Assignment>> {
        self.ledger.find_assignment(resource_uuid, participant_uuid)
    }

    /// Lists assignments of one resource.
    pub fn list_assignments(&self, resource_uuid: ResourceId) -> LedgerResult<Vec<Assignment>> {
        self.ledger.list_assignments(resource_uuid)
    }

    /// Compares the cached counter with the live rows.
    pub fn audit(&self, resource_uuid: ResourceId) -> LedgerResult<LedgerAudit> {
        let audit = self.ledger.audit(resource_uuid)?;
        if !audit.is_consistent() {
            error!(
                "event=ledger_audit module=ledger status=error resource={} assigned={} live={} capacity={}",
                resource_uuid, audit.assigned, audit.live_count, audit.capacity
            );
        }
        Ok(audit)
    }
}

fn log_outcome<T>(
    event: &str,
    resource: impl std::fmt::Display,
    started_at: Instant,
    result: &LedgerResult<T>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!(
            "event={event} module=ledger status=ok resource={resource} duration_ms={duration_ms}"
        ),
        Err(err) if err.is_client_rejection() => info!(
            "event={event} module=ledger status=rejected resource={resource} duration_ms={duration_ms} error_code={}",
            err.code()
        ),
        Err(err) if err.is_retryable() => warn!(
            "event={event} module=ledger status=error resource={resource} duration_ms={duration_ms} error_code={} retryable=true",
            err.code()
        ),
        Err(err @ LedgerError::InvariantViolation(_)) => error!(
            "event=invariant_violation module=ledger status=error operation={event} resource={resource} error={err}"
        ),
        Err(err) => error!(
            "event={event} module=ledger status=error resource={resource} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
    }
}
