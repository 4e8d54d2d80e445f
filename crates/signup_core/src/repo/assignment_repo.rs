//! Assignment ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Be the only writer of `assignments` rows.
//! - Keep `resources.assigned` equal to the live row count through the
//!   create/delete/move protocols.
//!
//! # Invariants
//! - Each protocol runs in one `LedgerTransaction`: the write lock is taken
//!   before any state is read, and every effect commits together or not at all.
//! - Capacity is validated on state read under the lock, never on a value the
//!   caller observed earlier.
//! - A failed move leaves both resources and the row untouched.
//! - `CapacityExceeded` and `NotFound` are returned as-is, never retried here.

use crate::db::{classify_sqlite_error, SqliteFault};
use crate::model::assignment::{Assignment, AssignmentId, ParticipantId};
use crate::model::resource::ResourceId;
use crate::repo::error::{LedgerError, LedgerResult, MissingEntity};
use crate::repo::ledger_tx::{ensure_ledger_connection_ready, LedgerTransaction};
use crate::repo::resource_repo::{decrement_assigned, increment_assigned, locked_snapshot};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const ASSIGNMENT_SELECT_SQL: &str = "SELECT
    uuid,
    resource_uuid,
    participant_uuid
FROM assignments";

/// Outcome of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Target equals the current resource; nothing was written.
    Unchanged(Assignment),
    /// Row now references the new resource.
    Moved {
        assignment: Assignment,
        from: ResourceId,
    },
}

impl MoveOutcome {
    /// The assignment as stored after the move.
    pub fn assignment(&self) -> &Assignment {
        match self {
            Self::Unchanged(assignment) => assignment,
            Self::Moved { assignment, .. } => assignment,
        }
    }
}

/// Counter versus rows for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerAudit {
    pub resource_uuid: ResourceId,
    pub capacity: u32,
    pub assigned: u32,
    pub live_count: u32,
}

impl LedgerAudit {
    /// `assigned == live_count` and `assigned <= capacity`.
    pub fn is_consistent(&self) -> bool {
        self.assigned == self.live_count && self.assigned <= self.capacity
    }
}

/// Ledger interface; the only sanctioned mutation path for assignments.
pub trait AssignmentLedger {
    /// Signs `participant_uuid` up for `resource_uuid` if a seat is free.
    fn create_assignment(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Assignment>;
    /// Cancels one assignment and returns the removed row.
    fn delete_assignment(&self, id: AssignmentId) -> LedgerResult<Assignment>;
    /// Cancels by `(resource, participant)` pair.
    fn cancel_participant(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Assignment>;
    /// Reassigns to another resource as one cancel-then-signup step.
    fn move_assignment(
        &self,
        id: AssignmentId,
        new_resource_uuid: ResourceId,
    ) -> LedgerResult<MoveOutcome>;
    fn get_assignment(&self, id: AssignmentId) -> LedgerResult<Option<Assignment>>;
    fn find_assignment(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Option<Assignment>>;
    /// Lists assignments of one resource in signup order.
    fn list_assignments(&self, resource_uuid: ResourceId) -> LedgerResult<Vec<Assignment>>;
    fn audit(&self, resource_uuid: ResourceId) -> LedgerResult<LedgerAudit>;
}

/// SQLite-backed assignment ledger.
pub struct SqliteAssignmentLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAssignmentLedger<'conn> {
    /// Creates ledger from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> LedgerResult<Self> {
        ensure_ledger_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AssignmentLedger for SqliteAssignmentLedger<'_> {
    fn create_assignment(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Assignment> {
        let tx = LedgerTransaction::begin(self.conn)?;
        let snapshot = locked_snapshot(&tx, resource_uuid)?;

        if load_by_pair(&tx, resource_uuid, participant_uuid)?.is_some() {
            return Err(LedgerError::Conflict {
                resource_uuid,
                participant_uuid,
            });
        }

        if !snapshot.has_room() {
            return Err(LedgerError::CapacityExceeded {
                resource_uuid,
                assigned: snapshot.assigned,
                capacity: snapshot.capacity,
            });
        }

        let assignment = Assignment::new(resource_uuid, participant_uuid);
        tx.execute(
            "INSERT INTO assignments (
                uuid,
                resource_uuid,
                participant_uuid
            ) VALUES (?1, ?2, ?3);",
            params![
                assignment.uuid.to_string(),
                resource_uuid.to_string(),
                participant_uuid.to_string(),
            ],
        )
        .map_err(|err| conflict_or(err, resource_uuid, participant_uuid))?;
        increment_assigned(&tx, resource_uuid)?;
        tx.commit()?;

        Ok(assignment)
    }

    fn delete_assignment(&self, id: AssignmentId) -> LedgerResult<Assignment> {
        let tx = LedgerTransaction::begin(self.conn)?;
        let assignment =
            load_by_id(&tx, id)?.ok_or(LedgerError::NotFound(MissingEntity::Assignment(id)))?;

        remove_row(&tx, &assignment)?;
        tx.commit()?;

        Ok(assignment)
    }

    fn cancel_participant(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Assignment> {
        let tx = LedgerTransaction::begin(self.conn)?;
        let assignment = load_by_pair(&tx, resource_uuid, participant_uuid)?.ok_or(
            LedgerError::NotFound(MissingEntity::Participant {
                resource_uuid,
                participant_uuid,
            }),
        )?;

        remove_row(&tx, &assignment)?;
        tx.commit()?;

        Ok(assignment)
    }

    fn move_assignment(
        &self,
        id: AssignmentId,
        new_resource_uuid: ResourceId,
    ) -> LedgerResult<MoveOutcome> {
        let tx = LedgerTransaction::begin(self.conn)?;
        let current =
            load_by_id(&tx, id)?.ok_or(LedgerError::NotFound(MissingEntity::Assignment(id)))?;

        if current.resource_uuid == new_resource_uuid {
            tx.commit()?;
            return Ok(MoveOutcome::Unchanged(current));
        }

        // Target is validated before the source counter is touched.
        let target = locked_snapshot(&tx, new_resource_uuid)?;
        if load_by_pair(&tx, new_resource_uuid, current.participant_uuid)?.is_some() {
            return Err(LedgerError::Conflict {
                resource_uuid: new_resource_uuid,
                participant_uuid: current.participant_uuid,
            });
        }
        if !target.has_room() {
            return Err(LedgerError::CapacityExceeded {
                resource_uuid: new_resource_uuid,
                assigned: target.assigned,
                capacity: target.capacity,
            });
        }

        tx.execute(
            "UPDATE assignments
             SET
                resource_uuid = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![id.to_string(), new_resource_uuid.to_string()],
        )
        .map_err(|err| conflict_or(err, new_resource_uuid, current.participant_uuid))?;
        decrement_assigned(&tx, current.resource_uuid)?;
        increment_assigned(&tx, new_resource_uuid)?;
        tx.commit()?;

        Ok(MoveOutcome::Moved {
            assignment: Assignment {
                resource_uuid: new_resource_uuid,
                ..current
            },
            from: current.resource_uuid,
        })
    }

    fn get_assignment(&self, id: AssignmentId) -> LedgerResult<Option<Assignment>> {
        load_by_id(self.conn, id)
    }

    fn find_assignment(
        &self,
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    ) -> LedgerResult<Option<Assignment>> {
        load_by_pair(self.conn, resource_uuid, participant_uuid)
    }

    fn list_assignments(&self, resource_uuid: ResourceId) -> LedgerResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL}
             WHERE resource_uuid = ?1
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([resource_uuid.to_string()])?;
        let mut assignments = Vec::new();

        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }

        Ok(assignments)
    }

    fn audit(&self, resource_uuid: ResourceId) -> LedgerResult<LedgerAudit> {
        let audit = self
            .conn
            .query_row(
                "SELECT
                    r.capacity,
                    r.assigned,
                    (SELECT COUNT(*) FROM assignments a WHERE a.resource_uuid = r.uuid)
                 FROM resources r
                 WHERE r.uuid = ?1;",
                [resource_uuid.to_string()],
                |row| {
                    Ok(LedgerAudit {
                        resource_uuid,
                        capacity: row.get(0)?,
                        assigned: row.get(1)?,
                        live_count: row.get(2)?,
                    })
                },
            )
            .optional()?;

        audit.ok_or(LedgerError::NotFound(MissingEntity::Resource(resource_uuid)))
    }
}

fn remove_row(tx: &LedgerTransaction<'_>, assignment: &Assignment) -> LedgerResult<()> {
    tx.execute(
        "DELETE FROM assignments WHERE uuid = ?1;",
        [assignment.uuid.to_string()],
    )?;
    decrement_assigned(tx, assignment.resource_uuid)?;
    Ok(())
}

fn conflict_or(
    err: rusqlite::Error,
    resource_uuid: ResourceId,
    participant_uuid: ParticipantId,
) -> LedgerError {
    match classify_sqlite_error(&err) {
        SqliteFault::UniqueViolation(_) => LedgerError::Conflict {
            resource_uuid,
            participant_uuid,
        },
        _ => err.into(),
    }
}

fn load_by_id(conn: &Connection, id: AssignmentId) -> LedgerResult<Option<Assignment>> {
    let mut stmt = conn.prepare(&format!("{ASSIGNMENT_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_assignment_row(row)?));
    }
    Ok(None)
}

fn load_by_pair(
    conn: &Connection,
    resource_uuid: ResourceId,
    participant_uuid: ParticipantId,
) -> LedgerResult<Option<Assignment>> {
    let mut stmt = conn.prepare(&format!(
        "{ASSIGNMENT_SELECT_SQL}
         WHERE resource_uuid = ?1
           AND participant_uuid = ?2;"
    ))?;
    let mut rows = stmt.query(params![
        resource_uuid.to_string(),
        participant_uuid.to_string()
    ])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_assignment_row(row)?));
    }
    Ok(None)
}

fn parse_assignment_row(row: &Row<'_>) -> LedgerResult<Assignment> {
    Ok(Assignment {
        uuid: parse_uuid(&row.get::<_, String>("uuid")?, "assignments.uuid")?,
        resource_uuid: parse_uuid(
            &row.get::<_, String>("resource_uuid")?,
            "assignments.resource_uuid",
        )?,
        participant_uuid: parse_uuid(
            &row.get::<_, String>("participant_uuid")?,
            "assignments.participant_uuid",
        )?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> LedgerResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| LedgerError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
