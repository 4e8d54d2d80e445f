//! Resource registry contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store capacity-bearing resources and expose their occupancy.
//! - Provide the `assigned` counter primitives used by the assignment ledger.
//! - Repair a drifted counter from the live assignment rows.
//!
//! # Invariants
//! - `capacity` never changes after creation.
//! - `assigned` changes only inside a `LedgerTransaction`; any other write
//!   path is rejected by the storage guard with `InvariantViolation`.
//! - Decrement floors at zero and logs the anomaly instead of failing.

use crate::model::resource::{CapacitySnapshot, Resource, ResourceId, ResourceValidationError};
use crate::repo::error::{LedgerError, LedgerResult, MissingEntity};
use crate::repo::ledger_tx::{ensure_ledger_connection_ready, LedgerTransaction};
use log::{error, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const RESOURCE_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    capacity,
    assigned
FROM resources";

/// Result of a counter repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecountReport {
    pub resource_uuid: ResourceId,
    /// Counter value before the repair.
    pub previous: u32,
    /// Live number of assignment rows, now stored as `assigned`.
    pub recounted: u32,
    pub capacity: u32,
}

impl RecountReport {
    /// Whether the stored counter had drifted from the rows.
    pub fn drifted(&self) -> bool {
        self.previous != self.recounted
    }
}

/// Outcome of a counter decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Counter went down by one to the contained value.
    Decremented(u32),
    /// Counter was already zero and stayed there.
    Clamped,
}

/// Repository interface for the resource registry.
pub trait ResourceRepository {
    fn create_resource(&self, resource: &Resource) -> LedgerResult<ResourceId>;
    /// Writes every column of `resource`. Only `name` may differ from the
    /// stored row; a different `capacity` or `assigned` is rejected.
    fn update_resource(&self, resource: &Resource) -> LedgerResult<()>;
    /// Writes `name` alone; `capacity` and `assigned` are never touched.
    fn rename_resource(&self, id: ResourceId, name: &str) -> LedgerResult<()>;
    fn get_resource(&self, id: ResourceId) -> LedgerResult<Option<Resource>>;
    fn list_resources(&self) -> LedgerResult<Vec<Resource>>;
    /// Read-only occupancy for display. Must not be used to pre-check a
    /// signup; the ledger re-validates under its own lock.
    fn get_capacity_snapshot(&self, id: ResourceId) -> LedgerResult<CapacitySnapshot>;
    /// Recomputes `assigned` from the assignment rows.
    fn recount_assigned(&self, id: ResourceId) -> LedgerResult<RecountReport>;
}

/// SQLite-backed resource registry.
pub struct SqliteResourceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResourceRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> LedgerResult<Self> {
        ensure_ledger_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ResourceRepository for SqliteResourceRepository<'_> {
    fn create_resource(&self, resource: &Resource) -> LedgerResult<ResourceId> {
        resource.validate()?;

        self.conn.execute(
            "INSERT INTO resources (
                uuid,
                name,
                capacity,
                assigned
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                resource.uuid.to_string(),
                resource.name.as_str(),
                resource.capacity,
                resource.assigned,
            ],
        )?;

        Ok(resource.uuid)
    }

    fn update_resource(&self, resource: &Resource) -> LedgerResult<()> {
        resource.validate()?;

        let changed = self
            .conn
            .execute(
                "UPDATE resources
                 SET
                    name = ?1,
                    capacity = ?2,
                    assigned = ?3,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?4;",
                params![
                    resource.name.as_str(),
                    resource.capacity,
                    resource.assigned,
                    resource.uuid.to_string(),
                ],
            )
            .map_err(LedgerError::from)
            .inspect_err(|err| {
                if let LedgerError::InvariantViolation(message) = err {
                    error!(
                        "event=invariant_violation module=registry status=rejected resource={} error={}",
                        resource.uuid, message
                    );
                }
            })?;

        if changed == 0 {
            return Err(LedgerError::NotFound(MissingEntity::Resource(
                resource.uuid,
            )));
        }

        Ok(())
    }

    fn rename_resource(&self, id: ResourceId, name: &str) -> LedgerResult<()> {
        if name.trim().is_empty() {
            return Err(ResourceValidationError::BlankName.into());
        }

        // Write lock up front; no read-to-write lock upgrade.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE resources
             SET
                name = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![name, id.to_string()],
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound(MissingEntity::Resource(id)));
        }
        tx.commit()?;

        Ok(())
    }

    fn get_resource(&self, id: ResourceId) -> LedgerResult<Option<Resource>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RESOURCE_SELECT_SQL} WHERE uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_resource_row(row)?));
        }

        Ok(None)
    }

    fn list_resources(&self) -> LedgerResult<Vec<Resource>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RESOURCE_SELECT_SQL} ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut resources = Vec::new();

        while let Some(row) = rows.next()? {
            resources.push(parse_resource_row(row)?);
        }

        Ok(resources)
    }

    fn get_capacity_snapshot(&self, id: ResourceId) -> LedgerResult<CapacitySnapshot> {
        read_snapshot(self.conn, id)
    }

    fn recount_assigned(&self, id: ResourceId) -> LedgerResult<RecountReport> {
        let tx = LedgerTransaction::begin(self.conn)?;
        let snapshot = locked_snapshot(&tx, id)?;
        let live: u32 = tx.query_row(
            "SELECT COUNT(*) FROM assignments WHERE resource_uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;

        if live > snapshot.capacity {
            error!(
                "event=assigned_recount module=registry status=error resource={} live={} capacity={}",
                id, live, snapshot.capacity
            );
            return Err(LedgerError::InvariantViolation(format!(
                "resource {id} holds {live} assignments but capacity is {}",
                snapshot.capacity
            )));
        }

        if live != snapshot.assigned {
            warn!(
                "event=assigned_recount module=registry status=repaired resource={} previous={} recounted={}",
                id, snapshot.assigned, live
            );
            write_assigned(&tx, id, live)?;
        }
        tx.commit()?;

        Ok(RecountReport {
            resource_uuid: id,
            previous: snapshot.assigned,
            recounted: live,
            capacity: snapshot.capacity,
        })
    }
}

/// Reads `(capacity, assigned)` while the caller holds the write lock.
///
/// The values cannot change until `tx` ends, so a capacity decision based on
/// them is race-free.
pub fn locked_snapshot(
    tx: &LedgerTransaction<'_>,
    id: ResourceId,
) -> LedgerResult<CapacitySnapshot> {
    read_snapshot(tx, id)
}

/// Adds one to `assigned` and returns the new value.
pub fn increment_assigned(tx: &LedgerTransaction<'_>, id: ResourceId) -> LedgerResult<u32> {
    let assigned: Option<u32> = tx
        .query_row(
            "UPDATE resources
             SET
                assigned = assigned + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
             RETURNING assigned;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    assigned.ok_or(LedgerError::NotFound(MissingEntity::Resource(id)))
}

/// Subtracts one from `assigned`, flooring at zero.
pub fn decrement_assigned(
    tx: &LedgerTransaction<'_>,
    id: ResourceId,
) -> LedgerResult<DecrementOutcome> {
    let snapshot = locked_snapshot(tx, id)?;
    if snapshot.assigned == 0 {
        warn!(
            "event=assigned_clamped module=registry status=ok resource={} capacity={}",
            id, snapshot.capacity
        );
        return Ok(DecrementOutcome::Clamped);
    }

    let next = snapshot.assigned - 1;
    write_assigned(tx, id, next)?;
    Ok(DecrementOutcome::Decremented(next))
}

fn write_assigned(tx: &LedgerTransaction<'_>, id: ResourceId, value: u32) -> LedgerResult<()> {
    let changed = tx.execute(
        "UPDATE resources
         SET
            assigned = ?2,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1;",
        params![id.to_string(), value],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound(MissingEntity::Resource(id)));
    }
    Ok(())
}

fn read_snapshot(conn: &Connection, id: ResourceId) -> LedgerResult<CapacitySnapshot> {
    let snapshot = conn
        .query_row(
            "SELECT capacity, assigned FROM resources WHERE uuid = ?1;",
            [id.to_string()],
            |row| {
                Ok(CapacitySnapshot {
                    capacity: row.get(0)?,
                    assigned: row.get(1)?,
                })
            },
        )
        .optional()?;

    snapshot.ok_or(LedgerError::NotFound(MissingEntity::Resource(id)))
}

fn parse_resource_row(row: &Row<'_>) -> LedgerResult<Resource> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        LedgerError::InvalidData(format!("invalid uuid value `{uuid_text}` in resources.uuid"))
    })?;

    Ok(Resource {
        uuid,
        name: row.get("name")?,
        capacity: row.get("capacity")?,
        assigned: row.get("assigned")?,
    })
}
