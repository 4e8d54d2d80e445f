use rusqlite::{params, Connection};
use signup_core::db::open_db_in_memory;
use signup_core::{
    AssignmentLedger, LedgerError, MissingEntity, RegistryService, Resource, ResourceId,
    ResourceRepository, ResourceValidationError, SqliteAssignmentLedger,
    SqliteResourceRepository,
};
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn stored_assigned(conn: &Connection, resource_uuid: ResourceId) -> i64 {
    conn.query_row(
        "SELECT assigned FROM resources WHERE uuid = ?1;",
        [resource_uuid.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn create_resource_starts_empty_and_reads_back() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());

    let resource = service.create_resource("  Beach cleanup  ", 4).unwrap();
    assert_eq!(resource.name, "Beach cleanup");
    assert_eq!(resource.capacity, 4);
    assert_eq!(resource.assigned, 0);

    let snapshot = service.capacity_snapshot(resource.uuid).unwrap();
    assert_eq!((snapshot.capacity, snapshot.assigned), (4, 0));

    let listed = service.list_resources().unwrap();
    assert_eq!(listed, vec![resource]);
}

#[test]
fn create_resource_rejects_zero_capacity_and_blank_name() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());

    let err = service.create_resource("Shift", 0).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ResourceValidationError::ZeroCapacity)
    ));
    let err = service.create_resource("   ", 2).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ResourceValidationError::BlankName)
    ));
    assert!(service.list_resources().unwrap().is_empty());
}

#[test]
fn create_resource_with_preset_assigned_is_rejected_by_storage() {
    let conn = setup();
    let repo = SqliteResourceRepository::try_new(&conn).unwrap();

    let mut resource = Resource::new("Pre-filled", 3);
    resource.assigned = 2;
    let err = repo.create_resource(&resource).unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));
    assert!(repo.get_resource(resource.uuid).unwrap().is_none());
}

#[test]
fn snapshot_of_missing_resource_is_not_found() {
    let conn = setup();
    let repo = SqliteResourceRepository::try_new(&conn).unwrap();

    let missing = Uuid::new_v4();
    let err = repo.get_capacity_snapshot(missing).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::NotFound(MissingEntity::Resource(id)) if id == missing
    ));
}

#[test]
fn rename_keeps_capacity_and_assigned() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());
    let ledger = SqliteAssignmentLedger::try_new(&conn).unwrap();

    let resource = service.create_resource("Draft name", 2).unwrap();
    ledger
        .create_assignment(resource.uuid, Uuid::new_v4())
        .unwrap();

    let renamed = service.rename_resource(resource.uuid, "Final name").unwrap();
    assert_eq!(renamed.name, "Final name");
    assert_eq!(renamed.assigned, 1);

    let loaded = service.get_resource(resource.uuid).unwrap().unwrap();
    assert_eq!(loaded, renamed);
}

#[test]
fn rename_writes_name_only_and_validates_input() {
    let conn = setup();
    let repo = SqliteResourceRepository::try_new(&conn).unwrap();
    let ledger = SqliteAssignmentLedger::try_new(&conn).unwrap();

    let resource = Resource::new("Soup kitchen", 3);
    repo.create_resource(&resource).unwrap();
    ledger
        .create_assignment(resource.uuid, Uuid::new_v4())
        .unwrap();

    // `resource` still says assigned = 0; the rename must not care.
    repo.rename_resource(resource.uuid, "Soup kitchen (evening)")
        .unwrap();
    let loaded = repo.get_resource(resource.uuid).unwrap().unwrap();
    assert_eq!(loaded.name, "Soup kitchen (evening)");
    assert_eq!(loaded.assigned, 1);
    assert_eq!(loaded.capacity, 3);

    let err = repo.rename_resource(resource.uuid, "   ").unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ResourceValidationError::BlankName)
    ));

    let missing = Uuid::new_v4();
    let err = repo.rename_resource(missing, "Ghost").unwrap_err();
    assert!(matches!(
        err,
        LedgerError::NotFound(MissingEntity::Resource(id)) if id == missing
    ));
}

#[test]
fn update_resource_with_different_assigned_is_invariant_violation() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());
    let ledger = SqliteAssignmentLedger::try_new(&conn).unwrap();

    let resource = service.create_resource("Soup kitchen", 3).unwrap();
    ledger
        .create_assignment(resource.uuid, Uuid::new_v4())
        .unwrap();

    let mut tampered = service.get_resource(resource.uuid).unwrap().unwrap();
    tampered.assigned = 0;
    let err = service.update_resource(&tampered).unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));
    assert!(!err.is_client_rejection());
    assert_eq!(stored_assigned(&conn, resource.uuid), 1);
}

#[test]
fn update_resource_with_different_capacity_is_invariant_violation() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());

    let resource = service.create_resource("Tree planting", 3).unwrap();
    let mut grown = resource.clone();
    grown.capacity = 30;
    let err = service.update_resource(&grown).unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));

    let loaded = service.get_resource(resource.uuid).unwrap().unwrap();
    assert_eq!(loaded.capacity, 3);
}

#[test]
fn update_missing_resource_returns_not_found() {
    let conn = setup();
    let repo = SqliteResourceRepository::try_new(&conn).unwrap();

    let resource = Resource::new("Ghost", 1);
    let err = repo.update_resource(&resource).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::NotFound(MissingEntity::Resource(id)) if id == resource.uuid
    ));
}

#[test]
fn raw_sql_writes_outside_the_ledger_are_rejected() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());
    let ledger = SqliteAssignmentLedger::try_new(&conn).unwrap();

    let resource = service.create_resource("Food drive", 2).unwrap();
    let assignment = ledger
        .create_assignment(resource.uuid, Uuid::new_v4())
        .unwrap();

    let direct_counter = conn.execute(
        "UPDATE resources SET assigned = 0 WHERE uuid = ?1;",
        [resource.uuid.to_string()],
    );
    assert_invariant_violation(direct_counter);

    let direct_insert = conn.execute(
        "INSERT INTO assignments (uuid, resource_uuid, participant_uuid) VALUES (?1, ?2, ?3);",
        params![
            Uuid::new_v4().to_string(),
            resource.uuid.to_string(),
            Uuid::new_v4().to_string()
        ],
    );
    assert_invariant_violation(direct_insert);

    let direct_delete = conn.execute(
        "DELETE FROM assignments WHERE uuid = ?1;",
        [assignment.uuid.to_string()],
    );
    assert_invariant_violation(direct_delete);

    let audit = ledger.audit(resource.uuid).unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.assigned, 1);
    assert_eq!(audit.live_count, 1);
}

#[test]
fn leaving_the_gate_open_cannot_be_committed() {
    let conn = setup();

    let autocommit = conn.execute("UPDATE ledger_gate SET is_open = 1 WHERE id = 1;", []);
    assert!(autocommit.is_err());

    conn.execute_batch("BEGIN; UPDATE ledger_gate SET is_open = 1 WHERE id = 1;")
        .unwrap();
    assert!(conn.execute_batch("COMMIT;").is_err());
    conn.execute_batch("ROLLBACK;").unwrap();

    let is_open: i64 = conn
        .query_row("SELECT is_open FROM ledger_gate WHERE id = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(is_open, 0);
}

#[test]
fn recount_repairs_a_drifted_counter() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());
    let ledger = SqliteAssignmentLedger::try_new(&conn).unwrap();

    let resource = service.create_resource("Library", 3).unwrap();
    ledger
        .create_assignment(resource.uuid, Uuid::new_v4())
        .unwrap();
    ledger
        .create_assignment(resource.uuid, Uuid::new_v4())
        .unwrap();
    force_assigned(&conn, resource.uuid, 0);
    assert!(!ledger.audit(resource.uuid).unwrap().is_consistent());

    let report = service.recount_assigned(resource.uuid).unwrap();
    assert!(report.drifted());
    assert_eq!(report.previous, 0);
    assert_eq!(report.recounted, 2);
    assert_eq!(stored_assigned(&conn, resource.uuid), 2);

    let again = service.recount_assigned(resource.uuid).unwrap();
    assert!(!again.drifted());
}

#[test]
fn recount_of_missing_resource_is_not_found() {
    let conn = setup();
    let service = RegistryService::new(SqliteResourceRepository::try_new(&conn).unwrap());

    let err = service.recount_assigned(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(MissingEntity::Resource(_))));
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let err = SqliteResourceRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        LedgerError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
    assert!(SqliteAssignmentLedger::try_new(&conn).is_err());
}

fn assert_invariant_violation(result: rusqlite::Result<usize>) {
    let err = result.unwrap_err();
    assert!(
        err.to_string().starts_with("invariant_violation:"),
        "unexpected storage error: {err}"
    );
    assert!(matches!(
        LedgerError::from(err),
        LedgerError::InvariantViolation(_)
    ));
}

/// Simulates a manual out-of-band fix that desynchronizes the counter.
fn force_assigned(conn: &Connection, resource_uuid: ResourceId, value: u32) {
    conn.execute_batch("BEGIN IMMEDIATE; UPDATE ledger_gate SET is_open = 1 WHERE id = 1;")
        .unwrap();
    conn.execute(
        "UPDATE resources SET assigned = ?2 WHERE uuid = ?1;",
        params![resource_uuid.to_string(), value],
    )
    .unwrap();
    conn.execute_batch("UPDATE ledger_gate SET is_open = 0 WHERE id = 1; COMMIT;")
        .unwrap();
}
