//! Resource registry use-case service.
//!
//! # Responsibility
//! - Create resources with validated name and capacity.
//! - Expose read-only occupancy and the counter repair path.
//!
//! # Invariants
//! - Newly created resources always start with `assigned = 0`.
//! - Renames write `name` only and never race the ledger's counter updates.

use crate::model::resource::{CapacitySnapshot, Resource, ResourceId};
use crate::repo::error::{LedgerError, LedgerResult, MissingEntity};
use crate::repo::resource_repo::{RecountReport, ResourceRepository};
use log::info;

/// Registry service facade over repository implementations.
pub struct RegistryService<R: ResourceRepository> {
    repo: R,
}

impl<R: ResourceRepository> RegistryService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one empty resource and returns the stored record.
    pub fn create_resource(&self, name: impl Into<String>, capacity: u32) -> LedgerResult<Resource> {
        let name: String = name.into();
        let resource = Resource::new(name.trim(), capacity);
        let resource_uuid = self.repo.create_resource(&resource)?;
        info!(
            "event=resource_create module=registry status=ok resource={} capacity={}",
            resource_uuid, capacity
        );
        self.repo
            .get_resource(resource_uuid)?
            .ok_or(LedgerError::InconsistentState(
                "created resource not found in read-back",
            ))
    }

    /// Renames a resource, leaving capacity and occupancy untouched.
    pub fn rename_resource(
        &self,
        resource_uuid: ResourceId,
        name: impl Into<String>,
    ) -> LedgerResult<Resource> {
        let name: String = name.into();
        self.repo.rename_resource(resource_uuid, name.trim())?;
        info!(
            "event=resource_rename module=registry status=ok resource={}",
            resource_uuid
        );
        self.repo
            .get_resource(resource_uuid)?
            .ok_or(LedgerError::NotFound(MissingEntity::Resource(resource_uuid)))
    }

    /// Generic full-record update. Any change to `assigned` or `capacity`
    /// is rejected with `InvariantViolation`.
    pub fn update_resource(&self, resource: &Resource) -> LedgerResult<()> {
        self.repo.update_resource(resource)
    }

    /// Gets one resource by ID.
    pub fn get_resource(&self, resource_uuid: ResourceId) -> LedgerResult<Option<Resource>> {
        self.repo.get_resource(resource_uuid)
    }

    /// Lists resources in creation order.
    pub fn list_resources(&self) -> LedgerResult<Vec<Resource>> {
        self.repo.list_resources()
    }

    /// Read-only `(capacity, assigned)` for display.
    pub fn capacity_snapshot(&self, resource_uuid: ResourceId) -> LedgerResult<CapacitySnapshot> {
        self.repo.get_capacity_snapshot(resource_uuid)
    }

    /// Rebuilds `assigned` from the live assignment rows.
    pub fn recount_assigned(&self, resource_uuid: ResourceId) -> LedgerResult<RecountReport> {
        self.repo.recount_assigned(resource_uuid)
    }
}
