//! Resource domain model.
//!
//! # Responsibility
//! - Define the capacity-bearing record that assignments are made against.
//! - Provide validation for registry write paths.
//!
//! # Invariants
//! - `capacity` is positive and fixed at creation.
//! - `0 <= assigned <= capacity` at every transaction boundary.
//! - `assigned` equals the number of assignments referencing the resource.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a capacity-bearing resource.
pub type ResourceId = Uuid;

/// Capacity-bearing record (an event with a fixed number of seats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub uuid: ResourceId,
    /// Display label; the only field callers may freely update.
    pub name: String,
    /// Upper bound on concurrent assignments. Immutable after creation.
    pub capacity: u32,
    /// Cached count of assignments. Written only by the assignment ledger.
    pub assigned: u32,
}

/// Validation failures for resource write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Capacity must be at least one.
    ZeroCapacity,
}

impl Display for ResourceValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "resource name must not be blank"),
            Self::ZeroCapacity => write!(f, "resource capacity must be positive"),
        }
    }
}

impl Error for ResourceValidationError {}

impl Resource {
    /// Creates an empty resource (`assigned = 0`) with a generated ID.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            capacity,
            assigned: 0,
        }
    }

    /// Validates caller-controlled fields.
    ///
    /// `assigned` is not checked here; the storage guard owns it.
    pub fn validate(&self) -> Result<(), ResourceValidationError> {
        if self.name.trim().is_empty() {
            return Err(ResourceValidationError::BlankName);
        }
        if self.capacity == 0 {
            return Err(ResourceValidationError::ZeroCapacity);
        }
        Ok(())
    }

    /// Returns the `(capacity, assigned)` pair of this record.
    pub fn snapshot(&self) -> CapacitySnapshot {
        CapacitySnapshot {
            capacity: self.capacity,
            assigned: self.assigned,
        }
    }
}

/// Point-in-time occupancy of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub capacity: u32,
    pub assigned: u32,
}

impl CapacitySnapshot {
    /// Whether one more assignment fits.
    pub fn has_room(&self) -> bool {
        self.assigned < self.capacity
    }

    /// Free seats; zero when full or over-full.
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.assigned)
    }
}
