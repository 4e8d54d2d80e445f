//! Assignment domain model.
//!
//! # Invariants
//! - `participant_uuid` never changes for the lifetime of an assignment.
//! - `resource_uuid` changes only through a ledger move.

use crate::model::resource::ResourceId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of one ledger entry.
pub type AssignmentId = Uuid;

/// Identifier of the entity being assigned (a volunteer, attendee, ...).
pub type ParticipantId = Uuid;

/// Ledger entry binding one participant to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub uuid: AssignmentId,
    pub resource_uuid: ResourceId,
    pub participant_uuid: ParticipantId,
}

impl Assignment {
    /// Creates a new assignment with a generated stable ID.
    pub fn new(resource_uuid: ResourceId, participant_uuid: ParticipantId) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            resource_uuid,
            participant_uuid,
        }
    }
}
