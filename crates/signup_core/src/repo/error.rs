//! Error taxonomy shared by the resource registry and the assignment ledger.
//!
//! # Invariants
//! - `Busy` is the only retryable kind.
//! - `NotFound`, `CapacityExceeded`, `Conflict` and `Validation` are client
//!   rejections; everything else is a server-side fault.
//! - Guard-trigger failures always surface as `InvariantViolation`.

use crate::db::{classify_sqlite_error, DbError, SqliteFault};
use crate::model::assignment::{AssignmentId, ParticipantId};
use crate::model::resource::{ResourceId, ResourceValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntity {
    Resource(ResourceId),
    Assignment(AssignmentId),
    /// No assignment binds this participant to this resource.
    Participant {
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    },
}

impl Display for MissingEntity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource(id) => write!(f, "resource {id}"),
            Self::Assignment(id) => write!(f, "assignment {id}"),
            Self::Participant {
                resource_uuid,
                participant_uuid,
            } => write!(
                f,
                "assignment of participant {participant_uuid} to resource {resource_uuid}"
            ),
        }
    }
}

/// Failure of a registry or ledger operation.
#[derive(Debug)]
pub enum LedgerError {
    /// Referenced resource or assignment does not exist.
    NotFound(MissingEntity),
    /// Resource was full when validated under the write lock.
    CapacityExceeded {
        resource_uuid: ResourceId,
        assigned: u32,
        capacity: u32,
    },
    /// Participant already holds an assignment on the resource.
    Conflict {
        resource_uuid: ResourceId,
        participant_uuid: ParticipantId,
    },
    /// Write outside the ledger protocol was rejected by the storage guard.
    InvariantViolation(String),
    /// Write lock was not granted before the busy timeout expired.
    Busy(String),
    /// Caller-supplied resource fields are invalid.
    Validation(ResourceValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Write succeeded but read-back did not observe it.
    InconsistentState(&'static str),
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
}

impl LedgerError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Whether the failure is the caller's to fix (4xx) rather than a fault.
    pub fn is_client_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::CapacityExceeded { .. }
                | Self::Conflict { .. }
                | Self::Validation(_)
        )
    }

    /// Stable short code for logs and exit statuses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::Conflict { .. } => "conflict",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Busy(_) => "busy",
            Self::Validation(_) => "validation",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::InconsistentState(_) => "inconsistent_state",
            Self::InvalidData(_) => "invalid_data",
            Self::Db(_) => "db_error",
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "not found: {entity}"),
            Self::CapacityExceeded {
                resource_uuid,
                assigned,
                capacity,
            } => write!(
                f,
                "resource {resource_uuid} is at capacity ({assigned}/{capacity})"
            ),
            Self::Conflict {
                resource_uuid,
                participant_uuid,
            } => write!(
                f,
                "participant {participant_uuid} is already assigned to resource {resource_uuid}"
            ),
            Self::InvariantViolation(message) => write!(f, "invariant violation: {message}"),
            Self::Busy(message) => write!(f, "datastore busy: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ledger requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InconsistentState(details) => write!(f, "inconsistent ledger state: {details}"),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceValidationError> for LedgerError {
    fn from(value: ResourceValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        match classify_sqlite_error(&value) {
            SqliteFault::Busy(message) => Self::Busy(message),
            SqliteFault::InvariantViolation(message) => Self::InvariantViolation(message),
            SqliteFault::UniqueViolation(_) | SqliteFault::Other => {
                Self::Db(DbError::Sqlite(value))
            }
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}
