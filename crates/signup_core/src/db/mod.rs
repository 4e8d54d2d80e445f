//! SQLite storage bootstrap, schema migrations and failure classification.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the signup core.
//! - Apply schema migrations (tables, constraints, guard triggers) in order.
//! - Translate raw SQLite failures into the ledger's error taxonomy.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - Guard triggers report through `RAISE(ABORT, 'invariant_violation: ...')`.

use rusqlite::{ffi, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{
    open_db, open_db_in_memory, open_db_in_memory_with_options, open_db_with_options, DbOptions,
};

pub type DbResult<T> = Result<T, DbError>;

/// Message prefix used by every guard trigger in the schema.
pub(crate) const INVARIANT_VIOLATION_PREFIX: &str = "invariant_violation:";

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Semantic category of a SQLite failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SqliteFault {
    /// Lock wait expired (`SQLITE_BUSY` / `SQLITE_LOCKED`).
    Busy(String),
    /// Guard trigger or CHECK constraint rejected the write.
    InvariantViolation(String),
    /// UNIQUE / PRIMARY KEY constraint rejected the write.
    UniqueViolation(String),
    /// Anything else; surfaced as a transport error.
    Other,
}

pub(crate) fn classify_sqlite_error(err: &rusqlite::Error) -> SqliteFault {
    let rusqlite::Error::SqliteFailure(failure, message) = err else {
        return SqliteFault::Other;
    };
    let message = message.as_deref().unwrap_or_default();

    match failure.code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
            SqliteFault::Busy(if message.is_empty() {
                failure.to_string()
            } else {
                message.to_string()
            })
        }
        ErrorCode::ConstraintViolation => {
            if let Some(detail) = message.strip_prefix(INVARIANT_VIOLATION_PREFIX) {
                return SqliteFault::InvariantViolation(detail.trim().to_string());
            }
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_CHECK => {
                    SqliteFault::InvariantViolation(message.to_string())
                }
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    SqliteFault::UniqueViolation(message.to_string())
                }
                _ => SqliteFault::Other,
            }
        }
        _ => SqliteFault::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_sqlite_error, SqliteFault};
    use rusqlite::{ffi, ErrorCode};

    fn failure(code: i32, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some(message.to_string()))
    }

    #[test]
    fn trigger_raise_is_classified_as_invariant_violation() {
        let err = failure(
            ffi::SQLITE_CONSTRAINT_TRIGGER,
            "invariant_violation: resources.assigned is ledger-managed",
        );
        assert_eq!(
            classify_sqlite_error(&err),
            SqliteFault::InvariantViolation("resources.assigned is ledger-managed".to_string())
        );
    }

    #[test]
    fn busy_and_locked_are_classified_as_busy() {
        let busy = failure(ffi::SQLITE_BUSY, "database is locked");
        assert!(matches!(classify_sqlite_error(&busy), SqliteFault::Busy(_)));

        let locked = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_LOCKED), None);
        assert!(matches!(
            classify_sqlite_error(&locked),
            SqliteFault::Busy(message) if !message.is_empty()
        ));
    }

    #[test]
    fn unique_violation_is_distinguished_from_other_constraints() {
        let unique = failure(ffi::SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed");
        assert!(matches!(
            classify_sqlite_error(&unique),
            SqliteFault::UniqueViolation(_)
        ));

        let foreign_key = failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY, "FOREIGN KEY failed");
        assert_eq!(classify_sqlite_error(&foreign_key), SqliteFault::Other);
        assert_eq!(
            classify_sqlite_error(&rusqlite::Error::QueryReturnedNoRows),
            SqliteFault::Other
        );
    }

    #[test]
    fn error_code_mapping_matches_primary_code() {
        let err = ffi::Error::new(ffi::SQLITE_CONSTRAINT_CHECK);
        assert_eq!(err.code, ErrorCode::ConstraintViolation);
    }
}
