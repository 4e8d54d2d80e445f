//! Write transaction that carries the ledger's write capability.
//!
//! # Responsibility
//! - Begin every protocol step with `BEGIN IMMEDIATE`, taking the database
//!   write lock before any state is read.
//! - Open the storage gate for the duration of the transaction and close it
//!   before commit.
//!
//! # Invariants
//! - Only this crate can construct a `LedgerTransaction`.
//! - Dropping without `commit` rolls back, which also restores the gate.
//! - A commit with the gate still open fails at the storage layer (deferred
//!   foreign key on `ledger_gate.is_open`).

use crate::db::migrations::{current_user_version, latest_version};
use crate::repo::error::{LedgerError, LedgerResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::ops::Deref;

/// Immediate transaction with the ledger gate open.
pub struct LedgerTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> LedgerTransaction<'conn> {
    /// Blocks until the write lock is granted or the busy timeout expires.
    pub(crate) fn begin(conn: &'conn Connection) -> LedgerResult<Self> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        tx.execute("UPDATE ledger_gate SET is_open = 1 WHERE id = 1;", [])?;
        Ok(Self { tx })
    }

    /// Closes the gate and commits every effect of this transaction at once.
    pub(crate) fn commit(self) -> LedgerResult<()> {
        self.tx
            .execute("UPDATE ledger_gate SET is_open = 0 WHERE id = 1;", [])?;
        self.tx.commit()?;
        Ok(())
    }
}

impl Deref for LedgerTransaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

/// Rejects connections that have not been migrated to the ledger schema.
pub(crate) fn ensure_ledger_connection_ready(conn: &Connection) -> LedgerResult<()> {
    let actual_version = current_user_version(conn)?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(LedgerError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
