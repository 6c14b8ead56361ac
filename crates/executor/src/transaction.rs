//! Transaction sessions.
//!
//! A transaction pins one connection for its lifetime. Every call issued
//! through the transaction session (and through sessions derived from it
//! with `with_context` and friends) runs on that connection and carries
//! the same transaction id in its call context.
//!
//! Lifecycle:
//!
//! ```text
//! Active --commit--> Committed
//!        --rollback--> RolledBack
//!        --drop--> RolledBack (with a warning)
//! ```
//!
//! Calls, commits and rollbacks after the transaction completed fail with
//! [`Error::TransactionCompleted`].

use std::fmt;
use std::sync::Arc;

use conduit_core::{Connection, Error, Execution, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::session::{execute_on, PreparedCall, Session, SessionScope, TransactionSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Committed,
    RolledBack,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Committed => "committed",
            Status::RolledBack => "rolled back",
        }
    }
}

/// How a transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Commit,
    Rollback,
}

struct Inner {
    status: Status,
    connection: Option<Box<dyn Connection>>,
}

/// State shared by every handle of one transaction.
pub(crate) struct TransactionState {
    id: Uuid,
    inner: Mutex<Inner>,
}

impl TransactionState {
    /// New active transaction. `connection` is `None` for test doubles.
    pub(crate) fn new(connection: Option<Box<dyn Connection>>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(Inner {
                status: Status::Active,
                connection,
            }),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.inner.lock().status == Status::Active
    }

    fn completed(&self, status: Status) -> Error {
        Error::TransactionCompleted {
            transaction_id: self.id.to_string(),
            state: status.label(),
        }
    }

    /// Fail unless the transaction is still active. The lock is released
    /// before returning.
    pub(crate) fn ensure_active(&self) -> Result<()> {
        let status = self.inner.lock().status;
        if status != Status::Active {
            return Err(self.completed(status));
        }
        Ok(())
    }

    /// Run `f` on the pinned connection while the transaction is active.
    ///
    /// The lock is held for the duration of `f`, so calls on one
    /// transaction are serialized. The lock is not reentrant: `f` must not
    /// call back into the same transaction.
    pub(crate) fn with_connection<R>(
        &self,
        f: impl FnOnce(Option<&mut dyn Connection>) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.lock();
        if inner.status != Status::Active {
            return Err(self.completed(inner.status));
        }
        match inner.connection.as_mut() {
            Some(connection) => f(Some(connection.as_mut())),
            None => f(None),
        }
    }

    /// Commit or roll back, then release the connection.
    ///
    /// A failed commit leaves the transaction active so it can still be
    /// rolled back.
    pub(crate) fn finish(&self, outcome: Outcome) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.status != Status::Active {
            return Err(self.completed(inner.status));
        }
        if let Some(connection) = inner.connection.as_mut() {
            match outcome {
                Outcome::Commit => connection.commit()?,
                Outcome::Rollback => connection.rollback()?,
            }
        }
        inner.status = match outcome {
            Outcome::Commit => Status::Committed,
            Outcome::Rollback => Status::RolledBack,
        };
        inner.connection = None;
        debug!(target: "conduit::txn", transaction = %self.id, state = inner.status.label(), "transaction finished");
        Ok(())
    }
}

impl Drop for TransactionState {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.status != Status::Active {
            return;
        }
        warn!(
            target: "conduit::txn",
            transaction = %self.id,
            "transaction dropped while active, rolling back"
        );
        if let Some(connection) = inner.connection.as_mut() {
            if let Err(e) = connection.rollback() {
                warn!(target: "conduit::txn", transaction = %self.id, error = %e, "rollback on drop failed");
            }
        }
        inner.status = Status::RolledBack;
        inner.connection = None;
    }
}

impl fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionState")
            .field("id", &self.id)
            .field("status", &self.inner.lock().status)
            .finish()
    }
}

// =============================================================================
// DbTransaction
// =============================================================================

/// Driver-backed transaction session. Cheap to clone; clones share the
/// transaction.
#[derive(Clone)]
pub struct DbTransaction {
    engine: Arc<Engine>,
    scope: SessionScope,
    state: Arc<TransactionState>,
}

impl DbTransaction {
    pub(crate) fn new(engine: Arc<Engine>, scope: SessionScope, state: Arc<TransactionState>) -> Self {
        Self {
            engine,
            scope,
            state,
        }
    }
}

impl fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("state", &self.state)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Session for DbTransaction {
    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn scope(&self) -> &SessionScope {
        &self.scope
    }

    fn rescoped(&self, scope: SessionScope) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            scope,
            state: Arc::clone(&self.state),
        }
    }

    fn execute(&self, call: &PreparedCall) -> Result<Execution> {
        self.state.with_connection(|connection| {
            self.scope.cancellation().check()?;
            let connection = connection.ok_or_else(|| {
                Error::configuration("transaction has no connection")
            })?;
            execute_on(connection, call, self.scope.cancellation())
        })
    }

    fn transaction_id(&self) -> Option<uuid::Uuid> {
        Some(self.state.id())
    }
}

impl TransactionSession for DbTransaction {
    fn id(&self) -> Uuid {
        self.state.id()
    }

    fn commit(&self) -> Result<()> {
        self.state.finish(Outcome::Commit)
    }

    fn rollback(&self) -> Result<()> {
        self.state.finish(Outcome::Rollback)
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
