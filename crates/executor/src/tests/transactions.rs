//! Transaction tests: connection pinning, shared ids and lifecycle.

use std::sync::Arc;

use parking_lot::Mutex;

use super::fixtures::*;
use crate::testing::DriverEvent;
use crate::{
    Args, CallObserver, CallStarted, DbSession, Engine, Error, Session, TransactionSession,
    Transactional,
};

/// Captures the transaction id of every started call.
#[derive(Default)]
struct TransactionIds(Mutex<Vec<Option<uuid::Uuid>>>);

impl CallObserver for TransactionIds {
    fn call_started(&self, event: &CallStarted<'_>) {
        self.0.lock().push(event.context.transaction_id());
    }
}

fn observed_session() -> (DbSession, crate::testing::MemoryDriver, Arc<TransactionIds>) {
    let ids = Arc::new(TransactionIds::default());
    let engine = Engine::builder().observer(ids.clone()).build().unwrap();
    let driver = crate::testing::MemoryDriver::new();
    (DbSession::new(engine, Arc::new(driver.clone())), driver, ids)
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_begin_commit_lifecycle() {
    let (session, driver) = db_session();

    let txn = session.begin_transaction().unwrap();
    assert!(txn.is_active());

    txn.call::<CreatePerson>(&Args::new().with("Name", "a")).unwrap();
    txn.call::<CreatePerson>(&Args::new().with("Name", "b")).unwrap();
    txn.commit().unwrap();
    assert!(!txn.is_active());

    // One pinned connection: begin, two calls, commit, release.
    let events = driver.events();
    assert_eq!(driver.connections_opened(), 1);
    assert!(matches!(events[1], DriverEvent::Begin { connection: 1 }));
    assert!(matches!(events[2], DriverEvent::Execute { connection: 1, .. }));
    assert!(matches!(events[3], DriverEvent::Execute { connection: 1, .. }));
    assert!(matches!(events[4], DriverEvent::Commit { connection: 1 }));
    assert!(matches!(events[5], DriverEvent::Close { connection: 1 }));
}

#[test]
fn test_begin_rollback_lifecycle() {
    let (session, driver) = db_session();

    let txn = session.begin_transaction().unwrap();
    txn.call::<GetPeople>(&()).unwrap();
    txn.rollback().unwrap();

    assert!(driver
        .events()
        .contains(&DriverEvent::Rollback { connection: 1 }));
    assert!(!driver.events().contains(&DriverEvent::Commit { connection: 1 }));
}

#[test]
fn test_call_after_commit_returns_error() {
    let (session, driver) = db_session();
    let txn = session.begin_transaction().unwrap();
    txn.commit().unwrap();

    let result = txn.call::<GetPeople>(&());
    assert!(
        matches!(&result, Err(Error::TransactionCompleted { state, .. }) if *state == "committed"),
        "Expected TransactionCompleted, got {:?}",
        result
    );
    assert!(driver.executions().is_empty());
}

#[test]
fn test_commit_after_rollback_returns_error() {
    let (session, _driver) = db_session();
    let txn = session.begin_transaction().unwrap();
    txn.rollback().unwrap();

    let result = txn.commit();
    assert!(
        matches!(&result, Err(Error::TransactionCompleted { state, .. }) if *state == "rolled back"),
        "Expected TransactionCompleted, got {:?}",
        result
    );
}

#[test]
fn test_drop_active_transaction_rolls_back() {
    let (session, driver) = db_session();
    {
        let txn = session.begin_transaction().unwrap();
        txn.call::<GetPeople>(&()).unwrap();
    }

    let events = driver.events();
    assert!(events.contains(&DriverEvent::Rollback { connection: 1 }));
    assert!(events.contains(&DriverEvent::Close { connection: 1 }));
}

#[test]
fn test_drop_after_commit_does_not_roll_back() {
    let (session, driver) = db_session();
    {
        let txn = session.begin_transaction().unwrap();
        txn.commit().unwrap();
    }
    assert!(!driver.events().contains(&DriverEvent::Rollback { connection: 1 }));
}

#[test]
fn test_backend_error_keeps_transaction_open() {
    let (session, driver) = db_session();
    driver.fail("usp_GetPeople", 1205, "deadlock victim");

    let txn = session.begin_transaction().unwrap();
    let result = txn.call::<GetPeople>(&());
    assert!(matches!(result, Err(Error::Backend { code: 1205, .. })));
    assert!(txn.is_active());
    txn.rollback().unwrap();
}

// =============================================================================
// Call context
// =============================================================================

#[test]
fn test_calls_share_transaction_id() {
    let (session, _driver, ids) = observed_session();

    session.call::<GetPeople>(&()).unwrap();
    let txn = session.begin_transaction().unwrap();
    txn.call::<GetPeople>(&()).unwrap();
    txn.with_connection("other").call::<GetPeople>(&()).unwrap();
    txn.commit().unwrap();

    let seen = ids.0.lock().clone();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], None);
    assert_eq!(seen[1], Some(txn.id()));
    assert_eq!(seen[2], Some(txn.id()));
}

#[test]
fn test_transactions_get_distinct_ids() {
    let (session, _driver) = db_session();
    let a = session.begin_transaction().unwrap();
    let b = session.begin_transaction().unwrap();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_clones_share_lifecycle() {
    let (session, _driver) = db_session();
    let txn = session.begin_transaction().unwrap();
    let clone = txn.clone();
    clone.commit().unwrap();
    assert!(!txn.is_active());
}

#[test]
fn test_refused_connection_fails_begin() {
    let (session, driver) = db_session();
    driver.refuse_connections(-1, "pool exhausted");
    let result = session.begin_transaction();
    assert!(matches!(result, Err(Error::Backend { code: -1, .. })));
}
