//! Concurrent use of one engine from many sessions.

use std::sync::Arc;
use std::thread;

use conduit::testing::{DriverEvent, MemoryDriver};
use conduit::*;

use crate::common::*;

const THREADS: usize = 8;
const CALLS_PER_THREAD: usize = 25;

#[test]
fn test_descriptor_resolved_once_across_threads() {
    let engine = create_engine(EngineConfig::default());

    let descriptors: Vec<Arc<ContractDescriptor>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| s.spawn(|| engine.contract::<PlaceOrder>().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for descriptor in &descriptors[1..] {
        assert!(Arc::ptr_eq(&descriptors[0], descriptor));
    }
}

#[test]
fn test_secure_values_use_their_own_authenticator() {
    let engine = create_engine(EngineConfig::default());
    let driver = MemoryDriver::new();

    thread::scope(|s| {
        for t in 0..THREADS {
            let session = DbSession::new(Arc::clone(&engine), Arc::new(driver.clone()));
            s.spawn(move || {
                for i in 0..CALLS_PER_THREAD {
                    let args = Args::new()
                        .with("Customer", customer((t * 1000 + i) as i64))
                        .with("Priority", "Normal")
                        .with("Note", format!("note-{t}-{i}"))
                        .with("CustomerKey", format!("key-{t}"));
                    session.call::<PlaceOrder>(&args).unwrap();
                }
            });
        }
    });

    let executions = driver.executions();
    assert_eq!(executions.len(), THREADS * CALLS_PER_THREAD);

    for (_, _, params) in executions {
        let id = params[0].value.as_int().unwrap();
        let (t, i) = (id / 1000, id % 1000);
        let key = format!("key-{t}");
        let ciphertext = params[3].value.as_bytes().unwrap();
        let plaintext = XorProvider.decrypt(ciphertext, key.as_bytes(), "Confidential").unwrap();
        assert_eq!(String::from_utf8(plaintext).unwrap(), format!("note-{t}-{i}"));
    }
}

#[test]
fn test_context_data_stays_with_its_session() {
    let mock = MockSession::new(create_engine(EngineConfig::default()));
    mock.on::<GetOrders>(MockResponse::with(|invocation| {
        let data = invocation.context.context_data().unwrap();
        let tenant = data.get("Tenant").unwrap();
        assert_eq!(invocation.parameter("CustomerId"), Some(&tenant));
        Ok(Execution::status(0))
    }));

    thread::scope(|s| {
        for t in 0..THREADS {
            let data = Arc::new(ContextData::from_entries([("Tenant", Value::Int(t as i64))]));
            let session = mock.with_context(format!("tenant-{t}"), data);
            s.spawn(move || {
                for _ in 0..CALLS_PER_THREAD {
                    session
                        .call::<GetOrders>(&Args::new().with("CustomerId", t as i64))
                        .unwrap();
                }
            });
        }
    });

    let invocations = mock.invocations();
    assert_eq!(invocations.len(), THREADS * CALLS_PER_THREAD);
    for invocation in invocations {
        let tenant = invocation.parameter("CustomerId").and_then(Value::as_int).unwrap();
        assert_eq!(
            invocation.context.connection_name(),
            Some(format!("tenant-{tenant}").as_str())
        );
    }
}

#[test]
fn test_call_ids_are_unique_across_threads() {
    let mock = MockSession::new(create_engine(EngineConfig::default()));

    thread::scope(|s| {
        for _ in 0..THREADS {
            let session = mock.clone();
            s.spawn(move || {
                for _ in 0..CALLS_PER_THREAD {
                    session.call::<OpenOrders>(&()).unwrap();
                }
            });
        }
    });

    let mut ids: Vec<u64> = mock
        .invocations()
        .iter()
        .map(|i| i.context.call_id())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), THREADS * CALLS_PER_THREAD);
}

#[test]
fn test_transactions_on_separate_threads_stay_isolated() {
    let engine = create_engine(EngineConfig::default());
    let driver = MemoryDriver::new();

    let ids: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let session = DbSession::new(Arc::clone(&engine), Arc::new(driver.clone()));
                s.spawn(move || {
                    let txn = session.begin_transaction().unwrap();
                    txn.call::<GetOrders>(&Args::new().with("CustomerId", t as i64))
                        .unwrap();
                    if t % 2 == 0 {
                        txn.commit().unwrap();
                    } else {
                        txn.rollback().unwrap();
                    }
                    txn.id()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), THREADS);

    let events = driver.events();
    let commits = events
        .iter()
        .filter(|e| matches!(e, DriverEvent::Commit { .. }))
        .count();
    let rollbacks = events
        .iter()
        .filter(|e| matches!(e, DriverEvent::Rollback { .. }))
        .count();
    assert_eq!(commits, THREADS / 2);
    assert_eq!(rollbacks, THREADS / 2);
    assert_eq!(driver.connections_opened(), THREADS);
}
