//! End-to-end flows through the public API: bind, execute, write back, map.

use std::sync::Arc;

use conduit::testing::{DriverEvent, MemoryDriver};
use conduit::*;

use crate::common::*;

fn order_args() -> Args {
    Args::new()
        .with("Customer", customer(42))
        .with("Items", serde_json::json!(["apple", "pear"]))
        .with("Priority", "High")
        .with("Note", "leave at door")
        .with("CustomerKey", "k3y")
}

// =============================================================================
// Stored calls
// =============================================================================

#[test]
fn test_place_order_binds_every_transform() {
    let (session, driver) = create_session();
    driver.respond("usp_PlaceOrder", |_| {
        let mut execution = Execution::status(0);
        execution.outputs.insert("OrderId".into(), Value::Int(1001));
        Ok(execution)
    });

    let mut args = order_args();
    let status = session.call_mut::<PlaceOrder>(&mut args).unwrap();
    assert_eq!(status, 0);

    let executions = driver.executions();
    assert_eq!(executions.len(), 1);
    let (_, target, params) = &executions[0];
    assert_eq!(target.qualified_name(), "usp_PlaceOrder");

    let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["CustomerId", "Items", "Priority", "Note", "CustomerKey", "OrderId"]);

    assert_eq!(params[0].value, Value::Int(42));
    assert!(!params[0].is_transformed);
    assert_eq!(params[1].value, Value::from(r#"["apple","pear"]"#));
    assert!(params[1].is_transformed);
    assert_eq!(params[2].value, Value::Int(10));

    let expected: Vec<u8> = b"leave at door"
        .iter()
        .zip(b"k3y".iter().cycle())
        .map(|(p, k)| p ^ k)
        .collect();
    assert_eq!(params[3].value, Value::Bytes(expected));
    assert_eq!(params[5].direction, Direction::Out);

    assert_eq!(args.get("OrderId"), Some(Value::Int(1001)));
    // Inputs are left as the caller wrote them.
    assert_eq!(args.get("Note"), Some(Value::from("leave at door")));
}

#[test]
fn test_missing_derived_root_is_binding_error() {
    let (session, driver) = create_session();
    let args = Args::new().with("Priority", "Low");

    let result = session.call::<PlaceOrder>(&args);
    assert!(
        matches!(&result, Err(Error::Binding { member, .. }) if member == "CustomerId"),
        "Expected Binding, got {:?}",
        result
    );
    assert_eq!(driver.connections_opened(), 0);
}

#[test]
fn test_unknown_enum_name_is_binding_error() {
    let (session, _driver) = create_session();
    let args = order_args().with("Priority", "Whenever");

    let result = session.call::<PlaceOrder>(&args);
    assert!(
        matches!(&result, Err(Error::Binding { member, .. }) if member == "Priority"),
        "Expected Binding, got {:?}",
        result
    );
}

#[test]
fn test_backend_failure_surfaces_unchanged() {
    let (session, driver) = create_session();
    driver.fail("usp_PlaceOrder", 547, "foreign key violation");

    let mut args = order_args();
    let result = session.call_mut::<PlaceOrder>(&mut args);
    assert!(
        matches!(&result, Err(Error::Backend { code: 547, .. })),
        "Expected Backend, got {:?}",
        result
    );
    assert_eq!(args.get("OrderId"), None);
}

// =============================================================================
// Queries and mapping
// =============================================================================

#[test]
fn test_get_orders_maps_rows() {
    let (session, driver) = create_session();
    driver.respond_rows("usp_GetOrders", vec![order_row(1, 10), order_row(2, 1)]);

    let orders: Vec<Order> = session
        .get_all::<GetOrders, Order>(&Args::new().with("CustomerId", 42))
        .unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id, 1);
    assert_eq!(orders[0].priority.as_ref().map(|p| p.value()), Some(10));
    assert_eq!(orders[1].priority.as_ref().map(|p| p.value()), Some(1));
    assert_eq!(orders[0].items, Some(serde_json::json!(["apple"])));

    let (_, target, _) = &driver.executions()[0];
    assert_eq!(target.qualified_name(), "sales.usp_GetOrders");
}

#[test]
fn test_view_reads_through_prefix_and_schema() {
    let (session, driver) = create_session();
    driver.respond_rows("vw_OpenOrders", vec![order_row(7, 5)]);

    let order: Option<Order> = session.get::<OpenOrders, Order>(&()).unwrap();
    assert_eq!(order.map(|o| o.id), Some(7));

    let (_, target, params) = &driver.executions()[0];
    assert_eq!(target.qualified_name(), "sales.vw_OpenOrders");
    assert_eq!(target.kind, CallKind::View);
    assert!(params.is_empty());
}

#[test]
fn test_empty_result_is_none() {
    let (session, _driver) = create_session();
    let order: Option<Order> = session
        .get::<GetOrders, Order>(&Args::new().with("CustomerId", 1))
        .unwrap();
    assert!(order.is_none());
}

#[test]
fn test_strict_session_rejects_unmapped_columns() {
    let (session, driver) = create_session();
    let row = Row::from_pairs([("OrderId", Value::Int(1)), ("Legacy", Value::Int(0))]);
    driver.respond_rows("usp_GetOrders", vec![row]);

    let args = Args::new().with("CustomerId", 1);
    let lenient: Vec<Order> = session.get_all::<GetOrders, Order>(&args).unwrap();
    assert_eq!(lenient.len(), 1);

    let result = session
        .with_strict_columns(true)
        .get_all::<GetOrders, Order>(&args);
    assert!(
        matches!(&result, Err(Error::UnmappedColumn { column, .. }) if column == "Legacy"),
        "Expected UnmappedColumn, got {:?}",
        result
    );
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn test_transaction_shares_one_connection() {
    let (session, driver) = create_session();
    let txn = session.begin_transaction().unwrap();

    txn.call::<GetOrders>(&Args::new().with("CustomerId", 1)).unwrap();
    txn.call::<GetOrders>(&Args::new().with("CustomerId", 2)).unwrap();
    txn.commit().unwrap();

    assert_eq!(driver.connections_opened(), 1);
    let events = driver.events();
    assert!(matches!(events.first(), Some(DriverEvent::Open { connection: 1, .. })));
    assert!(events.contains(&DriverEvent::Begin { connection: 1 }));
    assert!(events.contains(&DriverEvent::Commit { connection: 1 }));
    assert!(matches!(events.last(), Some(DriverEvent::Close { connection: 1 })));
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let (session, driver) = create_session();
    {
        let txn = session.begin_transaction().unwrap();
        txn.call::<GetOrders>(&Args::new().with("CustomerId", 1)).unwrap();
    }

    let events = driver.events();
    assert!(events.contains(&DriverEvent::Rollback { connection: 1 }));
    assert!(!events.contains(&DriverEvent::Commit { connection: 1 }));
}

#[test]
fn test_completed_transaction_refuses_calls() {
    let (session, _driver) = create_session();
    let txn = session.begin_transaction().unwrap();
    txn.rollback().unwrap();

    let result = txn.call::<GetOrders>(&Args::new().with("CustomerId", 1));
    assert!(
        matches!(result, Err(Error::TransactionCompleted { .. })),
        "Expected TransactionCompleted, got {:?}",
        result
    );
    assert!(txn.commit().is_err());
}

// =============================================================================
// Mock parity
// =============================================================================

#[test]
fn test_mock_binds_like_the_driver_session() {
    let (session, driver) = create_session();
    session.call::<PlaceOrder>(&order_args()).unwrap();
    let (_, _, driver_params) = driver.executions().remove(0);

    let mock = MockSession::new(create_engine(EngineConfig::default()));
    mock.on::<PlaceOrder>(MockResponse::status(0).output("OrderId", 5));
    let mut args = order_args();
    mock.call_mut::<PlaceOrder>(&mut args).unwrap();

    let invocation = mock.invocations_of::<PlaceOrder>().remove(0);
    assert_eq!(invocation.parameters, driver_params);
    assert_eq!(invocation.context.target().qualified_name(), "usp_PlaceOrder");
    assert_eq!(args.get("OrderId"), Some(Value::Int(5)));
}

#[test]
fn test_mock_rows_map_like_driver_rows() {
    let mock = MockSession::new(create_engine(EngineConfig::default()));
    mock.on::<GetOrders>(MockResponse::rows(vec![order_row(3, 5)]));

    let orders: Vec<Order> = mock
        .get_all::<GetOrders, Order>(&Args::new().with("CustomerId", 1))
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].priority.as_ref().and_then(|p| p.name()), Some("Normal"));
}

#[test]
fn test_mock_transaction_recorded() {
    let mock = MockSession::new(create_engine(EngineConfig::default()));
    let txn = mock.begin_transaction().unwrap();
    let id = txn.id();
    txn.call::<GetOrders>(&Args::new().with("CustomerId", 1)).unwrap();
    txn.commit().unwrap();

    assert_eq!(mock.transactions(), vec![(id, MockTransactionEnd::Committed)]);
    assert_eq!(mock.invocations()[0].context.transaction_id(), Some(id));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_engine_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "procedure_prefix = \"sp_\"\ndefault_schema = \"app\"\nenum_storage = \"name\"\n",
    )
    .unwrap();

    let engine = Engine::builder()
        .config_file(&path)
        .unwrap()
        .encryption_provider(Arc::new(XorProvider))
        .build()
        .unwrap();
    let driver = MemoryDriver::new();
    let session = DbSession::new(engine, Arc::new(driver.clone()));

    session.call::<PlaceOrder>(&order_args()).unwrap();
    session.call::<GetOrders>(&Args::new().with("CustomerId", 1)).unwrap();

    let executions = driver.executions();
    let (_, place, params) = &executions[0];
    assert_eq!(place.qualified_name(), "app.sp_PlaceOrder");
    assert_eq!(params[2].value, Value::from("High"));
    // A declared schema wins over the default.
    assert_eq!(executions[1].1.qualified_name(), "sales.sp_GetOrders");
}

#[test]
fn test_invalid_config_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "enum_storage = \"ordinal\"\n").unwrap();

    let result = Engine::builder().config_file(&path);
    let error = result.err().expect("invalid storage mode must be rejected");
    assert_eq!(error.kind(), ErrorKind::Configuration);
}
