//! Property tests over binding and naming.

use std::sync::Arc;

use conduit::testing::MemoryDriver;
use conduit::*;
use proptest::prelude::*;

use crate::common::*;

fn mock() -> MockSession {
    MockSession::new(create_engine(EngineConfig::default()))
}

/// Flip the case of every other ASCII letter.
fn scramble_case(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            if i % 2 == 0 {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_any_enum_value_binds_verbatim(value in any::<i64>()) {
        let mock = mock();
        let args = Args::new()
            .with("Customer", customer(1))
            .with("Priority", value);
        mock.call::<PlaceOrder>(&args).unwrap();

        let invocation = mock.invocations().remove(0);
        prop_assert_eq!(invocation.parameter("Priority"), Some(&Value::Int(value)));
    }

    #[test]
    fn prop_enum_values_survive_mapping(value in any::<i64>()) {
        let mock = mock();
        mock.on::<GetOrders>(MockResponse::rows(vec![order_row(1, value)]));

        let order: Order = mock
            .get::<GetOrders, Order>(&Args::new().with("CustomerId", 1))
            .unwrap()
            .unwrap();
        prop_assert_eq!(order.priority.map(|p| p.value()), Some(value));
    }

    #[test]
    fn prop_argument_names_match_case_insensitively(id in 1i64..1_000_000) {
        let mock = mock();
        let args = Args::new()
            .with(scramble_case("CustomerId"), id);
        mock.call::<GetOrders>(&args).unwrap();

        let invocation = mock.invocations().remove(0);
        prop_assert_eq!(invocation.parameter("CustomerId"), Some(&Value::Int(id)));
    }

    #[test]
    fn prop_prefix_applied_once(name in "[A-Z][A-Za-z]{0,12}") {
        let engine = create_engine(EngineConfig::default());
        let resolver = engine.resolver();

        let bare = resolver
            .resolve_contract(ContractDefinition::stored_call(name.clone()))
            .unwrap();
        let prefixed = resolver
            .resolve_contract(ContractDefinition::stored_call(format!("usp_{name}")))
            .unwrap();
        prop_assert_eq!(bare.target_name(), format!("usp_{name}"));
        prop_assert_eq!(prefixed.target_name(), format!("usp_{name}"));
    }

    #[test]
    fn prop_missing_required_never_reaches_driver(team in proptest::option::of("[a-z]{1,8}")) {
        let driver = MemoryDriver::new();
        let session = DbSession::new(
            create_engine(EngineConfig::default()),
            Arc::new(driver.clone()),
        );
        let mut args = Args::new();
        if let Some(team) = team {
            args.insert("Team", team);
        }

        let result = session.call::<GetOrders>(&args);
        prop_assert!(matches!(result, Err(Error::Binding { .. })), "got {:?}", result);
        prop_assert_eq!(driver.connections_opened(), 0);
    }
}
