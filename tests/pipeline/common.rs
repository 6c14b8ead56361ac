//! Common contracts and helpers for pipeline tests

use std::sync::Arc;

use conduit::testing::MemoryDriver;
use conduit::*;

/// Route `conduit::*` tracing output to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn priority() -> EnumType {
    EnumType::new("Priority")
        .variant("Low", 1)
        .variant("Normal", 5)
        .variant_with_alternate("Urgent", "High", 10)
}

/// `usp_PlaceOrder @CustomerId, @Items, @Priority, @Note, @OrderId OUTPUT`
pub struct PlaceOrder;

impl Contract for PlaceOrder {
    fn definition() -> ContractDefinition {
        ContractDefinition::stored_call("PlaceOrder")
            .member(
                MemberDefinition::new("CustomerId")
                    .derived_from(&["Customer", "Id"])
                    .required(),
            )
            .member(MemberDefinition::new("Items").json())
            .member(MemberDefinition::new("Priority").enumeration(priority()))
            .member(MemberDefinition::new("Note").secure("CustomerKey", "Confidential"))
            .member(MemberDefinition::new("CustomerKey"))
            .member(MemberDefinition::new("OrderId").output())
    }
}

/// `sales.usp_GetOrders @CustomerId`
pub struct GetOrders;

impl Contract for GetOrders {
    fn definition() -> ContractDefinition {
        ContractDefinition::stored_call("GetOrders")
            .schema("sales")
            .member(MemberDefinition::new("CustomerId").required())
    }
}

/// `sales.vw_OpenOrders`
pub struct OpenOrders;

impl Contract for OpenOrders {
    fn definition() -> ContractDefinition {
        ContractDefinition::view("OpenOrders").schema("sales")
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub priority: Option<EnumValue>,
    pub items: Option<serde_json::Value>,
}

impl Entity for Order {
    fn definition() -> EntityDefinition {
        EntityDefinition::new("Order")
            .member(MemberDefinition::new("Id").source("OrderId").required())
            .member(MemberDefinition::new("Priority").enumeration(priority().nullable()))
            .member(MemberDefinition::new("Items").json())
    }

    fn set_member(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "Id" => self.id = i64::from_value(value)?,
            "Priority" => self.priority = Option::<EnumValue>::from_value(value)?,
            "Items" => self.items = Option::<serde_json::Value>::from_value(value)?,
            other => return Err(unknown_member("Order", other)),
        }
        Ok(())
    }
}

/// XOR with the authenticator.
pub struct XorProvider;

impl EncryptionProvider for XorProvider {
    fn encrypt(&self, plaintext: &[u8], authenticator: &[u8], _classification: &str) -> Result<Vec<u8>> {
        Ok(plaintext
            .iter()
            .zip(authenticator.iter().cycle())
            .map(|(p, a)| p ^ a)
            .collect())
    }

    fn decrypt(&self, ciphertext: &[u8], authenticator: &[u8], classification: &str) -> Result<Vec<u8>> {
        self.encrypt(ciphertext, authenticator, classification)
    }
}

pub fn customer(id: i64) -> Value {
    Value::Object([("Id".to_string(), Value::Int(id))].into_iter().collect())
}

pub fn order_row(id: i64, priority: i64) -> Row {
    Row::from_pairs([
        ("OrderId", Value::Int(id)),
        ("Priority", Value::Int(priority)),
        ("Items", Value::from("[\"apple\"]")),
    ])
}

/// Engine with the XOR provider and the given config.
pub fn create_engine(config: EngineConfig) -> Arc<Engine> {
    init_tracing();
    Engine::builder()
        .config(config)
        .encryption_provider(Arc::new(XorProvider))
        .build()
        .unwrap()
}

/// Driver-backed session plus its driver.
pub fn create_session() -> (DbSession, MemoryDriver) {
    let driver = MemoryDriver::new();
    let session = DbSession::new(create_engine(EngineConfig::default()), Arc::new(driver.clone()));
    (session, driver)
}
