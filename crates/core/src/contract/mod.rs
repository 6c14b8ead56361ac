//! Contracts, entities and their descriptors.
//!
//! A contract is a typed descriptor of a backend call (stored procedure or
//! view) and its parameters. An entity is the typed shape result rows are
//! mapped into. Both declare their members through a definition; the
//! [`DescriptorResolver`] turns definitions into cached descriptors.

mod cache;
mod definition;
mod descriptor;

pub use cache::DescriptorCache;
pub use definition::{ContractDefinition, EntityDefinition, MemberDefinition, TransformSpec};
pub use descriptor::{ContractDescriptor, DescriptorResolver, EntityDescriptor, MemberDescriptor};

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// A callable backend operation.
///
/// ```text
/// struct CreatePerson;
///
/// impl Contract for CreatePerson {
///     fn definition() -> ContractDefinition {
///         ContractDefinition::stored_call("CreatePerson")
///             .member(MemberDefinition::new("Name").required())
///             .member(MemberDefinition::new("PersonId").output())
///     }
/// }
/// ```
pub trait Contract: 'static {
    /// Declared shape of the contract.
    fn definition() -> ContractDefinition;
}

/// A typed result row.
pub trait Entity: Default + Send + 'static {
    /// Declared members.
    fn definition() -> EntityDefinition;

    /// Assign a mapped value onto the member named `member`.
    fn set_member(&mut self, member: &str, value: Value) -> Result<()>;
}

/// Live argument values for a call.
pub trait Arguments {
    /// Current value of a member.
    fn get(&self, member: &str) -> Option<Value>;

    /// Write an output value back. Returns `Ok(false)` when the arguments
    /// are immutable.
    fn set_output(&mut self, member: &str, value: Value) -> Result<bool> {
        let _ = (member, value);
        Ok(false)
    }
}

/// Anonymous, ordered argument bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: Vec<(String, Value)>,
}

impl Args {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an argument.
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(member, value);
        self
    }

    /// Add or replace an argument.
    pub fn insert(&mut self, member: impl Into<String>, value: impl Into<Value>) {
        let member = member.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&member)) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((member, value)),
        }
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Arguments for Args {
    fn get(&self, member: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == member)
            .or_else(|| self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(member)))
            .map(|(_, v)| v.clone())
    }

    fn set_output(&mut self, member: &str, value: Value) -> Result<bool> {
        self.insert(member, value);
        Ok(true)
    }
}

impl Arguments for HashMap<String, Value> {
    fn get(&self, member: &str) -> Option<Value> {
        HashMap::get(self, member).cloned()
    }

    fn set_output(&mut self, member: &str, value: Value) -> Result<bool> {
        self.insert(member.to_string(), value);
        Ok(true)
    }
}

/// Arguments for contracts that take none.
impl Arguments for () {
    fn get(&self, _member: &str) -> Option<Value> {
        None
    }
}

/// Helper for `set_member` implementations: the error for an unknown member.
pub fn unknown_member(entity: &str, member: &str) -> Error {
    Error::InvalidInput {
        reason: format!("{entity} has no member '{member}'"),
    }
}
