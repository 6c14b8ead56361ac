//! Per-member value transformation.
//!
//! A [`Transform`] converts a member value on its way to the datasource
//! (`to_source`, applied before the value is registered as a call
//! parameter) and a raw value on its way back (`from_source`, applied before
//! the value is assigned onto an entity). Only one direction runs per member
//! per call.
//!
//! - [`EnumTransform`]: enum <-> integer or name, honoring alternate names
//! - [`JsonTransform`]: structured value <-> JSON text
//! - [`SecureTransform`]: encryption through an [`EncryptionProvider`]

mod enums;
mod json;
mod secure;

pub use enums::{EnumStorage, EnumTransform, EnumType, EnumVariant};
pub use json::JsonTransform;
pub use secure::{EncryptionProvider, SecureKind, SecureSpec, SecureTransform};

use std::fmt;

use crate::context::CallContext;
use crate::error::Result;
use crate::value::Value;

/// Read access to the other members of the instance being transformed.
pub trait MemberLookup {
    /// Raw value of a sibling member, if present.
    fn lookup(&self, member: &str) -> Option<Value>;
}

/// Identity of the instance a transform runs against.
///
/// Scoped to one call so identities never collide across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    call_id: u64,
    slot: usize,
}

impl InstanceKey {
    /// Key for instance `slot` (an argument address or row index) within a call.
    pub fn new(call_id: u64, slot: usize) -> Self {
        Self { call_id, slot }
    }
}

/// Everything a transform may consult besides the value itself.
pub struct TransformContext<'a> {
    /// Contract or entity owning the member
    pub owner: &'a str,
    /// Member being transformed
    pub member: &'a str,
    /// Context of the call in progress
    pub call: Option<&'a CallContext>,
    /// Sibling members of the same instance
    pub siblings: &'a dyn MemberLookup,
    /// Identity of the instance
    pub instance: InstanceKey,
}

impl fmt::Debug for TransformContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformContext")
            .field("owner", &self.owner)
            .field("member", &self.member)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

/// Bidirectional value conversion between a member and its datasource form.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Convert a member value into its datasource representation.
    fn to_source(&self, value: Value, ctx: &TransformContext<'_>) -> Result<Value>;

    /// Convert a raw datasource value into the member representation.
    fn from_source(&self, raw: Value, ctx: &TransformContext<'_>) -> Result<Value>;
}

/// A [`MemberLookup`] with no siblings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSiblings;

impl MemberLookup for NoSiblings {
    fn lookup(&self, _member: &str) -> Option<Value> {
        None
    }
}

#[cfg(test)]
pub(crate) fn test_context<'a>(member: &'a str, siblings: &'a dyn MemberLookup) -> TransformContext<'a> {
    TransformContext {
        owner: "TestContract",
        member,
        call: None,
        siblings,
        instance: InstanceKey::new(0, 0),
    }
}
