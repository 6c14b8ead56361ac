//! Declarative contract and entity definitions.
//!
//! These are what a contract or entity type hands the resolver. They carry
//! no derived state: prefixes, default schemas and built transforms are
//! applied at resolution.

use std::fmt;
use std::sync::Arc;

use crate::context::CallKind;
use crate::driver::Direction;
use crate::transform::{EnumType, SecureKind, SecureSpec, Transform};

/// Transform declared on a member.
#[derive(Clone)]
pub enum TransformSpec {
    /// A caller-supplied transform
    Custom(Arc<dyn Transform>),
    /// Enum transform; storage follows the engine configuration
    Enum(EnumType),
    /// JSON text transform
    Json,
}

impl fmt::Debug for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformSpec::Custom(t) => f.debug_tuple("Custom").field(t).finish(),
            TransformSpec::Enum(ty) => f.debug_tuple("Enum").field(&ty.name()).finish(),
            TransformSpec::Json => f.write_str("Json"),
        }
    }
}

/// One declared member of a contract or entity.
#[derive(Debug, Clone)]
pub struct MemberDefinition {
    pub(crate) name: String,
    pub(crate) source: Option<String>,
    pub(crate) required: bool,
    pub(crate) direction: Direction,
    pub(crate) transform: Option<TransformSpec>,
    pub(crate) secure: Option<SecureSpec>,
    pub(crate) derived_from: Option<Vec<String>>,
}

impl MemberDefinition {
    /// Declare a member.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            required: false,
            direction: Direction::In,
            transform: None,
            secure: None,
            derived_from: None,
        }
    }

    /// Override the parameter or column name.
    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.source = Some(name.into());
        self
    }

    /// A null or absent value is an error.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Output-only parameter.
    pub fn output(mut self) -> Self {
        self.direction = Direction::Out;
        self
    }

    /// Input and output parameter.
    pub fn in_out(mut self) -> Self {
        self.direction = Direction::InOut;
        self
    }

    /// Attach a custom transform.
    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(TransformSpec::Custom(transform));
        self
    }

    /// Attach the enum transform for `ty`.
    pub fn enumeration(mut self, ty: EnumType) -> Self {
        self.transform = Some(TransformSpec::Enum(ty));
        self
    }

    /// Attach the JSON transform.
    pub fn json(mut self) -> Self {
        self.transform = Some(TransformSpec::Json);
        self
    }

    /// Mark as a secure text value.
    pub fn secure(self, authenticator_member: impl Into<String>, classification: impl Into<String>) -> Self {
        self.secure_as(authenticator_member, classification, SecureKind::Text)
    }

    /// Mark as a secure byte value.
    pub fn secure_bytes(
        self,
        authenticator_member: impl Into<String>,
        classification: impl Into<String>,
    ) -> Self {
        self.secure_as(authenticator_member, classification, SecureKind::Bytes)
    }

    fn secure_as(
        mut self,
        authenticator_member: impl Into<String>,
        classification: impl Into<String>,
        kind: SecureKind,
    ) -> Self {
        self.secure = Some(SecureSpec {
            authenticator_member: authenticator_member.into(),
            classification: classification.into(),
            kind,
        });
        self
    }

    /// Derive the value by walking `path` from another argument, e.g.
    /// `["Owner", "Id"]` reads the `Id` field of the `Owner` object.
    pub fn derived_from(mut self, path: &[&str]) -> Self {
        self.derived_from = Some(path.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Declared contract: a named call against a stored procedure or view.
#[derive(Debug, Clone)]
pub struct ContractDefinition {
    pub(crate) name: String,
    pub(crate) kind: CallKind,
    pub(crate) schema: Option<String>,
    pub(crate) target: Option<String>,
    pub(crate) members: Vec<MemberDefinition>,
}

impl ContractDefinition {
    /// A contract targeting a stored procedure named after `name`.
    pub fn stored_call(name: impl Into<String>) -> Self {
        Self::new(name, CallKind::StoredProcedure)
    }

    /// A contract targeting a view named after `name`.
    pub fn view(name: impl Into<String>) -> Self {
        Self::new(name, CallKind::View)
    }

    fn new(name: impl Into<String>, kind: CallKind) -> Self {
        Self {
            name: name.into(),
            kind,
            schema: None,
            target: None,
            members: Vec::new(),
        }
    }

    /// Explicit schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Explicit target object name; no prefix is applied.
    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.target = Some(name.into());
        self
    }

    /// Declare a member.
    pub fn member(mut self, member: MemberDefinition) -> Self {
        self.members.push(member);
        self
    }

    /// Contract name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Declared entity: the typed shape rows are mapped into.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub(crate) name: String,
    pub(crate) members: Vec<MemberDefinition>,
}

impl EntityDefinition {
    /// Start declaring an entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Declare a member.
    pub fn member(mut self, member: MemberDefinition) -> Self {
        self.members.push(member);
        self
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
