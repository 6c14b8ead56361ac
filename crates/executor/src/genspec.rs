//! Generalization/specialization (GenSpec) result mapping.
//!
//! A GenSpec type is a closed set of entity variants stored in one result
//! set. A discriminator column on each row selects the variant the row is
//! mapped into:
//!
//! ```text
//! enum Party {
//!     Person(Person),
//!     Company(Company),
//! }
//!
//! impl GenSpec for Party {
//!     fn variants() -> Result<VariantRegistry<Self>> {
//!         VariantRegistry::builder()
//!             .column("PartyType")
//!             .variant("P", Party::Person)
//!             .variant("C", Party::Company)
//!             .build()
//!     }
//! }
//! ```
//!
//! The registry is checked when first used: tags must be unique and every
//! variant entity must resolve. Rows whose discriminator matches no tag map
//! into the base variant when one is registered and fail otherwise.

use std::any::type_name;

use conduit_core::{DescriptorResolver, Entity, Error, Result, Row, Value};

use crate::mapper::RowMapper;

/// A closed family of entity variants selected by a discriminator column.
pub trait GenSpec: Send + Sync + Sized + 'static {
    /// Declare the variants.
    fn variants() -> Result<VariantRegistry<Self>>;
}

type BuildFn<G> = Box<dyn Fn(&RowMapper<'_>, &Row, usize) -> Result<G> + Send + Sync>;
type CheckFn = fn(&DescriptorResolver) -> Result<()>;

pub(crate) struct Variant<G> {
    entity: &'static str,
    build: BuildFn<G>,
    check: CheckFn,
}

impl<G: 'static> Variant<G> {
    fn of<E: Entity>(wrap: fn(E) -> G) -> Self {
        Self {
            entity: type_name::<E>(),
            build: Box::new(move |mapper: &RowMapper<'_>, row: &Row, index: usize| {
                mapper.map_entity::<E>(row, index).map(wrap)
            }),
            check: |resolver| resolver.entity::<E>().map(|_| ()),
        }
    }

    pub(crate) fn build(&self, mapper: &RowMapper<'_>, row: &Row, index: usize) -> Result<G> {
        (self.build)(mapper, row, index)
    }
}

/// The variants of a GenSpec type, keyed by discriminator tag.
pub struct VariantRegistry<G> {
    owner: &'static str,
    column: Option<String>,
    tagged: Vec<(String, Variant<G>)>,
    base: Option<Variant<G>>,
}

impl<G: 'static> VariantRegistry<G> {
    /// Start declaring variants.
    pub fn builder() -> VariantRegistryBuilder<G> {
        VariantRegistryBuilder {
            column: None,
            tagged: Vec::new(),
            base: Vec::new(),
        }
    }
}

impl<G> VariantRegistry<G> {
    /// Discriminator column, when it overrides the engine default.
    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Registered tags in declaration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tagged.iter().map(|(tag, _)| tag.as_str())
    }

    /// Whether unmatched rows have a fallback.
    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    pub(crate) fn owner(&self) -> &'static str {
        self.owner
    }

    /// Variant for a discriminator value.
    pub(crate) fn select(&self, discriminator: &Value) -> Option<&Variant<G>> {
        let candidates = tag_candidates(discriminator);
        self.tagged
            .iter()
            .find(|(tag, _)| candidates.iter().any(|c| c.eq_ignore_ascii_case(tag)))
            .map(|(_, variant)| variant)
            .or(self.base.as_ref())
    }

    /// Resolve every variant entity so bad metadata fails before any row.
    pub(crate) fn check(&self, resolver: &DescriptorResolver) -> Result<()> {
        let variants = self.tagged.iter().map(|(_, v)| v).chain(self.base.iter());
        for variant in variants {
            (variant.check)(resolver).map_err(|e| match e {
                Error::Definition { owner, reason } => Error::definition(
                    self.owner,
                    format!("variant {} ({owner}): {reason}", variant.entity),
                ),
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Builder for [`VariantRegistry`].
pub struct VariantRegistryBuilder<G> {
    column: Option<String>,
    tagged: Vec<(String, Variant<G>)>,
    base: Vec<Variant<G>>,
}

impl<G: 'static> VariantRegistryBuilder<G> {
    /// Read the discriminator from `column` instead of the engine default.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Map rows tagged `tag` into entity `E`, wrapped by `wrap`.
    pub fn variant<E: Entity>(mut self, tag: impl Into<String>, wrap: fn(E) -> G) -> Self {
        self.tagged.push((tag.into().trim().to_string(), Variant::of(wrap)));
        self
    }

    /// Map rows with an unknown discriminator into entity `E`.
    pub fn base<E: Entity>(mut self, wrap: fn(E) -> G) -> Self {
        self.base.push(Variant::of(wrap));
        self
    }

    /// Finish, checking the declaration is unambiguous.
    pub fn build(self) -> Result<VariantRegistry<G>> {
        let owner = type_name::<G>();
        if let Some(column) = &self.column {
            if column.trim().is_empty() {
                return Err(Error::definition(owner, "discriminator column is empty"));
            }
        }
        if self.tagged.is_empty() && self.base.is_empty() {
            return Err(Error::definition(owner, "no variants registered"));
        }
        if self.base.len() > 1 {
            return Err(Error::definition(owner, "more than one base variant registered"));
        }
        for (i, (tag, _)) in self.tagged.iter().enumerate() {
            if tag.is_empty() {
                return Err(Error::definition(owner, "variant registered with an empty tag"));
            }
            if self.tagged[..i].iter().any(|(seen, _)| seen.eq_ignore_ascii_case(tag)) {
                return Err(Error::definition(owner, format!("duplicate discriminator tag '{tag}'")));
            }
        }

        Ok(VariantRegistry {
            owner,
            column: self.column,
            tagged: self.tagged,
            base: self.base.into_iter().next(),
        })
    }
}

/// Textual forms a discriminator value can match a tag by.
pub(crate) fn tag_candidates(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.trim().to_string()],
        Value::Int(i) => vec![i.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Enum(e) => {
            let mut out = vec![e.value().to_string()];
            if let Some(name) = e.name() {
                out.push(name.to_string());
            }
            out
        }
        _ => Vec::new(),
    }
}
