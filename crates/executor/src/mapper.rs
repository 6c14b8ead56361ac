//! Row to entity mapping.
//!
//! Columns match members case-insensitively through the entity
//! descriptor. Each mapped value passes through the member's incoming
//! transform before assignment. A row populates a fresh instance, so a
//! failed row never leaves a half-filled entity behind.

use std::cell::RefCell;

use conduit_core::{
    CallContext, CancellationToken, DescriptorResolver, Entity, EntityDescriptor, Error,
    ErrorKind, InstanceKey, MemberLookup, Result, Row, RowStream, TransformContext, Value,
};
use rustc_hash::FxHashSet;

use crate::genspec::{self, GenSpec, VariantRegistry};
use crate::notify::{Notifier, RowRejected, UnexpectedColumn};

/// Sibling lookup over the raw cells of one row.
struct RowLookup<'a> {
    descriptor: &'a EntityDescriptor,
    row: &'a Row,
}

impl MemberLookup for RowLookup<'_> {
    fn lookup(&self, member: &str) -> Option<Value> {
        let member = self.descriptor.member(member)?;
        self.row.get(&member.source_name).cloned()
    }
}

/// Maps the rows of one call.
pub(crate) struct RowMapper<'a> {
    resolver: &'a DescriptorResolver,
    notifier: &'a Notifier,
    context: &'a CallContext,
    strict: bool,
    discriminator: Option<&'a str>,
    reported: RefCell<FxHashSet<(String, String)>>,
}

impl<'a> RowMapper<'a> {
    pub(crate) fn new(
        resolver: &'a DescriptorResolver,
        notifier: &'a Notifier,
        context: &'a CallContext,
        strict: bool,
    ) -> Self {
        Self {
            resolver,
            notifier,
            context,
            strict,
            discriminator: None,
            reported: RefCell::new(FxHashSet::default()),
        }
    }

    /// Treat `column` as a discriminator: never reported as unexpected.
    pub(crate) fn with_discriminator(mut self, column: &'a str) -> Self {
        self.discriminator = Some(column);
        self
    }

    /// Map one row into a `T`.
    pub(crate) fn map_entity<T: Entity>(&self, row: &Row, index: usize) -> Result<T> {
        let descriptor = self.resolver.entity::<T>()?;
        self.populate(&descriptor, row, index)
    }

    /// Map one row into the variant its discriminator selects.
    pub(crate) fn map_variant<G: GenSpec>(
        &self,
        registry: &VariantRegistry<G>,
        row: &Row,
        index: usize,
    ) -> Result<G> {
        let raw = self
            .discriminator
            .and_then(|column| row.get(column))
            .unwrap_or(&Value::Null);
        let variant = registry.select(raw).ok_or_else(|| {
            Error::mapping(
                index,
                format!(
                    "no variant of {} registered for discriminator {}",
                    registry.owner(),
                    describe(raw)
                ),
            )
        })?;
        variant.build(self, row, index)
    }

    fn populate<T: Entity>(&self, descriptor: &EntityDescriptor, row: &Row, index: usize) -> Result<T> {
        let mut cells = Vec::with_capacity(row.len());
        for (position, column) in row.columns().iter().enumerate() {
            match descriptor.member_for_column(column) {
                Some(member) => cells.push((member, position)),
                None if self.is_discriminator(column) => {}
                None => self.unexpected(descriptor, column, index)?,
            }
        }

        for member in descriptor.members().iter().filter(|m| m.required) {
            let present = cells
                .iter()
                .find(|(m, _)| m.name == member.name)
                .and_then(|(_, position)| row.get_index(*position))
                .map_or(false, |v| !v.is_null());
            if !present {
                return Err(Error::mapping(
                    index,
                    format!(
                        "required member '{}' of {} is missing from the row",
                        member.name,
                        descriptor.name()
                    ),
                ));
            }
        }

        let lookup = RowLookup { descriptor, row };
        let instance = InstanceKey::new(self.context.call_id(), index);
        let mut entity = T::default();
        for (member, position) in cells {
            let raw = row.get_index(position).cloned().unwrap_or(Value::Null);
            let value = match &member.transform {
                Some(transform) => {
                    let ctx = TransformContext {
                        owner: descriptor.name(),
                        member: &member.name,
                        call: Some(self.context),
                        siblings: &lookup,
                        instance,
                    };
                    transform
                        .from_source(raw, &ctx)
                        .map_err(|e| e.into_mapping(index, &member.name))?
                }
                None => raw,
            };
            entity
                .set_member(&member.name, value)
                .map_err(|e| e.into_mapping(index, &member.name))?;
        }
        Ok(entity)
    }

    fn is_discriminator(&self, column: &str) -> bool {
        self.discriminator
            .map_or(false, |d| d.eq_ignore_ascii_case(column))
    }

    fn unexpected(&self, descriptor: &EntityDescriptor, column: &str, index: usize) -> Result<()> {
        if self.strict {
            return Err(Error::UnmappedColumn {
                row: index,
                entity: descriptor.name().to_string(),
                column: column.to_string(),
            });
        }
        let key = (descriptor.name().to_string(), column.to_ascii_lowercase());
        if self.reported.borrow_mut().insert(key) {
            self.notifier.unexpected_column(&UnexpectedColumn {
                context: self.context,
                entity: descriptor.name(),
                column,
                row: index,
            });
        }
        Ok(())
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => format!("'{s}'"),
        other => match genspec::tag_candidates(other).first() {
            Some(tag) => tag.clone(),
            None => other.type_name().to_string(),
        },
    }
}

/// Map every row of `rows`.
///
/// A row that fails to map is skipped and reported. An unmapped column
/// under strict columns fails the call, as does any failure that is not
/// about the row itself (configuration, cancellation, backend).
pub(crate) fn collect_all<T>(
    rows: &mut dyn RowStream,
    mapper: &RowMapper<'_>,
    cancel: &CancellationToken,
    mut map: impl FnMut(&Row, usize) -> Result<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    let mut index = 0;
    loop {
        cancel.check()?;
        let Some(row) = rows.next_row()? else {
            break;
        };
        match map(&row, index) {
            Ok(value) => out.push(value),
            Err(error) if is_row_scoped(&error) => {
                mapper.notifier.row_rejected(&RowRejected {
                    context: mapper.context,
                    row: index,
                    error: &error,
                });
            }
            Err(error) => return Err(error),
        }
        index += 1;
    }
    Ok(out)
}

fn is_row_scoped(error: &Error) -> bool {
    error.kind() == ErrorKind::Mapping && !matches!(error, Error::UnmappedColumn { .. })
}

/// Map the first row of `rows`, then drain the rest. The token is
/// observed between drained rows too.
pub(crate) fn collect_first<T>(
    rows: &mut dyn RowStream,
    cancel: &CancellationToken,
    map: impl FnOnce(&Row, usize) -> Result<T>,
) -> Result<Option<T>> {
    cancel.check()?;
    let Some(row) = rows.next_row()? else {
        return Ok(None);
    };
    let value = map(&row, 0)?;
    loop {
        cancel.check()?;
        if rows.next_row()?.is_none() {
            break;
        }
    }
    Ok(Some(value))
}

/// Registry for `G`, built and validated on first use.
pub(crate) fn registry<G: GenSpec>(resolver: &DescriptorResolver) -> Result<std::sync::Arc<VariantRegistry<G>>> {
    resolver
        .cache()
        .get_or_try_insert::<G, VariantRegistry<G>, _>(|| {
            let registry = G::variants()?;
            registry.check(resolver)?;
            Ok(registry)
        })
}
