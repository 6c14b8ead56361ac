//! Enum transform.
//!
//! Incoming values resolve as follows:
//! - `Null`: allowed only for nullable enums
//! - an `Enum` of the same type: passed through unchanged
//! - an integer, or a string that parses as one: taken verbatim, including
//!   values no variant declares (they are kept as the literal number)
//! - any other string: matched against alternate names, then variant names,
//!   both case-insensitively; no match is an error

use serde::{Deserialize, Serialize};

use super::{Transform, TransformContext};
use crate::error::{Error, Result};
use crate::value::{EnumValue, Value};

/// How enum values are written to the datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumStorage {
    /// The underlying integer
    #[default]
    Value,
    /// The alternate name if declared, else the variant name
    Name,
}

/// One declared enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    /// Programmatic variant name
    pub name: String,
    /// Alternate datasource name
    pub alternate: Option<String>,
    /// Underlying integer value
    pub value: i64,
}

/// Declared shape of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    variants: Vec<EnumVariant>,
    nullable: bool,
}

impl EnumType {
    /// Start declaring an enum type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
            nullable: false,
        }
    }

    /// Declare a variant.
    pub fn variant(mut self, name: impl Into<String>, value: i64) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            alternate: None,
            value,
        });
        self
    }

    /// Declare a variant with an alternate datasource name.
    pub fn variant_with_alternate(
        mut self,
        name: impl Into<String>,
        alternate: impl Into<String>,
        value: i64,
    ) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            alternate: Some(alternate.into()),
            value,
        });
        self
    }

    /// Allow `Null`.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared variants.
    pub fn variants(&self) -> &[EnumVariant] {
        &self.variants
    }

    /// Whether `Null` is accepted.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Build a value of this type from an integer, naming it when it matches a variant.
    pub fn from_int(&self, value: i64) -> EnumValue {
        let name = self
            .variants
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.name.clone());
        EnumValue::new(self.name.clone(), value, name)
    }

    /// Build a value of this type from a variant or alternate name.
    pub fn from_name(&self, name: &str) -> Option<EnumValue> {
        let variant = self
            .variants
            .iter()
            .find(|v| {
                v.alternate
                    .as_deref()
                    .is_some_and(|alt| alt.eq_ignore_ascii_case(name))
            })
            .or_else(|| {
                self.variants
                    .iter()
                    .find(|v| v.name.eq_ignore_ascii_case(name))
            })?;
        Some(EnumValue::new(
            self.name.clone(),
            variant.value,
            Some(variant.name.clone()),
        ))
    }
}

/// Transform between [`Value::Enum`] and an integer or name on the datasource.
#[derive(Debug, Clone)]
pub struct EnumTransform {
    ty: EnumType,
    storage: EnumStorage,
}

impl EnumTransform {
    /// Transform for `ty`, stored by underlying value.
    pub fn new(ty: EnumType) -> Self {
        Self {
            ty,
            storage: EnumStorage::Value,
        }
    }

    /// Choose the datasource representation.
    pub fn with_storage(mut self, storage: EnumStorage) -> Self {
        self.storage = storage;
        self
    }

    /// The enum type.
    pub fn enum_type(&self) -> &EnumType {
        &self.ty
    }

    fn resolve(&self, raw: Value, member: &str) -> Result<Option<EnumValue>> {
        match raw {
            Value::Null if self.ty.nullable => Ok(None),
            Value::Null => Err(Error::transform(
                member,
                format!("null is not a valid {} value", self.ty.name),
            )),
            Value::Enum(e) if e.type_name() == self.ty.name => Ok(Some(e)),
            Value::Enum(e) => Err(Error::transform(
                member,
                format!(
                    "enum value of type {} cannot be used as {}",
                    e.type_name(),
                    self.ty.name
                ),
            )),
            Value::Int(i) => Ok(Some(self.ty.from_int(i))),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Some(self.ty.from_int(i)));
                }
                self.ty.from_name(s).map(Some).ok_or_else(|| {
                    Error::transform(
                        member,
                        format!("'{s}' is not a declared {} name", self.ty.name),
                    )
                })
            }
            other => Err(Error::transform(
                member,
                format!("cannot read {} from {}", self.ty.name, other.type_name()),
            )),
        }
    }
}

impl Transform for EnumTransform {
    fn to_source(&self, value: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        let Some(e) = self.resolve(value, ctx.member)? else {
            return Ok(Value::Null);
        };
        Ok(match self.storage {
            EnumStorage::Value => Value::Int(e.value()),
            EnumStorage::Name => {
                let declared = self.ty.variants.iter().find(|v| v.value == e.value());
                match declared {
                    Some(v) => Value::String(v.alternate.clone().unwrap_or_else(|| v.name.clone())),
                    None => Value::String(e.value().to_string()),
                }
            }
        })
    }

    fn from_source(&self, raw: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        Ok(self
            .resolve(raw, ctx.member)?
            .map(Value::Enum)
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{test_context, NoSiblings};

    fn test_enum() -> EnumType {
        EnumType::new("TestEnum")
            .variant("ValueA", 1)
            .variant_with_alternate("ValueX", "Value10", 10)
    }

    fn from_source(t: &EnumTransform, raw: Value) -> Result<Value> {
        t.from_source(raw, &test_context("Member", &NoSiblings))
    }

    fn to_source(t: &EnumTransform, value: Value) -> Result<Value> {
        t.to_source(value, &test_context("Member", &NoSiblings))
    }

    #[test]
    fn test_alternate_value_and_name_agree() {
        let t = EnumTransform::new(test_enum());
        let expected = from_source(&t, Value::Int(10)).unwrap();
        for raw in [
            Value::from("Value10"),
            Value::from("10"),
            Value::from("ValueX"),
            Value::from("value10"),
        ] {
            assert_eq!(from_source(&t, raw).unwrap(), expected);
        }
        assert_eq!(expected.as_enum().unwrap().name(), Some("ValueX"));
    }

    #[test]
    fn test_out_of_range_integers_are_kept_verbatim() {
        let t = EnumTransform::new(test_enum());
        for i in [0_i64, -10, 1000] {
            let v = from_source(&t, Value::Int(i)).unwrap();
            let e = v.as_enum().unwrap();
            assert_eq!(e.value(), i);
            assert_eq!(e.to_string(), i.to_string());
        }
    }

    #[test]
    fn test_null_rejected_unless_nullable() {
        let strict = EnumTransform::new(test_enum());
        assert!(matches!(
            from_source(&strict, Value::Null),
            Err(Error::Transform { .. })
        ));

        let lax = EnumTransform::new(test_enum().nullable());
        assert_eq!(from_source(&lax, Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_typed_value_passes_through() {
        let t = EnumTransform::new(test_enum());
        let typed = EnumValue::new("TestEnum", 1000, None);
        assert_eq!(
            from_source(&t, Value::Enum(typed.clone())).unwrap(),
            Value::Enum(typed)
        );
    }

    #[test]
    fn test_foreign_enum_rejected() {
        let t = EnumTransform::new(test_enum());
        let other = EnumValue::new("OtherEnum", 1, None);
        assert!(from_source(&t, Value::Enum(other)).is_err());
    }

    #[test]
    fn test_unknown_name_is_error() {
        let t = EnumTransform::new(test_enum());
        let err = from_source(&t, Value::from("ValueZ")).unwrap_err();
        assert!(err.to_string().contains("ValueZ"));
        assert!(from_source(&t, Value::Float(1.0)).is_err());
    }

    #[test]
    fn test_to_source_by_value() {
        let t = EnumTransform::new(test_enum());
        let v = from_source(&t, Value::from("ValueA")).unwrap();
        assert_eq!(to_source(&t, v).unwrap(), Value::Int(1));
        assert_eq!(to_source(&t, Value::from("Value10")).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_to_source_by_name_prefers_alternate() {
        let t = EnumTransform::new(test_enum()).with_storage(EnumStorage::Name);
        assert_eq!(to_source(&t, Value::Int(10)).unwrap(), Value::from("Value10"));
        assert_eq!(to_source(&t, Value::Int(1)).unwrap(), Value::from("ValueA"));
        assert_eq!(to_source(&t, Value::Int(77)).unwrap(), Value::from("77"));
    }

    #[test]
    fn test_name_round_trip() {
        let t = EnumTransform::new(test_enum()).with_storage(EnumStorage::Name);
        for v in [1_i64, 10, 42] {
            let original = Value::Enum(test_enum().from_int(v));
            let stored = to_source(&t, original.clone()).unwrap();
            assert_eq!(from_source(&t, stored).unwrap(), original);
        }
    }
}
