//! JSON transform: structured value <-> JSON text.

use super::{Transform, TransformContext};
use crate::error::{Error, Result};
use crate::value::Value;

/// Stores a structured member as JSON text. `Null` passes through both ways.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransform;

impl Transform for JsonTransform {
    fn to_source(&self, value: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let json: serde_json::Value = value.into();
        serde_json::to_string(&json)
            .map(Value::String)
            .map_err(|e| Error::transform(ctx.member, format!("cannot serialize JSON: {e}")))
    }

    fn from_source(&self, raw: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        let parsed: serde_json::Value = match raw {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => serde_json::from_str(&s),
            Value::Bytes(b) => serde_json::from_slice(&b),
            other => {
                return Err(Error::transform(
                    ctx.member,
                    format!("cannot read JSON from {}", other.type_name()),
                ))
            }
        }
        .map_err(|e| Error::transform(ctx.member, format!("invalid JSON: {e}")))?;
        Ok(parsed.into())
    }
}
