//! Secure-value transform.
//!
//! A secure member is encrypted on its way to the datasource and decrypted
//! on its way back. The byte-level work is delegated to an injected
//! [`EncryptionProvider`], keyed by a data-classification string. Each
//! operation also needs an authenticator read from a sibling member of the
//! same instance.

use base64::Engine as _;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::{InstanceKey, Transform, TransformContext};
use crate::error::{Error, Result};
use crate::value::Value;

/// Byte-level encryption collaborator.
pub trait EncryptionProvider: Send + Sync {
    /// Encrypt `plaintext` for `classification`, bound to `authenticator`.
    fn encrypt(&self, plaintext: &[u8], authenticator: &[u8], classification: &str) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, ciphertext: &[u8], authenticator: &[u8], classification: &str) -> Result<Vec<u8>>;
}

/// Plaintext representation of a secure member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecureKind {
    /// UTF-8 text (`Value::String`)
    #[default]
    Text,
    /// Raw bytes (`Value::Bytes`)
    Bytes,
}

/// Declared secure-value metadata of a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureSpec {
    /// Sibling member holding the authenticator
    pub authenticator_member: String,
    /// Data classification handed to the provider
    pub classification: String,
    /// Plaintext representation
    pub kind: SecureKind,
}

/// Transform that encrypts through an [`EncryptionProvider`].
///
/// Built per engine. When the engine has no provider the transform still
/// exists but every non-null value fails with a configuration error.
pub struct SecureTransform {
    provider: Option<Arc<dyn EncryptionProvider>>,
    spec: SecureSpec,
    // Single slot, last write wins.
    authenticator: Mutex<Option<(InstanceKey, Arc<[u8]>)>>,
}

impl SecureTransform {
    /// Create a secure transform.
    pub fn new(provider: Option<Arc<dyn EncryptionProvider>>, spec: SecureSpec) -> Self {
        Self {
            provider,
            spec,
            authenticator: Mutex::new(None),
        }
    }

    /// Declared metadata.
    pub fn spec(&self) -> &SecureSpec {
        &self.spec
    }

    fn provider(&self) -> Result<&dyn EncryptionProvider> {
        self.provider.as_deref().ok_or_else(|| {
            Error::configuration(format!(
                "no encryption provider configured for classification '{}'",
                self.spec.classification
            ))
        })
    }

    fn authenticator(&self, ctx: &TransformContext<'_>) -> Result<Arc<[u8]>> {
        let mut slot = self.authenticator.lock();
        if let Some((key, bytes)) = slot.as_ref() {
            if *key == ctx.instance {
                return Ok(Arc::clone(bytes));
            }
        }

        let member = &self.spec.authenticator_member;
        let bytes: Arc<[u8]> = match ctx.siblings.lookup(member) {
            Some(Value::Bytes(b)) if !b.is_empty() => b.into(),
            Some(Value::String(s)) if !s.is_empty() => s.into_bytes().into(),
            Some(Value::Int(i)) => i.to_string().into_bytes().into(),
            _ => {
                return Err(Error::transform(
                    ctx.member,
                    format!("authenticator member '{member}' is missing or empty"),
                ))
            }
        };
        *slot = Some((ctx.instance, Arc::clone(&bytes)));
        Ok(bytes)
    }
}

impl fmt::Debug for SecureTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureTransform")
            .field("spec", &self.spec)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

impl Transform for SecureTransform {
    fn to_source(&self, value: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        let plaintext = match (self.spec.kind, value) {
            (_, Value::Null) => return Ok(Value::Null),
            (SecureKind::Text, Value::String(s)) => s.into_bytes(),
            (SecureKind::Bytes, Value::Bytes(b)) => b,
            (kind, other) => {
                return Err(Error::transform(
                    ctx.member,
                    format!("secure {kind:?} member cannot hold {}", other.type_name()),
                ))
            }
        };
        let provider = self.provider()?;
        let authenticator = self.authenticator(ctx)?;
        let ciphertext = provider.encrypt(&plaintext, &authenticator, &self.spec.classification)?;
        Ok(Value::Bytes(ciphertext))
    }

    fn from_source(&self, raw: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        let ciphertext = match raw {
            Value::Null => return Ok(Value::Null),
            Value::Bytes(b) => b,
            Value::String(s) => base64::engine::general_purpose::STANDARD
                .decode(s.trim())
                .map_err(|e| Error::transform(ctx.member, format!("invalid base64 ciphertext: {e}")))?,
            other => {
                return Err(Error::transform(
                    ctx.member,
                    format!("cannot read ciphertext from {}", other.type_name()),
                ))
            }
        };
        let provider = self.provider()?;
        let authenticator = self.authenticator(ctx)?;
        let plaintext = provider.decrypt(&ciphertext, &authenticator, &self.spec.classification)?;
        match self.spec.kind {
            SecureKind::Bytes => Ok(Value::Bytes(plaintext)),
            SecureKind::Text => String::from_utf8(plaintext)
                .map(Value::String)
                .map_err(|_| Error::transform(ctx.member, "decrypted value is not UTF-8")),
        }
    }
}
