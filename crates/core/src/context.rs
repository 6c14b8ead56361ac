//! Call context: ambient state threaded through one call.
//!
//! A [`CallContext`] is built fresh for every call from the resolved call
//! target and the issuing session's scope. The session owns its
//! [`ContextData`]; each call context only holds a weak reference, so the
//! data survives across calls of one session while contexts do not keep it
//! alive on their own.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::value::Value;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique call id.
pub fn next_call_id() -> u64 {
    NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Kind of backend object a contract targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// A stored procedure (stored call)
    StoredProcedure,
    /// A view, read through a select
    View,
}

impl CallKind {
    /// Whether calls of this kind are read-only.
    pub fn is_read_only(self) -> bool {
        matches!(self, CallKind::View)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::StoredProcedure => f.write_str("stored procedure"),
            CallKind::View => f.write_str("view"),
        }
    }
}

/// Resolved backend object a call runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallTarget {
    /// Object name, prefix already applied
    pub name: String,
    /// Schema, explicit or the configured default
    pub schema: Option<String>,
    /// Object kind
    pub kind: CallKind,
}

impl CallTarget {
    /// Schema-qualified name, e.g. `dbo.usp_CreatePerson`.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Arbitrary key/value correlation data shared by every call of a session.
///
/// Nested and side calls observe and may mutate what earlier calls stored.
#[derive(Debug, Default)]
pub struct ContextData {
    entries: RwLock<HashMap<String, Value>>,
}

impl ContextData {
    /// Create empty context data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context data from initial entries.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Read an entry.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Store an entry, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.write().insert(key.into(), value)
    }

    /// Remove an entry.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of all entries.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.read().clone()
    }
}

/// Session-side inputs to call context construction.
#[derive(Debug, Clone, Copy)]
pub struct ContextScope<'a> {
    /// Logical connection name
    pub connection_name: Option<&'a str>,
    /// Session-owned context data
    pub context_data: &'a Arc<ContextData>,
    /// Transaction the call belongs to, if any
    pub transaction_id: Option<Uuid>,
}

/// Ambient metadata for one call.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: u64,
    connection_name: Option<String>,
    context_data: Weak<ContextData>,
    target: CallTarget,
    transaction_id: Option<Uuid>,
}

impl CallContext {
    /// Build the context for a call against `target`.
    ///
    /// Every session implementation, real or test double, goes through this
    /// constructor so contexts are populated identically.
    pub fn build(target: &CallTarget, scope: ContextScope<'_>) -> Self {
        Self {
            call_id: next_call_id(),
            connection_name: scope.connection_name.map(str::to_string),
            context_data: Arc::downgrade(scope.context_data),
            target: target.clone(),
            transaction_id: scope.transaction_id,
        }
    }

    /// Process-unique id of this call.
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    /// Logical connection name.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection_name.as_deref()
    }

    /// Shared context data, if the owning session is still alive.
    pub fn context_data(&self) -> Option<Arc<ContextData>> {
        self.context_data.upgrade()
    }

    /// Resolved target.
    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    /// Target schema.
    pub fn target_schema(&self) -> Option<&str> {
        self.target.schema.as_deref()
    }

    /// Target object name.
    pub fn target_object(&self) -> &str {
        &self.target.name
    }

    /// Target object kind.
    pub fn target_object_type(&self) -> CallKind {
        self.target.kind
    }

    /// Whether the call runs inside a transaction.
    pub fn is_in_transaction(&self) -> bool {
        self.transaction_id.is_some()
    }

    /// Transaction id shared by every call of one transaction.
    pub fn transaction_id(&self) -> Option<Uuid> {
        self.transaction_id
    }

    /// Whether the call is read-only (true for views).
    pub fn is_read_only(&self) -> bool {
        self.target.kind.is_read_only()
    }
}
