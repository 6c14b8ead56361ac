//! Type-keyed descriptor cache.
//!
//! Read-mostly. Two threads resolving the same type for the first time may
//! both build a descriptor; resolution is deterministic so whichever insert
//! lands first is kept and the other is dropped.

use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::Result;

type Entry = Arc<dyn Any + Send + Sync>;

/// Concurrent map from `(key type, value type)` to a shared value.
#[derive(Default)]
pub struct DescriptorCache {
    entries: DashMap<(TypeId, TypeId), Entry>,
}

impl DescriptorCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value of type `V` for key type `K`, if present.
    pub fn get<K: 'static, V: Send + Sync + 'static>(&self) -> Option<Arc<V>> {
        let key = (TypeId::of::<K>(), TypeId::of::<V>());
        let entry = self.entries.get(&key)?;
        Arc::clone(entry.value()).downcast::<V>().ok()
    }

    /// Cached value for `K`, building it with `build` on first use.
    ///
    /// Build failures are returned and not cached.
    pub fn get_or_try_insert<K, V, F>(&self, build: F) -> Result<Arc<V>>
    where
        K: 'static,
        V: Send + Sync + 'static,
        F: FnOnce() -> Result<V>,
    {
        if let Some(hit) = self.get::<K, V>() {
            return Ok(hit);
        }

        // Built outside the map lock: `build` may itself consult the cache.
        let built: Entry = Arc::new(build()?);
        let key = (TypeId::of::<K>(), TypeId::of::<V>());
        let stored = Arc::clone(self.entries.entry(key).or_insert(built).value());
        Ok(stored
            .downcast::<V>()
            .unwrap_or_else(|_| unreachable!("entry keyed by TypeId of V")))
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
