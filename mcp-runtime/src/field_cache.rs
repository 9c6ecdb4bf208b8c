//! Per-object field metadata cache.
//!
//! Entries are keyed by the exact (case-sensitive) object API name and hold
//! the typed describe fields behind an `Arc`, so every hit hands back the same
//! allocation. Capacity is bounded with LRU eviction; `invalidate`/`clear`
//! drop entries explicitly. Nothing expires on its own.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use sforce_core::fields::{FieldMetadata, fields_from_describe};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SalesforceError;
use crate::salesforce::SalesforceApi;

pub const DEFAULT_FIELD_CACHE_CAPACITY: usize = 256;

pub type CachedFields = Arc<Vec<FieldMetadata>>;

pub struct FieldCache {
    entries: Mutex<LruCache<String, CachedFields>>,
}

impl FieldCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached fields for `object_name`, running one describe on a miss.
    ///
    /// The lock is held across the describe, so concurrent misses on the same
    /// object wait for the first round trip instead of issuing their own.
    pub async fn get_fields(
        &self,
        api: &dyn SalesforceApi,
        object_name: &str,
    ) -> Result<CachedFields, SalesforceError> {
        let mut entries = self.entries.lock().await;
        if let Some(hit) = entries.get(object_name) {
            debug!(object_name, "field cache hit");
            return Ok(Arc::clone(hit));
        }

        debug!(object_name, "field cache miss, describing");
        let describe = api.describe(object_name).await?;
        let fields = fields_from_describe(&describe).map_err(|e| {
            SalesforceError::UnexpectedResponse(format!(
                "describe for {object_name} has malformed fields: {e}"
            ))
        })?;
        let fields = Arc::new(fields);
        if let Some((evicted, _)) = entries.push(object_name.to_string(), Arc::clone(&fields)) {
            if evicted != object_name {
                debug!(evicted = %evicted, "field cache evicted entry");
            }
        }
        Ok(fields)
    }

    /// Drop one object's entry. Returns whether it was cached.
    pub async fn invalidate(&self, object_name: &str) -> bool {
        self.entries.lock().await.pop(object_name).is_some()
    }

    /// Drop every entry. Returns how many were cached.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    #[cfg(test)]
    pub async fn contains(&self, object_name: &str) -> bool {
        self.entries.lock().await.contains(object_name)
    }
}

impl Default for FieldCache {
    fn default() -> Self {
        Self::new(DEFAULT_FIELD_CACHE_CAPACITY)
    }
}
