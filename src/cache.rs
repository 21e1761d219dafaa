//! Bounded memo for lookup tables.
//!
//! Entries are evicted least-recently-used once `capacity` is reached and,
//! when a TTL is configured, dropped on access after it elapses.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use lru::LruCache;

use crate::config::LookupCacheConfig;
use crate::fields::FieldMap;

/// Records keyed by one of their fields.
pub type Lookup = IndexMap<String, FieldMap>;

/// Identity of a lookup query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub entity_type: String,
    pub key_field: String,
    pub fields: Vec<String>,
    pub separator: Option<String>,
}

pub struct LookupCache {
    entries: Mutex<LruCache<LookupKey, (Instant, Arc<Lookup>)>>,
    ttl: Option<Duration>,
}

impl LookupCache {
    pub fn new(config: &LookupCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<LookupKey, (Instant, Arc<Lookup>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &LookupKey) -> Option<Arc<Lookup>> {
        let mut entries = self.lock();
        let (stored_at, lookup) = entries.get(key)?;
        if self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl) {
            entries.pop(key);
            return None;
        }
        Some(lookup.clone())
    }

    pub fn insert(&self, key: LookupKey, lookup: Arc<Lookup>) {
        self.lock().put(key, (Instant::now(), lookup));
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
