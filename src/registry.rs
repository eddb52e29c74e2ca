//! Lookup-only registry of live caches by name.
//!
//! The registry never owns a cache: entries are weak, so a cache disappears from
//! lookups once its last `Arc` is dropped. Pass a registry to whoever needs to share
//! instances; there is no process-wide one.

use crate::cache::MemoryCache;
use crate::errors::CacheError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

pub struct CacheRegistry<K, V> {
    caches: RwLock<HashMap<String, Weak<MemoryCache<K, V>>>>,
}

impl<K, V> Default for CacheRegistry<K, V> {
    fn default() -> Self {
        Self { caches: RwLock::new(HashMap::new()) }
    }
}

impl<K, V> std::fmt::Debug for CacheRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry").field("entries", &self.caches.read().len()).finish()
    }
}

impl<K, V> CacheRegistry<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `cache` under its own name.
    ///
    /// # Errors
    /// Returns [`CacheError::NameTaken`] if a live cache is already registered under that name.
    pub fn register(&self, cache: &Arc<MemoryCache<K, V>>) -> Result<(), CacheError> {
        let mut caches = self.caches.write();
        let name = cache.name();
        if caches.get(name).is_some_and(|w| w.strong_count() > 0) {
            return Err(CacheError::NameTaken(name.to_string()));
        }
        caches.insert(name.to_string(), Arc::downgrade(cache));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<MemoryCache<K, V>>> {
        self.caches.read().get(name).and_then(Weak::upgrade)
    }

    /// Returns the live cache under `name`, or registers the one `make` builds.
    ///
    /// `make` runs without the registry lock held, so it may use the registry. If another
    /// caller registers `name` first, that cache wins and the freshly built one is dropped.
    pub fn get_or_create(
        &self,
        name: &str,
        make: impl FnOnce(&str) -> Arc<MemoryCache<K, V>>,
    ) -> Arc<MemoryCache<K, V>> {
        if let Some(live) = self.get(name) {
            return live;
        }
        let built = make(name);
        let mut caches = self.caches.write();
        if let Some(live) = caches.get(name).and_then(Weak::upgrade) {
            drop(caches);
            return live;
        }
        caches.insert(name.to_string(), Arc::downgrade(&built));
        built
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.caches.write().remove(name).is_some()
    }

    /// Names of live caches, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .caches
            .read()
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Drops entries whose cache is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut caches = self.caches.write();
        let before = caches.len();
        caches.retain(|_, w| w.strong_count() > 0);
        before - caches.len()
    }
}
