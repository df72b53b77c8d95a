//! Concurrent inspection cache.
//!
//! A thin wrapper over a sharded concurrent map keyed by absolute file path.
//! All operations are safe without external locking; iteration may skip
//! entries inserted concurrently but never yields a key twice and never
//! fails; `len` is approximate under concurrent mutation. The producer
//! passed to [`InspectionCache::get_or_try_insert`] runs at most once per
//! absent key, under the key's shard lock, so concurrent lookups of the same
//! file share one inspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::model::ModuleData;

#[derive(Default)]
pub struct InspectionCache {
    map: DashMap<PathBuf, Arc<ModuleData>>,
}

impl InspectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &Path) -> Option<Arc<ModuleData>> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Return the cached record for `key`, or run `produce` and cache its
    /// result. `produce` runs at most once if the key was absent; its error
    /// is returned without caching anything.
    pub fn get_or_try_insert<E>(
        &self,
        key: PathBuf,
        produce: impl FnOnce() -> Result<ModuleData, E>,
    ) -> Result<Arc<ModuleData>, E> {
        match self.map.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let value = Arc::new(produce()?);
                entry.insert(value.clone());
                Ok(value)
            }
        }
    }

    /// Point-in-time copy of the cache contents.
    pub fn snapshot(&self) -> Vec<(PathBuf, Arc<ModuleData>)> {
        self.map.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }
}
