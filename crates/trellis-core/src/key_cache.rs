//! # Key Cache
//!
//! Bidirectional, identity-based map between heap objects and store keys.
//!
//! An object is cached *provisionally* (against the key specification being
//! built for it) before its fields are translated, and completed once the
//! store assigns its key. A back-reference met mid-translation therefore finds
//! the in-progress entry instead of starting a second translation.
//!
//! ## Invariants
//!
//! - At most one entry per object and at most one entry per key.
//! - Eviction removes both directions and never touches the object itself.

use crate::Key;
use crate::keyspec::SpecId;
use crate::model::ObjectRef;
use std::collections::BTreeMap;

/// What the cache knows about an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedKey {
    /// Stored or associated under this key.
    Complete(Key),
    /// Being stored; its key is still under construction.
    Provisional(SpecId),
}

/// Session-scoped identity cache.
#[derive(Debug, Clone, Default)]
pub struct KeyCache {
    by_object: BTreeMap<ObjectRef, CachedKey>,
    by_key: BTreeMap<Key, ObjectRef>,
}

impl KeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `object` under a complete key, replacing whatever either side
    /// was previously bound to.
    pub fn cache(&mut self, key: Key, object: ObjectRef) {
        self.evict_object(object);
        if let Some(previous) = self.by_key.remove(&key) {
            self.by_object.remove(&previous);
        }
        self.by_key.insert(key.clone(), object);
        self.by_object.insert(object, CachedKey::Complete(key));
    }

    /// Cache `object` as in flight under a key specification.
    pub fn cache_provisional(&mut self, object: ObjectRef, spec: SpecId) {
        self.evict_object(object);
        self.by_object.insert(object, CachedKey::Provisional(spec));
    }

    #[must_use]
    pub fn cached_key(&self, object: ObjectRef) -> Option<&CachedKey> {
        self.by_object.get(&object)
    }

    /// The complete key of `object`, if it has one.
    #[must_use]
    pub fn complete_key(&self, object: ObjectRef) -> Option<&Key> {
        match self.by_object.get(&object) {
            Some(CachedKey::Complete(key)) => Some(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn cached_object(&self, key: &Key) -> Option<ObjectRef> {
        self.by_key.get(key).copied()
    }

    /// Remove `object` and its key. Returns what was cached.
    pub fn evict_object(&mut self, object: ObjectRef) -> Option<CachedKey> {
        let entry = self.by_object.remove(&object)?;
        if let CachedKey::Complete(key) = &entry {
            self.by_key.remove(key);
        }
        Some(entry)
    }

    /// Remove `key` and its object. Returns the object that was cached.
    pub fn evict_key(&mut self, key: &Key) -> Option<ObjectRef> {
        let object = self.by_key.remove(key)?;
        self.by_object.remove(&object);
        Some(object)
    }

    pub fn clear(&mut self) {
        self.by_object.clear();
        self.by_key.clear();
    }

    /// Number of cached objects, provisional entries included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_object.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_object.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
