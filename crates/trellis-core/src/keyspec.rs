//! # Key Specifications
//!
//! Keys under construction during one store operation. A specification starts
//! with its kind, picks up an identifier from a key field or a caller-supplied
//! name, and a parent either as a finished key or as another specification
//! that is itself still being built. Parent chains are resolved lazily, so a
//! child can be translated before its parent's key exists.
//!
//! The arena lives for one public session operation and is cleared after it.

use crate::{Key, KeyId, StoreResult, TrellisError};

/// Handle to a specification in a `SpecArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecId(u32);

/// Parent of a key under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    Key(Key),
    Spec(SpecId),
}

/// One key under construction.
#[derive(Debug, Clone)]
pub struct KeySpecification {
    kind: String,
    id: Option<KeyId>,
    parent: Option<ParentRef>,
    open: bool,
    settled: bool,
    assigned: Option<Key>,
}

impl KeySpecification {
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> Option<&KeyId> {
        self.id.as_ref()
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    /// Whether the owning object's fields are still being translated.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether the key and parent fields have been applied.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// The finished key, once allocated or written.
    #[must_use]
    pub fn assigned(&self) -> Option<&Key> {
        self.assigned.as_ref()
    }
}

/// Key source used when a specification has no identifier yet.
pub type Allocate<'a> = dyn FnMut(&Key) -> StoreResult<Key> + 'a;

/// Arena of specifications for one session operation.
#[derive(Debug, Clone, Default)]
pub struct SpecArena {
    specs: Vec<KeySpecification>,
}

impl SpecArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a specification; it stays open until `close`.
    pub fn open(
        &mut self,
        kind: impl Into<String>,
        parent: Option<ParentRef>,
        id: Option<KeyId>,
    ) -> SpecId {
        self.push(KeySpecification {
            kind: kind.into(),
            id,
            parent,
            open: true,
            settled: false,
            assigned: None,
        })
    }

    /// Start a specification for an object whose key is already known.
    pub fn open_assigned(&mut self, key: Key) -> SpecId {
        self.push(KeySpecification {
            kind: key.kind().to_string(),
            id: key.id().cloned(),
            parent: key.parent().cloned().map(ParentRef::Key),
            open: true,
            settled: true,
            assigned: Some(key),
        })
    }

    fn push(&mut self, spec: KeySpecification) -> SpecId {
        let id = SpecId(u32::try_from(self.specs.len()).unwrap_or(u32::MAX));
        self.specs.push(spec);
        id
    }

    #[must_use]
    pub fn get(&self, id: SpecId) -> Option<&KeySpecification> {
        self.specs.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: SpecId) -> Result<&mut KeySpecification, TrellisError> {
        self.specs
            .get_mut(id.0 as usize)
            .ok_or_else(|| TrellisError::Config(format!("unknown key specification {}", id.0)))
    }

    #[must_use]
    pub fn is_open(&self, id: SpecId) -> bool {
        self.get(id).is_some_and(KeySpecification::is_open)
    }

    /// Whether references may resolve `id`: it and every specification
    /// above it have their key fields applied.
    #[must_use]
    pub fn is_settled(&self, id: SpecId) -> bool {
        let mut current = Some(id);
        for _ in 0..=self.specs.len() {
            let Some(spec) = current.and_then(|id| self.get(id)) else {
                return current.is_none();
            };
            if !spec.settled {
                return false;
            }
            current = match spec.parent {
                Some(ParentRef::Spec(parent)) => Some(parent),
                _ => None,
            };
        }
        // Cyclic parents are reported when the key is resolved.
        true
    }

    /// Set the identifier. Once the key is assigned only the same
    /// identifier is accepted.
    pub fn set_id(&mut self, id: SpecId, key_id: KeyId) -> Result<(), TrellisError> {
        let spec = self.get_mut(id)?;
        match &spec.assigned {
            None => spec.id = Some(key_id),
            Some(key) if key.id() == Some(&key_id) => {}
            Some(key) => return Err(TrellisError::KeyAssigned(key.clone(), "id".into())),
        }
        Ok(())
    }

    /// Set the parent. Once the key is assigned only the same parent is
    /// accepted.
    pub fn set_parent(&mut self, id: SpecId, parent: ParentRef) -> Result<(), TrellisError> {
        let parent_key = match &parent {
            ParentRef::Key(key) => Some(key.clone()),
            ParentRef::Spec(spec) => self.get(*spec).and_then(|s| s.assigned.clone()),
        };
        let spec = self.get_mut(id)?;
        match &spec.assigned {
            None => spec.parent = Some(parent),
            Some(key) if parent_key.is_some() && key.parent() == parent_key.as_ref() => {}
            Some(key) => return Err(TrellisError::KeyAssigned(key.clone(), "parent".into())),
        }
        Ok(())
    }

    /// Mark the key and parent fields as applied.
    pub fn settle(&mut self, id: SpecId) -> Result<(), TrellisError> {
        self.get_mut(id)?.settled = true;
        Ok(())
    }

    /// Mark the owning object's translation as finished.
    pub fn close(&mut self, id: SpecId) -> Result<(), TrellisError> {
        let spec = self.get_mut(id)?;
        spec.open = false;
        spec.settled = true;
        Ok(())
    }

    /// Record the key the store gave the owning object.
    pub fn assign(&mut self, id: SpecId, key: Key) -> Result<(), TrellisError> {
        self.get_mut(id)?.assigned = Some(key);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.specs.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Finish the key of `id`, allocating identifiers for it and any
    /// unfinished ancestors. With `associating`, a missing identifier is an
    /// error instead.
    pub fn resolve(
        &mut self,
        id: SpecId,
        associating: bool,
        allocate: &mut Allocate<'_>,
    ) -> Result<Key, TrellisError> {
        self.resolve_within(id, associating, allocate, self.specs.len())
    }

    /// Finish only the ancestors of `id`.
    pub fn resolve_parent(
        &mut self,
        id: SpecId,
        allocate: &mut Allocate<'_>,
    ) -> Result<Option<Key>, TrellisError> {
        self.parent_key(id, false, allocate, self.specs.len())
    }

    /// The key to write the record of `id` under: complete ancestors, and
    /// the specification's own identifier if it has one. The store assigns
    /// the rest.
    pub fn record_key(
        &mut self,
        id: SpecId,
        allocate: &mut Allocate<'_>,
    ) -> Result<Key, TrellisError> {
        let budget = self.specs.len();
        if let Some(key) = self.get_mut(id)?.assigned.clone() {
            return Ok(key);
        }
        let parent = self.parent_key(id, false, allocate, budget)?;
        let spec = self.get_mut(id)?;
        Ok(Key::from_parts(spec.kind.clone(), spec.id.clone(), parent))
    }

    fn resolve_within(
        &mut self,
        id: SpecId,
        associating: bool,
        allocate: &mut Allocate<'_>,
        budget: usize,
    ) -> Result<Key, TrellisError> {
        if let Some(key) = self.get_mut(id)?.assigned.clone() {
            return Ok(key);
        }
        let parent = self.parent_key(id, associating, allocate, budget)?;
        let spec = self.get_mut(id)?;
        let key = Key::from_parts(spec.kind.clone(), spec.id.clone(), parent);
        let key = if key.is_complete() {
            key
        } else if associating {
            return Err(TrellisError::IncompleteKey(key));
        } else {
            allocate(&key)?
        };
        self.get_mut(id)?.assigned = Some(key.clone());
        Ok(key)
    }

    fn parent_key(
        &mut self,
        id: SpecId,
        associating: bool,
        allocate: &mut Allocate<'_>,
        budget: usize,
    ) -> Result<Option<Key>, TrellisError> {
        let spec = self.get_mut(id)?;
        match spec.parent.clone() {
            None => Ok(None),
            Some(ParentRef::Key(key)) => Ok(Some(key)),
            Some(ParentRef::Spec(parent)) => {
                let Some(budget) = budget.checked_sub(1) else {
                    return Err(TrellisError::CyclicKeyHierarchy(spec.kind.clone()));
                };
                self.resolve_within(parent, associating, allocate, budget)
                    .map(Some)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
