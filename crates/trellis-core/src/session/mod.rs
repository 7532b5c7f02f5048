//! # Session
//!
//! The store orchestrator. A session owns a heap of objects, the key cache
//! that maps them to records, and the key specifications and activation
//! state of the operation in progress. Every public operation runs to
//! completion before the next one starts; the per-operation state is
//! cleared when it returns, whether it succeeded or not.
//!
//! ## Identity
//!
//! Within one session a record is materialized at most once: loading a key
//! that is already cached returns the cached object, and references found
//! while decoding resolve to the same object. Independent sessions sharing
//! one store each hold their own objects.
//!
//! ## Write modes
//!
//! - `store` writes each entity as soon as its fields are translated
//! - `store_all` stages every entity reached and writes them with one
//!   `put_all` call
//! - `associate` translates without writing, only to learn keys
//!
//! ## Failure
//!
//! When an operation fails, cache entries it created for objects that were
//! not written are removed, so a retry starts clean. Records already written
//! by an immediate store stay written and stay cached.

mod decode;
mod encode;

use crate::activation::ActivationController;
use crate::codec::CodecChain;
use crate::config::Settings;
use crate::key_cache::{CachedKey, KeyCache};
use crate::keyspec::{ParentRef, SpecArena, SpecId};
use crate::model::{Heap, Object, ObjectRef};
use crate::record::PropertySet;
use crate::schema::Schema;
use crate::storage::RecordStore;
use crate::strategy::{HintStrategy, StrategySet};
use crate::translate::{FieldPlan, Plans};
use crate::{Key, KeyId, TrellisError, TxnId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type Result<T> = std::result::Result<T, TrellisError>;

// =============================================================================
// OPTIONS AND RESULTS
// =============================================================================

/// Caller-supplied key parts for `store_with`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub parent: Option<Key>,
    /// Key name or id, used when the object has no key field value.
    pub name: Option<KeyId>,
}

impl StoreOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn parent(mut self, parent: Key) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<KeyId>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Outcome of `store_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchKeys {
    inputs: Vec<ObjectRef>,
    /// Every entity written, including ones reached through references.
    written: Vec<(ObjectRef, Key)>,
}

impl BatchKeys {
    /// Keys of the requested objects, in request order.
    #[must_use]
    pub fn resolve(&self) -> Vec<(ObjectRef, Key)> {
        self.inputs
            .iter()
            .filter_map(|object| self.key_of(*object).map(|key| (*object, key.clone())))
            .collect()
    }

    #[must_use]
    pub fn key_of(&self, object: ObjectRef) -> Option<&Key> {
        self.written
            .iter()
            .find(|(written, _)| *written == object)
            .map(|(_, key)| key)
    }

    /// Every record the batch wrote.
    #[must_use]
    pub fn written(&self) -> &[(ObjectRef, Key)] {
        &self.written
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.written.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Write each record as soon as it is translated.
    Immediate,
    /// Resolve keys without writing.
    Associate,
    /// Stage records for one `put_all`.
    Batch,
}

/// A translated record waiting for its batch to be written.
#[derive(Debug)]
struct Pending {
    object: ObjectRef,
    spec: SpecId,
    properties: PropertySet,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Configures and builds a `Session`. All configuration errors surface in
/// `build`.
pub struct SessionBuilder<S: RecordStore> {
    store: Arc<S>,
    schema: Schema,
    strategies: Option<StrategySet>,
    codecs: CodecChain,
    settings: Settings,
}

impl<S: RecordStore> SessionBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            schema: Schema::new(),
            strategies: None,
            codecs: CodecChain::standard(),
            settings: Settings::default(),
        }
    }

    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Replace the default hint-reading strategy.
    #[must_use]
    pub fn strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = Some(strategies);
        self
    }

    #[must_use]
    pub fn codecs(mut self, codecs: CodecChain) -> Self {
        self.codecs = codecs;
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Session<S>> {
        let strategies = self.strategies.unwrap_or_else(|| {
            StrategySet::new(HintStrategy::new(self.settings.index_by_default))
        });
        let plans = Plans::build(&self.schema, &strategies, &self.codecs)?;
        debug!(
            types = plans.types().count(),
            depth = self.settings.depth_bound(),
            "session ready"
        );

        Ok(Session {
            store: self.store,
            plans: Arc::new(plans),
            strategies,
            codecs: self.codecs,
            heap: Heap::new(),
            cache: KeyCache::new(),
            specs: SpecArena::new(),
            activation: ActivationController::new(self.settings.depth_bound()),
            txn: None,
            pending: Vec::new(),
            journal: Vec::new(),
            txn_written: Vec::new(),
        })
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Maps objects to records in one record store.
pub struct Session<S: RecordStore> {
    store: Arc<S>,
    plans: Arc<Plans>,
    strategies: StrategySet,
    codecs: CodecChain,
    heap: Heap,
    cache: KeyCache,
    /// Keys under construction; cleared after every operation.
    specs: SpecArena,
    activation: ActivationController,
    txn: Option<TxnId>,
    pending: Vec<Pending>,
    /// Objects cached by the operation in progress.
    journal: Vec<ObjectRef>,
    /// Objects written inside the open transaction.
    txn_written: Vec<ObjectRef>,
}

impl<S: RecordStore> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("objects", &self.heap.len())
            .field("cached", &self.cache.len())
            .field("activation_depth", &self.activation.base())
            .field("txn", &self.txn)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore> Session<S> {
    pub fn builder(store: Arc<S>) -> SessionBuilder<S> {
        SessionBuilder::new(store)
    }

    /// The record store this session writes to.
    #[must_use]
    pub fn backend(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[must_use]
    pub fn key_cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Move a new object into the session.
    pub fn insert(&mut self, object: Object) -> ObjectRef {
        self.heap.insert(object)
    }

    pub fn object(&self, object: ObjectRef) -> Result<&Object> {
        self.heap
            .get(object)
            .ok_or(TrellisError::UnknownObject(object))
    }

    pub fn object_mut(&mut self, object: ObjectRef) -> Result<&mut Object> {
        self.heap
            .get_mut(object)
            .ok_or(TrellisError::UnknownObject(object))
    }

    /// The key a record of `type_name` with this id would have.
    pub fn key_for(
        &self,
        type_name: &str,
        id: impl Into<KeyId>,
        parent: Option<Key>,
    ) -> Result<Key> {
        let plan = self.plans.get(type_name)?;
        Ok(Key::new(plan.kind.clone(), id).with_optional_parent(parent))
    }

    // =========================================================================
    // STORING
    // =========================================================================

    /// Write an object and every entity it references that is not yet
    /// stored. Returns the object's key.
    pub fn store(&mut self, object: ObjectRef) -> Result<Key> {
        self.store_with(object, StoreOptions::default())
    }

    /// `store` with a caller-supplied parent and key name.
    pub fn store_with(&mut self, object: ObjectRef, options: StoreOptions) -> Result<Key> {
        self.ensure_unstored(object)?;
        let result = self
            .store_entity(
                object,
                WriteMode::Immediate,
                options.parent.map(ParentRef::Key),
                options.name,
            )
            .and_then(|spec| self.resolve_spec(spec, false));
        self.finish(result, true)
    }

    /// Write several objects and everything they reach with one `put_all`.
    /// Objects already reached earlier in the same batch are written once.
    pub fn store_all(&mut self, objects: &[ObjectRef], parent: Option<Key>) -> Result<BatchKeys> {
        let result = self.store_batch(objects, parent);
        self.finish(result, false)
    }

    fn store_batch(&mut self, objects: &[ObjectRef], parent: Option<Key>) -> Result<BatchKeys> {
        for &object in objects {
            self.object(object)?;
            match self.cache.cached_key(object) {
                Some(CachedKey::Complete(key)) => {
                    return Err(TrellisError::AlreadyStored(object, key.clone()));
                }
                Some(CachedKey::Provisional(_)) => {}
                None => {
                    self.store_entity(
                        object,
                        WriteMode::Batch,
                        parent.clone().map(ParentRef::Key),
                        None,
                    )?;
                }
            }
        }
        let written = self.flush()?;
        debug!(requested = objects.len(), written = written.len(), "stored batch");
        Ok(BatchKeys {
            inputs: objects.to_vec(),
            written,
        })
    }

    /// Rewrite the record of an object that is already stored. Referenced
    /// entities that are not yet stored are written too.
    pub fn update(&mut self, object: ObjectRef) -> Result<Key> {
        let key = self
            .cache
            .complete_key(object)
            .cloned()
            .ok_or(TrellisError::NotAssociated(object))?;
        if !self.object(object)?.is_activated() {
            return Err(TrellisError::NotActivated(object));
        }
        let result = self.update_entity(object, key);
        self.finish(result, true)
    }

    /// `update` if the object has a key, `store` otherwise.
    pub fn store_or_update(&mut self, object: ObjectRef) -> Result<Key> {
        if self.cache.complete_key(object).is_some() {
            self.update(object)
        } else {
            self.store(object)
        }
    }

    // =========================================================================
    // ASSOCIATION
    // =========================================================================

    /// Learn the key of an object that is already stored, from its key
    /// fields and parent, without writing. Referenced objects are associated
    /// too.
    ///
    /// If another object already holds the key, that object is returned and
    /// `object` stays unassociated.
    pub fn associate(&mut self, object: ObjectRef) -> Result<ObjectRef> {
        self.object(object)?;
        if self.cache.complete_key(object).is_some() {
            return Ok(object);
        }
        let result = self
            .store_entity(object, WriteMode::Associate, None, None)
            .and_then(|spec| self.resolve_spec(spec, true));
        let result = result.map(|key| self.cache.cached_object(&key).unwrap_or(object));
        self.finish(result, false)
    }

    /// Associate an object with an explicit, complete key.
    pub fn associate_with_key(&mut self, object: ObjectRef, key: Key) -> Result<ObjectRef> {
        self.object(object)?;
        if !key.is_complete() {
            return Err(TrellisError::IncompleteKey(key));
        }
        if let Some(existing) = self.cache.cached_object(&key) {
            return Ok(existing);
        }
        debug!(%object, %key, "associating");
        self.cache.cache(key, object);
        Ok(object)
    }

    /// Forget an object's key. Returns the key it had.
    pub fn disassociate(&mut self, object: ObjectRef) -> Option<Key> {
        match self.cache.evict_object(object) {
            Some(CachedKey::Complete(key)) => Some(key),
            _ => None,
        }
    }

    /// Forget every key.
    pub fn disassociate_all(&mut self) {
        debug!(cached = self.cache.len(), "disassociating all objects");
        self.cache.clear();
    }

    #[must_use]
    pub fn associated_key(&self, object: ObjectRef) -> Option<&Key> {
        self.cache.complete_key(object)
    }

    #[must_use]
    pub fn is_associated(&self, object: ObjectRef) -> bool {
        self.associated_key(object).is_some()
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Load the record under `key`. Referenced entities are loaded up to the
    /// activation depth; deeper ones become unactivated stubs.
    ///
    /// Returns the cached object if the key is already in the session.
    pub fn load_key(&mut self, key: &Key) -> Result<Option<ObjectRef>> {
        debug!(%key, depth = self.activation.base(), "loading");
        self.activation.reset();
        let result = self.fetch(key);
        self.finish(result, false)
    }

    /// Load a root record of `type_name` by id.
    pub fn load(
        &mut self,
        type_name: &str,
        id: impl Into<KeyId>,
        parent: Option<Key>,
    ) -> Result<Option<ObjectRef>> {
        let key = self.key_for(type_name, id, parent)?;
        self.load_key(&key)
    }

    /// `load`, failing if the record does not exist.
    pub fn require(
        &mut self,
        type_name: &str,
        id: impl Into<KeyId>,
        parent: Option<Key>,
    ) -> Result<ObjectRef> {
        let key = self.key_for(type_name, id, parent)?;
        self.load_key(&key)?.ok_or(TrellisError::NotFound(key))
    }

    /// Load several root records of one type with a single `get_all`.
    /// Missing ids are absent from the result. Objects the session holds
    /// only as stubs are populated in place.
    pub fn load_all<I>(&mut self, type_name: &str, ids: I) -> Result<BTreeMap<KeyId, ObjectRef>>
    where
        I: IntoIterator,
        I::Item: Into<KeyId>,
    {
        let kind = self.plans.get(type_name)?.kind.clone();
        let keys: Vec<Key> = ids
            .into_iter()
            .map(|id| Key::new(kind.clone(), id))
            .collect();
        let result = self.load_many(&keys);
        self.finish(result, false)
    }

    fn load_many(&mut self, keys: &[Key]) -> Result<BTreeMap<KeyId, ObjectRef>> {
        // Uncached keys, and keys cached only as stubs.
        let missing: Vec<Key> = keys
            .iter()
            .filter(|key| {
                self.cache.cached_object(key).is_none_or(|object| {
                    self.heap.get(object).is_some_and(|o| !o.is_activated())
                })
            })
            .cloned()
            .collect();
        let records = if missing.is_empty() {
            Vec::new()
        } else {
            self.store.get_all(self.txn, &missing)?
        };

        for record in records.into_iter().flatten() {
            self.activation.reset();
            match self.cache.cached_object(&record.key) {
                None => {
                    self.materialize(record, None)?;
                }
                // Stubbed earlier, in this batch or by a bounded load.
                Some(stub) if !self.object(stub)?.is_activated() => {
                    self.materialize(record, Some(stub))?;
                }
                Some(_) => {}
            }
        }

        Ok(keys
            .iter()
            .filter_map(|key| {
                let id = key.id()?.clone();
                self.cache.cached_object(key).map(|object| (id, object))
            })
            .collect())
    }

    /// Reload an associated object from its record, discarding local changes.
    pub fn refresh(&mut self, object: ObjectRef) -> Result<()> {
        let key = self
            .cache
            .complete_key(object)
            .cloned()
            .ok_or(TrellisError::NotAssociated(object))?;
        self.activation.reset();
        let result = self.reload(object, key, true);
        self.finish(result, false)
    }

    /// Populate an unactivated stub. Activated objects are left alone.
    pub fn activate(&mut self, object: ObjectRef) -> Result<()> {
        if self.object(object)?.is_activated() {
            return Ok(());
        }
        let key = self
            .cache
            .complete_key(object)
            .cloned()
            .ok_or(TrellisError::NotAssociated(object))?;
        self.activation.reset();
        let result = self.reload(object, key, false);
        self.finish(result, false)
    }

    pub fn is_activated(&self, object: ObjectRef) -> Result<bool> {
        Ok(self.object(object)?.is_activated())
    }

    fn reload(&mut self, object: ObjectRef, key: Key, refreshing: bool) -> Result<()> {
        match self.store.get(self.txn, &key)? {
            Some(record) => self.materialize(record, Some(object)).map(drop),
            None if refreshing => Err(TrellisError::RefreshNotFound(key)),
            None => Err(TrellisError::NotFound(key)),
        }
    }

    // =========================================================================
    // DELETING
    // =========================================================================

    /// Delete an associated object's record and forget its key.
    pub fn delete(&mut self, object: ObjectRef) -> Result<Key> {
        let mut keys = self.delete_all(&[object])?;
        keys.pop().ok_or(TrellisError::NotAssociated(object))
    }

    /// Delete several records with one store call.
    pub fn delete_all(&mut self, objects: &[ObjectRef]) -> Result<Vec<Key>> {
        let keys = objects
            .iter()
            .map(|&object| {
                self.cache
                    .complete_key(object)
                    .cloned()
                    .ok_or(TrellisError::NotAssociated(object))
            })
            .collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(keys);
        }
        self.store.delete(self.txn, &keys)?;
        for &object in objects {
            self.cache.evict_object(object);
        }
        debug!(records = keys.len(), "deleted");
        Ok(keys)
    }

    // =========================================================================
    // ACTIVATION DEPTH
    // =========================================================================

    /// Default activation depth for loads.
    #[must_use]
    pub fn activation_depth(&self) -> u32 {
        self.activation.base()
    }

    pub fn set_activation_depth(&mut self, depth: u32) {
        self.activation.set_base(depth);
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    pub fn begin_transaction(&mut self) -> Result<TxnId> {
        if self.txn.is_some() {
            return Err(TrellisError::TransactionActive);
        }
        let txn = self.store.begin_transaction()?;
        debug!(%txn, "transaction started");
        self.txn = Some(txn);
        Ok(txn)
    }

    /// Apply the open transaction. If the store refuses, objects written
    /// inside it lose their keys.
    pub fn commit(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(TrellisError::NoTransaction)?;
        let written = std::mem::take(&mut self.txn_written);
        if let Err(error) = self.store.commit(txn) {
            self.evict_all(&written);
            return Err(error.into());
        }
        debug!(%txn, written = written.len(), "transaction committed");
        Ok(())
    }

    /// Discard the open transaction. Objects written inside it lose their
    /// keys.
    pub fn rollback(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(TrellisError::NoTransaction)?;
        let written = std::mem::take(&mut self.txn_written);
        self.evict_all(&written);
        self.store.rollback(txn)?;
        debug!(%txn, evicted = written.len(), "transaction rolled back");
        Ok(())
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Root keys of the partition groups the open transaction has touched.
    pub fn transaction_groups(&self) -> Result<Vec<Key>> {
        let txn = self.txn.ok_or(TrellisError::NoTransaction)?;
        Ok(self.store.transaction_groups(txn)?)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn ensure_unstored(&self, object: ObjectRef) -> Result<()> {
        self.object(object)?;
        match self.cache.cached_key(object) {
            Some(CachedKey::Complete(key)) => {
                Err(TrellisError::AlreadyStored(object, key.clone()))
            }
            Some(CachedKey::Provisional(_)) => Err(TrellisError::InFlight(object)),
            None => Ok(()),
        }
    }

    fn resolve_spec(&mut self, spec: SpecId, associating: bool) -> Result<Key> {
        let store = &self.store;
        self.specs
            .resolve(spec, associating, &mut |key: &Key| store.allocate(key))
    }

    fn record_key(&mut self, spec: SpecId) -> Result<Key> {
        let store = &self.store;
        self.specs
            .record_key(spec, &mut |key: &Key| store.allocate(key))
    }

    /// Cache the key a record was written under.
    fn mark_written(&mut self, object: ObjectRef, key: Key) {
        self.cache.cache(key, object);
        if self.txn.is_some() {
            self.txn_written.push(object);
        }
    }

    fn evict_all(&mut self, objects: &[ObjectRef]) {
        for &object in objects {
            self.cache.evict_object(object);
        }
    }

    fn translation_error(
        &self,
        object: ObjectRef,
        field: &FieldPlan,
        reason: impl Into<String>,
    ) -> TrellisError {
        TrellisError::Translation {
            object,
            type_name: self
                .heap
                .get(object)
                .map(|o| o.type_name().to_string())
                .unwrap_or_default(),
            field: field.field.name().to_string(),
            reason: reason.into(),
        }
    }

    /// End an operation: clear per-operation state and, on failure, drop
    /// the cache entries it created. Written records keep their keys when
    /// `keep_written` is set.
    fn finish<T>(&mut self, result: Result<T>, keep_written: bool) -> Result<T> {
        let journal = std::mem::take(&mut self.journal);
        if let Err(error) = &result {
            debug!(%error, objects = journal.len(), "unwinding failed operation");
            for object in journal {
                let written = matches!(self.cache.cached_key(object), Some(CachedKey::Complete(_)));
                if !(written && keep_written) {
                    self.cache.evict_object(object);
                }
            }
            self.pending.clear();
        }
        self.specs.clear();
        self.activation.reset();
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::schema::{FieldDescriptor, FieldType, TypeDescriptor};
    use crate::storage::MemoryStore;
    use crate::StoreError;

    fn schema() -> Schema {
        Schema::new()
            .with_type(
                TypeDescriptor::new("Pilot")
                    .field(FieldDescriptor::new("name", FieldType::Text).key())
                    .field(FieldDescriptor::new("age", FieldType::Int32))
                    .field(FieldDescriptor::new("wingman", FieldType::object("Pilot"))),
            )
            .with_type(
                TypeDescriptor::new("Ship")
                    .field(FieldDescriptor::new("fleet", FieldType::object("Fleet")).parent())
                    .field(FieldDescriptor::new("class", FieldType::Text)),
            )
            .with_type(
                TypeDescriptor::new("Fleet")
                    .field(FieldDescriptor::new("name", FieldType::Text).key())
                    .field(
                        FieldDescriptor::new("flagship", FieldType::object("Ship")).child(),
                    ),
            )
    }

    fn session() -> (Arc<MemoryStore>, Session<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::builder(Arc::clone(&store))
            .schema(schema())
            .build()
            .expect("build");
        (store, session)
    }

    fn pilot(session: &mut Session<MemoryStore>, name: &str) -> ObjectRef {
        session.insert(Object::new("Pilot").with("name", name).with("age", 30i64))
    }

    #[test]
    fn store_uses_key_field_as_name() {
        let (store, mut session) = session();
        let bob = pilot(&mut session, "bob");
        let key = session.store(bob).expect("store");
        assert_eq!(key, Key::new("Pilot", "bob"));
        assert_eq!(session.associated_key(bob), Some(&key));
        assert_eq!(store.calls().put, 1);
    }

    #[test]
    fn storing_twice_is_rejected() {
        let (_, mut session) = session();
        let bob = pilot(&mut session, "bob");
        session.store(bob).expect("store");
        assert!(matches!(
            session.store(bob),
            Err(TrellisError::AlreadyStored(_, _))
        ));
    }

    #[test]
    fn mutual_references_store_once_each() {
        let (store, mut session) = session();
        let bob = pilot(&mut session, "bob");
        let amy = pilot(&mut session, "amy");
        session.object_mut(bob).expect("bob").set("wingman", amy);
        session.object_mut(amy).expect("amy").set("wingman", bob);

        session.store(bob).expect("store");
        assert_eq!(store.len().expect("len"), 2);
        assert!(session.is_associated(amy));
    }

    #[test]
    fn child_in_flight_parent_resolves() {
        let (_, mut session) = session();
        let ship = session.insert(Object::new("Ship").with("class", "frigate"));
        let fleet = session.insert(
            Object::new("Fleet")
                .with("name", "north")
                .with("flagship", ship),
        );
        session.object_mut(ship).expect("ship").set("fleet", fleet);

        session.store(fleet).expect("store");
        let ship_key = session.associated_key(ship).expect("ship key");
        assert_eq!(ship_key.parent(), Some(&Key::new("Fleet", "north")));
    }

    #[test]
    fn load_returns_the_cached_object() {
        let (store, mut session) = session();
        let bob = pilot(&mut session, "bob");
        session.store(bob).expect("store");

        let loaded = session.load("Pilot", "bob", None).expect("load");
        assert_eq!(loaded, Some(bob));
        assert_eq!(store.calls().get, 0);
    }

    #[test]
    fn failed_store_leaves_no_provisional_keys() {
        let store = Arc::new(MemoryStore::with_group_limit(1));
        let mut session = Session::builder(Arc::clone(&store))
            .schema(schema())
            .build()
            .expect("build");
        let bob = pilot(&mut session, "bob");
        let amy = pilot(&mut session, "amy");
        session.object_mut(bob).expect("bob").set("wingman", amy);

        session.begin_transaction().expect("begin");
        let result = session.store(bob);
        assert!(matches!(
            result,
            Err(TrellisError::Store(StoreError::TooManyGroups { .. }))
        ));
        // amy was written inside the transaction before bob failed
        assert!(session.is_associated(amy));
        assert!(!session.is_associated(bob));
        assert!(session.key_cache().cached_key(bob).is_none());

        session.rollback().expect("rollback");
        assert!(!session.is_associated(amy));
        assert!(store.is_empty().expect("len"));
    }

    #[test]
    fn transactions_do_not_nest() {
        let (_, mut session) = session();
        session.begin_transaction().expect("begin");
        assert!(matches!(
            session.begin_transaction(),
            Err(TrellisError::TransactionActive)
        ));
        session.commit().expect("commit");
        assert!(matches!(session.commit(), Err(TrellisError::NoTransaction)));
        assert!(matches!(session.rollback(), Err(TrellisError::NoTransaction)));
    }

    #[test]
    fn associate_learns_keys_without_writing() {
        let (store, mut session) = session();
        let bob = pilot(&mut session, "bob");
        let returned = session.associate(bob).expect("associate");
        assert_eq!(returned, bob);
        assert_eq!(session.associated_key(bob), Some(&Key::new("Pilot", "bob")));
        assert_eq!(store.calls().put, 0);

        let twin = pilot(&mut session, "bob");
        assert_eq!(session.associate(twin).expect("associate"), bob);
        assert!(!session.is_associated(twin));
    }

    #[test]
    fn associate_without_key_is_incomplete() {
        let (_, mut session) = session();
        let ship = session.insert(Object::new("Ship").with("class", "frigate"));
        assert!(matches!(
            session.associate(ship),
            Err(TrellisError::IncompleteKey(_))
        ));
        assert!(session.key_cache().is_empty());
    }

    #[test]
    fn delete_forgets_the_key() {
        let (store, mut session) = session();
        let bob = pilot(&mut session, "bob");
        let key = session.store(bob).expect("store");
        assert_eq!(session.delete(bob).expect("delete"), key);
        assert!(!session.is_associated(bob));
        assert!(store.is_empty().expect("len"));
        assert!(matches!(
            session.delete(bob),
            Err(TrellisError::NotAssociated(_))
        ));
    }

    #[test]
    fn update_rewrites_record() {
        let (store, mut session) = session();
        let bob = pilot(&mut session, "bob");
        let key = session.store(bob).expect("store");
        session.object_mut(bob).expect("bob").set("age", 31i64);
        assert_eq!(session.update(bob).expect("update"), key);

        let mut other = Session::builder(Arc::clone(&store))
            .schema(schema())
            .build()
            .expect("build");
        let loaded = other.require("Pilot", "bob", None).expect("load");
        assert_eq!(other.object(loaded).expect("bob").get("age"), &Value::Int(31));
    }
}
