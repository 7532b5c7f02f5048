//! Object to record translation.
//!
//! Fields are translated in plan order, so key and parent fields shape the
//! owner's key specification before any reference to the owner can be
//! resolved. Entities reached through references are stored recursively in
//! the same write mode; embedded values are flattened into the owner's
//! properties under a path prefix.

use super::{Pending, Result, Session, WriteMode};
use crate::key_cache::CachedKey;
use crate::keyspec::{ParentRef, SpecId};
use crate::model::{ObjectRef, Value};
use crate::record::{PropertySet, Record, StoreValue};
use crate::storage::RecordStore;
use crate::translate::{FieldPlan, Translator, TypePlan, element_path, field_path, type_path};
use crate::{Key, KeyId, StoreError, TrellisError};
use std::sync::Arc;
use tracing::{debug, trace};

/// Embedded values enclosing the current position, innermost first.
struct Embedding<'a> {
    object: ObjectRef,
    outer: Option<&'a Embedding<'a>>,
}

impl Embedding<'_> {
    fn contains(&self, object: ObjectRef) -> bool {
        self.object == object || self.outer.is_some_and(|outer| outer.contains(object))
    }
}

/// Where a field value is being written.
#[derive(Clone, Copy)]
struct Scope<'a> {
    mode: WriteMode,
    /// Specification of the entity whose record receives the properties.
    spec: SpecId,
    /// Object whose fields are being read.
    object: ObjectRef,
    path: &'a str,
    indexed: bool,
    embedding: Option<&'a Embedding<'a>>,
}

impl<S: RecordStore> Session<S> {
    /// Translate one entity and write it, stage it, or only resolve its key,
    /// depending on `mode`.
    pub(super) fn store_entity(
        &mut self,
        object: ObjectRef,
        mode: WriteMode,
        parent: Option<ParentRef>,
        name: Option<KeyId>,
    ) -> Result<SpecId> {
        let plans = Arc::clone(&self.plans);
        let plan = plans.get(self.object(object)?.type_name())?;

        let spec = self.specs.open(plan.kind.clone(), parent, name);
        self.cache.cache_provisional(object, spec);
        self.journal.push(object);
        debug!(%object, kind = %plan.kind, ?mode, "storing entity");

        let mut properties = PropertySet::new();
        let scope = Scope {
            mode,
            spec,
            object,
            path: "",
            indexed: true,
            embedding: None,
        };
        self.encode_fields(plan, scope, &mut properties)?;
        self.specs.close(spec)?;

        match mode {
            WriteMode::Immediate => {
                let key = self.record_key(spec)?;
                let key = self.store.put(self.txn, Record::new(key, properties))?;
                self.specs.assign(spec, key.clone())?;
                self.mark_written(object, key);
            }
            WriteMode::Associate => {
                let key = self.resolve_spec(spec, true)?;
                match self.cache.cached_object(&key) {
                    Some(existing) if existing != object => {
                        self.cache.evict_object(object);
                    }
                    _ => self.cache.cache(key, object),
                }
            }
            WriteMode::Batch => self.pending.push(Pending {
                object,
                spec,
                properties,
            }),
        }
        Ok(spec)
    }

    /// Rewrite the record of an object whose key is known.
    pub(super) fn update_entity(&mut self, object: ObjectRef, key: Key) -> Result<Key> {
        let plans = Arc::clone(&self.plans);
        let plan = plans.get(self.object(object)?.type_name())?;

        let spec = self.specs.open_assigned(key.clone());
        let mut properties = PropertySet::new();
        let scope = Scope {
            mode: WriteMode::Immediate,
            spec,
            object,
            path: "",
            indexed: true,
            embedding: None,
        };
        self.encode_fields(plan, scope, &mut properties)?;
        self.specs.close(spec)?;

        debug!(%object, %key, "updating entity");
        Ok(self.store.put(self.txn, Record::new(key, properties))?)
    }

    /// Write every staged record with one `put_all`. Returns the written
    /// keys in staging order.
    pub(super) fn flush(&mut self) -> Result<Vec<(ObjectRef, Key)>> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        // Parents first: allocating them fixes every record key below.
        let store = &self.store;
        for staged in &pending {
            self.specs
                .resolve_parent(staged.spec, &mut |key: &Key| store.allocate(key))?;
        }

        let mut owners = Vec::with_capacity(pending.len());
        let mut records = Vec::with_capacity(pending.len());
        for staged in pending {
            records.push(Record::new(self.record_key(staged.spec)?, staged.properties));
            owners.push((staged.object, staged.spec));
        }

        debug!(records = records.len(), "writing batch");
        let keys = self.store.put_all(self.txn, records)?;
        if keys.len() != owners.len() {
            return Err(StoreError::Corrupt(format!(
                "batch of {} records returned {} keys",
                owners.len(),
                keys.len()
            ))
            .into());
        }

        let mut written = Vec::with_capacity(keys.len());
        for ((object, spec), key) in owners.into_iter().zip(keys) {
            self.specs.assign(spec, key.clone())?;
            self.mark_written(object, key.clone());
            written.push((object, key));
        }
        Ok(written)
    }

    fn encode_fields(
        &mut self,
        plan: &TypePlan,
        scope: Scope<'_>,
        properties: &mut PropertySet,
    ) -> Result<()> {
        // Key and parent fields come first; once past them, references
        // back to this entity may resolve its key.
        let entity = scope.embedding.is_none();
        for field in &plan.fields {
            if entity && !field.translator.shapes_key() {
                self.specs.settle(scope.spec)?;
            }
            if field.translator == Translator::Null {
                continue;
            }
            let value = self.object(scope.object)?.get(field.field.name()).clone();
            let path = field_path(scope.path, &field.name);
            trace!(object = %scope.object, field = %path, "encoding field");

            let inner = Scope {
                path: &path,
                indexed: scope.indexed && field.indexed,
                ..scope
            };
            self.encode_value(field, &field.translator, &value, inner, properties)?;
        }
        if entity {
            self.specs.settle(scope.spec)?;
        }
        Ok(())
    }

    fn encode_value(
        &mut self,
        field: &FieldPlan,
        translator: &Translator,
        value: &Value,
        scope: Scope<'_>,
        properties: &mut PropertySet,
    ) -> Result<()> {
        let path = scope.path;
        // Key-shaping fields only count on the entity itself.
        let owner = scope.embedding.is_none().then_some(scope.spec);

        match translator {
            Translator::Null => {}
            Translator::Key(_) => {
                if let Some(owner) = owner
                    && let Some(id) = self.key_id(field, value, scope.object)?
                {
                    self.specs.set_id(owner, id)?;
                }
            }
            Translator::Parent => {
                if let (Some(owner), Value::Object(target)) = (owner, value) {
                    let parent = self.parent_ref(*target, scope.mode)?;
                    self.specs.set_parent(owner, parent)?;
                }
            }
            _ if value.is_null() => properties.insert(path, StoreValue::Null, scope.indexed),
            Translator::Value(ty) => {
                let stored = self
                    .codecs
                    .encode(value, ty)
                    .map_err(|e| self.translation_error(scope.object, field, e.to_string()))?;
                properties.insert(path, stored, scope.indexed);
            }
            Translator::Independent | Translator::Child => {
                let target = self.target(field, value, scope.object)?;
                let child = *translator == Translator::Child;
                let key = self.reference_key(target, child, scope)?;
                properties.insert(path, StoreValue::Key(key), scope.indexed);
            }
            Translator::Embed(type_name) => {
                let target = self.target(field, value, scope.object)?;
                let actual = self.object(target)?.type_name();
                if actual != type_name {
                    let reason = format!("expected embedded {type_name}, found {actual}");
                    return Err(self.translation_error(scope.object, field, reason));
                }
                let before = properties.len();
                self.encode_embedded(field, target, type_name, scope, properties)?;
                if properties.len() == before {
                    properties.insert(path, StoreValue::Null, scope.indexed);
                }
            }
            Translator::Polymorphic => {
                let target = self.target(field, value, scope.object)?;
                let actual = self.object(target)?.type_name().to_string();
                properties.insert(type_path(path), StoreValue::Text(actual.clone()), scope.indexed);
                self.encode_embedded(field, target, &actual, scope, properties)?;
            }
            Translator::List(inner) => {
                let Value::List(items) = value else {
                    let reason = format!("expected list, found {}", value.variant_name());
                    return Err(self.translation_error(scope.object, field, reason));
                };
                let len = i64::try_from(items.len())
                    .map_err(|_| self.translation_error(scope.object, field, "list too long"))?;
                properties.insert(path, StoreValue::Int(len), scope.indexed);
                for (index, item) in items.iter().enumerate() {
                    let element = element_path(path, index);
                    let scope = Scope {
                        path: &element,
                        ..scope
                    };
                    self.encode_value(field, inner, item, scope, properties)?;
                }
            }
        }
        Ok(())
    }

    fn encode_embedded(
        &mut self,
        field: &FieldPlan,
        target: ObjectRef,
        type_name: &str,
        scope: Scope<'_>,
        properties: &mut PropertySet,
    ) -> Result<()> {
        if scope.embedding.is_some_and(|e| e.contains(target)) || target == scope.object {
            return Err(self.translation_error(
                scope.object,
                field,
                "embedded value contains itself",
            ));
        }
        let plans = Arc::clone(&self.plans);
        let plan = plans.get(type_name)?;
        let link = Embedding {
            object: target,
            outer: scope.embedding,
        };
        let inner = Scope {
            object: target,
            embedding: Some(&link),
            ..scope
        };
        self.encode_fields(plan, inner, properties)
    }

    /// Key of a referenced entity, storing it first if the session has
    /// never seen it. A child that is not yet stored is stored under the
    /// current record's key.
    ///
    /// An entity whose key or parent fields are still being translated
    /// cannot be referenced: resolving it would fix its key without them.
    fn reference_key(&mut self, target: ObjectRef, child: bool, scope: Scope<'_>) -> Result<Key> {
        let associating = scope.mode == WriteMode::Associate;
        match self.cache.cached_key(target).cloned() {
            Some(CachedKey::Complete(key)) => Ok(key),
            Some(CachedKey::Provisional(spec)) => {
                if !self.specs.is_settled(spec) || (child && self.specs.is_open(spec)) {
                    return Err(TrellisError::InFlight(target));
                }
                self.resolve_spec(spec, associating)
            }
            None => {
                let parent = child.then_some(ParentRef::Spec(scope.spec));
                let spec = self.store_entity(target, scope.mode, parent, None)?;
                self.resolve_spec(spec, associating)
            }
        }
    }

    fn parent_ref(&mut self, target: ObjectRef, mode: WriteMode) -> Result<ParentRef> {
        match self.cache.cached_key(target).cloned() {
            Some(CachedKey::Complete(key)) => Ok(ParentRef::Key(key)),
            Some(CachedKey::Provisional(spec)) => Ok(ParentRef::Spec(spec)),
            None => Ok(ParentRef::Spec(
                self.store_entity(target, mode, None, None)?,
            )),
        }
    }

    fn target(&self, field: &FieldPlan, value: &Value, object: ObjectRef) -> Result<ObjectRef> {
        let target = value.as_object().ok_or_else(|| {
            let reason = format!("expected object, found {}", value.variant_name());
            self.translation_error(object, field, reason)
        })?;
        self.object(target)?;
        Ok(target)
    }

    fn key_id(&self, field: &FieldPlan, value: &Value, object: ObjectRef) -> Result<Option<KeyId>> {
        match value {
            Value::Null => Ok(None),
            Value::Text(name) if name.is_empty() => {
                Err(self.translation_error(object, field, "key names must not be empty"))
            }
            Value::Text(name) => Ok(Some(KeyId::Name(name.clone()))),
            Value::Int(id) => u64::try_from(*id)
                .ok()
                .filter(|id| *id > 0)
                .map(|id| Some(KeyId::Id(id)))
                .ok_or_else(|| self.translation_error(object, field, "key ids must be positive")),
            other => {
                let reason = format!("cannot use {} as a key", other.variant_name());
                Err(self.translation_error(object, field, reason))
            }
        }
    }
}
