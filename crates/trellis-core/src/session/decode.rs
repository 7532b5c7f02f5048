//! Record to object translation.
//!
//! A materialized object is cached under its key before its fields are
//! decoded, so references back to it (directly or around a cycle) resolve to
//! the same object. References are followed while the activation controller
//! has depth left; past that they become unactivated stubs that carry only
//! their key fields.

use super::{Result, Session};
use crate::model::{Object, ObjectRef, Value};
use crate::record::{Record, StoreValue};
use crate::schema::FieldType;
use crate::storage::RecordStore;
use crate::translate::{FieldPlan, Translator, TypePlan, element_path, field_path, type_path};
use crate::{Key, KeyId};
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl<S: RecordStore> Session<S> {
    /// The object for `key`: cached, or fetched and materialized.
    pub(super) fn fetch(&mut self, key: &Key) -> Result<Option<ObjectRef>> {
        if let Some(object) = self.cache.cached_object(key) {
            return Ok(Some(object));
        }
        match self.store.get(self.txn, key)? {
            Some(record) => self.materialize(record, None).map(Some),
            None => Ok(None),
        }
    }

    /// Decode a record into `into` (refresh, stub activation) or a new
    /// object.
    pub(super) fn materialize(&mut self, record: Record, into: Option<ObjectRef>) -> Result<ObjectRef> {
        let plans = Arc::clone(&self.plans);
        let plan = plans.for_kind(record.key.kind())?;

        let object = match into {
            Some(object) => {
                self.object_mut(object)?.reset();
                object
            }
            None => {
                let object = self.heap.insert(Object::new(plan.type_name.clone()));
                self.journal.push(object);
                object
            }
        };
        self.cache.cache(record.key.clone(), object);
        debug!(key = %record.key, %object, depth = self.activation.current(), "materializing");

        self.decode_fields(plan, &record, "", Some(&record.key), object)?;
        Ok(object)
    }

    fn decode_fields(
        &mut self,
        plan: &TypePlan,
        record: &Record,
        prefix: &str,
        key: Option<&Key>,
        object: ObjectRef,
    ) -> Result<()> {
        for field in &plan.fields {
            let path = field_path(prefix, &field.name);
            trace!(%object, field = %path, "decoding field");
            let value = self.decode_value(field, &field.translator, record, &path, key, object)?;
            self.object_mut(object)?.set(field.field.name(), value);
        }
        Ok(())
    }

    fn decode_value(
        &mut self,
        field: &FieldPlan,
        translator: &Translator,
        record: &Record,
        path: &str,
        key: Option<&Key>,
        object: ObjectRef,
    ) -> Result<Value> {
        let stored = record.properties.get(path);
        match translator {
            Translator::Null => Ok(Value::Null),
            Translator::Key(ty) => match key.and_then(Key::id) {
                Some(id) => self.key_value(field, ty, id, object),
                None => Ok(Value::Null),
            },
            Translator::Parent => match key.and_then(Key::parent) {
                Some(parent) => self.decode_reference(parent, field),
                None => Ok(Value::Null),
            },
            Translator::Value(ty) => match stored {
                None | Some(StoreValue::Null) => Ok(Value::Null),
                Some(stored) => self
                    .codecs
                    .decode(stored, ty)
                    .map_err(|e| self.translation_error(object, field, e.to_string())),
            },
            Translator::Independent | Translator::Child => match stored {
                None | Some(StoreValue::Null) => Ok(Value::Null),
                Some(StoreValue::Key(target)) => self.decode_reference(target, field),
                Some(other) => {
                    let reason = format!("expected key, found {}", other.variant_name());
                    Err(self.translation_error(object, field, reason))
                }
            },
            Translator::Embed(type_name) => {
                if record.properties.has_descendants(path) {
                    self.decode_embedded(type_name, record, path)
                } else {
                    Ok(Value::Null)
                }
            }
            Translator::Polymorphic => match record.properties.get(&type_path(path)) {
                None | Some(StoreValue::Null) => Ok(Value::Null),
                Some(StoreValue::Text(type_name)) => self.decode_embedded(type_name, record, path),
                Some(other) => {
                    let reason = format!("expected type name, found {}", other.variant_name());
                    Err(self.translation_error(object, field, reason))
                }
            },
            Translator::List(inner) => match stored {
                None | Some(StoreValue::Null) => Ok(Value::Null),
                Some(StoreValue::Int(len)) => {
                    let len = usize::try_from(*len)
                        .map_err(|_| self.translation_error(object, field, "negative list length"))?;
                    let mut items = Vec::with_capacity(len.min(record.properties.len()));
                    for index in 0..len {
                        let element = element_path(path, index);
                        items.push(self.decode_value(field, inner, record, &element, key, object)?);
                    }
                    Ok(Value::List(items))
                }
                Some(other) => {
                    let reason = format!("expected list length, found {}", other.variant_name());
                    Err(self.translation_error(object, field, reason))
                }
            },
        }
    }

    fn decode_embedded(&mut self, type_name: &str, record: &Record, path: &str) -> Result<Value> {
        let plans = Arc::clone(&self.plans);
        let plan = plans.get(type_name)?;
        let embedded = self.heap.insert(Object::new(plan.type_name.clone()));
        self.decode_fields(plan, record, path, None, embedded)?;
        Ok(Value::Object(embedded))
    }

    /// Follow a stored reference within the activation bound.
    fn decode_reference(&mut self, key: &Key, field: &FieldPlan) -> Result<Value> {
        if let Some(object) = self.cache.cached_object(key) {
            return Ok(Value::Object(object));
        }
        let current = self.activation.current();
        if current == 0 {
            return self.stub(key).map(Value::Object);
        }
        // A field bound of zero keeps the target unloaded.
        let bound = self.strategies.activation_depth(&field.field, current);
        if bound == 0 {
            return self.stub(key).map(Value::Object);
        }

        self.activation.enter(bound);
        let loaded = self.fetch(key);
        self.activation.leave();

        match loaded? {
            Some(object) => Ok(Value::Object(object)),
            None => {
                warn!(%key, field = %field.name, "dangling reference left unset");
                Ok(Value::Null)
            }
        }
    }

    /// An unactivated placeholder carrying only the key fields.
    fn stub(&mut self, key: &Key) -> Result<ObjectRef> {
        let plans = Arc::clone(&self.plans);
        let plan = plans.for_kind(key.kind())?;
        let stub = self.heap.insert(Object::stub(plan.type_name.clone()));
        self.journal.push(stub);

        if let Some(id) = key.id() {
            for field in &plan.fields {
                if let Translator::Key(ty) = &field.translator {
                    let value = self.key_value(field, ty, id, stub)?;
                    self.object_mut(stub)?.set(field.field.name(), value);
                }
            }
        }
        self.cache.cache(key.clone(), stub);
        trace!(%key, %stub, "stubbed reference");
        Ok(stub)
    }

    fn key_value(
        &self,
        field: &FieldPlan,
        ty: &FieldType,
        id: &KeyId,
        object: ObjectRef,
    ) -> Result<Value> {
        match (ty, id) {
            (FieldType::Text, KeyId::Name(name)) => Ok(Value::Text(name.clone())),
            (FieldType::Int64, KeyId::Id(id)) => i64::try_from(*id)
                .map(Value::Int)
                .map_err(|_| self.translation_error(object, field, "key id out of range")),
            (FieldType::Int32, KeyId::Id(id)) => i32::try_from(*id)
                .map(Value::from)
                .map_err(|_| self.translation_error(object, field, "key id out of range")),
            (ty, id) => {
                let reason = format!("key {id} does not fit a {ty} field");
                Err(self.translation_error(object, field, reason))
            }
        }
    }
}
