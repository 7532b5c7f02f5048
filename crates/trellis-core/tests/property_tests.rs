//! # Property-Based Tests
//!
//! Randomized object graphs checked against the engine's invariants:
//! faithful round trips, cycle-safe identity, single-write batches and
//! bounded activation.

use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;
use trellis_core::{
    FieldDescriptor, FieldType, MemoryStore, Object, ObjectRef, Schema, Session, TypeDescriptor,
    Value,
};

fn schema() -> Schema {
    Schema::new()
        .with_type(
            TypeDescriptor::new("Node")
                .field(FieldDescriptor::new("label", FieldType::Text))
                .field(FieldDescriptor::new("next", FieldType::object("Node"))),
        )
        .with_type(
            TypeDescriptor::new("Person")
                .field(FieldDescriptor::new("name", FieldType::Text).key())
                .field(FieldDescriptor::new("age", FieldType::Int32))
                .field(FieldDescriptor::new("height", FieldType::Float64))
                .field(FieldDescriptor::new("tags", FieldType::list(FieldType::Text)))
                .field(FieldDescriptor::new("photo", FieldType::Bytes)),
        )
}

fn open(store: &Arc<MemoryStore>) -> Session<MemoryStore> {
    Session::builder(Arc::clone(store))
        .schema(schema())
        .build()
        .expect("build session")
}

fn label(session: &Session<MemoryStore>, object: ObjectRef) -> Value {
    session.object(object).expect("object").get("label").clone()
}

fn next(session: &Session<MemoryStore>, object: ObjectRef) -> Option<ObjectRef> {
    session.object(object).expect("object").get("next").as_object()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Scalars and lists reload exactly as stored.
    #[test]
    fn scalar_fields_round_trip(
        name in "[a-z]{1,12}",
        age in any::<i32>(),
        height in -1.0e6f64..1.0e6,
        tags in vec("[ -~]{0,8}", 0..6),
        photo in vec(any::<u8>(), 0..32),
    ) {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let tags: Vec<Value> = tags.into_iter().map(Value::from).collect();
        let person = session.insert(
            Object::new("Person")
                .with("name", name.as_str())
                .with("age", age)
                .with("height", Value::Float(height))
                .with("tags", tags.clone())
                .with("photo", Value::Bytes(photo.clone())),
        );
        session.store(person).expect("store");

        let mut other = open(&store);
        let loaded = other.require("Person", name.as_str(), None).expect("load");
        let copy = other.object(loaded).expect("copy");
        prop_assert_eq!(copy.get("name"), &Value::from(name));
        prop_assert_eq!(copy.get("age"), &Value::from(age));
        prop_assert_eq!(copy.get("height"), &Value::Float(height));
        prop_assert_eq!(copy.get("tags"), &Value::List(tags));
        prop_assert_eq!(copy.get("photo"), &Value::Bytes(photo));
    }

    /// Any shape of `next` pointers, cycles included, reloads with the same
    /// shape and one object per record.
    #[test]
    fn arbitrary_reference_graphs_round_trip(
        targets in vec(proptest::option::of(0usize..8), 1..8),
    ) {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let count = targets.len();
        let nodes: Vec<ObjectRef> = (0..count)
            .map(|i| session.insert(Object::new("Node").with("label", format!("n{i}"))))
            .collect();
        for (i, target) in targets.iter().enumerate() {
            if let Some(target) = target {
                let target = nodes[target % count];
                session.object_mut(nodes[i]).expect("node").set("next", target);
            }
        }

        let batch = session.store_all(&nodes, None).expect("store_all");
        prop_assert_eq!(store.calls().put_all, 1);
        prop_assert_eq!(store.len().expect("len"), count);

        let keys: Vec<_> = batch.resolve().into_iter().map(|(_, key)| key).collect();
        let mut other = open(&store);
        for (i, key) in keys.iter().enumerate() {
            let loaded = other.load_key(key).expect("load").expect("present");
            prop_assert_eq!(label(&other, loaded), Value::from(format!("n{i}")));

            let expected = targets[i].map(|t| Value::from(format!("n{}", t % count)));
            let actual = next(&other, loaded).map(|n| label(&other, n));
            prop_assert_eq!(actual, expected);
        }
        prop_assert_eq!(other.key_cache().len(), count);
    }

    /// A chain loaded with depth `d` has exactly `d + 1` populated objects.
    #[test]
    fn activation_depth_bounds_population(len in 1usize..12, depth in 0u32..12) {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let nodes: Vec<ObjectRef> = (0..len)
            .map(|i| session.insert(Object::new("Node").with("label", format!("n{i}"))))
            .collect();
        for pair in nodes.windows(2) {
            session.object_mut(pair[0]).expect("node").set("next", pair[1]);
        }
        let key = session.store(nodes[0]).expect("store");

        let mut other = open(&store);
        other.set_activation_depth(depth);
        let mut current = other.load_key(&key).expect("load");
        let mut activated = 0usize;
        while let Some(object) = current {
            if !other.is_activated(object).expect("object") {
                break;
            }
            activated += 1;
            current = next(&other, object);
        }
        prop_assert_eq!(activated, len.min(depth as usize + 1));
    }
}
