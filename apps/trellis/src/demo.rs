//! # Demonstration Schema
//!
//! Missions embed their pilots; each pilot references a rocket ship, and
//! ships escort one another, so the stored graph contains a cycle.

use trellis_core::{
    EnumType, FieldDescriptor, FieldType, Key, Object, RecordStore, Schema, Session, TrellisError,
    TypeDescriptor, Value,
};

/// Destinations a ship can be headed for.
pub const PLANETS: [&str; 4] = ["MERCURY", "VENUS", "MARS", "JUPITER"];

/// Name of the mission written by [`seed`].
pub const MISSION: &str = "conquest";

/// The schema every CLI session is built with.
#[must_use]
pub fn schema() -> Schema {
    Schema::new()
        .with_type(
            TypeDescriptor::new("Mission")
                .field(FieldDescriptor::new("name", FieldType::Text).key())
                .field(
                    FieldDescriptor::new("pilots", FieldType::list(FieldType::object("Pilot")))
                        .embedded(),
                ),
        )
        .with_type(
            TypeDescriptor::new("Pilot")
                .field(FieldDescriptor::new("name", FieldType::Text))
                .field(FieldDescriptor::new("ship", FieldType::object("RocketShip"))),
        )
        .with_type(
            TypeDescriptor::new("RocketShip")
                .field(FieldDescriptor::new("name", FieldType::Text).key())
                .field(FieldDescriptor::new(
                    "dest",
                    FieldType::Enum(EnumType::new("Planet", PLANETS)),
                ))
                .field(FieldDescriptor::new("escort", FieldType::object("RocketShip"))),
        )
}

/// Store the demonstration mission and return its key.
///
/// Running it again overwrites the same records, since every stored
/// entity is keyed by name.
pub fn seed<S: RecordStore>(session: &mut Session<S>) -> Result<Key, TrellisError> {
    let hawk = session.insert(
        Object::new("RocketShip")
            .with("name", "hawk")
            .with("dest", Value::Enum("MARS".into())),
    );
    let kite = session.insert(
        Object::new("RocketShip")
            .with("name", "kite")
            .with("dest", Value::Enum("VENUS".into()))
            .with("escort", hawk),
    );
    session.object_mut(hawk)?.set("escort", kite);

    let bob = session.insert(Object::new("Pilot").with("name", "bob").with("ship", hawk));
    let alice = session.insert(Object::new("Pilot").with("name", "alice").with("ship", kite));
    let mission = session.insert(
        Object::new("Mission")
            .with("name", MISSION)
            .with("pilots", vec![Value::Object(bob), Value::Object(alice)]),
    );
    session.store(mission)
}
