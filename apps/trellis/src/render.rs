//! # JSON Rendering
//!
//! Loaded object graphs and raw records as `serde_json` values.
//!
//! Objects render as maps of their fields plus `$type`, and `$key` when the
//! session knows one. An object reached a second time renders as a `$ref`
//! to its handle, so cycles terminate. Unactivated stubs carry
//! `"$activated": false` and only their key fields.

use serde_json::{Map, Value as Json};
use std::collections::BTreeSet;
use trellis_core::{ObjectRef, Record, RecordStore, Session, StoreError, TrellisError, Value};

/// Render the graph reachable from `object`.
pub fn render_object<S: RecordStore>(
    session: &Session<S>,
    object: ObjectRef,
) -> Result<Json, TrellisError> {
    let mut seen = BTreeSet::new();
    render(session, object, &mut seen)
}

/// Render a stored record with its properties.
pub fn render_record(record: &Record) -> Result<Json, TrellisError> {
    serde_json::to_value(record)
        .map_err(|e| TrellisError::Store(StoreError::Serialization(e.to_string())))
}

fn render<S: RecordStore>(
    session: &Session<S>,
    object: ObjectRef,
    seen: &mut BTreeSet<ObjectRef>,
) -> Result<Json, TrellisError> {
    let instance = session.object(object)?;
    let mut map = Map::new();
    map.insert("$type".into(), Json::from(instance.type_name()));
    if let Some(key) = session.associated_key(object) {
        map.insert("$key".into(), Json::from(key.to_string()));
    }
    if !seen.insert(object) {
        map.insert("$ref".into(), Json::from(object.to_string()));
        return Ok(Json::Object(map));
    }
    if !instance.is_activated() {
        map.insert("$activated".into(), Json::Bool(false));
    }
    for (name, value) in instance.fields() {
        map.insert(name.to_string(), render_value(session, value, seen)?);
    }
    Ok(Json::Object(map))
}

fn render_value<S: RecordStore>(
    session: &Session<S>,
    value: &Value,
    seen: &mut BTreeSet<ObjectRef>,
) -> Result<Json, TrellisError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Char(c) => Json::from(c.to_string()),
        Value::Text(s) | Value::Enum(s) => Json::from(s.as_str()),
        Value::Bytes(bytes) => Json::from(bytes.clone()),
        Value::Date(date) => Json::from(date.to_string()),
        Value::Timestamp(ts) => Json::from(ts.to_string()),
        Value::Object(object) => render(session, *object, seen)?,
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| render_value(session, item, seen))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}
