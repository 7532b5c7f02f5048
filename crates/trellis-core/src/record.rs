//! # Records
//!
//! The flat representation handed to record stores: a key plus an ordered
//! set of named properties. Property names encode the path of the value in
//! the object graph (`pilots[0].name`), so embedded values need no key of
//! their own.

use crate::Key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

/// A scalar the record store holds natively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreValue {
    /// Explicit absence marker.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Reference to another record.
    Key(Key),
}

impl StoreValue {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Key(_) => "key",
        }
    }
}

/// A stored value and whether the store should index it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub value: StoreValue,
    pub indexed: bool,
}

/// Properties ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySet(BTreeMap<String, Property>);

impl PropertySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property.
    pub fn insert(&mut self, name: impl Into<String>, value: StoreValue, indexed: bool) {
        self.0.insert(name.into(), Property { value, indexed });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StoreValue> {
        self.0.get(name).map(|p| &p.value)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Move every property of `other` into this set.
    pub fn merge(&mut self, other: PropertySet) {
        self.0.extend(other.0);
    }

    /// Whether any property lies below `path` (`path.x`, `path[i]`, `path$type`).
    #[must_use]
    pub fn has_descendants(&self, path: &str) -> bool {
        self.0
            .range::<str, _>((Bound::Excluded(path), Bound::Unbounded))
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(path))
            .any(|name| matches!(name.as_bytes().get(path.len()), Some(b'.' | b'[' | b'$')))
    }
}

/// One stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub properties: PropertySet,
}

impl Record {
    #[must_use]
    pub fn new(key: Key, properties: PropertySet) -> Self {
        Self { key, properties }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendants_match_only_path_separators() {
        let mut props = PropertySet::new();
        props.insert("pilots", StoreValue::Int(1), true);
        props.insert("pilots2", StoreValue::Int(1), true);
        props.insert("pilotsX.name", StoreValue::Null, true);
        assert!(!props.has_descendants("pilots"));

        props.insert("pilots[0].name", StoreValue::Text("bob".into()), true);
        assert!(props.has_descendants("pilots"));
        assert!(props.has_descendants("pilots[0]"));
        assert!(!props.has_descendants("pilots[1]"));
    }

    #[test]
    fn merge_keeps_name_order() {
        let mut a = PropertySet::new();
        a.insert("b", StoreValue::Bool(true), false);
        let mut b = PropertySet::new();
        b.insert("a", StoreValue::Int(3), true);
        a.merge(b);
        let names: Vec<_> = a.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
