//! # Object Model
//!
//! The in-memory side of the mapping: typed objects held in a session-owned
//! arena and addressed by `ObjectRef` handles.
//!
//! Identity is handle identity. Two objects with identical fields are still
//! different instances; a reference cycle is just two handles pointing at each
//! other, so no reference counting is involved.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;

static NULL: Value = Value::Null;

// =============================================================================
// OBJECT HANDLE
// =============================================================================

/// Handle to an object in a `Heap`. Equality is reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(u32);

impl ObjectRef {
    /// The arena slot this handle points to.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

// =============================================================================
// FIELD VALUES
// =============================================================================

/// A field value of an in-memory object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unset.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    /// Enumeration variant, by name.
    Enum(String),
    /// Embedded value or reference to another entity.
    Object(ObjectRef),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Self::Object(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
            Self::Enum(_) => "enum",
            Self::Object(_) => "object",
            Self::List(_) => "list",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

// =============================================================================
// OBJECT
// =============================================================================

/// A typed instance: a type name plus a map of field values.
///
/// Fields never set read as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: String,
    fields: BTreeMap<String, Value>,
    activated: bool,
}

impl Object {
    /// Create an empty, activated object of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            activated: true,
        }
    }

    /// Create an unpopulated stub of the given type.
    #[must_use]
    pub fn stub(type_name: impl Into<String>) -> Self {
        Self {
            activated: false,
            ..Self::new(type_name)
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read a field; unset fields read as `Value::Null`.
    #[must_use]
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Write a field. Writing `Value::Null` unsets it.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        match value.into() {
            Value::Null => {
                self.fields.remove(&field);
            }
            value => {
                self.fields.insert(field, value);
            }
        }
    }

    /// Iterate over set fields in field-name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether the object's fields have been populated from its record.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Reset to an empty object of the same type before it is repopulated.
    pub(crate) fn reset(&mut self) {
        self.fields.clear();
        self.activated = true;
    }
}

// =============================================================================
// HEAP
// =============================================================================

/// Arena owning the objects of one session.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an object into the arena and return its handle.
    pub fn insert(&mut self, object: Object) -> ObjectRef {
        // Handles are u32; a session never holds 4 billion objects.
        let index = u32::try_from(self.objects.len()).unwrap_or(u32::MAX);
        self.objects.push(object);
        ObjectRef(index)
    }

    #[must_use]
    pub fn get(&self, r: ObjectRef) -> Option<&Object> {
        self.objects.get(r.index())
    }

    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut Object> {
        self.objects.get_mut(r.index())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
