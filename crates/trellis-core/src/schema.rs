//! # Schema
//!
//! Type and field descriptors: the metadata the engine needs about each
//! persistent type. Descriptors are declared up front by the embedding
//! application; nothing is discovered at runtime.
//!
//! `FieldHints` carry the per-field configuration that strategies read
//! (transient, relationship kind, embedding, stored name, activation bound).

use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// FIELD TYPES
// =============================================================================

/// An enumeration type: a closed set of variant names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    #[must_use]
    pub fn new<V: Into<String>>(name: impl Into<String>, variants: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    Float64,
    Char,
    Text,
    Bytes,
    Date,
    Timestamp,
    Enum(EnumType),
    /// Another schema type, either embedded or referenced.
    Object(String),
    List(Box<FieldType>),
}

impl FieldType {
    #[must_use]
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object(type_name.into())
    }

    #[must_use]
    pub fn list(element: FieldType) -> Self {
        Self::List(Box::new(element))
    }

    /// The innermost non-list type.
    #[must_use]
    pub fn element(&self) -> &FieldType {
        match self {
            Self::List(inner) => inner.element(),
            other => other,
        }
    }

    /// The type name if the innermost type is an object type.
    #[must_use]
    pub fn object_type(&self) -> Option<&str> {
        match self.element() {
            Self::Object(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int32 => write!(f, "int32"),
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::Char => write!(f, "char"),
            Self::Text => write!(f, "text"),
            Self::Bytes => write!(f, "bytes"),
            Self::Date => write!(f, "date"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Enum(e) => write!(f, "enum {}", e.name()),
            Self::Object(name) => write!(f, "{name}"),
            Self::List(inner) => write!(f, "list<{inner}>"),
        }
    }
}

// =============================================================================
// FIELD HINTS
// =============================================================================

/// How a field referencing another entity relates to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// The referenced entity is the owner's parent in the key hierarchy.
    Parent,
    /// The referenced entity is stored under the owner's key.
    Child,
    /// The referenced entity has its own, unrelated key.
    Independent,
}

/// How an object-typed field is embedded in its owner's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedding {
    /// Flattened; the declared type is the runtime type.
    Plain,
    /// Flattened with a discriminator recording the runtime type.
    Polymorphic,
}

/// Declarative per-field configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldHints {
    pub transient: bool,
    pub indexed: Option<bool>,
    pub relationship: Option<Relationship>,
    /// The field holds the owner's own key name or id.
    pub key: bool,
    pub embed: Option<Embedding>,
    /// Stored property name, when different from the field name.
    pub name: Option<String>,
    /// Maximum activation depth below this field.
    pub activation: Option<u32>,
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// One field of a persistent type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    ty: FieldType,
    hints: FieldHints,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            hints: FieldHints::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    #[must_use]
    pub fn hints(&self) -> &FieldHints {
        &self.hints
    }

    #[must_use]
    pub fn transient(mut self) -> Self {
        self.hints.transient = true;
        self
    }

    #[must_use]
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.hints.indexed = Some(indexed);
        self
    }

    #[must_use]
    pub fn parent(mut self) -> Self {
        self.hints.relationship = Some(Relationship::Parent);
        self
    }

    #[must_use]
    pub fn child(mut self) -> Self {
        self.hints.relationship = Some(Relationship::Child);
        self
    }

    #[must_use]
    pub fn independent(mut self) -> Self {
        self.hints.relationship = Some(Relationship::Independent);
        self
    }

    #[must_use]
    pub fn key(mut self) -> Self {
        self.hints.key = true;
        self
    }

    #[must_use]
    pub fn embedded(mut self) -> Self {
        self.hints.embed = Some(Embedding::Plain);
        self
    }

    #[must_use]
    pub fn polymorphic(mut self) -> Self {
        self.hints.embed = Some(Embedding::Polymorphic);
        self
    }

    #[must_use]
    pub fn stored_as(mut self, name: impl Into<String>) -> Self {
        self.hints.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn activation(mut self, depth: u32) -> Self {
        self.hints.activation = Some(depth);
        self
    }
}

/// A persistent type: a name and its fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// Registry of persistent types.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, TypeDescriptor>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous descriptor with the same name.
    #[must_use]
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }
}
