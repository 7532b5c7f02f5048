//! # Translator Plans
//!
//! The per-type dispatch table used by the session's recursive engine. Each
//! schema type gets a `TypePlan` when the session is built: its kind and, for
//! every field, the stored property name, the index flag and the translator
//! chosen from the strategy set's classification. Translation then walks the
//! plans and never consults strategies for static answers again.
//!
//! ## Translator selection
//!
//! 1. Not stored: `Null`
//! 2. Entity relationship: `Parent`, `Child`, otherwise `Independent`
//! 3. Key field: `Key`
//! 4. Embedded: `Polymorphic` or `Embed`
//! 5. Object-typed fields with no other classification: `Independent`
//! 6. Everything else: `Value`, which must have a codec
//!
//! List-typed fields wrap the chosen translator in `List` once per level.
//!
//! ## Property naming
//!
//! | Position              | Property name   |
//! |-----------------------|-----------------|
//! | field of embedded `a` | `a.b`           |
//! | list element          | `a[3]`          |
//! | list length           | `a` (`Int`)     |
//! | polymorphic type      | `a$type`        |
//! | absent value          | `a` (`Null`)    |

use crate::codec::CodecChain;
use crate::primitives::{PATH_SEPARATOR, TYPE_SUFFIX};
use crate::schema::{Embedding, FieldDescriptor, FieldType, Schema, TypeDescriptor};
use crate::strategy::{RelationshipKind, StrategySet};
use crate::TrellisError;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// TRANSLATORS
// =============================================================================

/// How one field is translated to and from properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translator {
    /// Not persisted.
    Null,
    /// Scalar through the codec chain.
    Value(FieldType),
    /// Flattened value of the named type.
    Embed(String),
    /// Flattened value whose runtime type is recorded alongside it.
    Polymorphic,
    /// The owner's parent in the key hierarchy; stored in the key itself.
    Parent,
    /// Entity stored under the owner's key.
    Child,
    /// Entity with its own key.
    Independent,
    /// The owner's own key name or id; stored in the key itself.
    Key(FieldType),
    /// Applies the inner translator per element.
    List(Box<Translator>),
}

impl Translator {
    /// Key-shaping translators run before all others.
    fn rank(&self) -> u8 {
        match self {
            Self::Key(_) | Self::Parent => 0,
            _ => 1,
        }
    }

    /// Whether the translator contributes to the owner's key.
    #[must_use]
    pub fn shapes_key(&self) -> bool {
        self.rank() == 0
    }

    /// Whether the translator writes properties under its own path.
    #[must_use]
    pub fn writes_properties(&self) -> bool {
        !matches!(self, Self::Null | Self::Key(_) | Self::Parent)
    }
}

/// One field of a `TypePlan`.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub field: FieldDescriptor,
    /// Stored property name.
    pub name: String,
    pub indexed: bool,
    pub translator: Translator,
}

/// Translation table for one schema type.
#[derive(Debug, Clone)]
pub struct TypePlan {
    pub type_name: String,
    pub kind: String,
    /// Key and parent fields first, then declaration order.
    pub fields: Vec<FieldPlan>,
}

// =============================================================================
// PLANS
// =============================================================================

/// Plans for every type of a schema, with the kind mapping.
#[derive(Debug, Clone, Default)]
pub struct Plans {
    types: BTreeMap<String, TypePlan>,
    kinds: BTreeMap<String, String>,
}

impl Plans {
    /// Classify every field of every type. All configuration errors
    /// surface here.
    pub fn build(
        schema: &Schema,
        strategies: &StrategySet,
        codecs: &CodecChain,
    ) -> Result<Self, TrellisError> {
        let mut plans = Self::default();

        for descriptor in schema.types() {
            let type_name = descriptor.name();
            let kind = strategies.type_to_kind(type_name)?;
            let back = strategies.kind_to_type(&kind)?;
            if back != type_name {
                return Err(TrellisError::Config(format!(
                    "kind {kind:?} of type {type_name} maps back to {back:?}"
                )));
            }
            if let Some(other) = plans.kinds.insert(kind.clone(), type_name.to_string()) {
                return Err(TrellisError::Config(format!(
                    "kind {kind:?} is used by both {other} and {type_name}"
                )));
            }

            let mut fields = Vec::with_capacity(descriptor.fields().len());
            let mut names = BTreeSet::new();
            for field in descriptor.fields() {
                let class = strategies.classify(descriptor, field)?;
                let translator = select(&class, descriptor, field, schema, codecs)?;
                if translator.writes_properties() && !names.insert(class.name.clone()) {
                    return Err(TrellisError::Config(format!(
                        "{type_name} stores two fields as {:?}",
                        class.name
                    )));
                }
                fields.push(FieldPlan {
                    field: field.clone(),
                    name: class.name,
                    indexed: class.indexed,
                    translator,
                });
            }
            fields.sort_by_key(|f| f.translator.rank());

            if fields.iter().filter(|f| f.translator == Translator::Parent).count() > 1 {
                return Err(TrellisError::Config(format!(
                    "{type_name} declares more than one parent field"
                )));
            }

            plans.types.insert(
                type_name.to_string(),
                TypePlan {
                    type_name: type_name.to_string(),
                    kind,
                    fields,
                },
            );
        }
        Ok(plans)
    }

    pub fn get(&self, type_name: &str) -> Result<&TypePlan, TrellisError> {
        self.types
            .get(type_name)
            .ok_or_else(|| TrellisError::UnknownType(type_name.to_string()))
    }

    pub fn for_kind(&self, kind: &str) -> Result<&TypePlan, TrellisError> {
        self.kinds
            .get(kind)
            .and_then(|type_name| self.types.get(type_name))
            .ok_or_else(|| TrellisError::UnknownKind(kind.to_string()))
    }

    pub fn types(&self) -> impl Iterator<Item = &TypePlan> {
        self.types.values()
    }
}

fn select(
    class: &crate::strategy::Classification,
    owner: &TypeDescriptor,
    field: &FieldDescriptor,
    schema: &Schema,
    codecs: &CodecChain,
) -> Result<Translator, TrellisError> {
    if !class.stored {
        return Ok(Translator::Null);
    }

    let config = |reason: &str| {
        TrellisError::Config(format!("{}.{}: {reason}", owner.name(), field.name()))
    };
    let is_list = matches!(class.ty, FieldType::List(_));
    let element = class.ty.element();
    let referenced = || match element {
        FieldType::Object(name) if schema.get(name).is_some() => Ok(name.clone()),
        FieldType::Object(name) => Err(config(&format!("references unknown type {name}"))),
        other => Err(config(&format!("{other} is not an object type"))),
    };

    let base = match class.relationship {
        RelationshipKind::Parent => {
            referenced()?;
            if is_list {
                return Err(config("a parent field cannot be a list"));
            }
            Translator::Parent
        }
        RelationshipKind::Child => {
            referenced()?;
            Translator::Child
        }
        RelationshipKind::Independent => {
            referenced()?;
            Translator::Independent
        }
        RelationshipKind::Key => {
            if is_list {
                return Err(config("a key field cannot be a list"));
            }
            match element {
                FieldType::Text | FieldType::Int32 | FieldType::Int64 => {
                    Translator::Key(element.clone())
                }
                other => return Err(config(&format!("{other} cannot hold a key"))),
            }
        }
        RelationshipKind::None => match (class.embed, element) {
            (Some(Embedding::Polymorphic), FieldType::Object(_)) => Translator::Polymorphic,
            (Some(Embedding::Plain), _) => Translator::Embed(referenced()?),
            (Some(Embedding::Polymorphic), other) => {
                return Err(config(&format!("{other} cannot be embedded")));
            }
            (None, FieldType::Object(_)) => {
                referenced()?;
                Translator::Independent
            }
            (None, ty) if codecs.supports(ty) => Translator::Value(ty.clone()),
            (None, ty) => {
                return Err(TrellisError::NoCodec {
                    type_name: owner.name().to_string(),
                    field: field.name().to_string(),
                    ty: ty.to_string(),
                });
            }
        },
    };
    Ok(wrap(&class.ty, base))
}

fn wrap(ty: &FieldType, base: Translator) -> Translator {
    match ty {
        FieldType::List(inner) => Translator::List(Box::new(wrap(inner, base))),
        _ => base,
    }
}

// =============================================================================
// PROPERTY PATHS
// =============================================================================

/// `prefix.name`, or `name` at the top level.
#[must_use]
pub fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{name}")
    }
}

/// `path[index]`.
#[must_use]
pub fn element_path(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

/// `path$type`.
#[must_use]
pub fn type_path(path: &str) -> String {
    format!("{path}{TYPE_SUFFIX}")
}

// =============================================================================
// TESTS
// =============================================================================
