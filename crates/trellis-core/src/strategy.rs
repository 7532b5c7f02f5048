//! # Strategy Set
//!
//! Field classification: whether a field is stored, indexed, a reference to
//! another entity (and which kind), an embedded value, what it is called in
//! the record and how deep loads may recurse below it.
//!
//! Four traits cover the four concerns so each can be swapped alone;
//! `SplitStrategy` recombines independent implementations. `StrategySet`
//! holds one or more combined strategies and turns disagreements between
//! them into configuration errors when the session is built.

use crate::TrellisError;
use crate::schema::{Embedding, FieldDescriptor, FieldType, Relationship, TypeDescriptor};

// =============================================================================
// STRATEGY TRAITS
// =============================================================================

/// Which fields are persisted and how.
pub trait StorageStrategy {
    fn store(&self, field: &FieldDescriptor) -> bool;
    fn index(&self, field: &FieldDescriptor) -> bool;
    /// The field references a separately stored entity.
    fn entity(&self, field: &FieldDescriptor) -> bool;
    fn embed(&self, field: &FieldDescriptor) -> bool;
    fn polymorphic(&self, field: &FieldDescriptor) -> bool;
}

/// How entity references relate to their owner's key.
pub trait RelationshipStrategy {
    fn parent(&self, field: &FieldDescriptor) -> bool;
    fn child(&self, field: &FieldDescriptor) -> bool;
    /// The field holds the owner's own key name or id.
    fn key(&self, field: &FieldDescriptor) -> bool;
}

/// Logical names and types.
pub trait FieldStrategy {
    fn name(&self, field: &FieldDescriptor) -> String;
    fn type_of(&self, field: &FieldDescriptor) -> FieldType;
    fn type_to_kind(&self, type_name: &str) -> String;
    fn kind_to_type(&self, kind: &str) -> String;
}

/// Lazy-load bounds.
pub trait ActivationStrategy {
    /// Activation depth to use below `field`, given `current` remaining levels.
    fn activation_depth(&self, field: &FieldDescriptor, current: u32) -> u32;
}

/// A strategy answering all four concerns.
pub trait CombinedStrategy:
    StorageStrategy + RelationshipStrategy + FieldStrategy + ActivationStrategy
{
}

impl<T> CombinedStrategy for T where
    T: StorageStrategy + RelationshipStrategy + FieldStrategy + ActivationStrategy
{
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Relationship of a field to other entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    None,
    Parent,
    Child,
    Independent,
    Key,
}

/// Every static answer the strategies give for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub stored: bool,
    pub indexed: bool,
    pub relationship: RelationshipKind,
    pub embed: Option<Embedding>,
    pub name: String,
    pub ty: FieldType,
}

impl Classification {
    fn of(strategy: &dyn CombinedStrategy, field: &FieldDescriptor) -> Self {
        let relationship = if strategy.entity(field) {
            if strategy.parent(field) {
                RelationshipKind::Parent
            } else if strategy.child(field) {
                RelationshipKind::Child
            } else {
                RelationshipKind::Independent
            }
        } else if strategy.key(field) {
            RelationshipKind::Key
        } else {
            RelationshipKind::None
        };

        let embed = if strategy.embed(field) {
            Some(if strategy.polymorphic(field) {
                Embedding::Polymorphic
            } else {
                Embedding::Plain
            })
        } else {
            None
        };

        Self {
            stored: strategy.store(field),
            indexed: strategy.index(field),
            relationship,
            embed,
            name: strategy.name(field),
            ty: strategy.type_of(field),
        }
    }

    /// Name the first aspect on which two classifications differ.
    fn difference(&self, other: &Self) -> Option<String> {
        if self.stored != other.stored {
            return Some(format!("stored {} vs {}", self.stored, other.stored));
        }
        if self.indexed != other.indexed {
            return Some(format!("indexed {} vs {}", self.indexed, other.indexed));
        }
        if self.relationship != other.relationship {
            return Some(format!(
                "relationship {:?} vs {:?}",
                self.relationship, other.relationship
            ));
        }
        if self.embed != other.embed {
            return Some(format!("embedding {:?} vs {:?}", self.embed, other.embed));
        }
        if self.name != other.name {
            return Some(format!("name {:?} vs {:?}", self.name, other.name));
        }
        if self.ty != other.ty {
            return Some(format!("type {} vs {}", self.ty, other.ty));
        }
        None
    }
}

// =============================================================================
// HINT STRATEGY
// =============================================================================

/// Default strategy: reads the `FieldHints` declared on each descriptor.
///
/// Object-typed fields that are neither embedded nor key fields are treated
/// as independent entity references.
#[derive(Debug, Clone, Copy)]
pub struct HintStrategy {
    index_by_default: bool,
}

impl HintStrategy {
    #[must_use]
    pub const fn new(index_by_default: bool) -> Self {
        Self { index_by_default }
    }
}

impl Default for HintStrategy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StorageStrategy for HintStrategy {
    fn store(&self, field: &FieldDescriptor) -> bool {
        !field.hints().transient
    }

    fn index(&self, field: &FieldDescriptor) -> bool {
        field.hints().indexed.unwrap_or(self.index_by_default)
    }

    fn entity(&self, field: &FieldDescriptor) -> bool {
        let hints = field.hints();
        hints.relationship.is_some()
            || (field.ty().object_type().is_some() && hints.embed.is_none() && !hints.key)
    }

    fn embed(&self, field: &FieldDescriptor) -> bool {
        field.hints().embed.is_some()
    }

    fn polymorphic(&self, field: &FieldDescriptor) -> bool {
        field.hints().embed == Some(Embedding::Polymorphic)
    }
}

impl RelationshipStrategy for HintStrategy {
    fn parent(&self, field: &FieldDescriptor) -> bool {
        field.hints().relationship == Some(Relationship::Parent)
    }

    fn child(&self, field: &FieldDescriptor) -> bool {
        field.hints().relationship == Some(Relationship::Child)
    }

    fn key(&self, field: &FieldDescriptor) -> bool {
        field.hints().key
    }
}

impl FieldStrategy for HintStrategy {
    fn name(&self, field: &FieldDescriptor) -> String {
        field
            .hints()
            .name
            .clone()
            .unwrap_or_else(|| field.name().to_string())
    }

    fn type_of(&self, field: &FieldDescriptor) -> FieldType {
        field.ty().clone()
    }

    fn type_to_kind(&self, type_name: &str) -> String {
        type_name.to_string()
    }

    fn kind_to_type(&self, kind: &str) -> String {
        kind.to_string()
    }
}

impl ActivationStrategy for HintStrategy {
    fn activation_depth(&self, field: &FieldDescriptor, current: u32) -> u32 {
        field
            .hints()
            .activation
            .map_or(current, |bound| bound.min(current))
    }
}

// =============================================================================
// SPLIT STRATEGY
// =============================================================================

/// Combines four independently chosen strategies into one.
#[derive(Debug, Clone)]
pub struct SplitStrategy<S, R, F, A> {
    storage: S,
    relationship: R,
    field: F,
    activation: A,
}

impl<S, R, F, A> SplitStrategy<S, R, F, A>
where
    S: StorageStrategy,
    R: RelationshipStrategy,
    F: FieldStrategy,
    A: ActivationStrategy,
{
    pub fn new(storage: S, relationship: R, field: F, activation: A) -> Self {
        Self {
            storage,
            relationship,
            field,
            activation,
        }
    }
}

impl<S: StorageStrategy, R, F, A> StorageStrategy for SplitStrategy<S, R, F, A> {
    fn store(&self, field: &FieldDescriptor) -> bool {
        self.storage.store(field)
    }

    fn index(&self, field: &FieldDescriptor) -> bool {
        self.storage.index(field)
    }

    fn entity(&self, field: &FieldDescriptor) -> bool {
        self.storage.entity(field)
    }

    fn embed(&self, field: &FieldDescriptor) -> bool {
        self.storage.embed(field)
    }

    fn polymorphic(&self, field: &FieldDescriptor) -> bool {
        self.storage.polymorphic(field)
    }
}

impl<S, R: RelationshipStrategy, F, A> RelationshipStrategy for SplitStrategy<S, R, F, A> {
    fn parent(&self, field: &FieldDescriptor) -> bool {
        self.relationship.parent(field)
    }

    fn child(&self, field: &FieldDescriptor) -> bool {
        self.relationship.child(field)
    }

    fn key(&self, field: &FieldDescriptor) -> bool {
        self.relationship.key(field)
    }
}

impl<S, R, F: FieldStrategy, A> FieldStrategy for SplitStrategy<S, R, F, A> {
    fn name(&self, field: &FieldDescriptor) -> String {
        self.field.name(field)
    }

    fn type_of(&self, field: &FieldDescriptor) -> FieldType {
        self.field.type_of(field)
    }

    fn type_to_kind(&self, type_name: &str) -> String {
        self.field.type_to_kind(type_name)
    }

    fn kind_to_type(&self, kind: &str) -> String {
        self.field.kind_to_type(kind)
    }
}

impl<S, R, F, A: ActivationStrategy> ActivationStrategy for SplitStrategy<S, R, F, A> {
    fn activation_depth(&self, field: &FieldDescriptor, current: u32) -> u32 {
        self.activation.activation_depth(field, current)
    }
}

// =============================================================================
// STRATEGY SET
// =============================================================================

type Member = Box<dyn CombinedStrategy + Send + Sync>;

/// The strategies a session consults. All members must agree.
pub struct StrategySet {
    members: Vec<Member>,
}

impl std::fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategySet")
            .field("members", &self.members.len())
            .finish()
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::new(HintStrategy::default())
    }
}

impl StrategySet {
    pub fn new(strategy: impl CombinedStrategy + Send + Sync + 'static) -> Self {
        Self {
            members: vec![Box::new(strategy)],
        }
    }

    /// Add another strategy that must agree with the existing ones.
    #[must_use]
    pub fn with_member(mut self, strategy: impl CombinedStrategy + Send + Sync + 'static) -> Self {
        self.members.push(Box::new(strategy));
        self
    }

    /// Classify a field, failing if members disagree.
    pub fn classify(
        &self,
        owner: &TypeDescriptor,
        field: &FieldDescriptor,
    ) -> Result<Classification, TrellisError> {
        let mut members = self.members.iter();
        let first = members
            .next()
            .map(|m| Classification::of(m.as_ref(), field))
            .ok_or_else(|| TrellisError::Config("strategy set has no members".to_string()))?;

        for member in members {
            let other = Classification::of(member.as_ref(), field);
            if let Some(detail) = first.difference(&other) {
                return Err(TrellisError::StrategyConflict {
                    type_name: owner.name().to_string(),
                    field: field.name().to_string(),
                    detail,
                });
            }
        }
        Ok(first)
    }

    /// Kind for a type name, failing if members disagree.
    pub fn type_to_kind(&self, type_name: &str) -> Result<String, TrellisError> {
        self.agree(type_name, |m| m.type_to_kind(type_name))
    }

    /// Type name for a kind, failing if members disagree.
    pub fn kind_to_type(&self, kind: &str) -> Result<String, TrellisError> {
        self.agree(kind, |m| m.kind_to_type(kind))
    }

    /// The smallest bound any member allows below `field`.
    #[must_use]
    pub fn activation_depth(&self, field: &FieldDescriptor, current: u32) -> u32 {
        self.members
            .iter()
            .map(|m| m.activation_depth(field, current))
            .min()
            .unwrap_or(current)
    }

    fn agree(
        &self,
        subject: &str,
        answer: impl Fn(&Member) -> String,
    ) -> Result<String, TrellisError> {
        let mut answers = self.members.iter().map(answer);
        let first = answers
            .next()
            .ok_or_else(|| TrellisError::Config("strategy set has no members".to_string()))?;
        for other in answers {
            if other != first {
                return Err(TrellisError::Config(format!(
                    "strategies map {subject:?} to both {first:?} and {other:?}"
                )));
            }
        }
        Ok(first)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> TypeDescriptor {
        TypeDescriptor::new("Pilot")
    }

    #[test]
    fn object_fields_default_to_independent_references() {
        let set = StrategySet::default();
        let field = FieldDescriptor::new("ship", FieldType::object("RocketShip"));
        let class = set.classify(&owner(), &field).expect("classify");
        assert_eq!(class.relationship, RelationshipKind::Independent);
        assert_eq!(class.embed, None);
    }

    #[test]
    fn relationship_wins_over_embedding() {
        let set = StrategySet::default();
        let field = FieldDescriptor::new("ship", FieldType::object("RocketShip"))
            .embedded()
            .child();
        let class = set.classify(&owner(), &field).expect("classify");
        assert_eq!(class.relationship, RelationshipKind::Child);
        assert_eq!(class.embed, Some(Embedding::Plain));
    }

    #[test]
    fn disagreeing_members_are_a_conflict() {
        let set = StrategySet::new(HintStrategy::new(true)).with_member(HintStrategy::new(false));
        let field = FieldDescriptor::new("name", FieldType::Text);
        let result = set.classify(&owner(), &field);
        assert!(matches!(result, Err(TrellisError::StrategyConflict { .. })));
    }

    #[test]
    fn agreeing_members_classify() {
        let set = StrategySet::new(HintStrategy::new(true)).with_member(SplitStrategy::new(
            HintStrategy::new(true),
            HintStrategy::default(),
            HintStrategy::default(),
            HintStrategy::default(),
        ));
        let field = FieldDescriptor::new("name", FieldType::Text).indexed(false);
        let class = set.classify(&owner(), &field).expect("classify");
        assert!(!class.indexed);
        assert_eq!(class.name, "name");
    }

    #[test]
    fn activation_hint_never_raises_depth() {
        let strategy = HintStrategy::default();
        let field = FieldDescriptor::new("ship", FieldType::object("RocketShip")).activation(5);
        assert_eq!(strategy.activation_depth(&field, 2), 2);
        assert_eq!(strategy.activation_depth(&field, 9), 5);
    }
}
