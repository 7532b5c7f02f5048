//! # Core Type Definitions
//!
//! This module contains the identifier and error types shared by every
//! Trellis component:
//! - Record identifiers (`Key`, `KeyId`)
//! - Transaction handles (`TxnId`)
//! - Error types (`TrellisError`, `StoreError`)
//!
//! ## Ordering Guarantees
//!
//! `Key` orders by parent, then kind, then identifier, so root keys sort
//! before any key that has a parent and siblings sort together.

use crate::model::ObjectRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// KEY IDENTIFIERS
// =============================================================================

/// The identifying component of a key: a numeric id or a name.
///
/// Numeric ids are assigned by the store; names are supplied by the caller
/// (usually through a key field on the instance).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyId {
    /// Store-assigned or caller-supplied numeric id. Never zero.
    Id(u64),
    /// Caller-supplied name.
    Name(String),
}

impl From<u64> for KeyId {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

// =============================================================================
// KEY
// =============================================================================

/// Identifies a record: kind, identifying component, optional parent.
///
/// A key without an identifying component is *incomplete*; the store assigns
/// one when the record is written or when an id is allocated explicitly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    parent: Option<Box<Key>>,
    kind: String,
    id: Option<KeyId>,
}

impl Key {
    /// Create a complete root key.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            id: Some(id.into()),
        }
    }

    /// Create an incomplete root key of the given kind.
    #[must_use]
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            id: None,
        }
    }

    /// Assemble a key from its components.
    #[must_use]
    pub fn from_parts(kind: impl Into<String>, id: Option<KeyId>, parent: Option<Key>) -> Self {
        Self {
            parent: parent.map(Box::new),
            kind: kind.into(),
            id,
        }
    }

    /// Place this key under `parent` in the key hierarchy.
    #[must_use]
    pub fn with_parent(mut self, parent: Key) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Place this key under an optional parent.
    #[must_use]
    pub fn with_optional_parent(self, parent: Option<Key>) -> Self {
        match parent {
            Some(parent) => self.with_parent(parent),
            None => self,
        }
    }

    /// Return a copy of this key with the identifying component set.
    #[must_use]
    pub fn completed(&self, id: impl Into<KeyId>) -> Self {
        Self {
            parent: self.parent.clone(),
            kind: self.kind.clone(),
            id: Some(id.into()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> Option<&KeyId> {
        self.id.as_ref()
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// A key is complete when it and every ancestor carry an identifier.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.id.is_some() && self.parent().is_none_or(Key::is_complete)
    }

    /// The root ancestor of this key, which names its partition group.
    #[must_use]
    pub fn root(&self) -> &Key {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent}/")?;
        }
        match &self.id {
            Some(id) => write!(f, "{}({id})", self.kind),
            None => write!(f, "{}(?)", self.kind),
        }
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Handle to a transaction opened on a record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by record stores.
///
/// The session never reinterprets these; they reach the caller wrapped in
/// `TrellisError::Store` with the original reason intact.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A record or key could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes failed validation.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The transaction touched more partition groups than the store allows.
    #[error("Transaction touched {touched} partition groups (limit {limit})")]
    TooManyGroups { limit: usize, touched: usize },

    /// The transaction handle is not open on this store.
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TxnId),

    /// The key cannot be used for this operation (e.g. incomplete parent).
    #[error("Invalid key: {0}")]
    InvalidKey(Key),

    /// A lock guarding the store was poisoned by a panicking thread.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a persistence session.
///
/// - No silent failures
/// - Use `Result<T, TrellisError>` for fallible operations
/// - Library code never panics; every failure is reported here
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Strategies disagree about how a field is persisted.
    #[error("Strategy conflict on {type_name}.{field}: {detail}")]
    StrategyConflict {
        type_name: String,
        field: String,
        detail: String,
    },

    /// No codec in the value chain handles a stored scalar field.
    #[error("No value codec for {type_name}.{field} of type {ty}")]
    NoCodec {
        type_name: String,
        field: String,
        ty: String,
    },

    /// Any other setup problem (duplicate kinds, unknown referenced types).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A type name has no descriptor in the schema.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A stored kind maps to no registered type.
    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    /// The handle does not refer to an object in this session's heap.
    #[error("Unknown object: {0}")]
    UnknownObject(ObjectRef),

    /// Store re-entered for an instance whose translation has not finished.
    #[error("Instance {0} is already being stored in this session")]
    InFlight(ObjectRef),

    /// Store called for an instance that already has a key.
    #[error("Instance {0} is already stored as {1}")]
    AlreadyStored(ObjectRef, Key),

    /// Parent references between keys under construction form a loop.
    #[error("Key hierarchy is cyclic at kind {0}")]
    CyclicKeyHierarchy(String),

    /// Associating requires keys that are already complete.
    #[error("Associated instance has incomplete key {0}")]
    IncompleteKey(Key),

    /// The instance has no key in this session.
    #[error("Instance {0} is not associated with this session")]
    NotAssociated(ObjectRef),

    /// Writing an unpopulated stub would erase its record.
    #[error("Instance {0} is not activated")]
    NotActivated(ObjectRef),

    /// A key field or parent disagrees with a key already assigned.
    #[error("Key {0} is already assigned; its {1} cannot change")]
    KeyAssigned(Key, String),

    /// A required record does not exist.
    #[error("Record not found: {0}")]
    NotFound(Key),

    /// The record behind a refreshed instance no longer exists.
    #[error("Record for refreshed instance no longer exists: {0}")]
    RefreshNotFound(Key),

    /// A field value could not be translated.
    #[error("Cannot translate {object} field {type_name}.{field}: {reason}")]
    Translation {
        object: ObjectRef,
        type_name: String,
        field: String,
        reason: String,
    },

    /// `begin_transaction` while a transaction is open.
    #[error("Already in active transaction")]
    TransactionActive,

    /// `commit`/`rollback` without an open transaction.
    #[error("No active transaction")]
    NoTransaction,

    /// Failure reported by the record store, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_completeness_follows_parents() {
        let parent = Key::incomplete("Fleet");
        let child = Key::new("Ship", 7u64).with_parent(parent.clone());
        assert!(!child.is_complete());

        let child = Key::new("Ship", 7u64).with_parent(parent.completed(1u64));
        assert!(child.is_complete());
    }

    #[test]
    fn key_root_is_partition_group() {
        let root = Key::new("Fleet", "north");
        let leaf = Key::new("Pilot", 3u64).with_parent(Key::new("Ship", 2u64).with_parent(root.clone()));
        assert_eq!(leaf.root(), &root);
    }

    #[test]
    fn key_display_is_path_like() {
        let key = Key::new("Ship", 2u64).with_parent(Key::new("Fleet", "north"));
        assert_eq!(key.to_string(), "Fleet(\"north\")/Ship(2)");
        assert_eq!(Key::incomplete("Ship").to_string(), "Ship(?)");
    }

    #[test]
    fn keys_sort_parent_first() {
        let a = Key::new("Fleet", 1u64);
        let child = Key::new("Ship", 1u64).with_parent(a.clone());
        let b = Key::new("Fleet", 2u64);
        let mut keys = vec![b.clone(), child.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, child]);
    }
}
