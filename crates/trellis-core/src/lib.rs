//! # trellis-core
//!
//! The object-graph persistence engine for Trellis.
//!
//! This crate maps in-memory object graphs onto a flat, schemaless key/value
//! record store and back. It handles self-referential and mutually
//! referential graphs, lazy materialization bounded by an activation depth,
//! polymorphic embedded values and batched writes whose keys depend on one
//! another.
//!
//! ## Pipeline
//!
//! ```text
//! store:  Session -> TypePlan -> Translator (recursive) -> CodecChain -> PropertySet -> RecordStore
//! load:   RecordStore -> Record -> Translator (recursive, ActivationController) -> Heap
//! ```
//!
//! The `KeyCache` records object/key associations as they become known, so
//! every record is materialized at most once per session and a cycle in the
//! object graph never re-enters translation of an object already in flight.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: `BTreeMap` only, no hashing, no randomness
//! - Configuration errors surface when the session is built, never while
//!   translating
//! - Library code never panics; every failure is a `TrellisError`

// =============================================================================
// MODULES
// =============================================================================

pub mod activation;
pub mod codec;
pub mod config;
pub mod formats;
pub mod key_cache;
pub mod keyspec;
pub mod model;
pub mod primitives;
pub mod record;
pub mod schema;
pub mod session;
pub mod storage;
pub mod strategy;
pub mod translate;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Key, KeyId, StoreError, StoreResult, TrellisError, TxnId};

// =============================================================================
// RE-EXPORTS: Object Model and Schema
// =============================================================================

pub use model::{Heap, Object, ObjectRef, Value};
pub use record::{Property, PropertySet, Record, StoreValue};
pub use schema::{
    Embedding, EnumType, FieldDescriptor, FieldHints, FieldType, Relationship, Schema,
    TypeDescriptor,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use activation::ActivationController;
pub use codec::{CodecChain, CodecError, CoercingCodec, DirectCodec, EnumCodec, ValueCodec};
pub use config::Settings;
pub use key_cache::{CachedKey, KeyCache};
pub use keyspec::{KeySpecification, ParentRef, SpecArena, SpecId};
pub use session::{BatchKeys, Session, SessionBuilder, StoreOptions};
pub use strategy::{
    ActivationStrategy, Classification, CombinedStrategy, FieldStrategy, HintStrategy,
    RelationshipKind, RelationshipStrategy, SplitStrategy, StorageStrategy, StrategySet,
};
pub use translate::{FieldPlan, Plans, Translator, TypePlan};

// =============================================================================
// RE-EXPORTS: Storage and Formats
// =============================================================================

pub use formats::{PersistenceHeader, record_from_bytes, record_to_bytes};
pub use storage::{CallCounts, MemoryStore, RecordStore, RedbStore};
