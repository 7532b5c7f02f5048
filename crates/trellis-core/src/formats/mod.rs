//! # Formats
//!
//! Byte-level encodings used by disk-backed record stores.

pub mod persistence;

pub use persistence::{
    PersistenceHeader, key_from_bytes, key_to_bytes, record_from_bytes, record_to_bytes,
};
