//! # Primitives
//!
//! Fixed constants for the Trellis engine and its record format.
//!
//! These are compiled in and immutable at runtime; `Settings` covers what
//! callers may tune.

/// Magic bytes for the record format header.
///
/// - Record bytes = Magic Bytes ("TRLS") + Version (u8) + payload.
pub const MAGIC_BYTES: &[u8; 4] = b"TRLS";

/// Current record format version.
///
/// Increment this when making breaking changes to the record encoding.
pub const FORMAT_VERSION: u8 = 1;

/// Header length: magic plus version byte.
pub const HEADER_SIZE: usize = 5;

/// Maximum encoded size of one record, header included.
///
/// Validated before decoding so corrupt lengths cannot drive allocation.
pub const MAX_RECORD_SIZE: usize = 1024 * 1024; // 1 MiB

/// Activation depth meaning "follow references without limit".
pub const UNBOUNDED_DEPTH: u32 = u32::MAX;

/// Default number of partition groups one transaction may touch.
pub const DEFAULT_TRANSACTION_GROUP_LIMIT: usize = 25;

/// First identifier a store hands out. Zero is never a valid id.
pub const FIRST_ALLOCATED_ID: u64 = 1;

// =============================================================================
// PROPERTY NAMING
// =============================================================================

/// Separator between a field path and a nested field name.
pub const PATH_SEPARATOR: char = '.';

/// Suffix of the property recording the runtime type of a polymorphic value.
pub const TYPE_SUFFIX: &str = "$type";
