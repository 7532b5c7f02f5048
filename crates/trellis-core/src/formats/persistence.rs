//! # Persistence Format
//!
//! Binary encoding for records written by disk-backed stores.
//!
//! Format: Header (5 bytes) + postcard-serialized record.
//! - 4 bytes: Magic ("TRLS")
//! - 1 byte: Version
//!
//! Keys are encoded as bare postcard bytes; they are table keys and carry no
//! header.
//!
//! ## Validation
//!
//! Size and header are checked before the payload is deserialized:
//! - Maximum record size (`MAX_RECORD_SIZE`)
//! - Magic bytes and version
//! - Graceful errors for truncated or corrupted data

use crate::primitives::{self, FORMAT_VERSION, HEADER_SIZE, MAGIC_BYTES, MAX_RECORD_SIZE};
use crate::record::Record;
use crate::{Key, StoreError, StoreResult};

// =============================================================================
// RECORD HEADER
// =============================================================================

/// The header that precedes every stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> StoreResult<()> {
        if &self.magic != MAGIC_BYTES {
            return Err(StoreError::Corrupt("Invalid magic bytes".to_string()));
        }
        if self.version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        match bytes {
            [a, b, c, d, version, ..] => Ok(Self {
                magic: [*a, *b, *c, *d],
                version: *version,
            }),
            _ => Err(StoreError::Corrupt("Header too short".to_string())),
        }
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// Serialize a record to bytes (header + payload).
pub fn record_to_bytes(record: &Record) -> StoreResult<Vec<u8>> {
    let payload =
        postcard::to_stdvec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let total = HEADER_SIZE + payload.len();
    if total > MAX_RECORD_SIZE {
        return Err(StoreError::Serialization(format!(
            "Record {} encodes to {total} bytes, above the {MAX_RECORD_SIZE} byte limit",
            record.key
        )));
    }

    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(&PersistenceHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize a record from bytes.
///
/// Size and header are validated before the payload is touched.
pub fn record_from_bytes(bytes: &[u8]) -> StoreResult<Record> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt(format!(
            "Data too short: minimum {HEADER_SIZE} bytes required"
        )));
    }
    if bytes.len() > MAX_RECORD_SIZE {
        return Err(StoreError::Corrupt(format!(
            "Data size {} bytes exceeds maximum allowed {MAX_RECORD_SIZE} bytes",
            bytes.len()
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    postcard::from_bytes(payload)
        .map_err(|e| StoreError::Corrupt(format!("Failed to deserialize record: {e}")))
}

// =============================================================================
// KEYS
// =============================================================================

/// Encode a key for use as a table key.
pub fn key_to_bytes(key: &Key) -> StoreResult<Vec<u8>> {
    postcard::to_stdvec(key).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode a table key.
pub fn key_from_bytes(bytes: &[u8]) -> StoreResult<Key> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Corrupt(format!("Invalid key: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
