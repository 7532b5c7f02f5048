//! # Value Codec Chain
//!
//! Converts single scalar field values to the store's native representation
//! and back. The chain asks each codec in order and uses the first one that
//! claims the declared field type. Codecs hold no state.
//!
//! Standard order:
//! 1. `DirectCodec` - types the store holds natively
//! 2. `CoercingCodec` - int32 (range checked), char, date
//! 3. `EnumCodec` - variant names as text
//!
//! Null is handled by the engine before the chain is consulted.

use crate::model::Value;
use crate::record::StoreValue;
use crate::schema::FieldType;
use thiserror::Error;

/// A value that a codec claimed but could not convert.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

fn mismatch(ty: &FieldType, found: &str) -> CodecError {
    CodecError(format!("expected {ty} value, found {found}"))
}

/// One scalar conversion.
pub trait ValueCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this codec handles fields declared as `ty`.
    fn supports(&self, ty: &FieldType) -> bool;

    /// `Ok(None)` when the codec does not handle `ty`.
    fn encode(&self, value: &Value, ty: &FieldType) -> Result<Option<StoreValue>, CodecError>;

    /// `Ok(None)` when the codec does not handle `ty`.
    fn decode(&self, stored: &StoreValue, ty: &FieldType) -> Result<Option<Value>, CodecError>;
}

// =============================================================================
// DIRECT
// =============================================================================

/// Pass-through for types the store holds natively.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCodec;

impl ValueCodec for DirectCodec {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn supports(&self, ty: &FieldType) -> bool {
        matches!(
            ty,
            FieldType::Bool
                | FieldType::Int64
                | FieldType::Float64
                | FieldType::Text
                | FieldType::Bytes
                | FieldType::Timestamp
        )
    }

    fn encode(&self, value: &Value, ty: &FieldType) -> Result<Option<StoreValue>, CodecError> {
        if !self.supports(ty) {
            return Ok(None);
        }
        let stored = match (ty, value) {
            (FieldType::Bool, Value::Bool(b)) => StoreValue::Bool(*b),
            (FieldType::Int64, Value::Int(i)) => StoreValue::Int(*i),
            (FieldType::Float64, Value::Float(x)) => StoreValue::Float(*x),
            (FieldType::Text, Value::Text(s)) => StoreValue::Text(s.clone()),
            (FieldType::Bytes, Value::Bytes(b)) => StoreValue::Bytes(b.clone()),
            (FieldType::Timestamp, Value::Timestamp(t)) => StoreValue::Timestamp(*t),
            _ => return Err(mismatch(ty, value.variant_name())),
        };
        Ok(Some(stored))
    }

    fn decode(&self, stored: &StoreValue, ty: &FieldType) -> Result<Option<Value>, CodecError> {
        if !self.supports(ty) {
            return Ok(None);
        }
        let value = match (ty, stored) {
            (FieldType::Bool, StoreValue::Bool(b)) => Value::Bool(*b),
            (FieldType::Int64, StoreValue::Int(i)) => Value::Int(*i),
            (FieldType::Float64, StoreValue::Float(x)) => Value::Float(*x),
            (FieldType::Text, StoreValue::Text(s)) => Value::Text(s.clone()),
            (FieldType::Bytes, StoreValue::Bytes(b)) => Value::Bytes(b.clone()),
            (FieldType::Timestamp, StoreValue::Timestamp(t)) => Value::Timestamp(*t),
            _ => return Err(mismatch(ty, stored.variant_name())),
        };
        Ok(Some(value))
    }
}

// =============================================================================
// COERCING
// =============================================================================

/// Numeric, character and date coercions onto native store types.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoercingCodec;

impl ValueCodec for CoercingCodec {
    fn name(&self) -> &'static str {
        "coercing"
    }

    fn supports(&self, ty: &FieldType) -> bool {
        matches!(ty, FieldType::Int32 | FieldType::Char | FieldType::Date)
    }

    fn encode(&self, value: &Value, ty: &FieldType) -> Result<Option<StoreValue>, CodecError> {
        let stored = match (ty, value) {
            (FieldType::Int32, Value::Int(i)) => {
                let narrow = i32::try_from(*i)
                    .map_err(|_| CodecError(format!("{i} does not fit in int32")))?;
                StoreValue::Int(i64::from(narrow))
            }
            (FieldType::Char, Value::Char(c)) => StoreValue::Text(c.to_string()),
            (FieldType::Date, Value::Date(d)) => {
                let midnight = d
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| CodecError(format!("{d} has no midnight")))?;
                StoreValue::Timestamp(midnight.and_utc())
            }
            (FieldType::Int32 | FieldType::Char | FieldType::Date, other) => {
                return Err(mismatch(ty, other.variant_name()));
            }
            _ => return Ok(None),
        };
        Ok(Some(stored))
    }

    fn decode(&self, stored: &StoreValue, ty: &FieldType) -> Result<Option<Value>, CodecError> {
        let value = match (ty, stored) {
            (FieldType::Int32, StoreValue::Int(i)) => {
                let narrow = i32::try_from(*i)
                    .map_err(|_| CodecError(format!("stored {i} does not fit in int32")))?;
                Value::Int(i64::from(narrow))
            }
            (FieldType::Char, StoreValue::Text(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(CodecError(format!("{s:?} is not a single character"))),
                }
            }
            (FieldType::Date, StoreValue::Timestamp(t)) => Value::Date(t.date_naive()),
            (FieldType::Int32 | FieldType::Char | FieldType::Date, other) => {
                return Err(mismatch(ty, other.variant_name()));
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

// =============================================================================
// ENUM
// =============================================================================

/// Enumeration variants stored by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumCodec;

impl ValueCodec for EnumCodec {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn supports(&self, ty: &FieldType) -> bool {
        matches!(ty, FieldType::Enum(_))
    }

    fn encode(&self, value: &Value, ty: &FieldType) -> Result<Option<StoreValue>, CodecError> {
        let FieldType::Enum(enum_type) = ty else {
            return Ok(None);
        };
        match value {
            Value::Enum(variant) if enum_type.contains(variant) => {
                Ok(Some(StoreValue::Text(variant.clone())))
            }
            Value::Enum(variant) => Err(CodecError(format!(
                "{variant} is not a variant of {}",
                enum_type.name()
            ))),
            other => Err(mismatch(ty, other.variant_name())),
        }
    }

    fn decode(&self, stored: &StoreValue, ty: &FieldType) -> Result<Option<Value>, CodecError> {
        let FieldType::Enum(enum_type) = ty else {
            return Ok(None);
        };
        match stored {
            StoreValue::Text(variant) if enum_type.contains(variant) => {
                Ok(Some(Value::Enum(variant.clone())))
            }
            StoreValue::Text(variant) => Err(CodecError(format!(
                "stored {variant} is not a variant of {}",
                enum_type.name()
            ))),
            other => Err(mismatch(ty, other.variant_name())),
        }
    }
}

// =============================================================================
// CHAIN
// =============================================================================

/// Ordered list of codecs; the first one supporting a type wins.
pub struct CodecChain {
    codecs: Vec<Box<dyn ValueCodec>>,
}

impl std::fmt::Debug for CodecChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

impl Default for CodecChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl CodecChain {
    /// A chain with no codecs.
    #[must_use]
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Direct, coercing, enum.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(DirectCodec)
            .with(CoercingCodec)
            .with(EnumCodec)
    }

    /// Append a codec after the existing ones.
    #[must_use]
    pub fn with(mut self, codec: impl ValueCodec + 'static) -> Self {
        self.codecs.push(Box::new(codec));
        self
    }

    #[must_use]
    pub fn supports(&self, ty: &FieldType) -> bool {
        self.codecs.iter().any(|c| c.supports(ty))
    }

    pub fn encode(&self, value: &Value, ty: &FieldType) -> Result<StoreValue, CodecError> {
        for codec in &self.codecs {
            if let Some(stored) = codec.encode(value, ty)? {
                return Ok(stored);
            }
        }
        Err(CodecError(format!("no codec handles {ty}")))
    }

    pub fn decode(&self, stored: &StoreValue, ty: &FieldType) -> Result<Value, CodecError> {
        for codec in &self.codecs {
            if let Some(value) = codec.decode(stored, ty)? {
                return Ok(value);
            }
        }
        Err(CodecError(format!("no codec handles {ty}")))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EnumType;
    use chrono::NaiveDate;

    #[test]
    fn int32_out_of_range_fails_loudly() {
        let chain = CodecChain::standard();
        let result = chain.encode(&Value::Int(i64::from(i32::MAX) + 1), &FieldType::Int32);
        assert!(result.is_err());
        let ok = chain.encode(&Value::Int(-5), &FieldType::Int32).expect("in range");
        assert_eq!(ok, StoreValue::Int(-5));
    }

    #[test]
    fn date_is_stored_as_midnight_timestamp() {
        let chain = CodecChain::standard();
        let date = NaiveDate::from_ymd_opt(2031, 5, 17).expect("valid date");
        let stored = chain.encode(&Value::Date(date), &FieldType::Date).expect("encode");
        assert!(matches!(stored, StoreValue::Timestamp(_)));
        let back = chain.decode(&stored, &FieldType::Date).expect("decode");
        assert_eq!(back, Value::Date(date));
    }

    #[test]
    fn char_requires_single_character_text() {
        let chain = CodecChain::standard();
        assert_eq!(
            chain.decode(&StoreValue::Text("x".into()), &FieldType::Char).expect("decode"),
            Value::Char('x')
        );
        assert!(chain.decode(&StoreValue::Text("xy".into()), &FieldType::Char).is_err());
    }

    #[test]
    fn enum_validates_membership() {
        let chain = CodecChain::standard();
        let planet = FieldType::Enum(EnumType::new("Planet", ["MARS", "VENUS"]));
        assert_eq!(
            chain.encode(&Value::Enum("MARS".into()), &planet).expect("encode"),
            StoreValue::Text("MARS".into())
        );
        assert!(chain.encode(&Value::Enum("PLUTO".into()), &planet).is_err());
        assert!(chain.decode(&StoreValue::Text("PLUTO".into()), &planet).is_err());
    }

    #[test]
    fn type_mismatch_is_an_error_not_a_skip() {
        let chain = CodecChain::standard();
        assert!(chain.encode(&Value::Text("7".into()), &FieldType::Int64).is_err());
    }

    #[test]
    fn empty_chain_supports_nothing() {
        let chain = CodecChain::empty();
        assert!(!chain.supports(&FieldType::Text));
        assert!(chain.encode(&Value::Text("a".into()), &FieldType::Text).is_err());
    }

    #[test]
    fn chain_order_is_preserved() {
        let chain = CodecChain::standard();
        assert_eq!(format!("{chain:?}"), r#"["direct", "coercing", "enum"]"#);
    }
}
