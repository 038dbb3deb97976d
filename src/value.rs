//! Semantic values produced by decoding and accepted by encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A decoded (or to-be-encoded) ASN.1 value.
///
/// The serde representation is externally tagged (`{"Integer": 5}`); this is
/// also the JSON shape of `defaultValue` entries in schema descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    /// Arbitrary integer within the library's signed 64-bit window.
    Integer(i64),
    /// Symbolic enumerated identifier from the root or extension set.
    Enumerated(String),
    /// Bit string as a byte buffer plus a significant bit count. Bits are
    /// big-endian: bit 0 is the high bit of `data[0]`.
    BitString { data: Vec<u8>, bit_length: usize },
    OctetString(Vec<u8>),
    /// Character string text; the codec records which subset applies.
    Text(String),
    /// Object identifier arcs. First arc in 0..=2; second in 0..=39 when the
    /// first is 0 or 1.
    ObjectIdentifier(Vec<u64>),
    Null,
    /// SEQUENCE contents keyed by field name.
    Sequence(BTreeMap<String, Value>),
    SequenceOf(Vec<Value>),
    /// CHOICE as the selected alternative name plus its value.
    Choice { name: String, value: Box<Value> },
}

impl Value {
    /// Builds a [Value::BitString], zeroing any bits in `data` at or past
    /// `bit_length` so equality compares only the significant region.
    pub fn bit_string(data: Vec<u8>, bit_length: usize) -> Value {
        let mut data = data;
        data.truncate(bit_length.div_ceil(8));
        data.resize(bit_length.div_ceil(8), 0);

        let rem = bit_length % 8;
        if rem != 0 {
            let last = data.len() - 1;
            data[last] &= !(0xFFu8 >> rem);
        }

        Value::BitString {
            data,
            bit_length,
        }
    }

    /// Builds a [Value::Choice] without the caller boxing.
    pub fn choice(name: impl Into<String>, value: Value) -> Value {
        Value::Choice {
            name: name.into(),
            value: Box::new(value),
        }
    }

    /// One-word name of the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Enumerated(_) => "enumerated",
            Value::BitString { .. } => "bit string",
            Value::OctetString(_) => "octet string",
            Value::Text(_) => "text",
            Value::ObjectIdentifier(_) => "object identifier",
            Value::Null => "null",
            Value::Sequence(_) => "sequence",
            Value::SequenceOf(_) => "sequence of",
            Value::Choice { .. } => "choice",
        }
    }
}
