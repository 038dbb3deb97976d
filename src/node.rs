//! Decoded values annotated with their bit range and source bytes.
//!
//! Every codec can decode into a [DecodedNode] tree instead of a plain
//! [Value]. Node metadata carries enough to extract the exact byte region a
//! substructure came from (for example the region covered by a digital
//! signature) without re-encoding anything.

use std::collections::BTreeMap;

use crate::codec::CodecKind;
use crate::value::Value;

/// A decoded value plus its source-region metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNode {
    pub value: DecodedValue,
    pub meta: NodeMeta,
}

/// Where a node came from in the source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    /// Tag of the codec that produced this node.
    pub kind: CodecKind,
    /// First bit of the node's span, counted from the start of the stream.
    pub bit_offset: usize,
    /// Bits the node's decode consumed.
    pub bit_length: usize,
    /// Copy of the source bits `[bit_offset, bit_offset + bit_length)`,
    /// shifted to start at bit 0; exactly `ceil(bit_length / 8)` bytes with
    /// trailing bits zero.
    pub raw_bytes: Vec<u8>,
}

/// Payload of a [DecodedNode].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    /// A primitive's semantic value. Also used for the filled-in default of
    /// an absent DEFAULT field and for opaque extension payloads.
    Primitive(Value),
    /// One child per declared SEQUENCE field, present or not.
    Sequence(BTreeMap<String, DecodedField>),
    SequenceOf(Vec<DecodedNode>),
    Choice {
        name: String,
        node: Box<DecodedNode>,
    },
    /// A declared field that was syntactically absent and has no default.
    Absent,
}

/// A SEQUENCE child together with its presence flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub node: DecodedNode,
    /// Whether the field occupied bits on the wire.
    pub present: bool,
    /// Whether the value is a DEFAULT filled in for an absent field.
    pub is_default: bool,
}

impl DecodedNode {
    /// Looks up a SEQUENCE child by field name.
    pub fn field(&self, name: &str) -> Option<&DecodedField> {
        match &self.value {
            DecodedValue::Sequence(fields) => fields.get(name),
            _ => None,
        }
    }
}

/// Reduces a decoded-node tree to the plain value [crate::Codec::decode]
/// would have returned: absent non-default fields are omitted, defaults are
/// kept, and metadata is dropped.
pub fn strip_metadata(node: &DecodedNode) -> Value {
    match &node.value {
        DecodedValue::Primitive(value) => value.clone(),
        DecodedValue::Sequence(fields) => {
            let mut map = BTreeMap::new();
            for (name, field) in fields {
                if !field.present && !field.is_default {
                    continue;
                }
                map.insert(name.clone(), strip_metadata(&field.node));
            }
            Value::Sequence(map)
        }
        DecodedValue::SequenceOf(items) => {
            Value::SequenceOf(items.iter().map(strip_metadata).collect())
        }
        DecodedValue::Choice { name, node } => Value::choice(name.clone(), strip_metadata(node)),
        DecodedValue::Absent => Value::Null,
    }
}
