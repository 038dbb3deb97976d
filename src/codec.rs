//! Codec dispatch: one compiled codec per schema node kind.
//!
//! A [Codec] is immutable after construction and freely shared across
//! encode/decode calls; operations take the [BitBuffer] explicitly and hold
//! no hidden state.

use std::sync::{Arc, OnceLock};

use crate::buffer::BitBuffer;
use crate::composite::{ChoiceCodec, SequenceCodec, SequenceOfCodec};
use crate::errors::Error;
use crate::node::{DecodedNode, DecodedValue, NodeMeta};
use crate::primitives::{
    BooleanCodec, EnumeratedCodec, IntegerCodec, NullCodec, ObjectIdentifierCodec,
};
use crate::strings::{BitStringCodec, CharacterStringCodec, OctetStringCodec};
use crate::value::Value;

/// Bounds for an INTEGER codec. Both bounds present: constrained; only
/// `min`: semi-constrained; neither: unconstrained. `extensible` adds the
/// leading extensibility bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegerConstraints {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub extensible: bool,
}

impl IntegerConstraints {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn range(min: i64, max: i64) -> Self {
        IntegerConstraints {
            min: Some(min),
            max: Some(max),
            extensible: false,
        }
    }

    pub fn at_least(min: i64) -> Self {
        IntegerConstraints {
            min: Some(min),
            max: None,
            extensible: false,
        }
    }
}

/// Size bounds for BIT STRING, OCTET STRING, character strings and
/// SEQUENCE OF: a fixed size, a `[min, max]` range, or unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeConstraints {
    pub fixed: Option<usize>,
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub extensible: bool,
}

impl SizeConstraints {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn fixed(n: usize) -> Self {
        SizeConstraints {
            fixed: Some(n),
            ..Self::default()
        }
    }

    pub fn bounded(min: usize, max: usize) -> Self {
        SizeConstraints {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }
}

/// Small tag identifying the codec that produced a decoded node. Stored in
/// node metadata instead of a codec pointer; [crate::strip_metadata]
/// dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Boolean,
    Integer,
    Enumerated,
    BitString,
    OctetString,
    CharacterString,
    ObjectIdentifier,
    Null,
    Sequence,
    SequenceOf,
    Choice,
    /// Payload of an extension alternative unknown to the schema.
    Opaque,
}

/// A compiled codec for one ASN.1 type.
#[derive(Debug, Clone)]
pub enum Codec {
    Boolean(BooleanCodec),
    Integer(IntegerCodec),
    Enumerated(EnumeratedCodec),
    BitString(BitStringCodec),
    OctetString(OctetStringCodec),
    CharacterString(CharacterStringCodec),
    ObjectIdentifier(ObjectIdentifierCodec),
    Null(NullCodec),
    Sequence(SequenceCodec),
    SequenceOf(SequenceOfCodec),
    Choice(ChoiceCodec),
    /// Named slot resolved by [crate::schema::build_all]; breaks reference
    /// cycles in recursive schemas.
    Lazy(LazyCodec),
}

impl Codec {
    /// Appends the PER-unaligned encoding of `value`. On any error the
    /// buffer's bit length is restored to its pre-call value.
    pub fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let mark = buf.bit_len();
        let result = self.encode_inner(buf, value);

        if result.is_err() {
            buf.truncate_bits(mark);
        }

        result
    }

    pub(crate) fn encode_inner(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        match self {
            Codec::Boolean(c) => c.encode(buf, value),
            Codec::Integer(c) => c.encode(buf, value),
            Codec::Enumerated(c) => c.encode(buf, value),
            Codec::BitString(c) => c.encode(buf, value),
            Codec::OctetString(c) => c.encode(buf, value),
            Codec::CharacterString(c) => c.encode(buf, value),
            Codec::ObjectIdentifier(c) => c.encode(buf, value),
            Codec::Null(c) => c.encode(buf, value),
            Codec::Sequence(c) => c.encode(buf, value),
            Codec::SequenceOf(c) => c.encode(buf, value),
            Codec::Choice(c) => c.encode(buf, value),
            Codec::Lazy(c) => c.resolve()?.encode_inner(buf, value),
        }
    }

    /// Consumes bits at the read cursor and yields the decoded value.
    pub fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        match self {
            Codec::Boolean(c) => c.decode(buf),
            Codec::Integer(c) => c.decode(buf),
            Codec::Enumerated(c) => c.decode(buf),
            Codec::BitString(c) => c.decode(buf),
            Codec::OctetString(c) => c.decode(buf),
            Codec::CharacterString(c) => c.decode(buf),
            Codec::ObjectIdentifier(c) => c.decode(buf),
            Codec::Null(c) => c.decode(buf),
            Codec::Sequence(c) => c.decode(buf),
            Codec::SequenceOf(c) => c.decode(buf),
            Codec::Choice(c) => c.decode(buf),
            Codec::Lazy(c) => c.resolve()?.decode(buf),
        }
    }

    /// Like [Codec::decode] but returns a [DecodedNode] annotating every
    /// value with its bit offset, bit length and a copy of its source
    /// bytes.
    pub fn decode_with_metadata(&self, buf: &mut BitBuffer) -> Result<DecodedNode, Error> {
        if let Codec::Lazy(c) = self {
            return c.resolve()?.decode_with_metadata(buf);
        }

        let start = buf.read_position();
        let value = match self {
            Codec::Sequence(c) => c.decode_value_with_metadata(buf)?,
            Codec::SequenceOf(c) => c.decode_value_with_metadata(buf)?,
            Codec::Choice(c) => c.decode_value_with_metadata(buf)?,
            _ => DecodedValue::Primitive(self.decode(buf)?),
        };
        let end = buf.read_position();

        Ok(DecodedNode {
            value,
            meta: NodeMeta {
                kind: self.kind(),
                bit_offset: start,
                bit_length: end - start,
                raw_bytes: buf.extract_bits(start, end - start)?,
            },
        })
    }

    /// The metadata tag for nodes decoded by this codec. A lazy codec
    /// reports its target's kind once the registry build has completed.
    pub fn kind(&self) -> CodecKind {
        match self {
            Codec::Boolean(_) => CodecKind::Boolean,
            Codec::Integer(_) => CodecKind::Integer,
            Codec::Enumerated(_) => CodecKind::Enumerated,
            Codec::BitString(_) => CodecKind::BitString,
            Codec::OctetString(_) => CodecKind::OctetString,
            Codec::CharacterString(_) => CodecKind::CharacterString,
            Codec::ObjectIdentifier(_) => CodecKind::ObjectIdentifier,
            Codec::Null(_) => CodecKind::Null,
            Codec::Sequence(_) => CodecKind::Sequence,
            Codec::SequenceOf(_) => CodecKind::SequenceOf,
            Codec::Choice(_) => CodecKind::Choice,
            Codec::Lazy(c) => c.slot.get().map_or(CodecKind::Opaque, Codec::kind),
        }
    }
}

/// Deferred lookup of a codec built elsewhere in the same registry.
///
/// `build_all` allocates one slot per type name before compiling anything,
/// so `$ref` children can point at codecs that do not exist yet. The slot
/// is written exactly once, before `build_all` returns; after that the
/// codec tree is effectively immutable and shareable across threads.
#[derive(Debug, Clone)]
pub struct LazyCodec {
    name: String,
    slot: Arc<OnceLock<Codec>>,
}

impl LazyCodec {
    pub(crate) fn unresolved(name: impl Into<String>) -> Self {
        LazyCodec {
            name: name.into(),
            slot: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn fill(&self, codec: Codec) {
        let _ = self.slot.set(codec);
    }

    /// The referenced type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn resolve(&self) -> Result<&Codec, Error> {
        self.slot.get().ok_or_else(|| {
            Error::Schema(format!("reference `{}` is not resolved", self.name))
        })
    }
}

macro_rules! impl_from_codec {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for Codec {
            fn from(codec: $ty) -> Codec {
                Codec::$variant(codec)
            }
        })*
    };
}

impl_from_codec!(
    Boolean(BooleanCodec),
    Integer(IntegerCodec),
    Enumerated(EnumeratedCodec),
    BitString(BitStringCodec),
    OctetString(OctetStringCodec),
    CharacterString(CharacterStringCodec),
    ObjectIdentifier(ObjectIdentifierCodec),
    Null(NullCodec),
    Sequence(SequenceCodec),
    SequenceOf(SequenceOfCodec),
    Choice(ChoiceCodec),
    Lazy(LazyCodec),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_restores_bit_length() {
        let codec: Codec = IntegerCodec::new(IntegerConstraints::range(0, 255)).into();
        let mut buf = BitBuffer::new();
        buf.write_bits(0b101, 3).unwrap();

        assert!(codec.encode(&mut buf, &Value::Integer(1000)).is_err());
        assert_eq!(buf.bit_len(), 3);
        assert_eq!(buf.to_bytes(), vec![0b10100000]);

        codec.encode(&mut buf, &Value::Integer(7)).unwrap();
        assert_eq!(buf.bit_len(), 11);
    }

    #[test]
    fn test_unresolved_lazy_codec_is_schema_error() {
        let codec: Codec = LazyCodec::unresolved("Node").into();
        let mut buf = BitBuffer::new();
        let err = codec.encode(&mut buf, &Value::Null).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_lazy_codec_delegates_once_filled() {
        let lazy = LazyCodec::unresolved("B");
        lazy.fill(BooleanCodec::new().into());
        let codec: Codec = lazy.into();

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Boolean(true)).unwrap();
        assert_eq!(buf.bit_len(), 1);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Boolean(true));
        assert_eq!(codec.kind(), CodecKind::Boolean);
    }
}
