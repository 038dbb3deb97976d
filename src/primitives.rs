//! Primitive type codecs: BOOLEAN, INTEGER, ENUMERATED, NULL and
//! OBJECT IDENTIFIER.

use crate::buffer::BitBuffer;
use crate::codec::IntegerConstraints;
use crate::errors::Error;
use crate::length::{
    self, Length, bits_for_range, min_signed_bytes, min_unsigned_bytes, read_length_chunk,
    write_length_determinant,
};
use crate::value::Value;

/// BOOLEAN: one bit, `1` for true.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCodec;

impl BooleanCodec {
    pub fn new() -> Self {
        BooleanCodec
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::Boolean(b) = value else {
            return Err(Error::Constraint(format!(
                "expected boolean, got {}",
                value.type_name()
            )));
        };

        buf.write_bit(*b);
        Ok(())
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        Ok(Value::Boolean(buf.read_bit()?))
    }
}

/// NULL: zero bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCodec;

impl NullCodec {
    pub fn new() -> Self {
        NullCodec
    }

    pub(crate) fn encode(&self, _buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        match value {
            Value::Null => Ok(()),
            other => Err(Error::Constraint(format!(
                "expected null, got {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn decode(&self, _buf: &mut BitBuffer) -> Result<Value, Error> {
        Ok(Value::Null)
    }
}

/// INTEGER under the four PER shapes: constrained, semi-constrained,
/// unconstrained, and any of those behind an extensibility bit.
#[derive(Debug, Clone, Copy)]
pub struct IntegerCodec {
    constraints: IntegerConstraints,
}

impl IntegerCodec {
    pub fn new(constraints: IntegerConstraints) -> Self {
        IntegerCodec { constraints }
    }

    pub fn constraints(&self) -> &IntegerConstraints {
        &self.constraints
    }

    fn in_root_range(&self, v: i64) -> bool {
        self.constraints.min.is_none_or(|min| v >= min)
            && self.constraints.max.is_none_or(|max| v <= max)
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::Integer(v) = value else {
            return Err(Error::Constraint(format!(
                "expected integer, got {}",
                value.type_name()
            )));
        };
        let v = *v;

        if self.constraints.extensible {
            let in_root = self.in_root_range(v);
            buf.write_bit(!in_root);
            if !in_root {
                return encode_unconstrained(buf, v);
            }
            return self.encode_root(buf, v);
        }

        self.encode_root(buf, v)
    }

    fn encode_root(&self, buf: &mut BitBuffer, v: i64) -> Result<(), Error> {
        if !self.in_root_range(v) {
            return Err(Error::Constraint(format!(
                "integer {v} outside declared range"
            )));
        }

        match (self.constraints.min, self.constraints.max) {
            (Some(min), Some(max)) => {
                let range = (max as i128 - min as i128 + 1) as u128;
                if range == 1 {
                    return Ok(());
                }
                let offset = (v as i128 - min as i128) as u64;
                buf.write_bits(offset, bits_for_range(range))
            }
            (Some(min), None) => {
                let delta = (v as i128 - min as i128) as u64;
                let bytes = min_unsigned_bytes(delta);
                write_length_determinant(buf, bytes)?;
                buf.write_octets(&delta.to_be_bytes()[8 - bytes..]);
                Ok(())
            }
            _ => encode_unconstrained(buf, v),
        }
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        if self.constraints.extensible && buf.read_bit()? {
            return Ok(Value::Integer(decode_unconstrained(buf)?));
        }

        match (self.constraints.min, self.constraints.max) {
            (Some(min), Some(max)) => {
                let range = (max as i128 - min as i128 + 1) as u128;
                if range == 1 {
                    return Ok(Value::Integer(min));
                }
                let offset = buf.read_bits(bits_for_range(range))?;
                if offset as u128 > range - 1 {
                    return Err(Error::Wire(format!(
                        "integer offset {offset} beyond range {min}..{max}"
                    )));
                }
                Ok(Value::Integer((min as i128 + offset as i128) as i64))
            }
            (Some(min), None) => {
                let delta = read_unsigned_content(buf)?;
                let v = min as i128 + delta as i128;
                i64::try_from(v).map(Value::Integer).map_err(|_| {
                    Error::Wire(format!("integer {v} exceeds the supported 64-bit window"))
                })
            }
            (None, max) => {
                let v = decode_unconstrained(buf)?;
                if max.is_some_and(|max| v > max) {
                    return Err(Error::Wire(format!("integer {v} above declared maximum")));
                }
                Ok(Value::Integer(v))
            }
        }
    }
}

fn encode_unconstrained(buf: &mut BitBuffer, v: i64) -> Result<(), Error> {
    let bytes = min_signed_bytes(v);
    write_length_determinant(buf, bytes)?;
    buf.write_octets(&v.to_be_bytes()[8 - bytes..]);
    Ok(())
}

fn decode_unconstrained(buf: &mut BitBuffer) -> Result<i64, Error> {
    let bytes = read_integer_length(buf)?;
    let octets = buf.read_octets(bytes)?;

    let mut v: i64 = if octets[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in octets {
        v = (v << 8) | byte as i64;
    }

    Ok(v)
}

fn read_unsigned_content(buf: &mut BitBuffer) -> Result<u64, Error> {
    let bytes = read_integer_length(buf)?;

    let mut v = 0u64;
    for byte in buf.read_octets(bytes)? {
        v = (v << 8) | byte as u64;
    }

    Ok(v)
}

fn read_integer_length(buf: &mut BitBuffer) -> Result<usize, Error> {
    let bytes = match read_length_chunk(buf)? {
        Length::Full(n) => n,
        Length::Fragment(_) => {
            return Err(Error::Wire(
                "integer wider than the supported 64-bit window".to_string(),
            ));
        }
    };

    if bytes == 0 || bytes > 8 {
        return Err(Error::Wire(format!("integer with {bytes} content bytes")));
    }

    Ok(bytes)
}

/// ENUMERATED: root values indexed in declaration order; extension values
/// behind the extensibility bit as normally-small indexes.
#[derive(Debug, Clone)]
pub struct EnumeratedCodec {
    root: Vec<String>,
    extension: Option<Vec<String>>,
}

impl EnumeratedCodec {
    /// `extension` is `None` for a type without an extension marker and
    /// `Some` (possibly empty) when the marker is present.
    pub fn new(root: Vec<String>, extension: Option<Vec<String>>) -> Self {
        EnumeratedCodec { root, extension }
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::Enumerated(name) = value else {
            return Err(Error::Constraint(format!(
                "expected enumerated, got {}",
                value.type_name()
            )));
        };

        if let Some(index) = self.root.iter().position(|v| v == name) {
            if self.extension.is_some() {
                buf.write_bit(false);
            }
            let bits = bits_for_range(self.root.len() as u128);
            return buf.write_bits(index as u64, bits);
        }

        if let Some(extension) = &self.extension {
            if let Some(index) = extension.iter().position(|v| v == name) {
                buf.write_bit(true);
                return length::write_normally_small(buf, index as u64);
            }
        }

        Err(Error::Constraint(format!("unknown enumerated value `{name}`")))
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        if let Some(extension) = &self.extension {
            if buf.read_bit()? {
                let index = length::read_normally_small(buf)? as usize;
                return match extension.get(index) {
                    Some(name) => Ok(Value::Enumerated(name.clone())),
                    None => Err(Error::Wire(format!(
                        "unknown enumerated extension index {index}"
                    ))),
                };
            }
        }

        let bits = bits_for_range(self.root.len() as u128);
        let index = buf.read_bits(bits)? as usize;
        match self.root.get(index) {
            Some(name) => Ok(Value::Enumerated(name.clone())),
            None => Err(Error::Wire(format!("enumerated index {index} beyond root"))),
        }
    }
}

/// OBJECT IDENTIFIER: the canonical arc encoding framed as an
/// unconstrained octet string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdentifierCodec;

impl ObjectIdentifierCodec {
    pub fn new() -> Self {
        ObjectIdentifierCodec
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::ObjectIdentifier(arcs) = value else {
            return Err(Error::Constraint(format!(
                "expected object identifier, got {}",
                value.type_name()
            )));
        };

        let content = arcs_to_bytes(arcs)?;
        length::write_fragmented(buf, content.len(), |buf, start, count| {
            buf.write_octets(&content[start..start + count]);
            Ok(())
        })
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        let mut content = Vec::new();
        length::read_fragmented(buf, |buf, count| {
            content.extend(buf.read_octets(count)?);
            Ok(())
        })?;

        Ok(Value::ObjectIdentifier(bytes_to_arcs(&content)?))
    }
}

fn arcs_to_bytes(arcs: &[u64]) -> Result<Vec<u8>, Error> {
    if arcs.len() < 2 {
        return Err(Error::Constraint(
            "object identifier needs at least two arcs".to_string(),
        ));
    }
    if arcs[0] > 2 {
        return Err(Error::Constraint(format!(
            "first arc {} not in 0..=2",
            arcs[0]
        )));
    }
    if arcs[0] < 2 && arcs[1] > 39 {
        return Err(Error::Constraint(format!(
            "second arc {} not in 0..=39 under first arc {}",
            arcs[1], arcs[0]
        )));
    }

    let first = (arcs[0] * 40).checked_add(arcs[1]).ok_or_else(|| {
        Error::Constraint(format!("second arc {} too large", arcs[1]))
    })?;

    let mut out = Vec::new();
    write_base128(&mut out, first);
    for &arc in &arcs[2..] {
        write_base128(&mut out, arc);
    }

    Ok(out)
}

fn write_base128(out: &mut Vec<u8>, value: u64) {
    let mut chunks = [0u8; 10];
    let mut i = chunks.len();
    let mut v = value;

    loop {
        i -= 1;
        chunks[i] = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            break;
        }
    }

    let last = chunks.len() - 1;
    for j in i..chunks.len() {
        out.push(if j == last { chunks[j] } else { chunks[j] | 0x80 });
    }
}

fn bytes_to_arcs(content: &[u8]) -> Result<Vec<u64>, Error> {
    if content.is_empty() {
        return Err(Error::Wire("empty object identifier".to_string()));
    }

    let mut subids = Vec::new();
    let mut arc: u64 = 0;
    let mut in_arc = false;

    for &byte in content {
        if !in_arc && byte == 0x80 {
            return Err(Error::Wire("non-minimal object identifier arc".to_string()));
        }
        if arc > u64::MAX >> 7 {
            return Err(Error::Wire("object identifier arc overflow".to_string()));
        }

        arc = (arc << 7) | (byte & 0x7F) as u64;
        in_arc = byte & 0x80 != 0;

        if !in_arc {
            subids.push(arc);
            arc = 0;
        }
    }

    if in_arc {
        return Err(Error::Wire("truncated object identifier arc".to_string()));
    }

    let first = subids[0];
    let mut arcs = if first < 40 {
        vec![0, first]
    } else if first < 80 {
        vec![1, first - 40]
    } else {
        vec![2, first - 80]
    };
    arcs.extend(&subids[1..]);

    Ok(arcs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(codec: &IntegerCodec, v: i64) -> Value {
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(v)).unwrap();
        codec.decode(&mut buf).unwrap()
    }

    #[test]
    fn test_boolean_bits() {
        let codec = BooleanCodec::new();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Boolean(true)).unwrap();
        codec.encode(&mut buf, &Value::Boolean(false)).unwrap();
        assert_eq!(buf.bit_len(), 2);
        assert_eq!(buf.to_bytes(), vec![0b10000000]);
    }

    #[test]
    fn test_null_writes_nothing() {
        let codec = NullCodec::new();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Null).unwrap();
        assert_eq!(buf.bit_len(), 0);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Null);
    }

    #[test]
    fn test_constrained_integer_width() {
        let codec = IntegerCodec::new(IntegerConstraints::range(0, 255));
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(42)).unwrap();
        assert_eq!(buf.bit_len(), 8);
        assert_eq!(buf.to_bytes(), vec![42]);
    }

    #[test]
    fn test_single_value_range_writes_no_bits() {
        let codec = IntegerCodec::new(IntegerConstraints::range(7, 7));
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(7)).unwrap();
        assert_eq!(buf.bit_len(), 0);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(7));
    }

    #[test]
    fn test_constrained_integer_negative_bounds() {
        let codec = IntegerCodec::new(IntegerConstraints::range(-60, 60));
        assert_eq!(round_trip(&codec, -8), Value::Integer(-8));

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(-8)).unwrap();
        assert_eq!(buf.bit_len(), 7);
        assert_eq!(buf.read_bits(7).unwrap(), 52);
    }

    #[test]
    fn test_constrained_integer_full_i64_range() {
        let codec = IntegerCodec::new(IntegerConstraints::range(i64::MIN, i64::MAX));
        assert_eq!(round_trip(&codec, i64::MIN), Value::Integer(i64::MIN));
        assert_eq!(round_trip(&codec, -1), Value::Integer(-1));
        assert_eq!(round_trip(&codec, i64::MAX), Value::Integer(i64::MAX));
    }

    #[test]
    fn test_out_of_range_is_constraint_error() {
        let codec = IntegerCodec::new(IntegerConstraints::range(0, 255));
        let mut buf = BitBuffer::new();
        let err = codec.encode(&mut buf, &Value::Integer(256)).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_semi_constrained_integer() {
        let codec = IntegerCodec::new(IntegerConstraints::at_least(1));
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(257)).unwrap();
        // Length 2, then 0x0100 (value minus the lower bound).
        assert_eq!(buf.to_bytes(), vec![0x02, 0x01, 0x00]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(257));
    }

    #[test]
    fn test_unconstrained_integer_twos_complement() {
        let codec = IntegerCodec::new(IntegerConstraints::unconstrained());
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(-8)).unwrap();
        assert_eq!(buf.to_bytes(), vec![0x01, 0xF8]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(-8));

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(128)).unwrap();
        // 128 needs a leading zero byte to stay positive.
        assert_eq!(buf.to_bytes(), vec![0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_extensible_integer_in_and_out_of_root() {
        let codec = IntegerCodec::new(IntegerConstraints {
            extensible: true,
            ..IntegerConstraints::range(0, 7)
        });

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(5)).unwrap();
        assert_eq!(buf.bit_len(), 4);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(5));

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(300)).unwrap();
        // Extension bit, then an unconstrained integer.
        assert_eq!(buf.bit_len(), 1 + 8 + 16);
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(300));
    }

    #[test]
    fn test_oversized_wire_integer_is_wire_error() {
        let codec = IntegerCodec::new(IntegerConstraints::unconstrained());
        // Length 9: beyond the 64-bit window.
        let mut buf = BitBuffer::from_bytes(&[0x09, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(matches!(codec.decode(&mut buf).unwrap_err(), Error::Wire(_)));
    }

    #[test]
    fn test_enumerated_root_width() {
        let codec = EnumeratedCodec::new(
            vec!["red".to_string(), "green".to_string(), "blue".to_string()],
            None,
        );
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::Enumerated("blue".to_string()))
            .unwrap();
        assert_eq!(buf.bit_len(), 2);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::Enumerated("blue".to_string())
        );
    }

    #[test]
    fn test_enumerated_extension_value() {
        let codec = EnumeratedCodec::new(
            vec!["a".to_string(), "b".to_string()],
            Some(vec!["c".to_string()]),
        );
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::Enumerated("c".to_string()))
            .unwrap();
        // Extension bit plus a normally-small index.
        assert_eq!(buf.bit_len(), 8);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::Enumerated("c".to_string())
        );
    }

    #[test]
    fn test_enumerated_unknown_name() {
        let codec = EnumeratedCodec::new(vec!["a".to_string()], None);
        let mut buf = BitBuffer::new();
        let err = codec
            .encode(&mut buf, &Value::Enumerated("z".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_enumerated_unknown_extension_index() {
        let codec = EnumeratedCodec::new(vec!["a".to_string()], Some(vec![]));
        // Extension bit set, normally-small index 0, but no extension values.
        let mut buf = BitBuffer::new();
        buf.write_bit(true);
        buf.write_bits(0, 7).unwrap();
        assert!(matches!(codec.decode(&mut buf).unwrap_err(), Error::Wire(_)));
    }

    #[test]
    fn test_oid_round_trip() {
        let codec = ObjectIdentifierCodec::new();
        let arcs = vec![1, 3, 6, 1, 4, 1, 311, 21, 20];
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::ObjectIdentifier(arcs.clone()))
            .unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap(), Value::ObjectIdentifier(arcs));
    }

    #[test]
    fn test_oid_canonical_bytes() {
        let codec = ObjectIdentifierCodec::new();
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::ObjectIdentifier(vec![1, 2, 840]))
            .unwrap();
        // Length 3, then 0x2A (1*40+2) and 840 in base-128.
        assert_eq!(buf.to_bytes(), vec![0x03, 0x2A, 0x86, 0x48]);
    }

    #[test]
    fn test_oid_rejects_bad_arcs() {
        let codec = ObjectIdentifierCodec::new();
        let mut buf = BitBuffer::new();
        for arcs in [vec![3, 1], vec![0, 40], vec![1]] {
            assert!(matches!(
                codec
                    .encode(&mut buf, &Value::ObjectIdentifier(arcs))
                    .unwrap_err(),
                Error::Constraint(_)
            ));
        }
    }

    #[test]
    fn test_oid_truncated_arc_is_wire_error() {
        let codec = ObjectIdentifierCodec::new();
        // Length 2, arc bytes end with the continuation bit still set.
        let mut buf = BitBuffer::from_bytes(&[0x02, 0x2A, 0x86]);
        assert!(matches!(codec.decode(&mut buf).unwrap_err(), Error::Wire(_)));
    }
}
