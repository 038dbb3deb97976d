//! Composite codecs: SEQUENCE, SEQUENCE OF and CHOICE.
//!
//! Extension fields and extension alternatives travel as open types: the
//! child encoding is padded to whole bytes and framed with a length
//! determinant, so decoders unaware of an addition can skip it.

use std::collections::BTreeMap;

use crate::buffer::BitBuffer;
use crate::codec::{Codec, CodecKind, SizeConstraints};
use crate::errors::Error;
use crate::length::{
    self, Length, bits_for_range, decode_with_size, encode_with_size, read_length_chunk,
};
use crate::node::{DecodedField, DecodedNode, DecodedValue, NodeMeta};
use crate::value::Value;

/// One declared SEQUENCE field.
#[derive(Debug, Clone)]
pub struct SequenceField {
    pub name: String,
    pub codec: Codec,
    pub optional: bool,
    pub default: Option<Value>,
}

impl SequenceField {
    pub fn required(name: impl Into<String>, codec: impl Into<Codec>) -> Self {
        SequenceField {
            name: name.into(),
            codec: codec.into(),
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, codec: impl Into<Codec>) -> Self {
        SequenceField {
            optional: true,
            ..Self::required(name, codec)
        }
    }

    pub fn defaulted(name: impl Into<String>, codec: impl Into<Codec>, default: Value) -> Self {
        SequenceField {
            default: Some(default),
            ..Self::required(name, codec)
        }
    }

    fn tracked_in_preamble(&self) -> bool {
        self.optional || self.default.is_some()
    }

    /// Whether the field occupies bits given the supplied map. A DEFAULT
    /// field equal to its default (or missing) encodes as absent.
    fn is_present_in(&self, map: &BTreeMap<String, Value>) -> bool {
        match (map.get(&self.name), &self.default) {
            (None, _) => false,
            (Some(value), Some(default)) => value != default,
            (Some(_), None) => true,
        }
    }
}

/// SEQUENCE: extension bit, root presence preamble, root fields in order,
/// then open-typed extension fields behind a presence bitmap.
#[derive(Debug, Clone)]
pub struct SequenceCodec {
    root: Vec<SequenceField>,
    extension: Option<Vec<SequenceField>>,
}

impl SequenceCodec {
    /// `extension` is `None` when the type has no extension marker and
    /// `Some` (possibly empty) when it does.
    pub fn new(root: Vec<SequenceField>, extension: Option<Vec<SequenceField>>) -> Self {
        SequenceCodec { root, extension }
    }

    fn extension_fields(&self) -> &[SequenceField] {
        self.extension.as_deref().unwrap_or(&[])
    }

    fn check_known_keys(&self, map: &BTreeMap<String, Value>) -> Result<(), Error> {
        for key in map.keys() {
            let known = self.root.iter().any(|f| &f.name == key)
                || self.extension_fields().iter().any(|f| &f.name == key);
            if !known {
                return Err(Error::Constraint(format!("unknown field `{key}`")));
            }
        }
        Ok(())
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::Sequence(map) = value else {
            return Err(Error::Constraint(format!(
                "expected sequence, got {}",
                value.type_name()
            )));
        };
        self.check_known_keys(map)?;

        let root_present: Vec<bool> = self.root.iter().map(|f| f.is_present_in(map)).collect();
        for (field, present) in self.root.iter().zip(&root_present) {
            if !present && !field.tracked_in_preamble() {
                return Err(Error::Constraint(format!("missing field `{}`", field.name)));
            }
        }

        let ext_present: Vec<bool> = self
            .extension_fields()
            .iter()
            .map(|f| f.is_present_in(map))
            .collect();
        let any_extension = ext_present.iter().any(|&p| p);

        if self.extension.is_some() {
            buf.write_bit(any_extension);
        }

        for (field, present) in self.root.iter().zip(&root_present) {
            if field.tracked_in_preamble() {
                buf.write_bit(*present);
            }
        }

        for (field, present) in self.root.iter().zip(&root_present) {
            if *present {
                field
                    .codec
                    .encode_inner(buf, &map[&field.name])
                    .map_err(|e| e.at(&field.name))?;
            }
        }

        if any_extension {
            let slots = self.extension_fields().len();
            length::write_normally_small(buf, (slots - 1) as u64)?;
            for &present in &ext_present {
                buf.write_bit(present);
            }
            for (field, present) in self.extension_fields().iter().zip(&ext_present) {
                if *present {
                    write_open_type(buf, &field.codec, &map[&field.name])
                        .map_err(|e| e.at(&field.name))?;
                }
            }
        }

        Ok(())
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        let any_extension = if self.extension.is_some() {
            buf.read_bit()?
        } else {
            false
        };

        let mut root_present = Vec::with_capacity(self.root.len());
        for field in &self.root {
            root_present.push(if field.tracked_in_preamble() {
                buf.read_bit()?
            } else {
                true
            });
        }

        let mut map = BTreeMap::new();
        for (field, present) in self.root.iter().zip(&root_present) {
            if *present {
                let value = field.codec.decode(buf).map_err(|e| e.at(&field.name))?;
                map.insert(field.name.clone(), value);
            } else if let Some(default) = &field.default {
                map.insert(field.name.clone(), default.clone());
            }
        }

        let ext_fields = self.extension_fields();
        let mut ext_seen = vec![false; ext_fields.len()];
        if any_extension {
            let slots = length::read_normally_small(buf)? as usize + 1;
            let mut bitmap = Vec::with_capacity(slots);
            for _ in 0..slots {
                bitmap.push(buf.read_bit()?);
            }

            for (slot, &present) in bitmap.iter().enumerate() {
                if !present {
                    continue;
                }
                match ext_fields.get(slot) {
                    Some(field) => {
                        let value =
                            read_open_type(buf, &field.codec).map_err(|e| e.at(&field.name))?;
                        map.insert(field.name.clone(), value);
                        ext_seen[slot] = true;
                    }
                    None => {
                        skip_open_type(buf)?;
                    }
                }
            }
        }

        for (field, seen) in ext_fields.iter().zip(&ext_seen) {
            if !seen {
                if let Some(default) = &field.default {
                    map.insert(field.name.clone(), default.clone());
                }
            }
        }

        Ok(Value::Sequence(map))
    }

    pub(crate) fn decode_value_with_metadata(
        &self,
        buf: &mut BitBuffer,
    ) -> Result<DecodedValue, Error> {
        let any_extension = if self.extension.is_some() {
            buf.read_bit()?
        } else {
            false
        };

        let mut root_present = Vec::with_capacity(self.root.len());
        for field in &self.root {
            root_present.push(if field.tracked_in_preamble() {
                buf.read_bit()?
            } else {
                true
            });
        }

        let mut fields = BTreeMap::new();
        for (field, present) in self.root.iter().zip(&root_present) {
            let decoded = if *present {
                let node = field
                    .codec
                    .decode_with_metadata(buf)
                    .map_err(|e| e.at(&field.name))?;
                DecodedField {
                    node,
                    present: true,
                    is_default: false,
                }
            } else {
                absent_field(field, buf.read_position())
            };
            fields.insert(field.name.clone(), decoded);
        }

        let ext_fields = self.extension_fields();
        let mut ext_seen = vec![false; ext_fields.len()];
        if any_extension {
            let slots = length::read_normally_small(buf)? as usize + 1;
            let mut bitmap = Vec::with_capacity(slots);
            for _ in 0..slots {
                bitmap.push(buf.read_bit()?);
            }

            for (slot, &present) in bitmap.iter().enumerate() {
                if !present {
                    continue;
                }
                match ext_fields.get(slot) {
                    Some(field) => {
                        let node = read_open_type_node(buf, &field.codec)
                            .map_err(|e| e.at(&field.name))?;
                        fields.insert(
                            field.name.clone(),
                            DecodedField {
                                node,
                                present: true,
                                is_default: false,
                            },
                        );
                        ext_seen[slot] = true;
                    }
                    None => {
                        skip_open_type(buf)?;
                    }
                }
            }
        }

        for (field, seen) in ext_fields.iter().zip(&ext_seen) {
            if !seen {
                fields.insert(field.name.clone(), absent_field(field, buf.read_position()));
            }
        }

        Ok(DecodedValue::Sequence(fields))
    }
}

fn absent_field(field: &SequenceField, bit_offset: usize) -> DecodedField {
    let (value, is_default) = match &field.default {
        Some(default) => (DecodedValue::Primitive(default.clone()), true),
        None => (DecodedValue::Absent, false),
    };

    DecodedField {
        node: DecodedNode {
            value,
            meta: NodeMeta {
                kind: field.codec.kind(),
                bit_offset,
                bit_length: 0,
                raw_bytes: Vec::new(),
            },
        },
        present: false,
        is_default,
    }
}

/// SEQUENCE OF: a size determinant, then each element in order.
#[derive(Debug, Clone)]
pub struct SequenceOfCodec {
    item: Box<Codec>,
    size: SizeConstraints,
}

impl SequenceOfCodec {
    pub fn new(item: impl Into<Codec>, size: SizeConstraints) -> Self {
        SequenceOfCodec {
            item: Box::new(item.into()),
            size,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::SequenceOf(items) = value else {
            return Err(Error::Constraint(format!(
                "expected sequence of, got {}",
                value.type_name()
            )));
        };

        encode_with_size(buf, items.len(), &self.size, |buf, start, count| {
            for (i, item) in items[start..start + count].iter().enumerate() {
                self.item
                    .encode_inner(buf, item)
                    .map_err(|e| e.at(format!("[{}]", start + i)))?;
            }
            Ok(())
        })
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        let mut items = Vec::new();
        decode_with_size(buf, &self.size, |buf, count| {
            for _ in 0..count {
                let index = items.len();
                let item = self
                    .item
                    .decode(buf)
                    .map_err(|e| e.at(format!("[{index}]")))?;
                items.push(item);
            }
            Ok(())
        })?;

        Ok(Value::SequenceOf(items))
    }

    pub(crate) fn decode_value_with_metadata(
        &self,
        buf: &mut BitBuffer,
    ) -> Result<DecodedValue, Error> {
        let mut items = Vec::new();
        decode_with_size(buf, &self.size, |buf, count| {
            for _ in 0..count {
                let index = items.len();
                let node = self
                    .item
                    .decode_with_metadata(buf)
                    .map_err(|e| e.at(format!("[{index}]")))?;
                items.push(node);
            }
            Ok(())
        })?;

        Ok(DecodedValue::SequenceOf(items))
    }
}

/// One CHOICE alternative.
#[derive(Debug, Clone)]
pub struct ChoiceAlternative {
    pub name: String,
    pub codec: Codec,
}

impl ChoiceAlternative {
    pub fn new(name: impl Into<String>, codec: impl Into<Codec>) -> Self {
        ChoiceAlternative {
            name: name.into(),
            codec: codec.into(),
        }
    }
}

/// The alternative name a decoder reports when an extension alternative is
/// not declared in its schema. The value is the raw open-type payload as an
/// octet string.
pub const UNKNOWN_ALTERNATIVE: &str = "<unknown>";

/// CHOICE: constrained root index (zero bits for a single root
/// alternative), or extensibility bit plus normally-small index and an
/// open-typed value.
#[derive(Debug, Clone)]
pub struct ChoiceCodec {
    root: Vec<ChoiceAlternative>,
    extension: Option<Vec<ChoiceAlternative>>,
}

impl ChoiceCodec {
    /// `extension` is `None` when the type has no extension marker and
    /// `Some` (possibly empty) when it does.
    pub fn new(root: Vec<ChoiceAlternative>, extension: Option<Vec<ChoiceAlternative>>) -> Self {
        ChoiceCodec { root, extension }
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::Choice { name, value } = value else {
            return Err(Error::Constraint(format!(
                "expected choice, got {}",
                value.type_name()
            )));
        };

        if let Some(index) = self.root.iter().position(|a| &a.name == name) {
            if self.extension.is_some() {
                buf.write_bit(false);
            }
            buf.write_bits(index as u64, bits_for_range(self.root.len() as u128))?;
            return self.root[index]
                .codec
                .encode_inner(buf, value)
                .map_err(|e| e.at(name));
        }

        if let Some(extension) = &self.extension {
            if let Some(index) = extension.iter().position(|a| &a.name == name) {
                buf.write_bit(true);
                length::write_normally_small(buf, index as u64)?;
                return write_open_type(buf, &extension[index].codec, value)
                    .map_err(|e| e.at(name));
            }
        }

        Err(Error::Constraint(format!("unknown alternative `{name}`")))
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        if self.extension.is_some() && buf.read_bit()? {
            let index = length::read_normally_small(buf)? as usize;
            let known = self.extension.as_deref().unwrap_or(&[]).get(index);
            return match known {
                Some(alternative) => {
                    let value =
                        read_open_type(buf, &alternative.codec).map_err(|e| e.at(&alternative.name))?;
                    Ok(Value::choice(alternative.name.clone(), value))
                }
                None => {
                    let payload = read_open_type_bytes(buf)?;
                    Ok(Value::choice(UNKNOWN_ALTERNATIVE, Value::OctetString(payload)))
                }
            };
        }

        let index = buf.read_bits(bits_for_range(self.root.len() as u128))? as usize;
        let Some(alternative) = self.root.get(index) else {
            return Err(Error::Wire(format!("choice index {index} beyond root")));
        };

        let value = alternative
            .codec
            .decode(buf)
            .map_err(|e| e.at(&alternative.name))?;
        Ok(Value::choice(alternative.name.clone(), value))
    }

    pub(crate) fn decode_value_with_metadata(
        &self,
        buf: &mut BitBuffer,
    ) -> Result<DecodedValue, Error> {
        if self.extension.is_some() && buf.read_bit()? {
            let index = length::read_normally_small(buf)? as usize;
            let known = self.extension.as_deref().unwrap_or(&[]).get(index);
            return match known {
                Some(alternative) => {
                    let node = read_open_type_node(buf, &alternative.codec)
                        .map_err(|e| e.at(&alternative.name))?;
                    Ok(DecodedValue::Choice {
                        name: alternative.name.clone(),
                        node: Box::new(node),
                    })
                }
                None => {
                    let start = buf.read_position();
                    let payload = read_open_type_bytes(buf)?;
                    let end = buf.read_position();
                    Ok(DecodedValue::Choice {
                        name: UNKNOWN_ALTERNATIVE.to_string(),
                        node: Box::new(DecodedNode {
                            value: DecodedValue::Primitive(Value::OctetString(payload)),
                            meta: NodeMeta {
                                kind: CodecKind::Opaque,
                                bit_offset: start,
                                bit_length: end - start,
                                raw_bytes: buf.extract_bits(start, end - start)?,
                            },
                        }),
                    })
                }
            };
        }

        let index = buf.read_bits(bits_for_range(self.root.len() as u128))? as usize;
        let Some(alternative) = self.root.get(index) else {
            return Err(Error::Wire(format!("choice index {index} beyond root")));
        };

        let node = alternative
            .codec
            .decode_with_metadata(buf)
            .map_err(|e| e.at(&alternative.name))?;
        Ok(DecodedValue::Choice {
            name: alternative.name.clone(),
            node: Box::new(node),
        })
    }
}

/// Encodes `value` into a fresh buffer, pads to whole bytes (an empty
/// encoding becomes one zero byte) and frames the bytes with a length
/// determinant.
fn write_open_type(buf: &mut BitBuffer, codec: &Codec, value: &Value) -> Result<(), Error> {
    let mut payload = BitBuffer::new();
    codec.encode_inner(&mut payload, value)?;

    let mut bytes = payload.to_bytes();
    if bytes.is_empty() {
        bytes.push(0);
    }

    length::write_fragmented(buf, bytes.len(), |buf, start, count| {
        buf.write_octets(&bytes[start..start + count]);
        Ok(())
    })
}

/// Decodes an open-typed value. A single-chunk payload is decoded in place
/// against the outer buffer; a fragmented payload is reassembled first.
fn read_open_type(buf: &mut BitBuffer, codec: &Codec) -> Result<Value, Error> {
    match read_length_chunk(buf)? {
        Length::Full(n) => {
            check_open_type_fits(buf, n)?;
            let start = buf.read_position();
            let value = codec.decode(buf)?;
            skip_open_type_padding(buf, start, n)?;
            Ok(value)
        }
        Length::Fragment(first) => {
            let mut inner = reassemble_fragments(buf, first)?;
            codec.decode(&mut inner)
        }
    }
}

/// Metadata twin of [read_open_type]. Offsets of a reassembled fragmented
/// payload are relative to the payload, not the outer stream.
fn read_open_type_node(buf: &mut BitBuffer, codec: &Codec) -> Result<DecodedNode, Error> {
    match read_length_chunk(buf)? {
        Length::Full(n) => {
            check_open_type_fits(buf, n)?;
            let start = buf.read_position();
            let node = codec.decode_with_metadata(buf)?;
            skip_open_type_padding(buf, start, n)?;
            Ok(node)
        }
        Length::Fragment(first) => {
            let mut inner = reassemble_fragments(buf, first)?;
            codec.decode_with_metadata(&mut inner)
        }
    }
}

/// Reads an open type's payload bytes without interpreting them.
fn read_open_type_bytes(buf: &mut BitBuffer) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    length::read_fragmented(buf, |buf, count| {
        bytes.extend(buf.read_octets(count)?);
        Ok(())
    })?;
    Ok(bytes)
}

/// Skips an open type entirely (an extension the schema does not declare).
fn skip_open_type(buf: &mut BitBuffer) -> Result<(), Error> {
    length::read_fragmented(buf, |buf, count| buf.skip_bits(count * 8))?;
    Ok(())
}

fn check_open_type_fits(buf: &BitBuffer, n: usize) -> Result<(), Error> {
    if n * 8 > buf.remaining() {
        return Err(Error::Wire(format!(
            "open type length {n} bytes exceeds remaining bits"
        )));
    }
    Ok(())
}

fn skip_open_type_padding(buf: &mut BitBuffer, start: usize, n: usize) -> Result<(), Error> {
    let consumed = buf.read_position() - start;
    if consumed > n * 8 {
        return Err(Error::Wire(format!(
            "open type payload overran its {n}-byte frame"
        )));
    }
    buf.skip_bits(n * 8 - consumed)
}

fn reassemble_fragments(buf: &mut BitBuffer, first: usize) -> Result<BitBuffer, Error> {
    let mut bytes = buf.read_octets(first)?;
    length::read_fragmented(buf, |buf, count| {
        bytes.extend(buf.read_octets(count)?);
        Ok(())
    })?;
    Ok(BitBuffer::from_bytes(&bytes))
}
