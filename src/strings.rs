//! String-shaped codecs: BIT STRING, OCTET STRING and the character
//! strings (IA5String, VisibleString, UTF8String, custom alphabets).

use std::collections::HashMap;

use crate::buffer::BitBuffer;
use crate::codec::SizeConstraints;
use crate::errors::Error;
use crate::length::{bits_for_range, decode_with_size, encode_with_size};
use crate::value::Value;

/// BIT STRING: a size determinant counting bits, then the bits verbatim.
#[derive(Debug, Clone, Copy)]
pub struct BitStringCodec {
    size: SizeConstraints,
}

impl BitStringCodec {
    pub fn new(size: SizeConstraints) -> Self {
        BitStringCodec { size }
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::BitString { data, bit_length } = value else {
            return Err(Error::Constraint(format!(
                "expected bit string, got {}",
                value.type_name()
            )));
        };

        if data.len() * 8 < *bit_length {
            return Err(Error::Constraint(format!(
                "bit string data holds {} bits, bit length says {bit_length}",
                data.len() * 8
            )));
        }

        encode_with_size(buf, *bit_length, &self.size, |buf, start, count| {
            for i in start..start + count {
                buf.write_bit((data[i / 8] >> (7 - i % 8)) & 1 == 1);
            }
            Ok(())
        })
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        let mut bits = BitBuffer::new();
        let total = decode_with_size(buf, &self.size, |buf, count| {
            for _ in 0..count {
                let bit = buf.read_bit()?;
                bits.write_bit(bit);
            }
            Ok(())
        })?;

        Ok(Value::bit_string(bits.to_bytes(), total))
    }
}

/// OCTET STRING: a size determinant counting bytes, then the bytes with no
/// alignment padding.
#[derive(Debug, Clone, Copy)]
pub struct OctetStringCodec {
    size: SizeConstraints,
}

impl OctetStringCodec {
    pub fn new(size: SizeConstraints) -> Self {
        OctetStringCodec { size }
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::OctetString(bytes) = value else {
            return Err(Error::Constraint(format!(
                "expected octet string, got {}",
                value.type_name()
            )));
        };

        encode_with_size(buf, bytes.len(), &self.size, |buf, start, count| {
            buf.write_octets(&bytes[start..start + count]);
            Ok(())
        })
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        let mut bytes = Vec::new();
        decode_with_size(buf, &self.size, |buf, count| {
            bytes.extend(buf.read_octets(count)?);
            Ok(())
        })?;

        Ok(Value::OctetString(bytes))
    }
}

/// Character subset a [CharacterStringCodec] accepts, and how code points
/// go to the wire.
#[derive(Debug, Clone)]
pub enum CharKind {
    /// 7 bits per character, code points 0..=127.
    Ia5,
    /// 7 bits per character, printable subset 0x20..=0x7E.
    Visible,
    /// UTF-8 bytes framed by a byte-count size determinant; no per-character
    /// compaction.
    Utf8,
    /// Permitted alphabet: each character encodes as its index.
    Alphabet(Alphabet),
}

/// Indexed permitted-alphabet lookup, derived once at construction: a
/// character-to-index table for encoding and an index-to-character table
/// for decoding.
#[derive(Debug, Clone)]
pub struct Alphabet {
    by_index: Vec<char>,
    by_char: HashMap<char, usize>,
    bits: usize,
}

impl Alphabet {
    pub fn new(chars: &str) -> Result<Self, Error> {
        let by_index: Vec<char> = chars.chars().collect();
        if by_index.is_empty() {
            return Err(Error::Schema("empty permitted alphabet".to_string()));
        }

        let mut by_char = HashMap::with_capacity(by_index.len());
        for (i, &c) in by_index.iter().enumerate() {
            if by_char.insert(c, i).is_some() {
                return Err(Error::Schema(format!(
                    "duplicate character `{c}` in permitted alphabet"
                )));
            }
        }

        let bits = bits_for_range(by_index.len() as u128);
        Ok(Alphabet {
            by_index,
            by_char,
            bits,
        })
    }
}

/// Character string codec; the size determinant counts characters, except
/// for UTF-8 where it counts bytes.
#[derive(Debug, Clone)]
pub struct CharacterStringCodec {
    kind: CharKind,
    size: SizeConstraints,
}

impl CharacterStringCodec {
    pub fn new(kind: CharKind, size: SizeConstraints) -> Self {
        CharacterStringCodec { kind, size }
    }

    pub fn ia5(size: SizeConstraints) -> Self {
        Self::new(CharKind::Ia5, size)
    }

    pub fn visible(size: SizeConstraints) -> Self {
        Self::new(CharKind::Visible, size)
    }

    pub fn utf8(size: SizeConstraints) -> Self {
        Self::new(CharKind::Utf8, size)
    }

    fn code_for(&self, c: char) -> Result<u64, Error> {
        match &self.kind {
            CharKind::Ia5 => {
                if (c as u32) < 128 {
                    Ok(c as u64)
                } else {
                    Err(Error::Constraint(format!("character `{c}` outside IA5")))
                }
            }
            CharKind::Visible => {
                if (0x20..=0x7E).contains(&(c as u32)) {
                    Ok(c as u64)
                } else {
                    Err(Error::Constraint(format!(
                        "character `{}` outside the visible range",
                        c.escape_default()
                    )))
                }
            }
            CharKind::Alphabet(alphabet) => match alphabet.by_char.get(&c) {
                Some(&index) => Ok(index as u64),
                None => Err(Error::Constraint(format!(
                    "character `{c}` outside the permitted alphabet"
                ))),
            },
            CharKind::Utf8 => unreachable!("UTF-8 strings are byte-framed"),
        }
    }

    fn char_for(&self, code: u64) -> Result<char, Error> {
        match &self.kind {
            CharKind::Ia5 => Ok(char::from_u32(code as u32).unwrap_or('\0')),
            CharKind::Visible => {
                if (0x20..=0x7E).contains(&code) {
                    Ok(code as u8 as char)
                } else {
                    Err(Error::Constraint(format!(
                        "code point {code} outside the visible range"
                    )))
                }
            }
            CharKind::Alphabet(alphabet) => {
                alphabet.by_index.get(code as usize).copied().ok_or_else(|| {
                    Error::Wire(format!("alphabet index {code} beyond table"))
                })
            }
            CharKind::Utf8 => unreachable!("UTF-8 strings are byte-framed"),
        }
    }

    fn bits_per_char(&self) -> usize {
        match &self.kind {
            CharKind::Ia5 | CharKind::Visible => 7,
            CharKind::Alphabet(alphabet) => alphabet.bits,
            CharKind::Utf8 => unreachable!("UTF-8 strings are byte-framed"),
        }
    }

    pub(crate) fn encode(&self, buf: &mut BitBuffer, value: &Value) -> Result<(), Error> {
        let Value::Text(text) = value else {
            return Err(Error::Constraint(format!(
                "expected text, got {}",
                value.type_name()
            )));
        };

        if let CharKind::Utf8 = self.kind {
            let bytes = text.as_bytes();
            return encode_with_size(buf, bytes.len(), &self.size, |buf, start, count| {
                buf.write_octets(&bytes[start..start + count]);
                Ok(())
            });
        }

        let mut codes = Vec::with_capacity(text.len());
        for c in text.chars() {
            codes.push(self.code_for(c)?);
        }

        let bits = self.bits_per_char();
        encode_with_size(buf, codes.len(), &self.size, |buf, start, count| {
            for &code in &codes[start..start + count] {
                buf.write_bits(code, bits)?;
            }
            Ok(())
        })
    }

    pub(crate) fn decode(&self, buf: &mut BitBuffer) -> Result<Value, Error> {
        if let CharKind::Utf8 = self.kind {
            let mut bytes = Vec::new();
            decode_with_size(buf, &self.size, |buf, count| {
                bytes.extend(buf.read_octets(count)?);
                Ok(())
            })?;

            return String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| Error::Wire("invalid UTF-8 in character string".to_string()));
        }

        let bits = self.bits_per_char();
        let mut text = String::new();
        decode_with_size(buf, &self.size, |buf, count| {
            for _ in 0..count {
                let code = buf.read_bits(bits)?;
                text.push(self.char_for(code)?);
            }
            Ok(())
        })?;

        Ok(Value::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_bit_string_is_raw_bits() {
        let codec = BitStringCodec::new(SizeConstraints::fixed(8));
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::bit_string(vec![0xA5], 8))
            .unwrap();
        assert_eq!(buf.to_bytes(), vec![0xA5]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::bit_string(vec![0xA5], 8)
        );
    }

    #[test]
    fn test_unconstrained_bit_string_prefixes_length() {
        let codec = BitStringCodec::new(SizeConstraints::unconstrained());
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::bit_string(vec![0xA5], 8))
            .unwrap();
        assert_eq!(buf.to_bytes(), vec![0x08, 0xA5]);
    }

    #[test]
    fn test_bit_string_non_byte_multiple() {
        let codec = BitStringCodec::new(SizeConstraints::bounded(0, 16));
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::bit_string(vec![0b10100000], 3))
            .unwrap();
        // 5-bit size determinant, then 3 bits.
        assert_eq!(buf.bit_len(), 8);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::bit_string(vec![0b10100000], 3)
        );
    }

    #[test]
    fn test_bit_string_size_violation() {
        let codec = BitStringCodec::new(SizeConstraints::bounded(4, 8));
        let mut buf = BitBuffer::new();
        let err = codec
            .encode(&mut buf, &Value::bit_string(vec![0xFF, 0xFF], 12))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_octet_string_unaligned_content() {
        let codec = OctetStringCodec::new(SizeConstraints::fixed(2));
        let mut buf = BitBuffer::new();
        buf.write_bit(true);
        codec
            .encode(&mut buf, &Value::OctetString(vec![0xAB, 0xCD]))
            .unwrap();
        assert_eq!(buf.bit_len(), 17);

        buf.skip_bits(1).unwrap();
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::OctetString(vec![0xAB, 0xCD])
        );
    }

    #[test]
    fn test_ia5_seven_bits_per_char() {
        let codec = CharacterStringCodec::ia5(SizeConstraints::bounded(0, 64));
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::Text("hello".to_string()))
            .unwrap();
        assert_eq!(buf.bit_len(), 7 + 5 * 7);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::Text("hello".to_string())
        );
    }

    #[test]
    fn test_ia5_rejects_non_ascii() {
        let codec = CharacterStringCodec::ia5(SizeConstraints::unconstrained());
        let mut buf = BitBuffer::new();
        let err = codec
            .encode(&mut buf, &Value::Text("héllo".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_visible_rejects_control_characters() {
        let codec = CharacterStringCodec::visible(SizeConstraints::unconstrained());
        let mut buf = BitBuffer::new();
        let err = codec
            .encode(&mut buf, &Value::Text("a\tb".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_utf8_is_byte_framed() {
        let codec = CharacterStringCodec::utf8(SizeConstraints::unconstrained());
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::Text("héllo".to_string()))
            .unwrap();
        // Length 6 (bytes, not characters), then the UTF-8 bytes.
        assert_eq!(buf.to_bytes()[0], 0x06);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::Text("héllo".to_string())
        );
    }

    #[test]
    fn test_utf8_invalid_bytes_are_wire_error() {
        let codec = CharacterStringCodec::utf8(SizeConstraints::unconstrained());
        let mut buf = BitBuffer::from_bytes(&[0x01, 0xFF]);
        assert!(matches!(codec.decode(&mut buf).unwrap_err(), Error::Wire(_)));
    }

    #[test]
    fn test_alphabet_compacts_bits() {
        let alphabet = Alphabet::new("0123456789").unwrap();
        let codec =
            CharacterStringCodec::new(CharKind::Alphabet(alphabet), SizeConstraints::fixed(4));
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::Text("2509".to_string()))
            .unwrap();
        // Four characters at four bits each, no size bits.
        assert_eq!(buf.bit_len(), 16);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::Text("2509".to_string())
        );
    }

    #[test]
    fn test_alphabet_rejects_foreign_character() {
        let alphabet = Alphabet::new("abc").unwrap();
        let codec = CharacterStringCodec::new(
            CharKind::Alphabet(alphabet),
            SizeConstraints::unconstrained(),
        );
        let mut buf = BitBuffer::new();
        let err = codec
            .encode(&mut buf, &Value::Text("abd".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_single_character_alphabet_needs_no_bits() {
        let alphabet = Alphabet::new("x").unwrap();
        let codec = CharacterStringCodec::new(
            CharKind::Alphabet(alphabet),
            SizeConstraints::bounded(0, 7),
        );
        let mut buf = BitBuffer::new();
        codec
            .encode(&mut buf, &Value::Text("xxx".to_string()))
            .unwrap();
        // Only the 3-bit size determinant.
        assert_eq!(buf.bit_len(), 3);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Value::Text("xxx".to_string())
        );
    }
}
