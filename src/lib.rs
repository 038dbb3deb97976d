//! # perspec
//!
//! A runtime encoder and decoder for ASN.1 values under the Packed
//! Encoding Rules, unaligned variant (ITU-T X.691), driven by declarative
//! schemas.
//!
//! Describe types as [SchemaNode] trees (or parse them from ASN.1 text),
//! compile them into [Codec]s, then encode and decode [Value]s against a
//! [BitBuffer]. Decoding can also annotate every value with its bit offset,
//! bit length and source bytes, so substructures can be extracted
//! byte-exactly from the original message.
//!
//! ## Example
//!
//! ```
//! use perspec::{build_all, convert, parse_asn1, BitBuffer, ConvertOptions, Value};
//! use std::collections::BTreeMap;
//!
//! let module = parse_asn1(
//!     "Demo DEFINITIONS ::= BEGIN
//!      Reading ::= SEQUENCE {
//!          sensor INTEGER (0..255),
//!          value  INTEGER (-1000..1000)
//!      }
//!      END",
//! ).unwrap();
//! let registry = convert(&module, &ConvertOptions::default()).unwrap();
//! let codecs = build_all(&registry).unwrap();
//!
//! let reading = Value::Sequence(BTreeMap::from([
//!     ("sensor".to_string(), Value::Integer(7)),
//!     ("value".to_string(), Value::Integer(-40)),
//! ]));
//!
//! let mut buf = BitBuffer::new();
//! codecs["Reading"].encode(&mut buf, &reading).unwrap();
//! assert_eq!(codecs["Reading"].decode(&mut buf).unwrap(), reading);
//! ```

pub mod asn1;
pub mod buffer;
pub mod codec;
pub mod composite;
pub mod convert;
pub mod errors;
pub mod length;
pub mod node;
pub mod primitives;
pub mod schema;
pub mod strings;
pub mod value;

pub use crate::asn1::{Module, parse as parse_asn1};
pub use crate::buffer::BitBuffer;
pub use crate::codec::{Codec, CodecKind, IntegerConstraints, SizeConstraints};
pub use crate::composite::UNKNOWN_ALTERNATIVE;
pub use crate::convert::{ConvertOptions, OidPolicy, convert};
pub use crate::errors::{Error, ErrorKind};
pub use crate::node::{DecodedField, DecodedNode, DecodedValue, NodeMeta, strip_metadata};
pub use crate::schema::{SchemaField, SchemaNode, SizeDef, build, build_all};
pub use crate::value::Value;
