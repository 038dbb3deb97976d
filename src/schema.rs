//! JSON-serializable schema descriptions and their compilation to codecs.
//!
//! A [SchemaNode] tree is the stable interface for consumers who ship
//! pre-generated schemas: the serde representation uses a `"type"`
//! discriminator (`"INTEGER"`, `"SEQUENCE OF"`, `"$ref"`, …) and camelCase
//! member keys, and round-trips through JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{Codec, IntegerConstraints, LazyCodec, SizeConstraints};
use crate::composite::{ChoiceAlternative, ChoiceCodec, SequenceCodec, SequenceField, SequenceOfCodec};
use crate::errors::Error;
use crate::primitives::{
    BooleanCodec, EnumeratedCodec, IntegerCodec, NullCodec, ObjectIdentifierCodec,
};
use crate::strings::{Alphabet, BitStringCodec, CharKind, CharacterStringCodec, OctetStringCodec};
use crate::value::Value;

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Size constraint members shared by the string-shaped nodes and
/// `SEQUENCE OF`; flattened into the node's JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub extensible: bool,
}

impl SizeDef {
    pub fn fixed(n: usize) -> Self {
        SizeDef {
            fixed_size: Some(n),
            ..Self::default()
        }
    }

    pub fn bounded(min: usize, max: usize) -> Self {
        SizeDef {
            min_size: Some(min),
            max_size: Some(max),
            ..Self::default()
        }
    }

    fn to_constraints(self) -> Result<SizeConstraints, Error> {
        if self.fixed_size.is_some() && (self.min_size.is_some() || self.max_size.is_some()) {
            return Err(Error::Schema(
                "fixedSize conflicts with minSize/maxSize".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(Error::Schema(format!("minSize {min} above maxSize {max}")));
            }
        }

        Ok(SizeConstraints {
            fixed: self.fixed_size,
            min: self.min_size,
            max: self.max_size,
            extensible: self.extensible,
        })
    }
}

/// Declarative description of one ASN.1 type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchemaNode {
    #[serde(rename = "BOOLEAN")]
    Boolean,
    #[serde(rename = "NULL")]
    Null,
    #[serde(rename = "OBJECT IDENTIFIER")]
    ObjectIdentifier,
    #[serde(rename = "INTEGER")]
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
        #[serde(default, skip_serializing_if = "is_false")]
        extensible: bool,
    },
    #[serde(rename = "ENUMERATED", rename_all = "camelCase")]
    Enumerated {
        values: Vec<String>,
        /// Present exactly when the source type carried an extension
        /// marker; may be empty.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension_values: Option<Vec<String>>,
    },
    #[serde(rename = "BIT STRING")]
    BitString {
        #[serde(flatten)]
        size: SizeDef,
    },
    #[serde(rename = "OCTET STRING")]
    OctetString {
        #[serde(flatten)]
        size: SizeDef,
    },
    #[serde(rename = "IA5String")]
    Ia5String {
        #[serde(flatten)]
        size: SizeDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alphabet: Option<String>,
    },
    #[serde(rename = "VisibleString")]
    VisibleString {
        #[serde(flatten)]
        size: SizeDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alphabet: Option<String>,
    },
    #[serde(rename = "UTF8String")]
    Utf8String {
        #[serde(flatten)]
        size: SizeDef,
    },
    #[serde(rename = "SEQUENCE", rename_all = "camelCase")]
    Sequence {
        fields: Vec<SchemaField>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension_fields: Option<Vec<SchemaField>>,
    },
    #[serde(rename = "SEQUENCE OF")]
    SequenceOf {
        item: Box<SchemaNode>,
        #[serde(flatten)]
        size: SizeDef,
    },
    #[serde(rename = "CHOICE", rename_all = "camelCase")]
    Choice {
        alternatives: Vec<SchemaField>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension_alternatives: Option<Vec<SchemaField>>,
    },
    /// Reference to a named type in the registry passed to [build_all].
    #[serde(rename = "$ref")]
    Ref { name: String },
}

/// A SEQUENCE field or CHOICE alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub schema: SchemaNode,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, schema: SchemaNode) -> Self {
        SchemaField {
            name: name.into(),
            schema,
            optional: false,
            default_value: None,
        }
    }

    pub fn optional(name: impl Into<String>, schema: SchemaNode) -> Self {
        SchemaField {
            optional: true,
            ..Self::new(name, schema)
        }
    }

    pub fn defaulted(name: impl Into<String>, schema: SchemaNode, default: Value) -> Self {
        SchemaField {
            default_value: Some(default),
            ..Self::new(name, schema)
        }
    }
}

/// Compiles a single schema node into a codec. A `$ref` node cannot be
/// compiled in isolation; use [build_all] with a registry instead.
pub fn build(node: &SchemaNode) -> Result<Codec, Error> {
    build_node(node, None)
}

/// Compiles every named schema of a registry, resolving `$ref` nodes
/// through lazily filled slots so recursive schemas work: each name gets a
/// slot before anything is compiled, and every slot is filled before this
/// function returns.
pub fn build_all(registry: &BTreeMap<String, SchemaNode>) -> Result<BTreeMap<String, Codec>, Error> {
    let slots: BTreeMap<String, LazyCodec> = registry
        .keys()
        .map(|name| (name.clone(), LazyCodec::unresolved(name.clone())))
        .collect();

    let mut codecs = BTreeMap::new();
    for (name, node) in registry {
        let codec = build_node(node, Some(&slots))?;
        slots[name].fill(codec.clone());
        codecs.insert(name.clone(), codec);
    }

    debug!(types = codecs.len(), "compiled schema registry");
    Ok(codecs)
}

fn build_node(
    node: &SchemaNode,
    slots: Option<&BTreeMap<String, LazyCodec>>,
) -> Result<Codec, Error> {
    let codec = match node {
        SchemaNode::Boolean => BooleanCodec::new().into(),
        SchemaNode::Null => NullCodec::new().into(),
        SchemaNode::ObjectIdentifier => ObjectIdentifierCodec::new().into(),
        SchemaNode::Integer {
            min,
            max,
            extensible,
        } => IntegerCodec::new(IntegerConstraints {
            min: *min,
            max: *max,
            extensible: *extensible,
        })
        .into(),
        SchemaNode::Enumerated {
            values,
            extension_values,
        } => EnumeratedCodec::new(values.clone(), extension_values.clone()).into(),
        SchemaNode::BitString { size } => BitStringCodec::new(size.to_constraints()?).into(),
        SchemaNode::OctetString { size } => OctetStringCodec::new(size.to_constraints()?).into(),
        SchemaNode::Ia5String { size, alphabet } => {
            CharacterStringCodec::new(char_kind(CharKind::Ia5, alphabet)?, size.to_constraints()?)
                .into()
        }
        SchemaNode::VisibleString { size, alphabet } => CharacterStringCodec::new(
            char_kind(CharKind::Visible, alphabet)?,
            size.to_constraints()?,
        )
        .into(),
        SchemaNode::Utf8String { size } => {
            CharacterStringCodec::utf8(size.to_constraints()?).into()
        }
        SchemaNode::Sequence {
            fields,
            extension_fields,
        } => SequenceCodec::new(
            build_fields(fields, slots)?,
            match extension_fields {
                Some(fields) => Some(build_fields(fields, slots)?),
                None => None,
            },
        )
        .into(),
        SchemaNode::SequenceOf { item, size } => {
            SequenceOfCodec::new(build_node(item, slots)?, size.to_constraints()?).into()
        }
        SchemaNode::Choice {
            alternatives,
            extension_alternatives,
        } => ChoiceCodec::new(
            build_alternatives(alternatives, slots)?,
            match extension_alternatives {
                Some(alternatives) => Some(build_alternatives(alternatives, slots)?),
                None => None,
            },
        )
        .into(),
        SchemaNode::Ref { name } => match slots {
            None => {
                return Err(Error::Schema(format!(
                    "cannot resolve reference `{name}` without registry"
                )));
            }
            Some(slots) => match slots.get(name) {
                Some(slot) => Codec::Lazy(slot.clone()),
                None => {
                    return Err(Error::Schema(format!(
                        "reference `{name}` is not in the registry"
                    )));
                }
            },
        },
    };

    Ok(codec)
}

fn char_kind(base: CharKind, alphabet: &Option<String>) -> Result<CharKind, Error> {
    match alphabet {
        Some(chars) => Ok(CharKind::Alphabet(Alphabet::new(chars)?)),
        None => Ok(base),
    }
}

fn build_fields(
    fields: &[SchemaField],
    slots: Option<&BTreeMap<String, LazyCodec>>,
) -> Result<Vec<SequenceField>, Error> {
    fields
        .iter()
        .map(|field| {
            Ok(SequenceField {
                name: field.name.clone(),
                codec: build_node(&field.schema, slots).map_err(|e| e.at(&field.name))?,
                optional: field.optional,
                default: field.default_value.clone(),
            })
        })
        .collect()
}

fn build_alternatives(
    alternatives: &[SchemaField],
    slots: Option<&BTreeMap<String, LazyCodec>>,
) -> Result<Vec<ChoiceAlternative>, Error> {
    alternatives
        .iter()
        .map(|alternative| {
            Ok(ChoiceAlternative {
                name: alternative.name.clone(),
                codec: build_node(&alternative.schema, slots).map_err(|e| e.at(&alternative.name))?,
            })
        })
        .collect()
}
