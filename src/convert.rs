//! Conversion from the ASN.1 abstract syntax tree to schema nodes.
//!
//! Referenced types are inlined while they are acyclic; a type that reaches
//! itself transitively becomes a `$ref` node, which [crate::schema::build_all]
//! later resolves through its lazy registry.

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use crate::asn1::{AsnField, AsnType, AsnValue, Module, SizeConstraint, StringKind};
use crate::errors::Error;
use crate::schema::{SchemaField, SchemaNode, SizeDef};
use crate::value::Value;

/// What to do with OBJECT IDENTIFIER fields during conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OidPolicy {
    /// Compile them like any other field.
    #[default]
    Keep,
    /// Drop SEQUENCE fields and CHOICE alternatives whose type resolves to
    /// OBJECT IDENTIFIER.
    Omit,
}

/// Options for [convert].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertOptions {
    pub oid: OidPolicy,
}

/// Converts a parsed module into a registry of schema nodes, one per type
/// assignment.
pub fn convert(
    module: &Module,
    options: &ConvertOptions,
) -> Result<BTreeMap<String, SchemaNode>, Error> {
    let types: BTreeMap<&str, &AsnType> = module
        .assignments
        .iter()
        .map(|a| (a.name.as_str(), &a.ty))
        .collect();

    let mut registry = BTreeMap::new();
    for assignment in &module.assignments {
        let mut ctx = Context {
            types: &types,
            options,
            visiting: HashSet::from([assignment.name.as_str()]),
        };
        let node = ctx.convert_type(&assignment.ty)?;

        if node == (SchemaNode::Ref { name: assignment.name.clone() }) {
            return Err(Error::Schema(format!(
                "type `{}` is a circular alias of itself",
                assignment.name
            )));
        }

        registry.insert(assignment.name.clone(), node);
    }

    Ok(registry)
}

struct Context<'a> {
    types: &'a BTreeMap<&'a str, &'a AsnType>,
    options: &'a ConvertOptions,
    visiting: HashSet<&'a str>,
}

impl<'a> Context<'a> {
    fn convert_type(&mut self, ty: &'a AsnType) -> Result<SchemaNode, Error> {
        let node = match ty {
            AsnType::Boolean => SchemaNode::Boolean,
            AsnType::Null => SchemaNode::Null,
            AsnType::ObjectIdentifier => SchemaNode::ObjectIdentifier,
            AsnType::Integer { constraint, .. } => {
                let constraint = constraint.unwrap_or_default();
                SchemaNode::Integer {
                    min: constraint.min,
                    max: constraint.max,
                    extensible: constraint.extensible,
                }
            }
            AsnType::Enumerated { root, extension } => SchemaNode::Enumerated {
                values: root.iter().map(|item| item.name.clone()).collect(),
                extension_values: extension
                    .as_ref()
                    .map(|items| items.iter().map(|item| item.name.clone()).collect()),
            },
            AsnType::BitString { size } => SchemaNode::BitString {
                size: size_def(size),
            },
            AsnType::OctetString { size } => SchemaNode::OctetString {
                size: size_def(size),
            },
            AsnType::CharacterString {
                kind,
                size,
                alphabet,
            } => {
                let size = size_def(size);
                match kind {
                    StringKind::Ia5 => SchemaNode::Ia5String {
                        size,
                        alphabet: alphabet.clone(),
                    },
                    StringKind::Visible => SchemaNode::VisibleString {
                        size,
                        alphabet: alphabet.clone(),
                    },
                    StringKind::Utf8 => {
                        if alphabet.is_some() {
                            return Err(Error::Schema(
                                "FROM constraint is not supported on UTF8String".to_string(),
                            ));
                        }
                        SchemaNode::Utf8String { size }
                    }
                }
            }
            AsnType::Sequence { fields, extension } => SchemaNode::Sequence {
                fields: self.convert_fields(fields)?,
                extension_fields: match extension {
                    Some(fields) => Some(self.convert_fields(fields)?),
                    None => None,
                },
            },
            AsnType::SequenceOf { size, item } => SchemaNode::SequenceOf {
                item: Box::new(self.convert_type(item)?),
                size: size_def(size),
            },
            AsnType::Choice {
                alternatives,
                extension,
            } => SchemaNode::Choice {
                alternatives: self.convert_fields(alternatives)?,
                extension_alternatives: match extension {
                    Some(alternatives) => Some(self.convert_fields(alternatives)?),
                    None => None,
                },
            },
            AsnType::Reference(name) => {
                let Some(&target) = self.types.get(name.as_str()) else {
                    return Err(Error::UnresolvedReference(name.clone()));
                };

                if self.visiting.contains(name.as_str()) {
                    trace!(name = %name, "recursive type reference");
                    return Ok(SchemaNode::Ref { name: name.clone() });
                }

                self.visiting.insert(name.as_str());
                let node = self.convert_type(target)?;
                self.visiting.remove(name.as_str());
                node
            }
        };

        Ok(node)
    }

    fn convert_fields(&mut self, fields: &'a [AsnField]) -> Result<Vec<SchemaField>, Error> {
        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            if self.options.oid == OidPolicy::Omit && self.resolves_to_oid(&field.ty) {
                continue;
            }

            out.push(SchemaField {
                name: field.name.clone(),
                schema: self.convert_type(&field.ty).map_err(|e| e.at(&field.name))?,
                optional: field.optional,
                default_value: match &field.default {
                    Some(value) => Some(self.convert_default(&field.ty, value)?),
                    None => None,
                },
            });
        }
        Ok(out)
    }

    /// Follows reference chains to decide whether a field is an
    /// OBJECT IDENTIFIER underneath.
    fn resolves_to_oid(&self, ty: &AsnType) -> bool {
        let mut seen = HashSet::new();
        let mut current = ty;
        loop {
            match current {
                AsnType::ObjectIdentifier => return true,
                AsnType::Reference(name) => {
                    if !seen.insert(name.as_str()) {
                        return false;
                    }
                    match self.types.get(name.as_str()) {
                        Some(&target) => current = target,
                        None => return false,
                    }
                }
                _ => return false,
            }
        }
    }

    fn convert_default(&self, ty: &AsnType, value: &AsnValue) -> Result<Value, Error> {
        match value {
            AsnValue::Integer(n) => Ok(Value::Integer(*n)),
            AsnValue::Boolean(b) => Ok(Value::Boolean(*b)),
            AsnValue::Text(text) => Ok(Value::Text(text.clone())),
            AsnValue::Identifier(name) => self.resolve_identifier_default(ty, name),
        }
    }

    /// An identifier DEFAULT is an enumerated value name, or one of the
    /// type's named INTEGER constants.
    fn resolve_identifier_default(&self, ty: &AsnType, name: &str) -> Result<Value, Error> {
        let mut seen = HashSet::new();
        let mut current = ty;
        loop {
            match current {
                AsnType::Enumerated { root, extension } => {
                    let known = root
                        .iter()
                        .chain(extension.iter().flatten())
                        .any(|item| item.name == name);
                    if !known {
                        return Err(Error::Schema(format!(
                            "DEFAULT `{name}` is not an enumerated value of the field's type"
                        )));
                    }
                    return Ok(Value::Enumerated(name.to_string()));
                }
                AsnType::Integer { named_values, .. } => {
                    return named_values
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| Value::Integer(*v))
                        .ok_or_else(|| {
                            Error::Schema(format!(
                                "DEFAULT `{name}` is not a named value of the field's type"
                            ))
                        });
                }
                AsnType::Reference(target) => {
                    if !seen.insert(target.as_str()) {
                        return Err(Error::Schema(format!(
                            "DEFAULT `{name}` cannot be resolved through a circular reference"
                        )));
                    }
                    match self.types.get(target.as_str()) {
                        Some(&next) => current = next,
                        None => return Err(Error::UnresolvedReference(target.clone())),
                    }
                }
                _ => {
                    return Err(Error::Schema(format!(
                        "DEFAULT `{name}` is not valid for the field's type"
                    )));
                }
            }
        }
    }
}

fn size_def(size: &Option<SizeConstraint>) -> SizeDef {
    match size {
        None => SizeDef::default(),
        Some(size) => SizeDef {
            fixed_size: size.fixed,
            min_size: size.min,
            max_size: size.max,
            extensible: size.extensible,
        },
    }
}
