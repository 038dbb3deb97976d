//! Textual ASN.1 front end: tokenizer and parser for the module subset the
//! schema engine understands.
//!
//! The output is an abstract syntax tree that still carries source
//! constructs (named INTEGER values, original constraint shapes); the
//! [crate::convert] module turns it into schema nodes.

use tracing::debug;

use crate::errors::Error;

/// A parsed `Name DEFINITIONS ... ::= BEGIN ... END` module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub assignments: Vec<TypeAssignment>,
}

/// One `Name ::= Type` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAssignment {
    pub name: String,
    pub ty: AsnType,
}

/// Abstract syntax for a type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AsnType {
    Boolean,
    Null,
    ObjectIdentifier,
    Integer {
        /// Named values from a `{ name(number), ... }` list. Parsed and
        /// kept, but named constants compile to plain INTEGER.
        named_values: Vec<(String, i64)>,
        constraint: Option<ValueConstraint>,
    },
    Enumerated {
        root: Vec<EnumItem>,
        /// `Some` when the type carries an extension marker.
        extension: Option<Vec<EnumItem>>,
    },
    BitString {
        size: Option<SizeConstraint>,
    },
    OctetString {
        size: Option<SizeConstraint>,
    },
    CharacterString {
        kind: StringKind,
        size: Option<SizeConstraint>,
        alphabet: Option<String>,
    },
    Sequence {
        fields: Vec<AsnField>,
        extension: Option<Vec<AsnField>>,
    },
    SequenceOf {
        size: Option<SizeConstraint>,
        item: Box<AsnType>,
    },
    Choice {
        alternatives: Vec<AsnField>,
        extension: Option<Vec<AsnField>>,
    },
    Reference(String),
}

/// Restricted character string flavors the parser recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    Ia5,
    Visible,
    Utf8,
}

/// One enumerated item, with its source number when present.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumItem {
    pub name: String,
    pub number: Option<i64>,
}

/// One SEQUENCE field or CHOICE alternative.
#[derive(Debug, Clone, PartialEq)]
pub struct AsnField {
    pub name: String,
    pub ty: AsnType,
    pub optional: bool,
    pub default: Option<AsnValue>,
}

/// A DEFAULT value as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum AsnValue {
    Integer(i64),
    Boolean(bool),
    Text(String),
    /// An identifier, typically an enumerated value name.
    Identifier(String),
}

/// `(lo..hi)`, `(n)`, optionally extensible. `MIN`/`MAX` bounds parse to
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueConstraint {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub extensible: bool,
}

/// `SIZE(n)` or `SIZE(lo..hi)`, optionally extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeConstraint {
    pub fixed: Option<usize>,
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub extensible: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(i64),
    Text(String),
    Assign,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Range,
    Ellipsis,
    Caret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pos {
    line: usize,
    column: usize,
}

fn parse_error(pos: Pos, message: impl Into<String>) -> Error {
    Error::Parse {
        line: pos.line,
        column: pos.column,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, Pos)>, Error> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    macro_rules! advance {
        () => {{
            if chars[i] == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
            i += 1;
        }};
    }

    while i < chars.len() {
        let c = chars[i];
        let pos = Pos { line, column };

        if c.is_whitespace() {
            advance!();
            continue;
        }

        if c == '-' && chars.get(i + 1) == Some(&'-') {
            advance!();
            advance!();
            // Comment runs to end of line or a closing `--`.
            while i < chars.len() && chars[i] != '\n' {
                if chars[i] == '-' && chars.get(i + 1) == Some(&'-') {
                    advance!();
                    advance!();
                    break;
                }
                advance!();
            }
            continue;
        }

        match c {
            '{' => {
                tokens.push((Token::LBrace, pos));
                advance!();
            }
            '}' => {
                tokens.push((Token::RBrace, pos));
                advance!();
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                advance!();
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                advance!();
            }
            ',' => {
                tokens.push((Token::Comma, pos));
                advance!();
            }
            '^' => {
                tokens.push((Token::Caret, pos));
                advance!();
            }
            ':' => {
                if chars.get(i + 1) == Some(&':') && chars.get(i + 2) == Some(&'=') {
                    tokens.push((Token::Assign, pos));
                    advance!();
                    advance!();
                    advance!();
                } else {
                    return Err(parse_error(pos, "expected `::=`"));
                }
            }
            '.' => {
                let mut dots = 0;
                while chars.get(i) == Some(&'.') {
                    dots += 1;
                    advance!();
                }
                match dots {
                    2 => tokens.push((Token::Range, pos)),
                    3 => tokens.push((Token::Ellipsis, pos)),
                    _ => return Err(parse_error(pos, format!("unexpected `{}`", ".".repeat(dots)))),
                }
            }
            '"' => {
                advance!();
                let mut value = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(parse_error(pos, "unterminated string")),
                        Some(&'"') => {
                            advance!();
                            break;
                        }
                        Some(&c) => {
                            value.push(c);
                            advance!();
                        }
                    }
                }
                tokens.push((Token::Text(value), pos));
            }
            _ if c == '-' || c.is_ascii_digit() => {
                let mut value = String::new();
                value.push(c);
                advance!();
                while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                    value.push(chars[i]);
                    advance!();
                }
                let number = value
                    .parse::<i64>()
                    .map_err(|_| parse_error(pos, format!("invalid number `{value}`")))?;
                tokens.push((Token::Number(number), pos));
            }
            _ if c.is_ascii_alphabetic() => {
                let mut word = String::new();
                word.push(c);
                advance!();
                loop {
                    match chars.get(i) {
                        Some(&c) if c.is_ascii_alphanumeric() => {
                            word.push(c);
                            advance!();
                        }
                        // Single hyphens are legal inside identifiers;
                        // `--` would start a comment.
                        Some(&'-')
                            if chars.get(i + 1).is_some_and(|c| c.is_ascii_alphanumeric()) =>
                        {
                            word.push('-');
                            advance!();
                        }
                        _ => break,
                    }
                }
                tokens.push((Token::Word(word), pos));
            }
            _ => return Err(parse_error(pos, format!("unexpected character `{c}`"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, Pos)>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(t, _)| t)
    }

    fn pos(&self) -> Pos {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map_or(Pos { line: 1, column: 1 }, |(_, p)| *p)
    }

    fn next(&mut self, expected: &str) -> Result<Token, Error> {
        match self.tokens.get(self.index) {
            Some((token, _)) => {
                self.index += 1;
                Ok(token.clone())
            }
            None => Err(parse_error(self.pos(), format!("expected {expected}, found end of input"))),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.index += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), Error> {
        let pos = self.pos();
        let found = self.next(expected)?;
        if found != token {
            return Err(parse_error(pos, format!("expected {expected}, found {found:?}")));
        }
        Ok(())
    }

    fn word(&mut self, expected: &str) -> Result<String, Error> {
        let pos = self.pos();
        match self.next(expected)? {
            Token::Word(word) => Ok(word),
            other => Err(parse_error(pos, format!("expected {expected}, found {other:?}"))),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), Error> {
        let pos = self.pos();
        let word = self.word(keyword)?;
        if word != keyword {
            return Err(parse_error(pos, format!("expected `{keyword}`, found `{word}`")));
        }
        Ok(())
    }

    fn eat_word(&mut self, keyword: &str) -> bool {
        if let Some(Token::Word(word)) = self.peek() {
            if word == keyword {
                self.index += 1;
                return true;
            }
        }
        false
    }

    fn number(&mut self) -> Result<i64, Error> {
        let pos = self.pos();
        match self.next("a number")? {
            Token::Number(n) => Ok(n),
            other => Err(parse_error(pos, format!("expected a number, found {other:?}"))),
        }
    }

    fn module(&mut self) -> Result<Module, Error> {
        let pos = self.pos();
        let name = self.word("a module name")?;
        if !name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return Err(parse_error(pos, "module name must start with an uppercase letter"));
        }

        self.keyword("DEFINITIONS")?;
        if self.eat_word("AUTOMATIC") || self.eat_word("EXPLICIT") || self.eat_word("IMPLICIT") {
            self.keyword("TAGS")?;
        }
        self.expect(Token::Assign, "`::=`")?;
        self.keyword("BEGIN")?;

        let mut assignments = Vec::new();
        loop {
            if self.eat_word("END") {
                break;
            }
            let pos = self.pos();
            let name = self.word("a type name or `END`")?;
            if !name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                return Err(parse_error(pos, format!("type name `{name}` must start with an uppercase letter")));
            }
            self.expect(Token::Assign, "`::=`")?;
            let ty = self.ty()?;
            assignments.push(TypeAssignment { name, ty });
        }

        if self.index != self.tokens.len() {
            return Err(parse_error(self.pos(), "unexpected input after `END`"));
        }

        Ok(Module { name, assignments })
    }

    fn ty(&mut self) -> Result<AsnType, Error> {
        let pos = self.pos();
        let word = self.word("a type")?;

        match word.as_str() {
            "BOOLEAN" => Ok(AsnType::Boolean),
            "NULL" => Ok(AsnType::Null),
            "OBJECT" => {
                self.keyword("IDENTIFIER")?;
                Ok(AsnType::ObjectIdentifier)
            }
            "INTEGER" => self.integer(),
            "ENUMERATED" => self.enumerated(),
            "BIT" => {
                self.keyword("STRING")?;
                Ok(AsnType::BitString {
                    size: self.optional_size_constraint()?,
                })
            }
            "OCTET" => {
                self.keyword("STRING")?;
                Ok(AsnType::OctetString {
                    size: self.optional_size_constraint()?,
                })
            }
            "IA5String" => self.character_string(StringKind::Ia5),
            "VisibleString" => self.character_string(StringKind::Visible),
            "UTF8String" => self.character_string(StringKind::Utf8),
            "SEQUENCE" => self.sequence(),
            "CHOICE" => self.choice(),
            _ if word.chars().next().is_some_and(|c| c.is_ascii_uppercase()) => {
                Ok(AsnType::Reference(word))
            }
            _ => Err(parse_error(pos, format!("expected a type, found `{word}`"))),
        }
    }

    fn integer(&mut self) -> Result<AsnType, Error> {
        let mut named_values = Vec::new();
        if self.eat(&Token::LBrace) {
            loop {
                let name = self.word("a named value")?;
                self.expect(Token::LParen, "`(`")?;
                let number = self.number()?;
                self.expect(Token::RParen, "`)`")?;
                named_values.push((name, number));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RBrace, "`}`")?;
        }

        let constraint = if self.eat(&Token::LParen) {
            let constraint = self.value_constraint()?;
            self.expect(Token::RParen, "`)`")?;
            Some(constraint)
        } else {
            None
        };

        Ok(AsnType::Integer {
            named_values,
            constraint,
        })
    }

    fn value_constraint(&mut self) -> Result<ValueConstraint, Error> {
        let min = self.bound(true)?;
        let mut constraint = if self.eat(&Token::Range) {
            ValueConstraint {
                min,
                max: self.bound(false)?,
                extensible: false,
            }
        } else {
            ValueConstraint {
                min,
                max: min,
                extensible: false,
            }
        };

        if self.eat(&Token::Comma) {
            self.expect(Token::Ellipsis, "`...`")?;
            constraint.extensible = true;
        }

        Ok(constraint)
    }

    /// One endpoint of a value range; `MIN`/`MAX` mean unbounded.
    fn bound(&mut self, low: bool) -> Result<Option<i64>, Error> {
        if low && self.eat_word("MIN") {
            return Ok(None);
        }
        if !low && self.eat_word("MAX") {
            return Ok(None);
        }
        Ok(Some(self.number()?))
    }

    fn enumerated(&mut self) -> Result<AsnType, Error> {
        self.expect(Token::LBrace, "`{`")?;

        let mut root = Vec::new();
        let mut extension = None;

        loop {
            if self.eat(&Token::Ellipsis) {
                if extension.is_some() {
                    return Err(parse_error(self.pos(), "duplicate `...` in ENUMERATED"));
                }
                extension = Some(Vec::new());
            } else {
                let name = self.word("an enumerated value")?;
                let number = if self.eat(&Token::LParen) {
                    let number = self.number()?;
                    self.expect(Token::RParen, "`)`")?;
                    Some(number)
                } else {
                    None
                };
                let item = EnumItem { name, number };
                match &mut extension {
                    Some(items) => items.push(item),
                    None => root.push(item),
                }
            }

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.expect(Token::RBrace, "`}`")?;
        Ok(AsnType::Enumerated { root, extension })
    }

    fn character_string(&mut self, kind: StringKind) -> Result<AsnType, Error> {
        let mut size = None;
        let mut alphabet = None;

        if self.eat(&Token::LParen) {
            loop {
                if self.eat_word("SIZE") {
                    self.expect(Token::LParen, "`(`")?;
                    size = Some(self.size_body()?);
                    self.expect(Token::RParen, "`)`")?;
                } else if self.eat_word("FROM") {
                    self.expect(Token::LParen, "`(`")?;
                    let pos = self.pos();
                    match self.next("a quoted alphabet")? {
                        Token::Text(text) => alphabet = Some(text),
                        other => {
                            return Err(parse_error(pos, format!("expected a quoted alphabet, found {other:?}")));
                        }
                    }
                    self.expect(Token::RParen, "`)`")?;
                } else {
                    return Err(parse_error(self.pos(), "expected `SIZE` or `FROM`"));
                }

                // Constraints may be intersected: (SIZE(..) ^ FROM("..")).
                if !(self.eat(&Token::Caret) || self.eat_word("INTERSECTION")) {
                    break;
                }
            }
            self.expect(Token::RParen, "`)`")?;
        }

        Ok(AsnType::CharacterString {
            kind,
            size,
            alphabet,
        })
    }

    fn optional_size_constraint(&mut self) -> Result<Option<SizeConstraint>, Error> {
        if !self.eat(&Token::LParen) {
            return Ok(None);
        }
        self.keyword("SIZE")?;
        self.expect(Token::LParen, "`(`")?;
        let size = self.size_body()?;
        self.expect(Token::RParen, "`)`")?;
        self.expect(Token::RParen, "`)`")?;
        Ok(Some(size))
    }

    fn size_body(&mut self) -> Result<SizeConstraint, Error> {
        let pos = self.pos();
        let lo = self.number()?;
        let lo = usize::try_from(lo).map_err(|_| parse_error(pos, "negative size"))?;

        let mut size = if self.eat(&Token::Range) {
            if self.eat_word("MAX") {
                SizeConstraint {
                    min: Some(lo),
                    ..SizeConstraint::default()
                }
            } else {
                let pos = self.pos();
                let hi = self.number()?;
                let hi = usize::try_from(hi).map_err(|_| parse_error(pos, "negative size"))?;
                SizeConstraint {
                    min: Some(lo),
                    max: Some(hi),
                    ..SizeConstraint::default()
                }
            }
        } else {
            SizeConstraint {
                fixed: Some(lo),
                ..SizeConstraint::default()
            }
        };

        if self.eat(&Token::Comma) {
            self.expect(Token::Ellipsis, "`...`")?;
            size.extensible = true;
        }

        Ok(size)
    }

    fn sequence(&mut self) -> Result<AsnType, Error> {
        // SEQUENCE (SIZE(..)) OF, SEQUENCE OF, or SEQUENCE { ... }.
        if self.peek() == Some(&Token::LParen) {
            let size = self.optional_size_constraint()?;
            self.keyword("OF")?;
            return Ok(AsnType::SequenceOf {
                size,
                item: Box::new(self.ty()?),
            });
        }
        if self.eat_word("OF") {
            return Ok(AsnType::SequenceOf {
                size: None,
                item: Box::new(self.ty()?),
            });
        }

        let (fields, extension) = self.field_list("a field name")?;
        Ok(AsnType::Sequence { fields, extension })
    }

    fn choice(&mut self) -> Result<AsnType, Error> {
        let (alternatives, extension) = self.field_list("an alternative name")?;
        Ok(AsnType::Choice {
            alternatives,
            extension,
        })
    }

    fn field_list(
        &mut self,
        what: &str,
    ) -> Result<(Vec<AsnField>, Option<Vec<AsnField>>), Error> {
        self.expect(Token::LBrace, "`{`")?;

        let mut fields = Vec::new();
        let mut extension: Option<Vec<AsnField>> = None;
        let mut closed = false;

        loop {
            if self.eat(&Token::Ellipsis) {
                if extension.is_none() {
                    extension = Some(Vec::new());
                } else if !closed {
                    // A second `...` closes the extension group.
                    closed = true;
                } else {
                    return Err(parse_error(self.pos(), "too many `...` markers"));
                }
            } else {
                let pos = self.pos();
                let name = self.word(what)?;
                if !name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
                    return Err(parse_error(pos, format!("{what} must start with a lowercase letter, found `{name}`")));
                }

                let ty = self.ty()?;
                let mut optional = false;
                let mut default = None;
                if self.eat_word("OPTIONAL") {
                    optional = true;
                } else if self.eat_word("DEFAULT") {
                    default = Some(self.default_value()?);
                }

                let field = AsnField {
                    name,
                    ty,
                    optional,
                    default,
                };
                match &mut extension {
                    Some(items) if !closed => items.push(field),
                    _ => fields.push(field),
                }
            }

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.expect(Token::RBrace, "`}`")?;
        Ok((fields, extension))
    }

    fn default_value(&mut self) -> Result<AsnValue, Error> {
        let pos = self.pos();
        match self.next("a DEFAULT value")? {
            Token::Number(n) => Ok(AsnValue::Integer(n)),
            Token::Text(text) => Ok(AsnValue::Text(text)),
            Token::Word(word) => match word.as_str() {
                "TRUE" => Ok(AsnValue::Boolean(true)),
                "FALSE" => Ok(AsnValue::Boolean(false)),
                _ => Ok(AsnValue::Identifier(word)),
            },
            other => Err(parse_error(pos, format!("expected a DEFAULT value, found {other:?}"))),
        }
    }
}

/// Parses one ASN.1 module. Failures carry the line and column of the
/// offending token.
pub fn parse(text: &str) -> Result<Module, Error> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, index: 0 };
    let module = parser.module()?;
    debug!(module = %module.name, types = module.assignments.len(), "parsed ASN.1 module");
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_type(body: &str) -> AsnType {
        let text = format!("M DEFINITIONS ::= BEGIN T ::= {body} END");
        let module = parse(&text).unwrap();
        module.assignments.into_iter().next().unwrap().ty
    }

    #[test]
    fn test_parse_module_header() {
        let module = parse("Intercode DEFINITIONS AUTOMATIC TAGS ::= BEGIN END").unwrap();
        assert_eq!(module.name, "Intercode");
        assert!(module.assignments.is_empty());
    }

    #[test]
    fn test_parse_primitive_types() {
        assert_eq!(parse_type("BOOLEAN"), AsnType::Boolean);
        assert_eq!(parse_type("NULL"), AsnType::Null);
        assert_eq!(parse_type("OBJECT IDENTIFIER"), AsnType::ObjectIdentifier);
    }

    #[test]
    fn test_parse_integer_constraints() {
        assert_eq!(
            parse_type("INTEGER (0..255)"),
            AsnType::Integer {
                named_values: vec![],
                constraint: Some(ValueConstraint {
                    min: Some(0),
                    max: Some(255),
                    extensible: false,
                }),
            }
        );
        assert_eq!(
            parse_type("INTEGER (-60..60)"),
            AsnType::Integer {
                named_values: vec![],
                constraint: Some(ValueConstraint {
                    min: Some(-60),
                    max: Some(60),
                    extensible: false,
                }),
            }
        );
        assert_eq!(
            parse_type("INTEGER (5)"),
            AsnType::Integer {
                named_values: vec![],
                constraint: Some(ValueConstraint {
                    min: Some(5),
                    max: Some(5),
                    extensible: false,
                }),
            }
        );
        assert_eq!(
            parse_type("INTEGER (0..MAX)"),
            AsnType::Integer {
                named_values: vec![],
                constraint: Some(ValueConstraint {
                    min: Some(0),
                    max: None,
                    extensible: false,
                }),
            }
        );
        assert_eq!(
            parse_type("INTEGER (0..7, ...)"),
            AsnType::Integer {
                named_values: vec![],
                constraint: Some(ValueConstraint {
                    min: Some(0),
                    max: Some(7),
                    extensible: true,
                }),
            }
        );
    }

    #[test]
    fn test_parse_integer_named_values() {
        assert_eq!(
            parse_type("INTEGER { disabled(0), enabled(1) } (0..1)"),
            AsnType::Integer {
                named_values: vec![("disabled".to_string(), 0), ("enabled".to_string(), 1)],
                constraint: Some(ValueConstraint {
                    min: Some(0),
                    max: Some(1),
                    extensible: false,
                }),
            }
        );
    }

    #[test]
    fn test_parse_enumerated_with_extension() {
        assert_eq!(
            parse_type("ENUMERATED { red(0), green(1), ..., blue }"),
            AsnType::Enumerated {
                root: vec![
                    EnumItem {
                        name: "red".to_string(),
                        number: Some(0),
                    },
                    EnumItem {
                        name: "green".to_string(),
                        number: Some(1),
                    },
                ],
                extension: Some(vec![EnumItem {
                    name: "blue".to_string(),
                    number: None,
                }]),
            }
        );
    }

    #[test]
    fn test_parse_strings_with_size_and_alphabet() {
        assert_eq!(
            parse_type("OCTET STRING (SIZE(3))"),
            AsnType::OctetString {
                size: Some(SizeConstraint {
                    fixed: Some(3),
                    ..SizeConstraint::default()
                }),
            }
        );
        assert_eq!(
            parse_type("IA5String (SIZE(0..64))"),
            AsnType::CharacterString {
                kind: StringKind::Ia5,
                size: Some(SizeConstraint {
                    min: Some(0),
                    max: Some(64),
                    ..SizeConstraint::default()
                }),
                alphabet: None,
            }
        );
        assert_eq!(
            parse_type("VisibleString (SIZE(1..4) ^ FROM(\"0123456789\"))"),
            AsnType::CharacterString {
                kind: StringKind::Visible,
                size: Some(SizeConstraint {
                    min: Some(1),
                    max: Some(4),
                    ..SizeConstraint::default()
                }),
                alphabet: Some("0123456789".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_sequence_with_markers() {
        let ty = parse_type(
            "SEQUENCE { id INTEGER (0..255), name IA5String OPTIONAL, count INTEGER DEFAULT 0, ..., extra BOOLEAN }",
        );
        let AsnType::Sequence { fields, extension } = ty else {
            panic!("expected a SEQUENCE");
        };
        assert_eq!(fields.len(), 3);
        assert!(!fields[0].optional);
        assert!(fields[1].optional);
        assert_eq!(fields[2].default, Some(AsnValue::Integer(0)));
        let extension = extension.unwrap();
        assert_eq!(extension.len(), 1);
        assert_eq!(extension[0].name, "extra");
    }

    #[test]
    fn test_parse_sequence_of_with_size() {
        assert_eq!(
            parse_type("SEQUENCE (SIZE(1..10)) OF INTEGER (0..255)"),
            AsnType::SequenceOf {
                size: Some(SizeConstraint {
                    min: Some(1),
                    max: Some(10),
                    ..SizeConstraint::default()
                }),
                item: Box::new(AsnType::Integer {
                    named_values: vec![],
                    constraint: Some(ValueConstraint {
                        min: Some(0),
                        max: Some(255),
                        extensible: false,
                    }),
                }),
            }
        );
    }

    #[test]
    fn test_parse_choice_with_extension() {
        let ty = parse_type("CHOICE { num INTEGER, flag BOOLEAN, ... }");
        let AsnType::Choice {
            alternatives,
            extension,
        } = ty
        else {
            panic!("expected a CHOICE");
        };
        assert_eq!(alternatives.len(), 2);
        assert_eq!(extension, Some(vec![]));
    }

    #[test]
    fn test_parse_comments_and_hyphenated_names() {
        let module = parse(
            "M DEFINITIONS ::= BEGIN\n\
             -- full line comment\n\
             T ::= ENUMERATED { point-of-sale, mobile -- inline -- }\n\
             END",
        )
        .unwrap();
        let AsnType::Enumerated { root, .. } = &module.assignments[0].ty else {
            panic!("expected an ENUMERATED");
        };
        assert_eq!(root[0].name, "point-of-sale");
        assert_eq!(root[1].name, "mobile");
    }

    #[test]
    fn test_syntax_error_carries_position() {
        let err = parse("M DEFINITIONS ::= BEGIN\nT ::= SEQ { }\nEND").unwrap_err();
        let Error::Parse { line, column, .. } = err else {
            panic!("expected a parse error, got {err:?}");
        };
        assert_eq!(line, 2);
        assert!(column > 1);
    }

    #[test]
    fn test_unterminated_string_is_parse_error() {
        let err = parse("M DEFINITIONS ::= BEGIN T ::= IA5String (FROM(\"abc END").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_trailing_input_rejected() {
        let err = parse("M DEFINITIONS ::= BEGIN END garbage").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
