//! Error types shared by the buffer, the codecs, and the schema engine.

use thiserror::Error;

/// Every failure the library can surface. Encode, decode, build, parse and
/// convert all return this type; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A decode tried to read past the bits available in the buffer.
    #[error("buffer underrun: needed {needed} bits, {available} available")]
    Underrun { needed: usize, available: usize },

    /// A single read or write wider than the 64-bit value window.
    #[error("bit window exceeded: {0} bits requested, 64 supported")]
    BitWindow(usize),

    /// A value outside the constraints declared on the codec.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Decoded bits that make no sense under the PER grammar.
    #[error("wire format error: {0}")]
    Wire(String),

    /// A schema that cannot be compiled or a reference that cannot be
    /// resolved at encode/decode time.
    #[error("schema error: {0}")]
    Schema(String),

    /// Syntactic failure in ASN.1 text input.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// The converter met a type name that is neither defined in the module
    /// nor a primitive.
    #[error("unresolved type reference `{0}`")]
    UnresolvedReference(String),

    /// A child error enriched with the path segment (field name, `[index]`,
    /// or alternative name) where it surfaced.
    #[error("{path}: {source}")]
    Context {
        path: String,
        #[source]
        source: Box<Error>,
    },
}

/// Flat taxonomy tag for [Error], ignoring [Error::Context] wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Underrun,
    BitWindow,
    Constraint,
    Wire,
    Schema,
    Parse,
    UnresolvedReference,
}

impl Error {
    /// Returns the taxonomy kind of the innermost error, looking through
    /// any [Error::Context] wrappers added by composite codecs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Underrun { .. } => ErrorKind::Underrun,
            Error::BitWindow(_) => ErrorKind::BitWindow,
            Error::Constraint(_) => ErrorKind::Constraint,
            Error::Wire(_) => ErrorKind::Wire,
            Error::Schema(_) => ErrorKind::Schema,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::UnresolvedReference(_) => ErrorKind::UnresolvedReference,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Wraps `self` with a path segment. Used by SEQUENCE, SEQUENCE OF and
    /// CHOICE to report where inside a composite a child failed.
    pub fn at(self, path: impl Into<String>) -> Error {
        Error::Context {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
