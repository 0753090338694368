use thiserror::Error;

use crate::structural_tag::Kind;

pub type Result<T, E = crate::Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct JsonError(pub serde_json::Error);

impl PartialEq for JsonError {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_string() == other.0.to_string()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonError(JsonError(e))
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("{kind} requires at least {expected} elements of type StructuralTag, got {actual}")]
    ArityError {
        kind: Kind,
        expected: usize,
        actual: usize,
    },
    #[error("Expected {expected}, got {found}")]
    TypeError {
        expected: &'static str,
        found: Box<str>,
    },
    #[error("Invalid value for StructuralTag: unknown type {0:?}")]
    InvalidStructuralTag(Box<str>),
    #[error("StructuralTagsConfig is deprecated and not supported, please use StructuralTag instead")]
    UnsupportedLegacyShape,
    #[error("{kind} is missing required field '{field}'")]
    MissingField { kind: Kind, field: &'static str },
    #[error("{kind} doesn't accept arguments, got {count}")]
    UnexpectedArguments { kind: Kind, count: usize },
    #[error("Nesting limit reached: {0}")]
    NestingLimitReached(usize),
    #[error("Only one structured output constraint can be set, got: {}", .0.join(", "))]
    ConflictingConstraints(Vec<&'static str>),
    #[error("{location}: {source}")]
    Nested {
        location: Box<str>,
        source: Box<Error>,
    },
    #[error(transparent)]
    JsonError(JsonError),
}

impl Error {
    pub(crate) fn type_error(expected: &'static str, found: impl Into<Box<str>>) -> Self {
        Self::TypeError {
            expected,
            found: found.into(),
        }
    }

    /// Wraps the error with the location it was raised at.
    pub(crate) fn at(self, location: impl Into<Box<str>>) -> Self {
        Self::Nested {
            location: location.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping all location wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Nested { source, .. } => source.root_cause(),
            e => e,
        }
    }

    /// Full location path of a nested error, outermost first, e.g. `Concat.tags[1].Tag.content`.
    pub fn location(&self) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = self;
        while let Self::Nested { location, source } = current {
            parts.push(location.as_ref());
            current = source;
        }
        (!parts.is_empty()).then(|| parts.join("."))
    }

    pub fn is_legacy_shape(&self) -> bool {
        matches!(self.root_cause(), Self::UnsupportedLegacyShape)
    }
}
