#![deny(missing_docs)]

//! # Validation Errors
//!
//! Error values produced by validation, and the `ValidationResult` that
//! carries them. A validation never returns `Err`: every problem becomes a
//! `ValidationError` with the message part it concerns (`Location`), the
//! position inside that part's value (`InstancePath`) and its category
//! (`ErrorKind`).

use crate::oas::models::{ParamSource, SchemaType};
use crate::value::ValueKind;
use derive_more::Display;
use serde::Serialize;
use std::fmt;

/// Category of a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ErrorKind {
    /// No path template matches the request path.
    #[display("path not found")]
    PathNotFound,
    /// A template matches but declares no operation for the method.
    #[display("operation not allowed")]
    OperationNotAllowed,
    /// A required parameter is absent.
    #[display("missing parameter")]
    MissingParameter,
    /// A raw parameter value does not follow its style.
    #[display("parameter deserialize error")]
    ParameterDeserialize,
    /// No deserializer or declared media type for the content type.
    #[display("media type not supported")]
    MediaTypeNotSupported,
    /// The body could not be deserialized (malformed JSON, ...).
    #[display("media type deserialize error")]
    MediaTypeDeserialize,
    /// A required request body is empty.
    #[display("missing request body")]
    MissingRequestBody,
    /// The response status is not declared and no `default` exists.
    #[display("undeclared response")]
    UndeclaredResponse,
    /// Runtime kind differs from the schema type.
    #[display("invalid type: expected {expected}, got {actual}")]
    InvalidType {
        /// Schema type.
        expected: String,
        /// Runtime kind.
        actual: String,
    },
    /// The value cannot be parsed under its `format`.
    #[display("invalid format '{format}'")]
    Format {
        /// Format name.
        format: String,
    },
    /// `null` for a non-nullable schema.
    #[display("null not allowed")]
    NullNotAllowed,
    /// A `required` property is absent.
    #[display("missing property")]
    MissingProperty,
    /// An undeclared property while `additionalProperties` is `false`.
    #[display("unexpected property")]
    UnexpectedProperty,
    /// No `oneOf` member accepts the value.
    #[display("no oneOf match")]
    NoOneOfMatch,
    /// More than one `oneOf` member accepts the value.
    #[display("multiple oneOf matches")]
    MultipleOneOfMatch,
    /// No `anyOf` member accepts the value.
    #[display("no anyOf match")]
    NoAnyOfMatch,
    /// The discriminator tag is absent or unmapped.
    #[display("undefined discriminator value")]
    UndefinedDiscriminatorValue,
    /// The value is not one of the `enum` literals.
    #[display("enum mismatch")]
    EnumMismatch,
    /// A keyword constraint (`minLength`, `maximum`, ...) is violated.
    #[display("constraint '{keyword}' violated")]
    ConstraintViolation {
        /// Keyword name.
        keyword: String,
    },
    /// No security requirement group is satisfied.
    #[display("security validation error")]
    SecurityValidation,
}

impl ErrorKind {
    /// Builds an `InvalidType` kind.
    pub fn invalid_type(expected: SchemaType, actual: ValueKind) -> Self {
        Self::InvalidType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether the error stops validation of the whole call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PathNotFound | Self::OperationNotAllowed)
    }
}

/// The part of an HTTP message an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "in", rename_all = "camelCase")]
pub enum Location {
    /// Operation lookup (path and method).
    Operation,
    /// A declared parameter.
    Parameter {
        /// Parameter location.
        location: ParamSource,
        /// Parameter name.
        name: String,
    },
    /// The request or response body.
    Body,
    /// A security scheme.
    Security {
        /// Scheme name.
        scheme: String,
    },
    /// The response status.
    Response,
    /// A declared response header.
    ResponseHeader {
        /// Header name.
        name: String,
    },
    /// A free-standing value not attached to a message part.
    Value,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Operation => f.write_str("operation"),
            Location::Parameter { location, name } => write!(f, "{} parameter '{}'", location, name),
            Location::Body => f.write_str("body"),
            Location::Security { scheme } => write!(f, "security scheme '{}'", scheme),
            Location::Response => f.write_str("response"),
            Location::ResponseHeader { name } => write!(f, "response header '{}'", name),
            Location::Value => f.write_str("value"),
        }
    }
}

/// One step into a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object property.
    Key(String),
    /// Array index.
    Index(usize),
}

/// Position inside a value, rendered as a JSON Pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InstancePath(Vec<PathSegment>);

impl InstancePath {
    /// The root of the value.
    pub fn root() -> Self {
        Self::default()
    }

    /// Segments from the root.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Whether this is the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a segment in front (used while errors bubble up).
    pub fn prepend(&mut self, segment: PathSegment) {
        self.0.insert(0, segment);
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, "/{}", key.replace('~', "~0").replace('/', "~1"))?,
                PathSegment::Index(index) => write!(f, "/{}", index)?,
            }
        }
        Ok(())
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Message part.
    pub location: Location,
    /// Position inside the part's value.
    pub path: InstancePath,
    /// Category.
    pub kind: ErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl ValidationError {
    /// Creates an error at the root of a free-standing value.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            location: Location::Value,
            path: InstancePath::root(),
            kind,
            message: message.into(),
        }
    }

    /// Attaches the error to a message part.
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Nests the error under `segment`.
    pub fn under(mut self, segment: PathSegment) -> Self {
        self.path.prepend(segment);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            write!(f, "{}: {}", self.location, self.message)
        } else {
            write!(f, "{} at {}: {}", self.location, self.path, self.message)
        }
    }
}

/// Attaches every error of `errors` to `location`.
pub(crate) fn relocate(errors: Vec<ValidationError>, location: &Location) -> Vec<ValidationError> {
    errors
        .into_iter()
        .map(|e| e.at(location.clone()))
        .collect()
}

/// The errors of a failed validation, usable with `?`.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{} validation error(s): {}", _0.len(), render(_0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn render(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    /// Iterates over the errors.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }
}

/// Outcome of a validation call: a typed value or the collected errors.
///
/// An empty error list is the only success signal; the value is present
/// exactly when there are no errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult<T> {
    value: Option<T>,
    errors: Vec<ValidationError>,
}

impl<T> ValidationResult<T> {
    /// A successful result.
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            errors: Vec::new(),
        }
    }

    /// A failed result.
    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self {
            value: None,
            errors,
        }
    }

    /// Builds a result from a value or error list.
    pub fn from_result(result: Result<T, Vec<ValidationError>>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(errors) => Self::failure(errors),
        }
    }

    /// Whether validation succeeded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The typed value, on success.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The collected errors in discovery order.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Converts into a `Result`, raising the errors.
    pub fn into_result(self) -> Result<T, ValidationErrors> {
        match self.value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => Err(ValidationErrors(self.errors)),
        }
    }
}
