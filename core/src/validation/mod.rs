#![deny(missing_docs)]

//! # Validation
//!
//! Request and response validation against a compiled `Specification`.
//!
//! - **finder**: path template matching and operation lookup.
//! - **params**: parameter extraction per style.
//! - **media_types**: body deserialization per content type.
//! - **unmarshal**: schema validation with typed output.
//! - **formats**: `format` casters.
//! - **security**: security requirement checks.
//! - **validator**: the orchestrator tying the above together.

pub(crate) mod casting;
pub mod errors;
pub mod finder;
pub mod formats;
pub mod media_types;
pub mod params;
pub mod security;
pub mod unmarshal;
pub mod validator;

pub use errors::{
    ErrorKind, InstancePath, Location, PathSegment, ValidationError, ValidationErrors,
    ValidationResult,
};
pub use finder::{OperationFinder, OperationMatch, PathTemplate};
pub use formats::{FormatCaster, FormatError, FormatRegistry};
pub use media_types::{
    select_media_type, DeserializeError, Deserialized, MediaType, MediaTypeDeserializer,
    MediaTypeRegistry,
};
pub use params::{
    ParameterDeserializer, ParameterSources, RawSource, Shape, StyleDeserializer, StyleError,
};
pub use security::SecurityValidator;
pub use unmarshal::SchemaUnmarshaller;
pub use validator::{
    Parameters, RequestValidator, RequestValues, ResponseValues, ValidatorBuilder,
    ValidatorOptions,
};
