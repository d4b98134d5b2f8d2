#![deny(missing_docs)]

//! # Conform Core
//!
//! Validates HTTP requests and responses against an OpenAPI 3.x description
//! and returns the typed values carried by a valid exchange.
//!
//! ```
//! use conform_core::{RequestModel, RequestValidator, Specification, Value};
//! use std::sync::Arc;
//!
//! # fn main() -> conform_core::AppResult<()> {
//! let spec = Specification::from_yaml(r#"
//! openapi: 3.0.3
//! info: { title: Pets, version: "1" }
//! paths:
//!   /pets:
//!     get:
//!       parameters:
//!         - { name: limit, in: query, schema: { type: integer } }
//!       responses:
//!         "200": { description: ok }
//! "#)?;
//! let validator = RequestValidator::new(Arc::new(spec))?;
//! let result = validator.validate_request(&RequestModel::new("GET", "/pets?limit=5"));
//! let values = result.value().expect("valid request");
//! assert_eq!(values.parameters.query.get("limit"), Some(&Value::Integer(5)));
//! # Ok(())
//! # }
//! ```

/// Shared error types.
pub mod error;

/// Typed values produced by validation.
pub mod value;

/// Transport-neutral request and response models.
pub mod http;

/// OpenAPI (OAS) compilation.
pub mod oas;

/// Request and response validation.
pub mod validation;

pub use error::{AppError, AppResult};
pub use http::{Headers, RequestModel, ResponseModel};
pub use oas::{
    OperationSpec, ParamSource, ParamStyle, ParameterSpec, SchemaId, SchemaSpec, SchemaTable,
    SchemaType, SecurityScheme, Specification,
};
pub use validation::{
    ErrorKind, FormatRegistry, Location, MediaTypeRegistry, ParameterDeserializer, Parameters,
    RequestValidator, RequestValues, ResponseValues, SchemaUnmarshaller, ValidationError,
    ValidationErrors, ValidationResult, ValidatorBuilder, ValidatorOptions,
};
pub use value::{Value, ValueKind};
