#![deny(missing_docs)]

//! # OpenAPI Specification Module
//!
//! - **models**: the compiled, immutable specification tree.
//! - **loader**: compilation of an OpenAPI 3.x document into that tree.
//! - **ref_utils**: local `$ref` resolution helpers.

mod loader;
pub mod models;
pub(crate) mod ref_utils;
mod shims;

pub use models::{
    AdditionalProperties, Constraints, Discriminator, MediaTypeSpec, OperationSpec, ParamSource,
    ParamStyle, ParameterSpec, RequestBodySpec, ResponseSpec, SchemaId, SchemaSpec, SchemaTable,
    SchemaType, SecurityRequirement, SecurityScheme, Specification,
};
