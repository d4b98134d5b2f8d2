#![deny(missing_docs)]

//! # Document Shims
//!
//! Serde structures acting as an intermediate deserialization layer between
//! the raw document and the compiled `Specification`. They map directly to
//! OpenAPI objects and keep nested schemas and reference-able objects as raw
//! JSON so `$ref`s can be resolved against `components` during compilation.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// A security requirement object as written in the document.
pub(crate) type ShimSecurityRequirement = IndexMap<String, Vec<String>>;

/// Root document.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimOpenApi {
    /// OpenAPI version (e.g. "3.1.0").
    pub openapi: Option<String>,
    /// Swagger version, only read to reject 2.0 documents with a clear message.
    pub swagger: Option<String>,
    /// The `$self` keyword (OAS 3.2+).
    #[serde(rename = "$self")]
    pub self_uri: Option<String>,
    /// Server list; only the path part of each URL matters here.
    #[serde(default)]
    pub servers: Vec<ShimServer>,
    /// Raw path items keyed by template; `x-` keys are extensions.
    #[serde(default)]
    pub paths: IndexMap<String, JsonValue>,
    /// Reusable components.
    #[serde(default)]
    pub components: ShimComponents,
    /// Document-wide security requirements.
    pub security: Option<Vec<ShimSecurityRequirement>>,
}

/// Server object.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimServer {
    /// Server URL, possibly templated.
    pub url: String,
    /// Template variables.
    #[serde(default)]
    pub variables: IndexMap<String, ShimServerVariable>,
}

/// Server variable object.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimServerVariable {
    /// Substitution used when the template is expanded.
    pub default: String,
}

/// Components object; entries stay raw until referenced.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShimComponents {
    /// `schemas`
    #[serde(default)]
    pub schemas: IndexMap<String, JsonValue>,
    /// `parameters`
    #[serde(default)]
    pub parameters: IndexMap<String, JsonValue>,
    /// `requestBodies`
    #[serde(default)]
    pub request_bodies: IndexMap<String, JsonValue>,
    /// `responses`
    #[serde(default)]
    pub responses: IndexMap<String, JsonValue>,
    /// `headers`
    #[serde(default)]
    pub headers: IndexMap<String, JsonValue>,
    /// `securitySchemes`
    #[serde(default)]
    pub security_schemes: IndexMap<String, JsonValue>,
}

/// Path item object.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShimPathItem {
    /// Parameters shared by every operation of the path.
    #[serde(default)]
    pub parameters: Vec<JsonValue>,
    /// GET
    pub get: Option<ShimOperation>,
    /// PUT
    pub put: Option<ShimOperation>,
    /// POST
    pub post: Option<ShimOperation>,
    /// DELETE
    pub delete: Option<ShimOperation>,
    /// OPTIONS
    pub options: Option<ShimOperation>,
    /// HEAD
    pub head: Option<ShimOperation>,
    /// PATCH
    pub patch: Option<ShimOperation>,
    /// TRACE
    pub trace: Option<ShimOperation>,
}

impl ShimPathItem {
    /// Declared operations with their uppercase method.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &ShimOperation)> {
        [
            ("GET", &self.get),
            ("PUT", &self.put),
            ("POST", &self.post),
            ("DELETE", &self.delete),
            ("OPTIONS", &self.options),
            ("HEAD", &self.head),
            ("PATCH", &self.patch),
            ("TRACE", &self.trace),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    }
}

/// Operation object.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShimOperation {
    /// `operationId`
    pub operation_id: Option<String>,
    /// Raw parameters or references.
    #[serde(default)]
    pub parameters: Vec<JsonValue>,
    /// Raw request body or reference.
    pub request_body: Option<JsonValue>,
    /// Raw responses keyed by status.
    #[serde(default)]
    pub responses: IndexMap<String, JsonValue>,
    /// Operation security; overrides the document default when present.
    pub security: Option<Vec<ShimSecurityRequirement>>,
}

/// Parameter object.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimParameter {
    /// Name of the parameter.
    pub name: String,
    /// Location (query, path, header, cookie).
    #[serde(rename = "in")]
    pub location: String,
    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
    /// Serialization style.
    pub style: Option<String>,
    /// Explode modifier.
    pub explode: Option<bool>,
    /// Raw schema.
    pub schema: Option<JsonValue>,
    /// Media-type serialization, mutually exclusive with `schema`.
    pub content: Option<IndexMap<String, ShimMediaType>>,
}

/// Header object (a parameter without `name`/`in`).
#[derive(Debug, Deserialize)]
pub(crate) struct ShimHeader {
    /// Whether the header is required.
    #[serde(default)]
    pub required: bool,
    /// Serialization style; only `simple` is meaningful.
    pub style: Option<String>,
    /// Explode modifier.
    pub explode: Option<bool>,
    /// Raw schema.
    pub schema: Option<JsonValue>,
    /// Media-type serialization.
    pub content: Option<IndexMap<String, ShimMediaType>>,
}

/// Media type object.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimMediaType {
    /// Raw schema.
    pub schema: Option<JsonValue>,
}

/// Request body object.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimRequestBody {
    /// Whether an empty body is an error.
    #[serde(default)]
    pub required: bool,
    /// Content map.
    #[serde(default)]
    pub content: IndexMap<String, ShimMediaType>,
}

/// Response object.
#[derive(Debug, Deserialize)]
pub(crate) struct ShimResponse {
    /// Content map.
    #[serde(default)]
    pub content: IndexMap<String, ShimMediaType>,
    /// Raw headers or references.
    #[serde(default)]
    pub headers: IndexMap<String, JsonValue>,
}

/// Security scheme object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShimSecurityScheme {
    /// `type`
    #[serde(rename = "type")]
    pub kind: String,
    /// API key name.
    pub name: Option<String>,
    /// API key location.
    #[serde(rename = "in")]
    pub location: Option<String>,
    /// HTTP scheme.
    pub scheme: Option<String>,
    /// Bearer format hint.
    pub bearer_format: Option<String>,
}
