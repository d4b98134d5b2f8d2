#![deny(missing_docs)]

//! # OpenAPI Models
//!
//! The compiled, read-only specification tree validators run against.
//!
//! Schemas live in a `SchemaTable` arena and reference each other through
//! `SchemaId` indices, so recursive payload schemas compile to index cycles
//! rather than owning cycles. A `Specification` is built once and shared
//! behind an `Arc` by every concurrent validation call.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;

/// Index of a schema inside its `SchemaTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(usize);

impl SchemaId {
    /// Position inside the owning table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Arena owning every compiled schema of a specification.
///
/// Ids are only minted by `push`/`reserve`, so lookups through an id of the
/// same table always succeed.
#[derive(Debug, Clone, Default)]
pub struct SchemaTable {
    schemas: Vec<SchemaSpec>,
}

impl SchemaTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema and returns its id.
    pub fn push(&mut self, schema: SchemaSpec) -> SchemaId {
        self.schemas.push(schema);
        SchemaId(self.schemas.len() - 1)
    }

    /// Allocates an id for a schema compiled later (forward references).
    pub fn reserve(&mut self) -> SchemaId {
        self.push(SchemaSpec::default())
    }

    /// Replaces the schema behind a reserved id.
    pub fn set(&mut self, id: SchemaId, schema: SchemaSpec) {
        self.schemas[id.0] = schema;
    }

    /// Returns the schema behind `id`.
    pub fn get(&self, id: SchemaId) -> &SchemaSpec {
        &self.schemas[id.0]
    }

    /// Ids of every schema, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = SchemaId> {
        (0..self.schemas.len()).map(SchemaId)
    }

    /// Number of schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Closed set of schema `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    /// `string`
    String,
    /// `number`
    Number,
    /// `integer`
    Integer,
    /// `boolean`
    Boolean,
    /// `array`
    Array,
    /// `object`
    Object,
    /// `null` (OAS 3.1)
    Null,
}

impl SchemaType {
    /// Parses a `type` keyword value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// The keyword spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `additionalProperties` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalProperties {
    /// `true` or `false`.
    Allowed(bool),
    /// A schema undeclared properties must satisfy.
    Schema(SchemaId),
}

/// Polymorphism tag of a `oneOf`/`anyOf` schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    /// Property holding the tag.
    pub property_name: String,
    /// Tag value to variant schema (explicit and implicit entries).
    pub mapping: IndexMap<String, SchemaId>,
}

/// Keyword constraints besides type, format and enum.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// `minLength`
    pub min_length: Option<usize>,
    /// `maxLength`
    pub max_length: Option<usize>,
    /// `pattern`, compiled.
    pub pattern: Option<Regex>,
    /// `minimum`
    pub minimum: Option<f64>,
    /// `maximum`
    pub maximum: Option<f64>,
    /// `exclusiveMinimum` (boolean form; numeric form is folded into `minimum`).
    pub exclusive_minimum: bool,
    /// `exclusiveMaximum` (boolean form; numeric form is folded into `maximum`).
    pub exclusive_maximum: bool,
    /// `multipleOf`
    pub multiple_of: Option<f64>,
    /// `minItems`
    pub min_items: Option<usize>,
    /// `maxItems`
    pub max_items: Option<usize>,
    /// `uniqueItems`
    pub unique_items: bool,
    /// `minProperties`
    pub min_properties: Option<usize>,
    /// `maxProperties`
    pub max_properties: Option<usize>,
}

/// A compiled schema node.
#[derive(Debug, Clone, Default)]
pub struct SchemaSpec {
    /// `type`; `None` accepts any kind unless composition or object keywords apply.
    pub schema_type: Option<SchemaType>,
    /// `format`
    pub format: Option<String>,
    /// `nullable` (or `null` listed among 3.1 types).
    pub nullable: bool,
    /// `required`
    pub required: Vec<String>,
    /// `properties`
    pub properties: IndexMap<String, SchemaId>,
    /// `items`
    pub items: Option<SchemaId>,
    /// `additionalProperties`; `None` uses the validator default.
    pub additional_properties: Option<AdditionalProperties>,
    /// `allOf`
    pub all_of: Vec<SchemaId>,
    /// `oneOf`
    pub one_of: Vec<SchemaId>,
    /// `anyOf`
    pub any_of: Vec<SchemaId>,
    /// `discriminator`
    pub discriminator: Option<Discriminator>,
    /// `enum`
    pub enum_values: Option<Vec<JsonValue>>,
    /// `default`
    pub default: Option<JsonValue>,
    /// Remaining keyword constraints.
    pub constraints: Constraints,
}

impl SchemaSpec {
    /// A schema with only a `type`.
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// Whether a composition keyword drives this schema.
    pub fn has_composition(&self) -> bool {
        !self.all_of.is_empty() || !self.one_of.is_empty() || !self.any_of.is_empty()
    }

    /// The declared type, or `object`/`array` inferred from object/array keywords.
    pub fn effective_type(&self) -> Option<SchemaType> {
        self.schema_type.or_else(|| {
            if !self.properties.is_empty()
                || !self.required.is_empty()
                || self.additional_properties.is_some()
            {
                Some(SchemaType::Object)
            } else if self.items.is_some() {
                Some(SchemaType::Array)
            } else {
                None
            }
        })
    }
}

/// Parameter location (`in`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// Path.
    Path,
    /// Query.
    Query,
    /// Header.
    Header,
    /// Cookie.
    Cookie,
}

impl ParamSource {
    /// Parses an `in` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    /// The keyword spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }

    /// Default serialization style for the location.
    pub fn default_style(self) -> ParamStyle {
        match self {
            Self::Query | Self::Cookie => ParamStyle::Form,
            Self::Path | Self::Header => ParamStyle::Simple,
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter serialization style.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ParamStyle {
    /// `matrix`
    Matrix,
    /// `label`
    Label,
    /// `form`
    Form,
    /// `simple`
    #[default]
    Simple,
    /// `spaceDelimited`
    SpaceDelimited,
    /// `pipeDelimited`
    PipeDelimited,
    /// `deepObject`
    DeepObject,
    /// A style registered by the caller.
    Custom(String),
}

impl ParamStyle {
    /// Parses a `style` value; unknown names become `Custom`.
    pub fn parse(s: &str) -> Self {
        match s {
            "matrix" => Self::Matrix,
            "label" => Self::Label,
            "form" => Self::Form,
            "simple" => Self::Simple,
            "spaceDelimited" => Self::SpaceDelimited,
            "pipeDelimited" => Self::PipeDelimited,
            "deepObject" => Self::DeepObject,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The keyword spelling, used as the style registry key.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Matrix => "matrix",
            Self::Label => "label",
            Self::Form => "form",
            Self::Simple => "simple",
            Self::SpaceDelimited => "spaceDelimited",
            Self::PipeDelimited => "pipeDelimited",
            Self::DeepObject => "deepObject",
            Self::Custom(name) => name,
        }
    }

    /// `explode` default: `true` for `form`, `false` otherwise.
    pub fn default_explode(&self) -> bool {
        matches!(self, Self::Form)
    }
}

/// A declared parameter (also used for response headers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    /// Name in its location.
    pub name: String,
    /// Location.
    pub location: ParamSource,
    /// Whether absence is an error.
    pub required: bool,
    /// Serialization style.
    pub style: ParamStyle,
    /// Explode modifier.
    pub explode: bool,
    /// Schema of the value.
    pub schema: Option<SchemaId>,
    /// Media type of a `content`-serialized parameter.
    pub content_type: Option<String>,
}

impl ParameterSpec {
    /// A parameter with the location's default style and explode.
    pub fn new(name: impl Into<String>, location: ParamSource, schema: Option<SchemaId>) -> Self {
        let style = location.default_style();
        Self {
            name: name.into(),
            location,
            required: location == ParamSource::Path,
            explode: style.default_explode(),
            style,
            schema,
            content_type: None,
        }
    }
}

/// A media type entry of a `content` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypeSpec {
    /// Content type key as declared (may contain wildcards).
    pub content_type: String,
    /// Body schema, if declared.
    pub schema: Option<SchemaId>,
}

/// A request body declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestBodySpec {
    /// Whether an empty body is an error.
    pub required: bool,
    /// Content type to media type.
    pub content: IndexMap<String, MediaTypeSpec>,
}

/// A response declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSpec {
    /// Content type to media type.
    pub content: IndexMap<String, MediaTypeSpec>,
    /// Declared response headers.
    pub headers: Vec<ParameterSpec>,
}

/// One security requirement group (AND within the group).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement {
    /// Scheme name to required scopes.
    pub schemes: IndexMap<String, Vec<String>>,
}

/// A declared security scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    /// API key carried in a query parameter, header or cookie.
    ApiKey {
        /// Parameter name.
        name: String,
        /// Location.
        location: ParamSource,
    },
    /// HTTP authentication (basic, bearer, ...).
    Http {
        /// Scheme, lowercase.
        scheme: String,
        /// Format hint (e.g. JWT).
        bearer_format: Option<String>,
    },
    /// OAuth2 flows; a bearer token must be presented.
    OAuth2,
    /// OpenID Connect; a bearer token must be presented.
    OpenIdConnect,
    /// Mutual TLS; established by the transport before the request exists.
    MutualTls,
}

/// A compiled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    /// Uppercase HTTP method.
    pub method: String,
    /// Path template, e.g. `/pets/{id}`.
    pub path_template: String,
    /// `operationId`
    pub operation_id: Option<String>,
    /// Path-level and operation-level parameters, merged.
    pub parameters: Vec<ParameterSpec>,
    /// Request body.
    pub request_body: Option<RequestBodySpec>,
    /// Status code (`200`, `2XX`, `default`) to response.
    pub responses: IndexMap<String, ResponseSpec>,
    /// Alternative requirement groups (OR across groups). Empty means unsecured.
    pub security: Vec<SecurityRequirement>,
}

/// The compiled specification shared by validators.
#[derive(Debug, Clone, Default)]
pub struct Specification {
    /// Every schema of the document.
    pub schemas: SchemaTable,
    /// Every operation of the document.
    pub operations: Vec<OperationSpec>,
    /// Named security schemes.
    pub security_schemes: IndexMap<String, SecurityScheme>,
    /// Path prefixes taken from `servers`.
    pub base_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_then_set_keeps_id() {
        let mut table = SchemaTable::new();
        let id = table.reserve();
        let items = table.push(SchemaSpec::of_type(SchemaType::Integer));
        table.set(
            id,
            SchemaSpec {
                schema_type: Some(SchemaType::Array),
                items: Some(items),
                ..SchemaSpec::default()
            },
        );
        assert_eq!(table.get(id).schema_type, Some(SchemaType::Array));
        assert_eq!(table.get(id).items, Some(items));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_effective_type_inference() {
        let mut table = SchemaTable::new();
        let prop = table.push(SchemaSpec::default());
        let mut schema = SchemaSpec::default();
        assert_eq!(schema.effective_type(), None);
        schema.properties.insert("a".into(), prop);
        assert_eq!(schema.effective_type(), Some(SchemaType::Object));
    }

    #[test]
    fn test_parameter_defaults_per_location() {
        let query = ParameterSpec::new("q", ParamSource::Query, None);
        assert_eq!(query.style, ParamStyle::Form);
        assert!(query.explode);
        assert!(!query.required);

        let path = ParameterSpec::new("id", ParamSource::Path, None);
        assert_eq!(path.style, ParamStyle::Simple);
        assert!(!path.explode);
        assert!(path.required);
    }

    #[test]
    fn test_style_parse_custom() {
        assert_eq!(ParamStyle::parse("deepObject"), ParamStyle::DeepObject);
        assert_eq!(
            ParamStyle::parse("tabDelimited"),
            ParamStyle::Custom("tabDelimited".into())
        );
        assert_eq!(ParamStyle::Custom("x".into()).as_str(), "x");
    }
}
