#![deny(missing_docs)]

//! # Specification Loader
//!
//! Compiles an already-valid OpenAPI 3.x document into a `Specification`.
//!
//! - Local `$ref`s into `components` are resolved; external documents are not fetched.
//! - Component schemas are allocated before compilation, so recursive schemas
//!   compile to `SchemaId` cycles.
//! - Path-level parameters merge into each operation (operation wins).
//! - Operation `security` overrides the document default.
//! - Implicit discriminator mappings are filled from component names.

use crate::error::{AppError, AppResult};
use crate::oas::models::{
    AdditionalProperties, Constraints, Discriminator, MediaTypeSpec, OperationSpec, ParamSource,
    ParamStyle, ParameterSpec, RequestBodySpec, ResponseSpec, SchemaId, SchemaSpec, SchemaTable,
    SchemaType, SecurityRequirement, SecurityScheme, Specification,
};
use crate::oas::ref_utils::extract_component_name;
use crate::oas::shims::{
    ShimHeader, ShimMediaType, ShimOpenApi, ShimParameter, ShimPathItem, ShimRequestBody,
    ShimResponse, ShimSecurityRequirement, ShimSecurityScheme, ShimServer,
};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use url::Url;

impl Specification {
    /// Compiles a YAML document.
    pub fn from_yaml(yaml_content: &str) -> AppResult<Self> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(yaml_content)?;
        // Integer keys (status codes) become strings here.
        let json = serde_json::to_value(yaml)?;
        Self::from_value(json)
    }

    /// Compiles a JSON document.
    pub fn from_json(json_content: &str) -> AppResult<Self> {
        Self::from_value(serde_json::from_str(json_content)?)
    }

    /// Compiles a document already parsed into JSON.
    pub fn from_value(document: JsonValue) -> AppResult<Self> {
        let openapi: ShimOpenApi = serde_json::from_value(document)?;
        check_version(&openapi)?;
        Loader::new(&openapi).load()
    }
}

fn check_version(openapi: &ShimOpenApi) -> AppResult<()> {
    match (&openapi.openapi, &openapi.swagger) {
        (Some(version), _) if version.starts_with("3.") => Ok(()),
        (Some(version), _) => Err(AppError::Document(format!(
            "Unsupported OpenAPI version: {}. Only 3.x is supported.",
            version
        ))),
        (None, Some(version)) => Err(AppError::Document(format!(
            "Swagger {} documents must be converted to OpenAPI 3.x first",
            version
        ))),
        (None, None) => Err(AppError::Document(
            "Invalid OpenAPI document: missing 'openapi' version field.".into(),
        )),
    }
}

struct Loader<'d> {
    doc: &'d ShimOpenApi,
    table: SchemaTable,
    component_ids: HashMap<String, SchemaId>,
}

impl<'d> Loader<'d> {
    fn new(doc: &'d ShimOpenApi) -> Self {
        Self {
            doc,
            table: SchemaTable::new(),
            component_ids: HashMap::new(),
        }
    }

    fn self_uri(&self) -> Option<&'d str> {
        self.doc.self_uri.as_deref()
    }

    fn load(mut self) -> AppResult<Specification> {
        let doc = self.doc;

        // 1. Component schemas: allocate first so references resolve in any order.
        for name in doc.components.schemas.keys() {
            let id = self.table.reserve();
            self.component_ids.insert(name.clone(), id);
        }
        for (name, raw) in &doc.components.schemas {
            let spec = self.schema_spec(raw)?;
            self.table.set(self.component_ids[name], spec);
        }

        // 2. Security schemes.
        let mut security_schemes = IndexMap::new();
        for (name, raw) in &doc.components.security_schemes {
            let raw = resolve_component(
                raw,
                "securitySchemes",
                &doc.components.security_schemes,
                self.self_uri(),
            )?;
            let shim: ShimSecurityScheme = serde_json::from_value(raw.clone())?;
            security_schemes.insert(name.clone(), compile_security_scheme(name, &shim)?);
        }

        // 3. Operations.
        let default_security = compile_security(
            doc.security.as_deref().unwrap_or(&[]),
            &security_schemes,
        )?;
        let mut operations = Vec::new();
        for (path, raw_item) in &doc.paths {
            if path.starts_with("x-") {
                continue;
            }
            let item: ShimPathItem = serde_json::from_value(raw_item.clone()).map_err(|e| {
                AppError::Document(format!("Failed to parse path item '{}': {}", path, e))
            })?;
            let common = self.compile_parameters(&item.parameters)?;

            for (method, op) in item.operations() {
                let mut parameters = self.compile_parameters(&op.parameters)?;
                // Path-level parameters apply unless the operation overrides them.
                for param in &common {
                    let overridden = parameters
                        .iter()
                        .any(|p| p.name == param.name && p.location == param.location);
                    if !overridden {
                        parameters.push(param.clone());
                    }
                }

                let request_body = op
                    .request_body
                    .as_ref()
                    .map(|raw| self.compile_request_body(raw))
                    .transpose()?;

                let mut responses = IndexMap::new();
                for (status, raw) in &op.responses {
                    if status.starts_with("x-") {
                        continue;
                    }
                    let key = if status.eq_ignore_ascii_case("default") {
                        "default".to_string()
                    } else {
                        status.to_ascii_uppercase()
                    };
                    responses.insert(key, self.compile_response(raw)?);
                }

                let security = match &op.security {
                    Some(requirements) => compile_security(requirements, &security_schemes)?,
                    None => default_security.clone(),
                };

                operations.push(OperationSpec {
                    method: method.to_string(),
                    path_template: path.clone(),
                    operation_id: op.operation_id.clone(),
                    parameters,
                    request_body,
                    responses,
                    security,
                });
            }
        }

        Ok(Specification {
            schemas: self.table,
            operations,
            security_schemes,
            base_paths: compile_base_paths(&doc.servers),
        })
    }

    // --- Schemas ---

    fn compile_schema(&mut self, raw: &JsonValue) -> AppResult<SchemaId> {
        if let Some(reference) = ref_of(raw) {
            if raw.as_object().is_some_and(|o| o.len() == 1) {
                return self.schema_ref(reference);
            }
        }
        let spec = self.schema_spec(raw)?;
        Ok(self.table.push(spec))
    }

    fn schema_ref(&self, reference: &str) -> AppResult<SchemaId> {
        extract_component_name(reference, self.self_uri(), "schemas")
            .and_then(|name| self.component_ids.get(&name).copied())
            .ok_or_else(|| AppError::Reference(reference.to_string()))
    }

    fn schema_spec(&mut self, raw: &JsonValue) -> AppResult<SchemaSpec> {
        let obj = match raw {
            JsonValue::Bool(true) => return Ok(SchemaSpec::default()),
            JsonValue::Object(obj) => obj,
            other => {
                return Err(AppError::Document(format!(
                    "Unsupported schema definition: {}",
                    other
                )))
            }
        };

        let mut spec = SchemaSpec {
            format: obj.get("format").and_then(JsonValue::as_str).map(String::from),
            nullable: obj.get("nullable").and_then(JsonValue::as_bool).unwrap_or(false),
            required: string_list(obj.get("required")),
            default: obj.get("default").cloned(),
            enum_values: obj
                .get("enum")
                .and_then(JsonValue::as_array)
                .cloned()
                .or_else(|| obj.get("const").map(|c| vec![c.clone()])),
            constraints: compile_constraints(obj)?,
            ..SchemaSpec::default()
        };

        // A `$ref` with siblings (3.1) behaves as one more conjunct.
        if let Some(reference) = ref_of(raw) {
            spec.all_of.push(self.schema_ref(reference)?);
        }

        match obj.get("type") {
            Some(JsonValue::String(t)) => spec.schema_type = Some(parse_type(t)?),
            Some(JsonValue::Array(types)) => {
                let mut concrete = Vec::new();
                for t in types.iter().filter_map(JsonValue::as_str) {
                    match parse_type(t)? {
                        SchemaType::Null => spec.nullable = true,
                        other => concrete.push(other),
                    }
                }
                match concrete.as_slice() {
                    [] => spec.schema_type = Some(SchemaType::Null),
                    [single] => spec.schema_type = Some(*single),
                    many => {
                        for t in many {
                            let id = self.table.push(SchemaSpec::of_type(*t));
                            spec.any_of.push(id);
                        }
                    }
                }
            }
            _ => {}
        }

        if let Some(JsonValue::Object(props)) = obj.get("properties") {
            for (name, prop) in props {
                let id = self.compile_schema(prop)?;
                spec.properties.insert(name.clone(), id);
            }
        }
        if let Some(items) = obj.get("items") {
            spec.items = Some(self.compile_schema(items)?);
        }
        spec.additional_properties = match obj.get("additionalProperties") {
            Some(JsonValue::Bool(allowed)) => Some(AdditionalProperties::Allowed(*allowed)),
            Some(schema) => Some(AdditionalProperties::Schema(self.compile_schema(schema)?)),
            None => None,
        };

        for (keyword, target) in [
            ("allOf", &mut spec.all_of),
            ("oneOf", &mut spec.one_of),
            ("anyOf", &mut spec.any_of),
        ] {
            if let Some(JsonValue::Array(members)) = obj.get(keyword) {
                for member in members {
                    target.push(self.compile_schema(member)?);
                }
            }
        }

        if let Some(JsonValue::Object(disc)) = obj.get("discriminator") {
            spec.discriminator = Some(self.compile_discriminator(obj, disc)?);
        }

        Ok(spec)
    }

    fn compile_discriminator(
        &self,
        schema: &Map<String, JsonValue>,
        disc: &Map<String, JsonValue>,
    ) -> AppResult<Discriminator> {
        let property_name = disc
            .get("propertyName")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Document("Discriminator missing 'propertyName'".into()))?
            .to_string();

        let mut mapping = IndexMap::new();
        if let Some(JsonValue::Object(explicit)) = disc.get("mapping") {
            for (tag, target) in explicit {
                let target = target.as_str().ok_or_else(|| {
                    AppError::Document(format!("Discriminator mapping '{}' must be a string", tag))
                })?;
                let id = match self.component_ids.get(target) {
                    Some(id) => *id,
                    None => self.schema_ref(target)?,
                };
                mapping.insert(tag.clone(), id);
            }
        }

        // Implicit entries: the component name of each referenced variant.
        for keyword in ["oneOf", "anyOf"] {
            let Some(JsonValue::Array(members)) = schema.get(keyword) else {
                continue;
            };
            for reference in members.iter().filter_map(ref_of) {
                if let Some(name) = extract_component_name(reference, self.self_uri(), "schemas") {
                    if !mapping.contains_key(&name) {
                        let id = self.schema_ref(reference)?;
                        mapping.insert(name, id);
                    }
                }
            }
        }

        Ok(Discriminator {
            property_name,
            mapping,
        })
    }

    // --- Parameters ---

    fn compile_parameters(&mut self, raw_params: &[JsonValue]) -> AppResult<Vec<ParameterSpec>> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for raw in raw_params {
            let param = self.compile_parameter(raw)?;
            if !seen.insert((param.name.clone(), param.location)) {
                return Err(AppError::Document(format!(
                    "Duplicate parameter '{}' in location '{}'",
                    param.name, param.location
                )));
            }
            result.push(param);
        }
        Ok(result)
    }

    fn compile_parameter(&mut self, raw: &JsonValue) -> AppResult<ParameterSpec> {
        let doc = self.doc;
        let raw = resolve_component(raw, "parameters", &doc.components.parameters, self.self_uri())?;
        let shim: ShimParameter = serde_json::from_value(raw.clone())?;
        let name = shim.name.clone();

        let location = ParamSource::parse(&shim.location).ok_or_else(|| {
            AppError::Document(format!(
                "Parameter '{}' has unsupported location '{}'",
                name, shim.location
            ))
        })?;

        if location == ParamSource::Path && !shim.required {
            return Err(AppError::Document(format!(
                "Path parameter '{}' must set required: true",
                name
            )));
        }

        let style = shim
            .style
            .as_deref()
            .map(ParamStyle::parse)
            .unwrap_or_else(|| location.default_style());
        validate_style_for_location(&name, location, &style)?;

        let (schema, content_type) =
            self.parameter_schema(&name, shim.schema.as_ref(), shim.content.as_ref())?;

        Ok(ParameterSpec {
            name,
            location,
            required: shim.required,
            explode: shim.explode.unwrap_or_else(|| style.default_explode()),
            style,
            schema,
            content_type,
        })
    }

    fn compile_header(&mut self, name: &str, raw: &JsonValue) -> AppResult<ParameterSpec> {
        let doc = self.doc;
        let raw = resolve_component(raw, "headers", &doc.components.headers, self.self_uri())?;
        let shim: ShimHeader = serde_json::from_value(raw.clone())?;
        let style = shim
            .style
            .as_deref()
            .map(ParamStyle::parse)
            .unwrap_or(ParamStyle::Simple);
        validate_style_for_location(name, ParamSource::Header, &style)?;
        let (schema, content_type) =
            self.parameter_schema(name, shim.schema.as_ref(), shim.content.as_ref())?;

        Ok(ParameterSpec {
            name: name.to_string(),
            location: ParamSource::Header,
            required: shim.required,
            explode: shim.explode.unwrap_or(false),
            style,
            schema,
            content_type,
        })
    }

    fn parameter_schema(
        &mut self,
        name: &str,
        schema: Option<&JsonValue>,
        content: Option<&IndexMap<String, ShimMediaType>>,
    ) -> AppResult<(Option<SchemaId>, Option<String>)> {
        match (schema, content) {
            (Some(_), Some(_)) => Err(AppError::Document(format!(
                "Parameter '{}' cannot specify both 'schema' and 'content'",
                name
            ))),
            (Some(schema), None) => Ok((Some(self.compile_schema(schema)?), None)),
            (None, Some(content)) => {
                if content.len() != 1 {
                    return Err(AppError::Document(format!(
                        "Parameter '{}' must define exactly one media type in 'content'",
                        name
                    )));
                }
                let (media_type, media) = content.iter().next().ok_or_else(|| {
                    AppError::Document(format!("Parameter '{}' has empty content map", name))
                })?;
                let schema = media
                    .schema
                    .as_ref()
                    .map(|s| self.compile_schema(s))
                    .transpose()?;
                Ok((schema, Some(media_type.clone())))
            }
            (None, None) => Ok((None, None)),
        }
    }

    // --- Bodies and responses ---

    fn compile_request_body(&mut self, raw: &JsonValue) -> AppResult<RequestBodySpec> {
        let doc = self.doc;
        let raw = resolve_component(raw, "requestBodies", &doc.components.request_bodies, self.self_uri())?;
        let shim: ShimRequestBody = serde_json::from_value(raw.clone())?;
        Ok(RequestBodySpec {
            required: shim.required,
            content: self.compile_content(&shim.content)?,
        })
    }

    fn compile_response(&mut self, raw: &JsonValue) -> AppResult<ResponseSpec> {
        let doc = self.doc;
        let raw = resolve_component(raw, "responses", &doc.components.responses, self.self_uri())?;
        let shim: ShimResponse = serde_json::from_value(raw.clone())?;

        let mut headers = Vec::new();
        for (name, raw_header) in &shim.headers {
            // Content-Type is described by `content`, never as a header.
            if name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            headers.push(self.compile_header(name, raw_header)?);
        }

        Ok(ResponseSpec {
            content: self.compile_content(&shim.content)?,
            headers,
        })
    }

    fn compile_content(
        &mut self,
        content: &IndexMap<String, ShimMediaType>,
    ) -> AppResult<IndexMap<String, MediaTypeSpec>> {
        let mut result = IndexMap::new();
        for (content_type, media) in content {
            let schema = media
                .schema
                .as_ref()
                .map(|s| self.compile_schema(s))
                .transpose()?;
            let key = content_type.to_ascii_lowercase();
            result.insert(
                key.clone(),
                MediaTypeSpec {
                    content_type: key,
                    schema,
                },
            );
        }
        Ok(result)
    }
}

// --- Free helpers ---

fn ref_of(raw: &JsonValue) -> Option<&str> {
    raw.get("$ref").and_then(JsonValue::as_str)
}

/// Follows `$ref` chains inside one components section.
fn resolve_component<'a>(
    raw: &'a JsonValue,
    section: &str,
    entries: &'a IndexMap<String, JsonValue>,
    self_uri: Option<&str>,
) -> AppResult<&'a JsonValue> {
    let mut current = raw;
    let mut visiting = HashSet::new();
    while let Some(reference) = ref_of(current) {
        let name = extract_component_name(reference, self_uri, section)
            .ok_or_else(|| AppError::Reference(reference.to_string()))?;
        if !visiting.insert(name.clone()) {
            return Err(AppError::Reference(format!(
                "Circular reference at '{}'",
                reference
            )));
        }
        current = entries
            .get(&name)
            .ok_or_else(|| AppError::Reference(reference.to_string()))?;
    }
    Ok(current)
}

fn parse_type(t: &str) -> AppResult<SchemaType> {
    SchemaType::parse(t)
        .ok_or_else(|| AppError::Document(format!("Unknown schema type '{}'", t)))
}

fn string_list(raw: Option<&JsonValue>) -> Vec<String> {
    raw.and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn compile_constraints(obj: &Map<String, JsonValue>) -> AppResult<Constraints> {
    let usize_of = |key: &str| {
        obj.get(key)
            .and_then(JsonValue::as_u64)
            .map(|n| n as usize)
    };
    let f64_of = |key: &str| obj.get(key).and_then(JsonValue::as_f64);

    let mut constraints = Constraints {
        min_length: usize_of("minLength"),
        max_length: usize_of("maxLength"),
        pattern: obj
            .get("pattern")
            .and_then(JsonValue::as_str)
            .map(Regex::new)
            .transpose()?,
        minimum: f64_of("minimum"),
        maximum: f64_of("maximum"),
        multiple_of: f64_of("multipleOf"),
        min_items: usize_of("minItems"),
        max_items: usize_of("maxItems"),
        unique_items: obj
            .get("uniqueItems")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
        min_properties: usize_of("minProperties"),
        max_properties: usize_of("maxProperties"),
        ..Constraints::default()
    };

    // 3.0 uses booleans, 3.1 uses the bound itself.
    match obj.get("exclusiveMinimum") {
        Some(JsonValue::Bool(b)) => constraints.exclusive_minimum = *b,
        Some(JsonValue::Number(n)) => {
            constraints.minimum = n.as_f64();
            constraints.exclusive_minimum = true;
        }
        _ => {}
    }
    match obj.get("exclusiveMaximum") {
        Some(JsonValue::Bool(b)) => constraints.exclusive_maximum = *b,
        Some(JsonValue::Number(n)) => {
            constraints.maximum = n.as_f64();
            constraints.exclusive_maximum = true;
        }
        _ => {}
    }

    Ok(constraints)
}

fn validate_style_for_location(name: &str, location: ParamSource, style: &ParamStyle) -> AppResult<()> {
    let is_allowed = match (location, style) {
        (_, ParamStyle::Custom(_)) => true,
        (ParamSource::Path, ParamStyle::Matrix | ParamStyle::Label | ParamStyle::Simple) => true,
        (
            ParamSource::Query,
            ParamStyle::Form
            | ParamStyle::SpaceDelimited
            | ParamStyle::PipeDelimited
            | ParamStyle::DeepObject,
        ) => true,
        (ParamSource::Header, ParamStyle::Simple) => true,
        (ParamSource::Cookie, ParamStyle::Form) => true,
        _ => false,
    };

    if !is_allowed {
        return Err(AppError::Document(format!(
            "Parameter '{}' uses style '{}' which is not allowed for {} parameters",
            name,
            style.as_str(),
            location
        )));
    }
    Ok(())
}

fn compile_security_scheme(name: &str, shim: &ShimSecurityScheme) -> AppResult<SecurityScheme> {
    match shim.kind.as_str() {
        "apiKey" => {
            let key_name = shim.name.clone().ok_or_else(|| {
                AppError::Document(format!("apiKey scheme '{}' missing 'name'", name))
            })?;
            let location = shim
                .location
                .as_deref()
                .and_then(ParamSource::parse)
                .filter(|l| *l != ParamSource::Path)
                .ok_or_else(|| {
                    AppError::Document(format!(
                        "apiKey scheme '{}' must be located in query, header or cookie",
                        name
                    ))
                })?;
            Ok(SecurityScheme::ApiKey {
                name: key_name,
                location,
            })
        }
        "http" => {
            let scheme = shim.scheme.as_deref().ok_or_else(|| {
                AppError::Document(format!("http scheme '{}' missing 'scheme'", name))
            })?;
            Ok(SecurityScheme::Http {
                scheme: scheme.to_ascii_lowercase(),
                bearer_format: shim.bearer_format.clone(),
            })
        }
        "oauth2" => Ok(SecurityScheme::OAuth2),
        "openIdConnect" => Ok(SecurityScheme::OpenIdConnect),
        "mutualTLS" => Ok(SecurityScheme::MutualTls),
        other => Err(AppError::Document(format!(
            "Security scheme '{}' has unsupported type '{}'",
            name, other
        ))),
    }
}

fn compile_security(
    requirements: &[ShimSecurityRequirement],
    schemes: &IndexMap<String, SecurityScheme>,
) -> AppResult<Vec<SecurityRequirement>> {
    requirements
        .iter()
        .map(|requirement| {
            for scheme in requirement.keys() {
                if !schemes.contains_key(scheme) {
                    return Err(AppError::Reference(format!(
                        "Security requirement references undefined scheme '{}'",
                        scheme
                    )));
                }
            }
            Ok(SecurityRequirement {
                schemes: requirement.clone(),
            })
        })
        .collect()
}

fn compile_base_paths(servers: &[ShimServer]) -> Vec<String> {
    let mut paths = Vec::new();
    for server in servers {
        let mut url = server.url.clone();
        for (var, value) in &server.variables {
            url = url.replace(&format!("{{{}}}", var), &value.default);
        }
        let path = match Url::parse(&url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url,
        };
        let path = path.trim_end_matches('/');
        if path.starts_with('/') && !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }
    paths
}
