//! # Request/Response Validator
//!
//! The orchestrator: finds the operation, then deserializes and unmarshals
//! every declared parameter and the body, and checks security. Every error
//! is collected into one `ValidationResult`; only a failed operation lookup
//! stops a call early.

use crate::error::AppResult;
use crate::http::{RequestModel, ResponseModel};
use crate::oas::models::{
    MediaTypeSpec, OperationSpec, ParamSource, ParameterSpec, ResponseSpec, SchemaId, Specification,
};
use crate::validation::casting::coerce;
use crate::validation::errors::{relocate, ErrorKind, Location, ValidationError, ValidationResult};
use crate::validation::finder::OperationFinder;
use crate::validation::formats::{FormatCaster, FormatRegistry};
use crate::validation::media_types::{select_media_type, MediaTypeDeserializer, MediaTypeRegistry};
use crate::validation::params::{ParameterDeserializer, ParameterSources, StyleDeserializer};
use crate::validation::security::SecurityValidator;
use crate::validation::unmarshal::SchemaUnmarshaller;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Behaviour switches of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorOptions {
    /// Coerce string-sourced values (parameters, forms, multipart) to the
    /// primitive types of their schema before validation.
    pub cast_parameters: bool,
    /// Check security requirements.
    pub validate_security: bool,
    /// Whether object schemas without `additionalProperties` accept
    /// undeclared properties.
    pub additional_properties_default: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            cast_parameters: true,
            validate_security: true,
            additional_properties_default: true,
        }
    }
}

/// Validated parameters by location and name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parameters {
    /// Path parameters.
    pub path: IndexMap<String, Value>,
    /// Query parameters.
    pub query: IndexMap<String, Value>,
    /// Header parameters.
    pub header: IndexMap<String, Value>,
    /// Cookie parameters.
    pub cookie: IndexMap<String, Value>,
}

impl Parameters {
    /// Looks up a validated parameter.
    pub fn get(&self, location: ParamSource, name: &str) -> Option<&Value> {
        self.slot(location).get(name)
    }

    fn slot(&self, location: ParamSource) -> &IndexMap<String, Value> {
        match location {
            ParamSource::Path => &self.path,
            ParamSource::Query => &self.query,
            ParamSource::Header => &self.header,
            ParamSource::Cookie => &self.cookie,
        }
    }

    fn slot_mut(&mut self, location: ParamSource) -> &mut IndexMap<String, Value> {
        match location {
            ParamSource::Path => &mut self.path,
            ParamSource::Query => &mut self.query,
            ParamSource::Header => &mut self.header,
            ParamSource::Cookie => &mut self.cookie,
        }
    }
}

/// Typed values of a valid request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestValues {
    /// Parameters present in the request or filled from schema defaults.
    pub parameters: Parameters,
    /// Body, when one was declared and sent.
    pub body: Option<Value>,
    /// Schemes of the satisfied security requirement group.
    pub security: Vec<String>,
}

/// Typed values of a valid response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseValues {
    /// Declared headers present in the response.
    pub headers: IndexMap<String, Value>,
    /// Body, when content was declared and sent.
    pub body: Option<Value>,
}

/// Assembles a `RequestValidator`.
#[derive(Debug, Clone)]
pub struct ValidatorBuilder {
    spec: Arc<Specification>,
    options: ValidatorOptions,
    formats: FormatRegistry,
    media_types: MediaTypeRegistry,
    parameters: ParameterDeserializer,
}

impl ValidatorBuilder {
    /// Starts from the built-in formats, media types and styles.
    pub fn new(spec: Arc<Specification>) -> Self {
        Self {
            spec,
            options: ValidatorOptions::default(),
            formats: FormatRegistry::with_defaults(),
            media_types: MediaTypeRegistry::with_defaults(),
            parameters: ParameterDeserializer::with_defaults(),
        }
    }

    /// Replaces the options.
    pub fn options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds or replaces a format caster.
    pub fn format(mut self, name: impl Into<String>, caster: impl FormatCaster + 'static) -> Self {
        self.formats.register(name, caster);
        self
    }

    /// Adds or replaces a media type deserializer.
    pub fn media_type(
        mut self,
        media_type: impl Into<String>,
        deserializer: impl MediaTypeDeserializer + 'static,
    ) -> Self {
        self.media_types.register(media_type, deserializer);
        self
    }

    /// Adds or replaces a parameter style.
    pub fn style(mut self, name: impl Into<String>, deserializer: impl StyleDeserializer + 'static) -> Self {
        self.parameters.register_style(name, deserializer);
        self
    }

    /// Compiles the path templates and freezes the registries.
    pub fn build(self) -> AppResult<RequestValidator> {
        Ok(RequestValidator {
            finder: OperationFinder::new(self.spec)?,
            options: self.options,
            formats: self.formats,
            media_types: self.media_types,
            parameters: self.parameters,
        })
    }
}

/// Validates requests and responses against one specification.
///
/// Immutable after construction; share it across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    finder: OperationFinder,
    options: ValidatorOptions,
    formats: FormatRegistry,
    media_types: MediaTypeRegistry,
    parameters: ParameterDeserializer,
}

impl RequestValidator {
    /// A validator with the default options and registries.
    pub fn new(spec: Arc<Specification>) -> AppResult<Self> {
        Self::builder(spec).build()
    }

    /// A builder for custom options and registries.
    pub fn builder(spec: Arc<Specification>) -> ValidatorBuilder {
        ValidatorBuilder::new(spec)
    }

    /// The specification this validator checks against.
    pub fn specification(&self) -> &Arc<Specification> {
        self.finder.specification()
    }

    /// The options in effect.
    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Validates a request.
    pub fn validate_request(&self, request: &RequestModel) -> ValidationResult<RequestValues> {
        let found = match self.finder.find(&request.method, &request.path) {
            Ok(found) => found,
            Err(error) => {
                tracing::debug!(method = %request.method, path = %request.path, kind = %error.kind, "no operation");
                return ValidationResult::failure(vec![error]);
            }
        };
        let operation = found.operation;
        tracing::debug!(
            method = %operation.method,
            template = %operation.path_template,
            operation_id = ?operation.operation_id,
            "operation matched"
        );

        let sources = ParameterSources::from_request(request, found.path_params);
        let mut errors = Vec::new();

        let mut parameters = Parameters::default();
        for param in &operation.parameters {
            let location = Location::Parameter {
                location: param.location,
                name: param.name.clone(),
            };
            match self.validate_parameter(param, &sources, &location) {
                Ok(Some(value)) => {
                    parameters.slot_mut(param.location).insert(param.name.clone(), value);
                }
                Ok(None) => {}
                Err(e) => errors.extend(e),
            }
        }

        let body = match self.validate_request_body(operation, request) {
            Ok(body) => body,
            Err(e) => {
                errors.extend(e);
                None
            }
        };

        let mut security = Vec::new();
        if self.options.validate_security {
            let spec = self.specification();
            let validator = SecurityValidator::new(&spec.security_schemes, &self.parameters, &spec.schemas);
            match validator.validate(&operation.security, &sources) {
                Ok(satisfied) => security = satisfied,
                Err(e) => errors.extend(e),
            }
        }

        tracing::debug!(errors = errors.len(), "request validation finished");
        if errors.is_empty() {
            ValidationResult::success(RequestValues {
                parameters,
                body,
                security,
            })
        } else {
            ValidationResult::failure(errors)
        }
    }

    /// Validates the response `response` produced for `request`.
    pub fn validate_response(
        &self,
        request: &RequestModel,
        response: &ResponseModel,
    ) -> ValidationResult<ResponseValues> {
        let found = match self.finder.find(&request.method, &request.path) {
            Ok(found) => found,
            Err(error) => return ValidationResult::failure(vec![error]),
        };
        let operation = found.operation;
        let Some(declared) = find_response(operation, response.status) else {
            tracing::debug!(status = response.status, "undeclared response status");
            return ValidationResult::failure(vec![ValidationError::new(
                ErrorKind::UndeclaredResponse,
                format!("status {} is not declared", response.status),
            )
            .at(Location::Response)]);
        };

        let mut errors = Vec::new();
        let sources = ParameterSources::from_response(response);
        let mut headers = IndexMap::new();
        for header in &declared.headers {
            let location = Location::ResponseHeader {
                name: header.name.clone(),
            };
            match self.validate_parameter(header, &sources, &location) {
                Ok(Some(value)) => {
                    headers.insert(header.name.clone(), value);
                }
                Ok(None) => {}
                Err(e) => errors.extend(e),
            }
        }

        let body = if declared.content.is_empty() || response.body.is_empty() {
            None
        } else {
            match self.validate_body(&declared.content, response.content_type(), &response.body) {
                Ok(body) => body,
                Err(e) => {
                    errors.extend(e);
                    None
                }
            }
        };

        tracing::debug!(status = response.status, errors = errors.len(), "response validation finished");
        if errors.is_empty() {
            ValidationResult::success(ResponseValues { headers, body })
        } else {
            ValidationResult::failure(errors)
        }
    }

    fn unmarshaller(&self) -> SchemaUnmarshaller<'_> {
        SchemaUnmarshaller::new(&self.specification().schemas, &self.formats)
            .with_additional_properties_default(self.options.additional_properties_default)
    }

    fn validate_parameter(
        &self,
        param: &ParameterSpec,
        sources: &ParameterSources,
        location: &Location,
    ) -> Result<Option<Value>, Vec<ValidationError>> {
        let schemas = &self.specification().schemas;
        let extracted = self
            .parameters
            .deserialize(schemas, param, sources)
            .map_err(|e| vec![e.at(location.clone())])?;

        let value = match extracted {
            Some(raw) => match &param.content_type {
                Some(content_type) => {
                    let text = match raw {
                        Value::String(s) => s,
                        other => other.to_json().to_string(),
                    };
                    let deserialized = self
                        .media_types
                        .deserialize(content_type, text.as_bytes())
                        .map_err(|e| vec![e.at(location.clone())])?;
                    self.cast(param.schema, deserialized.value, deserialized.needs_casting)
                }
                None => self.cast(param.schema, raw, true),
            },
            None => match param.schema.and_then(|id| schemas.get(id).default.as_ref()) {
                Some(default) => Value::from(default),
                None => return Ok(None),
            },
        };

        match param.schema {
            Some(id) => self
                .unmarshaller()
                .apply(id, &value)
                .map(Some)
                .map_err(|e| relocate(e, location)),
            None => Ok(Some(value)),
        }
    }

    fn validate_request_body(
        &self,
        operation: &OperationSpec,
        request: &RequestModel,
    ) -> Result<Option<Value>, Vec<ValidationError>> {
        let Some(request_body) = &operation.request_body else {
            return Ok(None);
        };
        if request.body.is_empty() {
            if request_body.required {
                return Err(vec![ValidationError::new(
                    ErrorKind::MissingRequestBody,
                    "request body is required",
                )
                .at(Location::Body)]);
            }
            return Ok(None);
        }
        self.validate_body(&request_body.content, request.content_type(), &request.body)
    }

    fn validate_body(
        &self,
        content: &IndexMap<String, MediaTypeSpec>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Option<Value>, Vec<ValidationError>> {
        let media = select_media_type(content, content_type).ok_or_else(|| {
            vec![ValidationError::new(
                ErrorKind::MediaTypeNotSupported,
                format!(
                    "content type '{}' is not declared",
                    content_type.unwrap_or("<none>")
                ),
            )
            .at(Location::Body)]
        })?;

        let effective = content_type.unwrap_or(&media.content_type);
        let deserialized = self
            .media_types
            .deserialize(effective, body)
            .map_err(|e| vec![e.at(Location::Body)])?;
        let value = self.cast(media.schema, deserialized.value, deserialized.needs_casting);

        match media.schema {
            Some(id) => self
                .unmarshaller()
                .apply(id, &value)
                .map(Some)
                .map_err(|e| relocate(e, &Location::Body)),
            None => Ok(Some(value)),
        }
    }

    fn cast(&self, schema: Option<SchemaId>, value: Value, textual: bool) -> Value {
        match schema {
            Some(id) if textual && self.options.cast_parameters => {
                coerce(&self.specification().schemas, id, value)
            }
            _ => value,
        }
    }
}

/// Exact status, then its `NXX` range, then `default`.
fn find_response(operation: &OperationSpec, status: u16) -> Option<&ResponseSpec> {
    operation
        .responses
        .get(&status.to_string())
        .or_else(|| operation.responses.get(&format!("{}XX", status / 100)))
        .or_else(|| operation.responses.get("default"))
}
