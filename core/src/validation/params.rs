//! # Parameter Deserializer
//!
//! Extraction of raw parameter values from their location according to the
//! declared `style` and `explode` policy.
//!
//! The output is a string-leaved `Value` (a string, an array of strings or
//! an object of strings) shaped after the parameter schema; casting the
//! leaves to the schema's primitive types happens afterwards.
//!
//! | style          | location      | array, explode=false | array, explode=true |
//! |----------------|---------------|----------------------|---------------------|
//! | matrix         | path          | `;id=3,4,5`          | `;id=3;id=4;id=5`   |
//! | label          | path          | `.3,4,5`             | `.3.4.5`            |
//! | form           | query, cookie | `id=3,4,5`           | `id=3&id=4&id=5`    |
//! | simple         | path, header  | `3,4,5`              | `3,4,5`             |
//! | spaceDelimited | query         | `id=3%204%205`       | `id=3&id=4&id=5`    |
//! | pipeDelimited  | query         | `id=3\|4\|5`         | `id=3&id=4&id=5`    |
//! | deepObject     | query         | n/a                  | n/a                 |

use crate::http::{Headers, RequestModel, ResponseModel};
use crate::oas::models::{ParamSource, ParameterSpec, SchemaId, SchemaTable, SchemaType};
use crate::validation::errors::{ErrorKind, Location, ValidationError};
use crate::value::Value;
use derive_more::Display;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where the raw text of one parameter comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSource<'a> {
    /// Decoded query pairs in order; the style picks the keys it needs.
    Pairs(&'a [(String, String)]),
    /// A single value (path segment, header, cookie).
    Single {
        /// The raw text.
        raw: Cow<'a, str>,
        /// Whether pieces must be percent-decoded after splitting.
        percent_encoded: bool,
    },
}

/// Shape the schema expects, deciding how raw text is split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// A scalar.
    Primitive,
    /// A sequence of scalars.
    Array,
    /// A mapping; `properties` lists declared names (empty when open).
    Object {
        /// Declared property names.
        properties: Vec<String>,
    },
}

impl Shape {
    /// The shape of schema `id`, looking through untyped compositions.
    pub fn of(schemas: &SchemaTable, id: Option<SchemaId>) -> Self {
        let mut current = id;
        for _ in 0..16 {
            let Some(id) = current else { break };
            let schema = schemas.get(id);
            match schema.effective_type() {
                Some(SchemaType::Array) => return Shape::Array,
                Some(SchemaType::Object) => {
                    let mut properties: Vec<String> = schema.properties.keys().cloned().collect();
                    for member in &schema.all_of {
                        properties.extend(schemas.get(*member).properties.keys().cloned());
                    }
                    return Shape::Object { properties };
                }
                Some(_) => return Shape::Primitive,
                None => {
                    current = schema
                        .all_of
                        .iter()
                        .chain(&schema.one_of)
                        .chain(&schema.any_of)
                        .next()
                        .copied();
                }
            }
        }
        Shape::Primitive
    }
}

/// A raw parameter value does not follow its style.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{_0}")]
pub struct StyleError(pub String);

impl std::error::Error for StyleError {}

/// Deserializes one style.
pub trait StyleDeserializer: Send + Sync {
    /// Extracts the value of `param` from `source`; `Ok(None)` when absent.
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError>;
}

impl<F> StyleDeserializer for F
where
    F: Fn(&ParameterSpec, &Shape, &RawSource<'_>) -> Result<Option<Value>, StyleError> + Send + Sync,
{
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        self(param, shape, source)
    }
}

fn decode(piece: &str, percent_encoded: bool) -> String {
    if percent_encoded {
        percent_decode_str(piece).decode_utf8_lossy().into_owned()
    } else {
        piece.to_string()
    }
}

fn strings(pieces: impl IntoIterator<Item = String>) -> Value {
    Value::Array(pieces.into_iter().map(Value::String).collect())
}

/// `k1,v1,k2,v2` into an object.
fn object_from_pairs(pieces: Vec<String>) -> Result<Value, StyleError> {
    if pieces.len() % 2 != 0 {
        return Err(StyleError(
            "object value has an odd number of key/value items".to_string(),
        ));
    }
    let mut map = IndexMap::new();
    let mut iter = pieces.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        map.insert(key, Value::String(value));
    }
    Ok(Value::Object(map))
}

/// `k1=v1,k2=v2` (already split) into an object.
fn object_from_assignments<'s>(
    pieces: impl IntoIterator<Item = &'s str>,
    percent_encoded: bool,
) -> Result<Value, StyleError> {
    let mut map = IndexMap::new();
    for piece in pieces {
        let (key, value) = piece
            .split_once('=')
            .ok_or_else(|| StyleError(format!("expected key=value, got '{}'", piece)))?;
        map.insert(
            decode(key, percent_encoded),
            Value::String(decode(value, percent_encoded)),
        );
    }
    Ok(Value::Object(map))
}

/// Splits a single delimited value into the requested shape.
fn split_single(
    raw: &str,
    delimiter: char,
    shape: &Shape,
    explode: bool,
    percent_encoded: bool,
) -> Result<Value, StyleError> {
    let split = |s: &str| -> Vec<String> {
        if s.is_empty() {
            Vec::new()
        } else {
            s.split(delimiter).map(|p| decode(p, percent_encoded)).collect()
        }
    };
    match shape {
        Shape::Primitive => Ok(Value::String(decode(raw, percent_encoded))),
        Shape::Array => Ok(strings(split(raw))),
        Shape::Object { .. } if explode => {
            object_from_assignments(raw.split(delimiter).filter(|p| !p.is_empty()), percent_encoded)
        }
        Shape::Object { .. } => object_from_pairs(split(raw)),
    }
}

fn values_of<'a>(pairs: &'a [(String, String)], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    pairs
        .iter()
        .filter(move |(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Query styles sharing the repeated-key explode form.
fn query_value(
    param: &ParameterSpec,
    shape: &Shape,
    pairs: &[(String, String)],
    delimiter: char,
) -> Result<Option<Value>, StyleError> {
    let first = values_of(pairs, &param.name).next();
    match shape {
        Shape::Primitive => Ok(first.map(Value::from)),
        Shape::Array if param.explode => {
            let all: Vec<String> = values_of(pairs, &param.name).map(str::to_string).collect();
            Ok((!all.is_empty()).then(|| strings(all)))
        }
        Shape::Object { properties } if param.explode => {
            let map: IndexMap<String, Value> = pairs
                .iter()
                .filter(|(key, _)| properties.is_empty() || properties.contains(key))
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            Ok((!map.is_empty()).then_some(Value::Object(map)))
        }
        _ => first
            .map(|raw| split_single(raw, delimiter, shape, false, false))
            .transpose(),
    }
}

/// `form` style (query and cookie).
#[derive(Debug, Clone, Copy, Default)]
pub struct FormStyle;

impl StyleDeserializer for FormStyle {
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        match source {
            RawSource::Pairs(pairs) => query_value(param, shape, pairs, ','),
            RawSource::Single {
                raw,
                percent_encoded,
            } => split_single(raw, ',', shape, false, *percent_encoded).map(Some),
        }
    }
}

/// `simple` style (path and header).
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStyle;

impl StyleDeserializer for SimpleStyle {
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        match source {
            RawSource::Single {
                raw,
                percent_encoded,
            } => split_single(raw, ',', shape, param.explode, *percent_encoded).map(Some),
            RawSource::Pairs(pairs) => values_of(pairs, &param.name)
                .next()
                .map(|raw| split_single(raw, ',', shape, param.explode, false))
                .transpose(),
        }
    }
}

/// `label` style (path): `.value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelStyle;

impl StyleDeserializer for LabelStyle {
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        let RawSource::Single {
            raw,
            percent_encoded,
        } = source
        else {
            return Err(StyleError("label style applies to path parameters".to_string()));
        };
        let rest = raw
            .strip_prefix('.')
            .ok_or_else(|| StyleError(format!("label value '{}' must start with '.'", raw)))?;
        let delimiter = if param.explode { '.' } else { ',' };
        split_single(rest, delimiter, shape, param.explode, *percent_encoded).map(Some)
    }
}

/// `matrix` style (path): `;name=value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixStyle;

impl StyleDeserializer for MatrixStyle {
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        let RawSource::Single {
            raw,
            percent_encoded,
        } = source
        else {
            return Err(StyleError("matrix style applies to path parameters".to_string()));
        };
        let encoded = *percent_encoded;
        let rest = raw
            .strip_prefix(';')
            .ok_or_else(|| StyleError(format!("matrix value '{}' must start with ';'", raw)))?;

        let named_value = |piece: &str| -> Result<String, StyleError> {
            match piece.split_once('=') {
                Some((key, value)) if key == param.name => Ok(value.to_string()),
                None if piece == param.name => Ok(String::new()),
                _ => Err(StyleError(format!(
                    "matrix item '{}' does not belong to '{}'",
                    piece, param.name
                ))),
            }
        };

        let value = match shape {
            Shape::Array if param.explode => {
                let items = rest
                    .split(';')
                    .map(|piece| named_value(piece).map(|v| decode(&v, encoded)))
                    .collect::<Result<Vec<_>, _>>()?;
                strings(items)
            }
            Shape::Object { .. } if param.explode => {
                object_from_assignments(rest.split(';'), encoded)?
            }
            _ => split_single(&named_value(rest)?, ',', shape, false, encoded)?,
        };
        Ok(Some(value))
    }
}

/// `spaceDelimited` and `pipeDelimited` styles (query).
#[derive(Debug, Clone, Copy)]
pub struct DelimitedStyle {
    delimiter: char,
}

impl DelimitedStyle {
    /// `spaceDelimited`
    pub fn space() -> Self {
        Self { delimiter: ' ' }
    }

    /// `pipeDelimited`
    pub fn pipe() -> Self {
        Self { delimiter: '|' }
    }
}

impl StyleDeserializer for DelimitedStyle {
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        match source {
            RawSource::Pairs(pairs) => query_value(param, shape, pairs, self.delimiter),
            RawSource::Single { .. } => Err(StyleError(
                "delimited styles apply to query parameters".to_string(),
            )),
        }
    }
}

/// `deepObject` style (query): `name[key]=value`, nesting allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepObjectStyle;

impl StyleDeserializer for DeepObjectStyle {
    fn deserialize(
        &self,
        param: &ParameterSpec,
        shape: &Shape,
        source: &RawSource<'_>,
    ) -> Result<Option<Value>, StyleError> {
        let RawSource::Pairs(pairs) = source else {
            return Err(StyleError("deepObject style applies to query parameters".to_string()));
        };
        if !matches!(shape, Shape::Object { .. }) {
            return Err(StyleError("deepObject style only serializes objects".to_string()));
        }

        let mut root = IndexMap::new();
        let mut found = false;
        for (key, value) in pairs.iter() {
            let Some(brackets) = key
                .strip_prefix(param.name.as_str())
                .filter(|rest| rest.starts_with('['))
            else {
                continue;
            };
            let mut path = bracket_path(brackets)?;
            if path.last().is_some_and(String::is_empty) {
                path.pop();
            }
            insert_path(&mut root, &path, value.clone())?;
            found = true;
        }
        Ok(found.then_some(Value::Object(root)))
    }
}

fn bracket_path(mut rest: &str) -> Result<Vec<String>, StyleError> {
    let mut path = Vec::new();
    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('[')
            .and_then(|r| r.split_once(']'))
            .ok_or_else(|| StyleError(format!("malformed deepObject key segment '{}'", rest)))?;
        path.push(inner.0.to_string());
        rest = inner.1;
    }
    if path.is_empty() {
        return Err(StyleError("deepObject key without property".to_string()));
    }
    Ok(path)
}

fn insert_path(
    map: &mut IndexMap<String, Value>,
    path: &[String],
    value: String,
) -> Result<(), StyleError> {
    let Some((head, rest)) = path.split_first() else {
        return Err(StyleError("deepObject key without property".to_string()));
    };
    if rest.is_empty() {
        match map.get_mut(head) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) if matches!(existing, Value::String(_)) => {
                let first = std::mem::replace(existing, Value::Null);
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            Some(_) => {
                return Err(StyleError(format!("deepObject key '{}' is both a value and an object", head)))
            }
            None => {
                map.insert(head.clone(), Value::String(value));
            }
        }
        return Ok(());
    }
    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(IndexMap::new()));
    match entry {
        Value::Object(inner) => insert_path(inner, rest, value),
        _ => Err(StyleError(format!(
            "deepObject key '{}' is both a value and an object",
            head
        ))),
    }
}

/// Raw parameter sources of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSources {
    /// Raw path captures, still percent-encoded.
    pub path: IndexMap<String, String>,
    /// Decoded query pairs.
    pub query: Vec<(String, String)>,
    /// Headers.
    pub headers: Headers,
    /// Cookies.
    pub cookies: IndexMap<String, String>,
}

impl ParameterSources {
    /// Sources of a request, with the path captures of its matched template.
    pub fn from_request(request: &RequestModel, path: IndexMap<String, String>) -> Self {
        Self {
            path,
            query: request.query_pairs(),
            headers: request.headers.clone(),
            cookies: request.cookie_map(),
        }
    }

    /// Sources of a response (headers only).
    pub fn from_response(response: &ResponseModel) -> Self {
        Self {
            headers: response.headers.clone(),
            ..Self::default()
        }
    }

    /// The raw source of `param`, or `None` when its location holds nothing.
    pub fn source(&self, param: &ParameterSpec) -> Option<RawSource<'_>> {
        match param.location {
            ParamSource::Path => self.path.get(&param.name).map(|raw| RawSource::Single {
                raw: Cow::Borrowed(raw.as_str()),
                percent_encoded: true,
            }),
            ParamSource::Query => Some(RawSource::Pairs(&self.query)),
            ParamSource::Header => self.headers.joined(&param.name).map(|raw| RawSource::Single {
                raw: Cow::Owned(raw),
                percent_encoded: false,
            }),
            ParamSource::Cookie => self.cookies.get(&param.name).map(|raw| RawSource::Single {
                raw: Cow::Borrowed(raw.as_str()),
                percent_encoded: true,
            }),
        }
    }
}

/// Registry of style deserializers plus the missing-parameter policy.
#[derive(Clone, Default)]
pub struct ParameterDeserializer {
    styles: HashMap<String, Arc<dyn StyleDeserializer>>,
}

impl fmt::Debug for ParameterDeserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.styles.keys().collect();
        names.sort();
        f.debug_struct("ParameterDeserializer")
            .field("styles", &names)
            .finish()
    }
}

impl ParameterDeserializer {
    /// Creates a deserializer without styles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a deserializer with every OpenAPI style.
    pub fn with_defaults() -> Self {
        let mut deserializer = Self::new();
        deserializer.register_style("matrix", MatrixStyle);
        deserializer.register_style("label", LabelStyle);
        deserializer.register_style("form", FormStyle);
        deserializer.register_style("simple", SimpleStyle);
        deserializer.register_style("spaceDelimited", DelimitedStyle::space());
        deserializer.register_style("pipeDelimited", DelimitedStyle::pipe());
        deserializer.register_style("deepObject", DeepObjectStyle);
        deserializer
    }

    /// Registers (or replaces) a style.
    pub fn register_style(&mut self, style: impl Into<String>, deserializer: impl StyleDeserializer + 'static) {
        self.styles.insert(style.into(), Arc::new(deserializer));
    }

    /// Extracts the raw value of `param` from `sources`.
    ///
    /// Returns `Ok(None)` for an absent optional parameter and a
    /// `MissingParameter` error for an absent required one. Parameters
    /// serialized through `content` yield their raw text.
    pub fn deserialize(
        &self,
        schemas: &SchemaTable,
        param: &ParameterSpec,
        sources: &ParameterSources,
    ) -> Result<Option<Value>, ValidationError> {
        let location = Location::Parameter {
            location: param.location,
            name: param.name.clone(),
        };

        let extracted = match sources.source(param) {
            None => None,
            Some(source) if param.content_type.is_some() => match source {
                RawSource::Pairs(pairs) => values_of(pairs, &param.name).next().map(Value::from),
                RawSource::Single { raw, .. } => Some(Value::String(raw.into_owned())),
            },
            Some(source) => {
                let style = self.styles.get(param.style.as_str()).ok_or_else(|| {
                    ValidationError::new(
                        ErrorKind::ParameterDeserialize,
                        format!("style '{}' is not supported", param.style.as_str()),
                    )
                    .at(location.clone())
                })?;
                let shape = Shape::of(schemas, param.schema);
                style.deserialize(param, &shape, &source).map_err(|e| {
                    ValidationError::new(ErrorKind::ParameterDeserialize, e.to_string())
                        .at(location.clone())
                })?
            }
        };

        match extracted {
            None if param.required => Err(ValidationError::new(
                ErrorKind::MissingParameter,
                "required parameter is missing",
            )
            .at(location)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oas::models::{ParamStyle, SchemaSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        table: SchemaTable,
        array: SchemaId,
        object: SchemaId,
        primitive: SchemaId,
    }

    fn fixture() -> Fixture {
        let mut table = SchemaTable::new();
        let primitive = table.push(SchemaSpec::of_type(SchemaType::String));
        let array = table.push(SchemaSpec {
            items: Some(primitive),
            ..SchemaSpec::of_type(SchemaType::Array)
        });
        let object = table.push(SchemaSpec {
            schema_type: Some(SchemaType::Object),
            properties: [("x".to_string(), primitive), ("y".to_string(), primitive)]
                .into_iter()
                .collect(),
            ..SchemaSpec::default()
        });
        Fixture {
            table,
            array,
            object,
            primitive,
        }
    }

    fn param(name: &str, location: ParamSource, style: ParamStyle, explode: bool, schema: SchemaId) -> ParameterSpec {
        ParameterSpec {
            style,
            explode,
            ..ParameterSpec::new(name, location, Some(schema))
        }
    }

    fn run(fx: &Fixture, p: &ParameterSpec, sources: &ParameterSources) -> Option<Value> {
        ParameterDeserializer::with_defaults()
            .deserialize(&fx.table, p, sources)
            .unwrap()
    }

    fn query(q: &str) -> ParameterSources {
        ParameterSources::from_request(&RequestModel::new("GET", &format!("/?{}", q)), IndexMap::new())
    }

    fn path(name: &str, raw: &str) -> ParameterSources {
        ParameterSources {
            path: [(name.to_string(), raw.to_string())].into_iter().collect(),
            ..ParameterSources::default()
        }
    }

    #[test]
    fn test_form_explode_array_and_object() {
        let fx = fixture();
        let ids = param("id", ParamSource::Query, ParamStyle::Form, true, fx.array);
        assert_eq!(run(&fx, &ids, &query("id=3&id=4&id=5")), Some(Value::from(json!(["3", "4", "5"]))));

        let obj = param("a", ParamSource::Query, ParamStyle::Form, true, fx.object);
        assert_eq!(run(&fx, &obj, &query("x=1&y=2&z=3")), Some(Value::from(json!({"x": "1", "y": "2"}))));
    }

    #[test]
    fn test_form_no_explode() {
        let fx = fixture();
        let ids = param("id", ParamSource::Query, ParamStyle::Form, false, fx.array);
        assert_eq!(run(&fx, &ids, &query("id=1,2,3")), Some(Value::from(json!(["1", "2", "3"]))));

        let obj = param("a", ParamSource::Query, ParamStyle::Form, false, fx.object);
        assert_eq!(run(&fx, &obj, &query("a=x,1,y,2")), Some(Value::from(json!({"x": "1", "y": "2"}))));
    }

    #[test]
    fn test_simple_path_percent_decoding() {
        let fx = fixture();
        let ids = param("ids", ParamSource::Path, ParamStyle::Simple, false, fx.array);
        assert_eq!(
            run(&fx, &ids, &path("ids", "a%2Cb,c%20d")),
            Some(Value::from(json!(["a,b", "c d"])))
        );

        let obj = param("p", ParamSource::Path, ParamStyle::Simple, true, fx.object);
        assert_eq!(run(&fx, &obj, &path("p", "x=1,y=2")), Some(Value::from(json!({"x": "1", "y": "2"}))));
    }

    #[test]
    fn test_label_and_matrix() {
        let fx = fixture();
        let label = param("id", ParamSource::Path, ParamStyle::Label, true, fx.array);
        assert_eq!(run(&fx, &label, &path("id", ".3.4.5")), Some(Value::from(json!(["3", "4", "5"]))));

        let matrix = param("id", ParamSource::Path, ParamStyle::Matrix, true, fx.array);
        assert_eq!(
            run(&fx, &matrix, &path("id", ";id=3;id=4;id=5")),
            Some(Value::from(json!(["3", "4", "5"])))
        );

        let matrix_obj = param("id", ParamSource::Path, ParamStyle::Matrix, false, fx.object);
        assert_eq!(
            run(&fx, &matrix_obj, &path("id", ";id=x,1,y,2")),
            Some(Value::from(json!({"x": "1", "y": "2"})))
        );

        let matrix_prim = param("id", ParamSource::Path, ParamStyle::Matrix, false, fx.primitive);
        assert_eq!(run(&fx, &matrix_prim, &path("id", ";id=5")), Some(Value::from("5")));
    }

    #[test]
    fn test_label_without_prefix_fails() {
        let fx = fixture();
        let label = param("id", ParamSource::Path, ParamStyle::Label, false, fx.primitive);
        let err = ParameterDeserializer::with_defaults()
            .deserialize(&fx.table, &label, &path("id", "5"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParameterDeserialize);
    }

    #[test]
    fn test_delimited_styles() {
        let fx = fixture();
        let space = param("id", ParamSource::Query, ParamStyle::SpaceDelimited, false, fx.array);
        assert_eq!(run(&fx, &space, &query("id=1%202%203")), Some(Value::from(json!(["1", "2", "3"]))));

        let pipe = param("id", ParamSource::Query, ParamStyle::PipeDelimited, false, fx.array);
        assert_eq!(run(&fx, &pipe, &query("id=1|2|3")), Some(Value::from(json!(["1", "2", "3"]))));
    }

    #[test]
    fn test_deep_object_nested() {
        let fx = fixture();
        let filter = param("filter", ParamSource::Query, ParamStyle::DeepObject, true, fx.object);
        assert_eq!(
            run(&fx, &filter, &query("filter[name]=joe&filter[age]=5&other=1")),
            Some(Value::from(json!({"name": "joe", "age": "5"})))
        );
        assert_eq!(
            run(&fx, &filter, &query("filter[range][min]=1&filter[tags][]=a&filter[tags][]=b")),
            Some(Value::from(json!({"range": {"min": "1"}, "tags": ["a", "b"]})))
        );
        assert_eq!(run(&fx, &filter, &query("other=1")), None);
    }

    #[test]
    fn test_header_joined_and_case_insensitive() {
        let fx = fixture();
        let tags = param("X-Tags", ParamSource::Header, ParamStyle::Simple, false, fx.array);
        let request = RequestModel::new("GET", "/")
            .with_header("x-tags", "a,b")
            .with_header("X-TAGS", "c");
        let sources = ParameterSources::from_request(&request, IndexMap::new());
        assert_eq!(run(&fx, &tags, &sources), Some(Value::from(json!(["a", "b", "c"]))));
    }

    #[test]
    fn test_missing_required() {
        let fx = fixture();
        let mut limit = param("limit", ParamSource::Query, ParamStyle::Form, true, fx.primitive);
        assert_eq!(run(&fx, &limit, &query("")), None);

        limit.required = true;
        let err = ParameterDeserializer::with_defaults()
            .deserialize(&fx.table, &limit, &query("other=1"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingParameter);
        assert_eq!(
            err.location,
            Location::Parameter {
                location: ParamSource::Query,
                name: "limit".into()
            }
        );
    }

    #[test]
    fn test_custom_style_registration() {
        let fx = fixture();
        let mut deserializer = ParameterDeserializer::with_defaults();
        deserializer.register_style(
            "commaQuoted",
            |p: &ParameterSpec, _: &Shape, source: &RawSource<'_>| -> Result<Option<Value>, StyleError> {
                match source {
                    RawSource::Pairs(pairs) => Ok(values_of(pairs, &p.name)
                        .next()
                        .map(|raw| Value::from(raw.trim_matches('\'')))),
                    RawSource::Single { .. } => Ok(None),
                }
            },
        );
        let p = param("q", ParamSource::Query, ParamStyle::Custom("commaQuoted".into()), false, fx.primitive);
        let value = deserializer.deserialize(&fx.table, &p, &query("q='hi'")).unwrap();
        assert_eq!(value, Some(Value::from("hi")));

        let unknown = param("q", ParamSource::Query, ParamStyle::Custom("nope".into()), false, fx.primitive);
        let err = deserializer.deserialize(&fx.table, &unknown, &query("q=1")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParameterDeserialize);
    }
}
