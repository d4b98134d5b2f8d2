//! # Media Type Deserializers
//!
//! Content-type keyed strategies turning a raw body into a structured
//! `Value` before a schema is applied.
//!
//! Lookup ignores case and media type parameters and falls back from the
//! exact `type/subtype` to the structured syntax suffix (`application/*+json`)
//! and then to the type wildcard (`text/*`). There is no `*/*` fallback: a
//! body nobody registered a deserializer for is `MediaTypeNotSupported`.

use crate::oas::models::MediaTypeSpec;
use crate::validation::errors::{ErrorKind, ValidationError};
use crate::value::Value;
use derive_more::Display;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Top-level type, lowercase (`application`).
    pub main: String,
    /// Subtype, lowercase (`vnd.api+json`).
    pub subtype: String,
    /// Parameters with lowercase names and unquoted values.
    pub params: IndexMap<String, String>,
}

impl MediaType {
    /// Parses `type/subtype; name=value`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (essence, params) = match raw.split_once(';') {
            Some((essence, params)) => (essence, params),
            None => (raw, ""),
        };
        let (main, subtype) = essence.trim().split_once('/')?;
        let (main, subtype) = (main.trim(), subtype.trim());
        if main.is_empty() || subtype.is_empty() {
            return None;
        }
        Some(Self {
            main: main.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: parse_params(params),
        })
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main, self.subtype)
    }

    /// Structured syntax suffix (`json` for `application/problem+json`).
    pub fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }

    /// A parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Registry keys to try, most specific first.
    fn candidates(&self) -> Vec<String> {
        let mut keys = vec![self.essence()];
        if let Some(suffix) = self.suffix() {
            keys.push(format!("{}/*+{}", self.main, suffix));
        }
        keys.push(format!("{}/*", self.main));
        keys
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence())
    }
}

fn parse_params(raw: &str) -> IndexMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            (!name.is_empty()).then_some((name, value))
        })
        .collect()
}

/// Output of a deserializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Deserialized {
    /// Structured value.
    pub value: Value,
    /// Whether leaves are text that should be cast to schema types.
    pub needs_casting: bool,
}

impl Deserialized {
    /// A value whose leaves are already typed (JSON).
    pub fn typed(value: Value) -> Self {
        Self {
            value,
            needs_casting: false,
        }
    }

    /// A value whose leaves are text (forms, multipart, plain text).
    pub fn textual(value: Value) -> Self {
        Self {
            value,
            needs_casting: true,
        }
    }
}

/// A body could not be read under its media type.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{_0}")]
pub struct DeserializeError(pub String);

impl std::error::Error for DeserializeError {}

/// Turns a raw body into a structured value.
pub trait MediaTypeDeserializer: Send + Sync {
    /// Deserializes `body` declared as `media_type`.
    fn deserialize(&self, media_type: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError>;
}

impl<F> MediaTypeDeserializer for F
where
    F: Fn(&MediaType, &[u8]) -> Result<Deserialized, DeserializeError> + Send + Sync,
{
    fn deserialize(&self, media_type: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError> {
        self(media_type, body)
    }
}

/// `application/json` and `+json` types.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDeserializer;

impl MediaTypeDeserializer for JsonDeserializer {
    fn deserialize(&self, _: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError> {
        serde_json::from_slice::<serde_json::Value>(body)
            .map(|json| Deserialized::typed(Value::from(json)))
            .map_err(|e| DeserializeError(format!("malformed JSON: {}", e)))
    }
}

/// `application/x-www-form-urlencoded`; repeated keys become arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormUrlencodedDeserializer;

impl MediaTypeDeserializer for FormUrlencodedDeserializer {
    fn deserialize(&self, _: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError> {
        let fields = collect_fields(
            url::form_urlencoded::parse(body)
                .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned()))),
        );
        Ok(Deserialized::textual(Value::Object(fields)))
    }
}

/// `multipart/form-data`; file parts become bytes, JSON parts are parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartDeserializer;

impl MediaTypeDeserializer for MultipartDeserializer {
    fn deserialize(&self, media_type: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError> {
        let boundary = media_type
            .param("boundary")
            .filter(|b| !b.is_empty())
            .ok_or_else(|| DeserializeError("multipart body without boundary".to_string()))?;
        parse_multipart(body, boundary).map(|fields| Deserialized::textual(Value::Object(fields)))
    }
}

/// Textual bodies, passed through as one string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDeserializer;

impl MediaTypeDeserializer for TextDeserializer {
    fn deserialize(&self, _: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError> {
        std::str::from_utf8(body)
            .map(|text| Deserialized::textual(Value::from(text)))
            .map_err(|e| DeserializeError(format!("body is not UTF-8: {}", e)))
    }
}

/// Opaque bodies, passed through as bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDeserializer;

impl MediaTypeDeserializer for BinaryDeserializer {
    fn deserialize(&self, _: &MediaType, body: &[u8]) -> Result<Deserialized, DeserializeError> {
        Ok(Deserialized::typed(Value::Bytes(body.to_vec())))
    }
}

/// Registry of media type deserializers.
#[derive(Clone, Default)]
pub struct MediaTypeRegistry {
    deserializers: HashMap<String, Arc<dyn MediaTypeDeserializer>>,
}

impl fmt::Debug for MediaTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.deserializers.keys().collect();
        keys.sort();
        f.debug_struct("MediaTypeRegistry")
            .field("media_types", &keys)
            .finish()
    }
}

impl MediaTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with JSON, forms, multipart, text and binary.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("application/json", JsonDeserializer);
        registry.register("application/*+json", JsonDeserializer);
        registry.register("application/x-www-form-urlencoded", FormUrlencodedDeserializer);
        registry.register("multipart/form-data", MultipartDeserializer);
        registry.register("text/plain", TextDeserializer);
        registry.register("text/*", TextDeserializer);
        registry.register("application/octet-stream", BinaryDeserializer);
        registry
    }

    /// Registers (or replaces) the deserializer for a key such as
    /// `application/xml`, `application/*+xml` or `image/*`.
    pub fn register(
        &mut self,
        media_type: impl Into<String>,
        deserializer: impl MediaTypeDeserializer + 'static,
    ) {
        let key = media_type.into().to_ascii_lowercase();
        self.deserializers.insert(key, Arc::new(deserializer));
    }

    /// Finds the deserializer for `media_type`, applying the fallbacks.
    pub fn find(&self, media_type: &MediaType) -> Option<&dyn MediaTypeDeserializer> {
        media_type
            .candidates()
            .iter()
            .find_map(|key| self.deserializers.get(key))
            .map(|d| d.as_ref())
    }

    /// Deserializes `body` declared as `content_type`.
    pub fn deserialize(&self, content_type: &str, body: &[u8]) -> Result<Deserialized, ValidationError> {
        let not_supported = || {
            ValidationError::new(
                ErrorKind::MediaTypeNotSupported,
                format!("media type '{}' is not supported", content_type),
            )
        };
        let media_type = MediaType::parse(content_type).ok_or_else(not_supported)?;
        let deserializer = self.find(&media_type).ok_or_else(not_supported)?;
        deserializer
            .deserialize(&media_type, body)
            .map_err(|e| ValidationError::new(ErrorKind::MediaTypeDeserialize, e.to_string()))
    }
}

/// Picks the declared media type for `content_type`: exact, then `type/*`,
/// then `*/*`. Without a content type, a single declared entry is used.
pub fn select_media_type<'a>(
    content: &'a IndexMap<String, MediaTypeSpec>,
    content_type: Option<&str>,
) -> Option<&'a MediaTypeSpec> {
    let Some(raw) = content_type else {
        return (content.len() == 1).then(|| content.values().next()).flatten();
    };
    let wanted = MediaType::parse(raw)?;
    let declared = |key: &str| {
        content.iter().find_map(|(declared, spec)| {
            MediaType::parse(declared)
                .filter(|m| m.essence() == key)
                .map(|_| spec)
        })
    };
    declared(&wanted.essence())
        .or_else(|| declared(&format!("{}/*", wanted.main)))
        .or_else(|| declared("*/*"))
}

/// Groups fields by name: a name seen once keeps its value, a repeated name
/// becomes an array of its occurrences, whatever each occurrence holds.
fn collect_fields(pairs: impl IntoIterator<Item = (String, Value)>) -> IndexMap<String, Value> {
    let mut grouped: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (name, value) in pairs {
        grouped.entry(name).or_default().push(value);
    }
    grouped
        .into_iter()
        .map(|(name, mut values)| match values.len() {
            1 => (name, values.remove(0)),
            _ => (name, Value::Array(values)),
        })
        .collect()
}

fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn trim_line_break(mut part: &[u8]) -> &[u8] {
    part = part.strip_prefix(b"\r\n").or_else(|| part.strip_prefix(b"\n")).unwrap_or(part);
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}

fn parse_multipart(body: &[u8], boundary: &str) -> Result<IndexMap<String, Value>, DeserializeError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();

    let mut cursor = find_bytes(body, &delimiter, 0)
        .ok_or_else(|| DeserializeError("multipart boundary not found".to_string()))?
        + delimiter.len();
    loop {
        if body[cursor..].starts_with(b"--") {
            return Ok(collect_fields(parts));
        }
        let end = find_bytes(body, &delimiter, cursor)
            .ok_or_else(|| DeserializeError("multipart closing boundary not found".to_string()))?;
        parts.push(parse_part(trim_line_break(&body[cursor..end]))?);
        cursor = end + delimiter.len();
    }
}

fn parse_part(part: &[u8]) -> Result<(String, Value), DeserializeError> {
    let (head, content) = match find_bytes(part, b"\r\n\r\n", 0) {
        Some(pos) => (&part[..pos], &part[pos + 4..]),
        None => match find_bytes(part, b"\n\n", 0) {
            Some(pos) => (&part[..pos], &part[pos + 2..]),
            None => (part, &[][..]),
        },
    };

    let head = String::from_utf8_lossy(head);
    let mut disposition = None;
    let mut part_type = None;
    for line in head.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => disposition = Some(parse_params(value)),
            "content-type" => part_type = MediaType::parse(value),
            _ => {}
        }
    }

    let disposition = disposition
        .ok_or_else(|| DeserializeError("multipart part without Content-Disposition".to_string()))?;
    let name = disposition
        .get("name")
        .cloned()
        .ok_or_else(|| DeserializeError("multipart part without a name".to_string()))?;

    let is_json = part_type
        .as_ref()
        .is_some_and(|m| m.essence() == "application/json" || m.suffix() == Some("json"));
    let is_text = part_type.as_ref().map_or(true, |m| m.main == "text");

    let value = if disposition.contains_key("filename") {
        Value::Bytes(content.to_vec())
    } else if is_json {
        serde_json::from_slice::<serde_json::Value>(content)
            .map(Value::from)
            .map_err(|e| DeserializeError(format!("malformed JSON in part '{}': {}", name, e)))?
    } else if is_text {
        match std::str::from_utf8(content) {
            Ok(text) => Value::from(text),
            Err(_) => Value::Bytes(content.to_vec()),
        }
    } else {
        Value::Bytes(content.to_vec())
    };
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_media_type_parse() {
        let m = MediaType::parse("Application/Problem+JSON; charset=\"utf-8\"").unwrap();
        assert_eq!(m.essence(), "application/problem+json");
        assert_eq!(m.suffix(), Some("json"));
        assert_eq!(m.param("charset"), Some("utf-8"));
        assert!(MediaType::parse("nonsense").is_none());
    }

    #[test]
    fn test_lookup_fallbacks() {
        let registry = MediaTypeRegistry::with_defaults();
        let json = registry
            .deserialize("application/vnd.api+json", br#"{"a":1}"#)
            .unwrap();
        assert_eq!(json.value, Value::from(json!({"a": 1})));
        assert!(!json.needs_casting);

        let csv = registry.deserialize("text/csv", b"a,b").unwrap();
        assert_eq!(csv.value, Value::from("a,b"));

        let err = registry.deserialize("image/png", b"..").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MediaTypeNotSupported);
    }

    #[test]
    fn test_malformed_json_is_deserialize_error() {
        let registry = MediaTypeRegistry::with_defaults();
        let err = registry.deserialize("application/json", b"{oops").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MediaTypeDeserialize);
    }

    #[test]
    fn test_form_repeated_keys() {
        let registry = MediaTypeRegistry::with_defaults();
        let form = registry
            .deserialize("application/x-www-form-urlencoded", b"tag=a&tag=b&name=x+y")
            .unwrap();
        assert_eq!(form.value, Value::from(json!({"tag": ["a", "b"], "name": "x y"})));
        assert!(form.needs_casting);
    }

    #[test]
    fn test_multipart_fields_and_files() {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\
Content-Type: application/octet-stream\r\n\
\r\n\
\x00\x01\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"meta\"\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"n\":1}\r\n\
--XyZ--\r\n";
        let registry = MediaTypeRegistry::with_defaults();
        let parsed = registry
            .deserialize("multipart/form-data; boundary=XyZ", body)
            .unwrap();
        let fields = parsed.value.as_object().unwrap();
        assert_eq!(fields["title"], Value::from("hello"));
        assert_eq!(fields["file"], Value::Bytes(vec![0, 1]));
        assert_eq!(fields["meta"], Value::from(json!({"n": 1})));
    }

    #[test]
    fn test_repeated_multipart_parts_keep_their_shape() {
        let body = b"--B\r\n\
Content-Disposition: form-data; name=\"a\"\r\n\
Content-Type: application/json\r\n\
\r\n\
[1,2]\r\n\
--B\r\n\
Content-Disposition: form-data; name=\"a\"\r\n\
\r\n\
x\r\n\
--B\r\n\
Content-Disposition: form-data; name=\"b\"\r\n\
Content-Type: application/json\r\n\
\r\n\
[3]\r\n\
--B--\r\n";
        let registry = MediaTypeRegistry::with_defaults();
        let parsed = registry.deserialize("multipart/form-data; boundary=B", body).unwrap();
        let fields = parsed.value.as_object().unwrap();
        assert_eq!(fields["a"], Value::from(json!([[1, 2], "x"])));
        assert_eq!(fields["b"], Value::from(json!([3])));
    }

    #[test]
    fn test_multipart_without_boundary() {
        let registry = MediaTypeRegistry::with_defaults();
        let err = registry.deserialize("multipart/form-data", b"").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MediaTypeDeserialize);
    }

    #[test]
    fn test_select_declared_media_type() {
        let spec = |ct: &str| MediaTypeSpec {
            content_type: ct.to_string(),
            schema: None,
        };
        let content: IndexMap<String, MediaTypeSpec> = ["application/json", "text/*"]
            .into_iter()
            .map(|ct| (ct.to_string(), spec(ct)))
            .collect();
        let pick = |ct: Option<&str>| select_media_type(&content, ct).map(|m| m.content_type.clone());
        assert_eq!(pick(Some("application/json; charset=utf-8")).as_deref(), Some("application/json"));
        assert_eq!(pick(Some("text/csv")).as_deref(), Some("text/*"));
        assert_eq!(pick(Some("image/png")), None);
        assert_eq!(pick(None), None);
    }

    #[test]
    fn test_register_custom_deserializer() {
        let mut registry = MediaTypeRegistry::new();
        registry.register(
            "application/*+csv",
            |_: &MediaType, body: &[u8]| -> Result<Deserialized, DeserializeError> {
                let text = String::from_utf8_lossy(body);
                let cells = text.split(',').map(Value::from).collect();
                Ok(Deserialized::textual(Value::Array(cells)))
            },
        );
        let parsed = registry.deserialize("application/report+csv", b"1,2").unwrap();
        assert_eq!(parsed.value, Value::from(json!(["1", "2"])));
    }
}
