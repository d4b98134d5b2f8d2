//! # Format Registry
//!
//! String-keyed casters for schema `format` values. A caster receives a
//! value whose kind already matches the schema type and returns its typed
//! form (`Value::Date`, `Value::Uuid`, ...) or a `FormatError`.
//!
//! Unknown formats pass the value through unchanged: formats are advisory
//! in OpenAPI, so an unregistered name degrades to no check at all.

use crate::value::Value;
use base64::prelude::{Engine, BASE64_STANDARD, BASE64_URL_SAFE};
use chrono::{DateTime, NaiveDate};
use derive_more::Display;
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// A value could not be parsed under its format.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{_0}")]
pub struct FormatError(pub String);

impl std::error::Error for FormatError {}

impl FormatError {
    fn new(format: &str, detail: impl fmt::Display) -> Self {
        Self(format!("not a valid '{}': {}", format, detail))
    }
}

/// Converts a value under one `format`.
///
/// Casters must accept their own output so that re-applying a schema to an
/// already typed value yields the same value.
pub trait FormatCaster: Send + Sync {
    /// Casts `value`, returning its typed form.
    fn cast(&self, value: &Value) -> Result<Value, FormatError>;
}

impl<F> FormatCaster for F
where
    F: Fn(&Value) -> Result<Value, FormatError> + Send + Sync,
{
    fn cast(&self, value: &Value) -> Result<Value, FormatError> {
        self(value)
    }
}

/// Registry of format casters.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    casters: HashMap<String, Arc<dyn FormatCaster>>,
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.casters.keys().collect();
        names.sort();
        f.debug_struct("FormatRegistry")
            .field("formats", &names)
            .finish()
    }
}

impl FormatRegistry {
    /// Creates an empty registry (every format passes through).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in formats.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("date", cast_date);
        registry.register("date-time", cast_date_time);
        registry.register("byte", cast_byte);
        registry.register("binary", cast_binary);
        registry.register("uuid", cast_uuid);
        registry.register("email", cast_email);
        registry.register("int32", |v: &Value| cast_int_range(v, "int32", i32::MIN as i64, i32::MAX as i64));
        registry.register("int64", |v: &Value| cast_int_range(v, "int64", i64::MIN, i64::MAX));
        registry.register("float", cast_passthrough);
        registry.register("double", cast_passthrough);
        registry.register("password", cast_passthrough);
        registry.register("uri", cast_uri);
        registry.register("ipv4", cast_ipv4);
        registry.register("ipv6", cast_ipv6);
        registry
    }

    /// Registers (or replaces) the caster for `format`.
    pub fn register(&mut self, format: impl Into<String>, caster: impl FormatCaster + 'static) {
        self.casters.insert(format.into(), Arc::new(caster));
    }

    /// Whether a caster exists for `format`.
    pub fn contains(&self, format: &str) -> bool {
        self.casters.contains_key(format)
    }

    /// Casts `value` under `format`; unknown formats pass through.
    pub fn cast(&self, format: &str, value: &Value) -> Result<Value, FormatError> {
        match self.casters.get(format) {
            Some(caster) => caster.cast(value),
            None => {
                tracing::trace!(format, "unknown format, value passed through");
                Ok(value.clone())
            }
        }
    }
}

/// A value this caster does not own: non-text kinds pass through, text
/// already typed under another format is rejected.
fn foreign(format: &str, value: &Value) -> Result<Value, FormatError> {
    if value.is_string_like() {
        Err(FormatError::new(format, format!("got a {} value", value.kind())))
    } else {
        Ok(value.clone())
    }
}

fn cast_date(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| FormatError::new("date", e)),
        Value::Date(_) => Ok(value.clone()),
        other => foreign("date", other),
    }
}

fn cast_date_time(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(Value::DateTime)
            .map_err(|e| FormatError::new("date-time", e)),
        Value::DateTime(_) => Ok(value.clone()),
        other => foreign("date-time", other),
    }
}

fn cast_byte(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => BASE64_STANDARD
            .decode(s)
            .or_else(|_| BASE64_URL_SAFE.decode(s))
            .map(Value::Bytes)
            .map_err(|e| FormatError::new("byte", e)),
        Value::Bytes(_) => Ok(value.clone()),
        other => foreign("byte", other),
    }
}

fn cast_binary(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
        Value::Bytes(_) => Ok(value.clone()),
        other => foreign("binary", other),
    }
}

fn cast_uuid(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => Uuid::parse_str(s)
            .map(Value::Uuid)
            .map_err(|e| FormatError::new("uuid", e)),
        Value::Uuid(_) => Ok(value.clone()),
        other => foreign("uuid", other),
    }
}

fn cast_email(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) if !is_valid_email(s) => {
            Err(FormatError::new("email", format!("'{}'", s)))
        }
        Value::String(_) => Ok(value.clone()),
        other => foreign("email", other),
    }
}

/// Syntactic check only: one `@`, non-empty local part, dotted domain.
fn is_valid_email(value: &str) -> bool {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = value.split('@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty() || domain.is_empty() || parts.next().is_some() {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn cast_int_range(value: &Value, format: &str, min: i64, max: i64) -> Result<Value, FormatError> {
    match value {
        Value::Integer(i) if *i < min || *i > max => {
            Err(FormatError::new(format, format!("{} out of range", i)))
        }
        other => Ok(other.clone()),
    }
}

fn cast_passthrough(value: &Value) -> Result<Value, FormatError> {
    Ok(value.clone())
}

fn cast_uri(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => Url::parse(s)
            .map(|_| value.clone())
            .map_err(|e| FormatError::new("uri", e)),
        other => foreign("uri", other),
    }
}

fn cast_ipv4(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => s
            .parse::<Ipv4Addr>()
            .map(|_| value.clone())
            .map_err(|e| FormatError::new("ipv4", e)),
        other => foreign("ipv4", other),
    }
}

fn cast_ipv6(value: &Value) -> Result<Value, FormatError> {
    match value {
        Value::String(s) => s
            .parse::<Ipv6Addr>()
            .map(|_| value.clone())
            .map_err(|e| FormatError::new("ipv6", e)),
        other => foreign("ipv6", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_date_time_cast_and_failure() {
        let registry = FormatRegistry::with_defaults();
        let cast = registry
            .cast("date-time", &Value::from("2024-05-01T10:00:00+02:00"))
            .unwrap();
        assert!(matches!(cast, Value::DateTime(_)));

        let err = registry
            .cast("date-time", &Value::from("not-a-date"))
            .unwrap_err();
        assert!(err.to_string().starts_with("not a valid 'date-time'"));
    }

    #[test]
    fn test_casters_accept_typed_values() {
        let registry = FormatRegistry::with_defaults();
        let date = registry.cast("date", &Value::from("2024-02-29")).unwrap();
        match &date {
            Value::Date(d) => assert_eq!(d.day(), 29),
            other => panic!("expected date, got {:?}", other),
        }
        assert_eq!(registry.cast("date", &date).unwrap(), date);

        let bytes = registry.cast("byte", &Value::from("aGk=")).unwrap();
        assert_eq!(bytes, Value::Bytes(b"hi".to_vec()));
        assert_eq!(registry.cast("byte", &bytes).unwrap(), bytes);
    }

    #[test]
    fn test_casters_reject_values_typed_by_another_format() {
        let registry = FormatRegistry::with_defaults();
        let uuid = registry
            .cast("uuid", &Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8"))
            .unwrap();
        let date = registry.cast("date", &Value::from("2020-01-02")).unwrap();

        assert!(registry.cast("date", &uuid).is_err());
        assert!(registry.cast("uuid", &date).is_err());
        assert!(registry.cast("byte", &date).is_err());
        assert!(registry.cast("email", &uuid).is_err());
        assert_eq!(registry.cast("uuid", &uuid).unwrap(), uuid);
        // Formats only constrain text.
        assert_eq!(registry.cast("date", &Value::Integer(3)).unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_int32_range() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.cast("int32", &Value::Integer(5)).is_ok());
        assert!(registry
            .cast("int32", &Value::Integer(i64::from(i32::MAX) + 1))
            .is_err());
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("with space@example.com"));
    }

    #[test]
    fn test_unknown_format_passes_through() {
        let registry = FormatRegistry::with_defaults();
        let value = Value::from("anything");
        assert_eq!(registry.cast("x-custom", &value).unwrap(), value);
    }

    #[test]
    fn test_register_custom_format() {
        let mut registry = FormatRegistry::new();
        registry.register("upper", |v: &Value| match v {
            Value::String(s) if s.chars().all(|c| c.is_ascii_uppercase()) => Ok(v.clone()),
            _ => Err(FormatError("not upper".into())),
        });
        assert!(registry.contains("upper"));
        assert!(registry.cast("upper", &Value::from("ABC")).is_ok());
        assert!(registry.cast("upper", &Value::from("abc")).is_err());
    }
}
