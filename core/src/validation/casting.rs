//! # String Casting
//!
//! Best-effort coercion of string-sourced values (parameters, URL-encoded
//! forms, multipart fields) to the primitive types their schema declares.
//!
//! Coercion never fails: a string that does not parse stays a string, so
//! the unmarshaller reports the mismatch as an `InvalidType` error against
//! the original text.

use crate::oas::models::{AdditionalProperties, SchemaId, SchemaSpec, SchemaTable, SchemaType};
use crate::value::Value;

const MAX_DEPTH: usize = 64;

/// Coerces string leaves of `value` following schema `id`.
pub(crate) fn coerce(schemas: &SchemaTable, id: SchemaId, value: Value) -> Value {
    coerce_at(schemas, id, value, 0)
}

fn coerce_at(schemas: &SchemaTable, id: SchemaId, value: Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return value;
    }
    let schema = schemas.get(id);
    match value {
        Value::String(s) => coerce_string(schemas, schema, s, depth),
        Value::Array(items) => match array_items(schemas, schema, depth) {
            Some(item_schema) => Value::Array(
                items
                    .into_iter()
                    .map(|item| coerce_at(schemas, item_schema, item, depth + 1))
                    .collect(),
            ),
            None => Value::Array(items),
        },
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| {
                    let item = match property_schema(schemas, schema, &key, depth) {
                        Some(target) => coerce_at(schemas, target, item, depth + 1),
                        None => item,
                    };
                    (key, item)
                })
                .collect(),
        ),
        other => other,
    }
}

fn coerce_string(schemas: &SchemaTable, schema: &SchemaSpec, s: String, depth: usize) -> Value {
    match schema.effective_type() {
        Some(SchemaType::String) => Value::String(s),
        Some(primitive) => parse_as(primitive, &s).unwrap_or(Value::String(s)),
        None => {
            // Untyped with composition: first member whose type parses the text.
            let members = schema
                .all_of
                .iter()
                .chain(&schema.one_of)
                .chain(&schema.any_of);
            for member in members {
                let cast = coerce_at(schemas, *member, Value::String(s.clone()), depth + 1);
                if !matches!(cast, Value::String(_)) {
                    return cast;
                }
            }
            Value::String(s)
        }
    }
}

fn parse_as(schema_type: SchemaType, s: &str) -> Option<Value> {
    match schema_type {
        SchemaType::Integer => s.trim().parse::<i64>().ok().map(Value::Integer),
        SchemaType::Number => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| s.parse::<f64>().map(Value::Number))
                .ok()
                .filter(|v| v.as_f64().is_some_and(f64::is_finite))
        }
        SchemaType::Boolean => match s {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        SchemaType::Null => (s.is_empty() || s == "null").then_some(Value::Null),
        SchemaType::String | SchemaType::Array | SchemaType::Object => None,
    }
}

fn array_items(schemas: &SchemaTable, schema: &SchemaSpec, depth: usize) -> Option<SchemaId> {
    schema.items.or_else(|| {
        composition(schema).find_map(|member| {
            (depth < MAX_DEPTH)
                .then(|| array_items(schemas, schemas.get(*member), depth + 1))
                .flatten()
        })
    })
}

fn property_schema(
    schemas: &SchemaTable,
    schema: &SchemaSpec,
    key: &str,
    depth: usize,
) -> Option<SchemaId> {
    if let Some(id) = schema.properties.get(key) {
        return Some(*id);
    }
    let from_members = composition(schema).find_map(|member| {
        (depth < MAX_DEPTH)
            .then(|| property_schema(schemas, schemas.get(*member), key, depth + 1))
            .flatten()
    });
    from_members.or(match schema.additional_properties {
        Some(AdditionalProperties::Schema(id)) => Some(id),
        _ => None,
    })
}

fn composition(schema: &SchemaSpec) -> impl Iterator<Item = &SchemaId> {
    schema
        .all_of
        .iter()
        .chain(&schema.one_of)
        .chain(&schema.any_of)
}
