//! # Schema Unmarshaller
//!
//! Recursive application of a compiled schema to a structured value.
//!
//! The unmarshaller never coerces strings: values arrive already shaped by
//! a media type or parameter deserializer (see `casting` for the optional
//! string coercion done before this stage). It checks kinds, casts formats,
//! enforces keyword constraints and composition, and builds the typed
//! output. Errors are aggregated rather than short-circuited: every element
//! and property is visited and each failure carries its instance path.

use crate::oas::models::{AdditionalProperties, SchemaId, SchemaSpec, SchemaTable, SchemaType};
use crate::validation::errors::{ErrorKind, PathSegment, ValidationError, ValidationResult};
use crate::validation::formats::FormatRegistry;
use crate::value::Value;
use indexmap::IndexMap;

type Applied = Result<Value, Vec<ValidationError>>;

const MAX_NULL_DEPTH: usize = 32;

/// Schema/value pairs currently being applied; re-entering one of them is a
/// reference cycle that made no progress into the value.
type Trail = Vec<(SchemaId, *const Value)>;

/// Applies schemas of one `SchemaTable` to values.
#[derive(Debug, Clone, Copy)]
pub struct SchemaUnmarshaller<'a> {
    schemas: &'a SchemaTable,
    formats: &'a FormatRegistry,
    additional_properties_default: bool,
}

impl<'a> SchemaUnmarshaller<'a> {
    /// Creates an unmarshaller; undeclared `additionalProperties` allow extras.
    pub fn new(schemas: &'a SchemaTable, formats: &'a FormatRegistry) -> Self {
        Self {
            schemas,
            formats,
            additional_properties_default: true,
        }
    }

    /// Sets the behaviour for object schemas that do not declare
    /// `additionalProperties`.
    pub fn with_additional_properties_default(mut self, allowed: bool) -> Self {
        self.additional_properties_default = allowed;
        self
    }

    /// Applies schema `id` to `value`.
    pub fn unmarshal(&self, id: SchemaId, value: &Value) -> ValidationResult<Value> {
        ValidationResult::from_result(self.apply(id, value))
    }

    pub(crate) fn apply(&self, id: SchemaId, value: &Value) -> Applied {
        self.apply_traced(id, value, &mut Vec::new())
    }

    fn apply_traced(&self, id: SchemaId, value: &Value, trail: &mut Trail) -> Applied {
        let key = (id, value as *const Value);
        if trail.contains(&key) {
            return Ok(value.clone());
        }
        trail.push(key);
        let result = self.apply_schema(self.schemas.get(id), value, trail);
        trail.pop();
        result
    }

    fn apply_schema(&self, schema: &SchemaSpec, value: &Value, trail: &mut Trail) -> Applied {
        if value.is_null() {
            if schema.nullable || schema.schema_type == Some(SchemaType::Null) {
                return Ok(Value::Null);
            }
            if !self.admits_null(schema, 0) {
                return Err(vec![ValidationError::new(
                    ErrorKind::NullNotAllowed,
                    "null is not allowed",
                )]);
            }
            if !schema.has_composition() {
                return Ok(Value::Null);
            }
        }

        let mut errors = Vec::new();
        let mut parts = Vec::new();

        match self.apply_own(schema, value, trail) {
            Ok(v) => parts.push(v),
            Err(e) => errors.extend(e),
        }

        let polymorphic = !schema.one_of.is_empty() || !schema.any_of.is_empty();
        match &schema.discriminator {
            Some(_) if polymorphic => match self.apply_discriminator(schema, value, trail) {
                Ok(v) => parts.push(v),
                Err(e) => errors.extend(e),
            },
            _ => {
                if !schema.one_of.is_empty() {
                    match self.apply_one_of(&schema.one_of, value, trail) {
                        Ok(v) => parts.push(v),
                        Err(e) => errors.extend(e),
                    }
                }
                if !schema.any_of.is_empty() {
                    match self.apply_any_of(&schema.any_of, value, trail) {
                        Ok(v) => parts.push(v),
                        Err(e) => errors.extend(e),
                    }
                }
            }
        }

        for member in &schema.all_of {
            match self.apply_traced(*member, value, trail) {
                Ok(v) => parts.push(v),
                Err(e) => errors.extend(e),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(parts
            .into_iter()
            .reduce(|acc, next| merge(acc, next, value))
            .unwrap_or_else(|| value.clone()))
    }

    /// Whether `null` can satisfy `schema`: it is nullable, typed `null`,
    /// untyped, or its composition leaves room for a null member
    /// (`oneOf: [{type: string}, {type: "null"}]`).
    fn admits_null(&self, schema: &SchemaSpec, depth: usize) -> bool {
        if schema.nullable || schema.schema_type == Some(SchemaType::Null) {
            return true;
        }
        if schema.effective_type().is_some() || depth > MAX_NULL_DEPTH {
            return false;
        }
        if !schema.has_composition() {
            return true;
        }
        let member = |id: &SchemaId| self.admits_null(self.schemas.get(*id), depth + 1);
        (schema.one_of.is_empty() || schema.one_of.iter().any(member))
            && (schema.any_of.is_empty() || schema.any_of.iter().any(member))
            && schema.all_of.iter().all(member)
    }

    /// Type, format, constraints and enum of the schema itself.
    fn apply_own(&self, schema: &SchemaSpec, value: &Value, trail: &mut Trail) -> Applied {
        let typed = match schema.effective_type() {
            None => value.clone(),
            Some(SchemaType::Array) => self.apply_array(schema, value, trail)?,
            Some(SchemaType::Object) => self.apply_object(schema, value, trail)?,
            Some(primitive) => check_primitive(primitive, value)?,
        };

        let mut errors = check_constraints(schema, value);
        if let Some(literals) = &schema.enum_values {
            if !literals.iter().any(|lit| value.matches_literal(lit)) {
                errors.push(ValidationError::new(
                    ErrorKind::EnumMismatch,
                    format!("{} is not one of the allowed values", value.to_json()),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        match &schema.format {
            Some(format) if !matches!(typed, Value::Array(_) | Value::Object(_)) => self
                .formats
                .cast(format, &typed)
                .map_err(|e| {
                    vec![ValidationError::new(
                        ErrorKind::Format {
                            format: format.clone(),
                        },
                        e.to_string(),
                    )]
                }),
            _ => Ok(typed),
        }
    }

    fn apply_array(&self, schema: &SchemaSpec, value: &Value, trail: &mut Trail) -> Applied {
        let Value::Array(items) = value else {
            return Err(vec![invalid_type(SchemaType::Array, value)]);
        };
        let Some(item_schema) = schema.items else {
            return Ok(value.clone());
        };

        let mut errors = Vec::new();
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.apply_traced(item_schema, item, trail) {
                Ok(v) => out.push(v),
                Err(e) => errors.extend(e.into_iter().map(|e| e.under(PathSegment::Index(index)))),
            }
        }
        if errors.is_empty() {
            Ok(Value::Array(out))
        } else {
            Err(errors)
        }
    }

    fn apply_object(&self, schema: &SchemaSpec, value: &Value, trail: &mut Trail) -> Applied {
        let Value::Object(map) = value else {
            return Err(vec![invalid_type(SchemaType::Object, value)]);
        };

        let mut errors = Vec::new();
        for name in &schema.required {
            if !map.contains_key(name) {
                errors.push(
                    ValidationError::new(
                        ErrorKind::MissingProperty,
                        format!("required property '{}' is missing", name),
                    )
                    .under(PathSegment::Key(name.clone())),
                );
            }
        }

        let additional = schema.additional_properties.unwrap_or(AdditionalProperties::Allowed(
            self.additional_properties_default || schema.has_composition(),
        ));

        let mut out = IndexMap::with_capacity(map.len());
        for (name, property) in map {
            let target = match schema.properties.get(name) {
                Some(id) => Some(*id),
                None => match additional {
                    AdditionalProperties::Schema(id) => Some(id),
                    AdditionalProperties::Allowed(true) => None,
                    AdditionalProperties::Allowed(false) => {
                        errors.push(
                            ValidationError::new(
                                ErrorKind::UnexpectedProperty,
                                format!("property '{}' is not declared", name),
                            )
                            .under(PathSegment::Key(name.clone())),
                        );
                        continue;
                    }
                },
            };
            match target {
                Some(id) => match self.apply_traced(id, property, trail) {
                    Ok(v) => {
                        out.insert(name.clone(), v);
                    }
                    Err(e) => errors.extend(
                        e.into_iter()
                            .map(|e| e.under(PathSegment::Key(name.clone()))),
                    ),
                },
                None => {
                    out.insert(name.clone(), property.clone());
                }
            }
        }

        for (name, id) in &schema.properties {
            if map.contains_key(name) || schema.required.contains(name) {
                continue;
            }
            if let Some(default) = &self.schemas.get(*id).default {
                match self.apply(*id, &Value::from(default)) {
                    Ok(typed) => {
                        out.insert(name.clone(), typed);
                    }
                    Err(e) => errors.extend(
                        e.into_iter()
                            .map(|e| e.under(PathSegment::Key(name.clone()))),
                    ),
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(out))
        } else {
            Err(errors)
        }
    }

    fn apply_discriminator(&self, schema: &SchemaSpec, value: &Value, trail: &mut Trail) -> Applied {
        let Some(discriminator) = &schema.discriminator else {
            return Ok(value.clone());
        };
        let Value::Object(map) = value else {
            return Err(vec![invalid_type(SchemaType::Object, value)]);
        };
        let tag = map.get(&discriminator.property_name).and_then(Value::as_str);
        match tag.and_then(|t| discriminator.mapping.get(t)) {
            Some(variant) => self.apply_traced(*variant, value, trail),
            None => Err(vec![ValidationError::new(
                ErrorKind::UndefinedDiscriminatorValue,
                match tag {
                    Some(t) => format!("discriminator value '{}' is not mapped", t),
                    None => format!(
                        "discriminator property '{}' is missing",
                        discriminator.property_name
                    ),
                },
            )]),
        }
    }

    fn apply_one_of(&self, members: &[SchemaId], value: &Value, trail: &mut Trail) -> Applied {
        let mut matches: Vec<Value> = members
            .iter()
            .filter_map(|member| self.apply_traced(*member, value, trail).ok())
            .collect();
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(vec![ValidationError::new(
                ErrorKind::NoOneOfMatch,
                "value does not match any oneOf schema",
            )]),
            n => Err(vec![ValidationError::new(
                ErrorKind::MultipleOneOfMatch,
                format!("value matches {} oneOf schemas", n),
            )]),
        }
    }

    fn apply_any_of(&self, members: &[SchemaId], value: &Value, trail: &mut Trail) -> Applied {
        members
            .iter()
            .find_map(|member| self.apply_traced(*member, value, trail).ok())
            .ok_or_else(|| {
                vec![ValidationError::new(
                    ErrorKind::NoAnyOfMatch,
                    "value does not match any anyOf schema",
                )]
            })
    }
}

fn invalid_type(expected: SchemaType, value: &Value) -> ValidationError {
    let actual = value.kind();
    ValidationError::new(
        ErrorKind::invalid_type(expected, actual),
        format!("expected {}, got {}", expected, actual),
    )
}

fn check_primitive(expected: SchemaType, value: &Value) -> Applied {
    let accepted = match (expected, value) {
        (SchemaType::String, v) if v.is_string_like() => Some(v.clone()),
        (SchemaType::Integer, Value::Integer(_)) => Some(value.clone()),
        (SchemaType::Integer, Value::Number(n))
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 =>
        {
            Some(Value::Integer(*n as i64))
        }
        (SchemaType::Number, Value::Integer(_) | Value::Number(_)) => Some(value.clone()),
        (SchemaType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (SchemaType::Null, Value::Null) => Some(Value::Null),
        _ => None,
    };
    accepted.ok_or_else(|| vec![invalid_type(expected, value)])
}

fn constraint(keyword: &str, message: String) -> ValidationError {
    ValidationError::new(
        ErrorKind::ConstraintViolation {
            keyword: keyword.to_string(),
        },
        message,
    )
}

/// Keyword constraints for the runtime kind of `value`.
///
/// String keywords apply to the wire text of typed values too, so a value
/// typed by one schema is still told apart by another.
fn check_constraints(schema: &SchemaSpec, value: &Value) -> Vec<ValidationError> {
    let c = &schema.constraints;
    let mut errors = Vec::new();

    if let Some(s) = value.wire_text() {
        let len = s.chars().count();
        if let Some(min) = c.min_length.filter(|min| len < *min) {
            errors.push(constraint("minLength", format!("length {} is below {}", len, min)));
        }
        if let Some(max) = c.max_length.filter(|max| len > *max) {
            errors.push(constraint("maxLength", format!("length {} exceeds {}", len, max)));
        }
        if let Some(pattern) = c.pattern.as_ref().filter(|p| !p.is_match(&s)) {
            errors.push(constraint(
                "pattern",
                format!("'{}' does not match '{}'", s, pattern.as_str()),
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = c.minimum {
            if n < min || (c.exclusive_minimum && n == min) {
                let keyword = if c.exclusive_minimum { "exclusiveMinimum" } else { "minimum" };
                errors.push(constraint(keyword, format!("{} is below {}", n, min)));
            }
        }
        if let Some(max) = c.maximum {
            if n > max || (c.exclusive_maximum && n == max) {
                let keyword = if c.exclusive_maximum { "exclusiveMaximum" } else { "maximum" };
                errors.push(constraint(keyword, format!("{} exceeds {}", n, max)));
            }
        }
        if let Some(m) = c.multiple_of.filter(|m| *m > 0.0) {
            let q = n / m;
            if (q - q.round()).abs() > 1e-9 {
                errors.push(constraint("multipleOf", format!("{} is not a multiple of {}", n, m)));
            }
        }
    }

    if let Value::Array(items) = value {
        if let Some(min) = c.min_items.filter(|min| items.len() < *min) {
            errors.push(constraint("minItems", format!("{} items, expected at least {}", items.len(), min)));
        }
        if let Some(max) = c.max_items.filter(|max| items.len() > *max) {
            errors.push(constraint("maxItems", format!("{} items, expected at most {}", items.len(), max)));
        }
        if c.unique_items {
            let rendered: Vec<_> = items.iter().map(Value::to_json).collect();
            let duplicate = items
                .iter()
                .enumerate()
                .any(|(i, item)| rendered[i + 1..].iter().any(|other| item.matches_literal(other)));
            if duplicate {
                errors.push(constraint("uniqueItems", "array items are not unique".to_string()));
            }
        }
    }

    if let Value::Object(map) = value {
        if let Some(min) = c.min_properties.filter(|min| map.len() < *min) {
            errors.push(constraint("minProperties", format!("{} properties, expected at least {}", map.len(), min)));
        }
        if let Some(max) = c.max_properties.filter(|max| map.len() > *max) {
            errors.push(constraint("maxProperties", format!("{} properties, expected at most {}", map.len(), max)));
        }
    }

    errors
}

/// Additive merge of composition results.
///
/// Objects merge key by key. Elsewhere the accumulated value wins unless it
/// is still the untouched input, in which case the later, more typed result
/// replaces it.
fn merge(acc: Value, next: Value, raw: &Value) -> Value {
    match (acc, next) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                match left.get_mut(&key) {
                    Some(slot) => {
                        if let Some(raw_child) = raw.get(&key) {
                            let existing = std::mem::replace(slot, Value::Null);
                            *slot = merge(existing, value, raw_child);
                        }
                    }
                    None => {
                        left.insert(key, value);
                    }
                }
            }
            Value::Object(left)
        }
        (acc, next) => {
            if &acc == raw {
                next
            } else {
                acc
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oas::models::{Constraints, Discriminator};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        table: SchemaTable,
        formats: FormatRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                table: SchemaTable::new(),
                formats: FormatRegistry::with_defaults(),
            }
        }

        fn push(&mut self, schema: SchemaSpec) -> SchemaId {
            self.table.push(schema)
        }

        fn object(&mut self, props: &[(&str, SchemaId)], required: &[&str]) -> SchemaId {
            self.push(SchemaSpec {
                schema_type: Some(SchemaType::Object),
                properties: props.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                required: required.iter().map(|s| s.to_string()).collect(),
                ..SchemaSpec::default()
            })
        }

        fn run(&self, id: SchemaId, value: serde_json::Value) -> ValidationResult<Value> {
            SchemaUnmarshaller::new(&self.table, &self.formats).unmarshal(id, &Value::from(value))
        }
    }

    fn kinds(result: &ValidationResult<Value>) -> Vec<ErrorKind> {
        result.errors().iter().map(|e| e.kind.clone()).collect()
    }

    #[test]
    fn test_null_handling() {
        let mut fx = Fixture::new();
        let strict = fx.push(SchemaSpec::of_type(SchemaType::String));
        let nullable = fx.push(SchemaSpec {
            nullable: true,
            ..SchemaSpec::of_type(SchemaType::String)
        });
        assert_eq!(kinds(&fx.run(strict, json!(null))), vec![ErrorKind::NullNotAllowed]);
        assert_eq!(fx.run(nullable, json!(null)).value(), Some(&Value::Null));
    }

    #[test]
    fn test_null_against_composition() {
        let mut fx = Fixture::new();
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        let integer = fx.push(SchemaSpec::of_type(SchemaType::Integer));
        let null = fx.push(SchemaSpec::of_type(SchemaType::Null));
        let strict = fx.push(SchemaSpec {
            one_of: vec![string, integer],
            ..SchemaSpec::default()
        });
        let any_strict = fx.push(SchemaSpec {
            any_of: vec![string, integer],
            ..SchemaSpec::default()
        });
        let optional = fx.push(SchemaSpec {
            one_of: vec![string, null],
            ..SchemaSpec::default()
        });
        let nullable = fx.push(SchemaSpec {
            nullable: true,
            all_of: vec![string],
            ..SchemaSpec::default()
        });

        assert_eq!(kinds(&fx.run(strict, json!(null))), vec![ErrorKind::NullNotAllowed]);
        assert_eq!(kinds(&fx.run(any_strict, json!(null))), vec![ErrorKind::NullNotAllowed]);
        assert_eq!(fx.run(optional, json!(null)).value(), Some(&Value::Null));
        assert_eq!(fx.run(nullable, json!(null)).value(), Some(&Value::Null));
    }

    #[test]
    fn test_primitive_kind_mismatch() {
        let mut fx = Fixture::new();
        let int = fx.push(SchemaSpec::of_type(SchemaType::Integer));
        let result = fx.run(int, json!("5"));
        assert_eq!(
            kinds(&result),
            vec![ErrorKind::invalid_type(SchemaType::Integer, crate::value::ValueKind::String)]
        );
        assert_eq!(fx.run(int, json!(5.0)).value(), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_array_errors_aggregate_with_index() {
        let mut fx = Fixture::new();
        let int = fx.push(SchemaSpec::of_type(SchemaType::Integer));
        let arr = fx.push(SchemaSpec {
            items: Some(int),
            ..SchemaSpec::of_type(SchemaType::Array)
        });
        let result = fx.run(arr, json!([1, "x", 3, true]));
        let paths: Vec<String> = result.errors().iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["/1", "/3"]);
    }

    #[test]
    fn test_object_required_and_additional() {
        let mut fx = Fixture::new();
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        let obj = fx.push(SchemaSpec {
            schema_type: Some(SchemaType::Object),
            properties: [("name".to_string(), string)].into_iter().collect(),
            required: vec!["name".into()],
            additional_properties: Some(AdditionalProperties::Allowed(false)),
            ..SchemaSpec::default()
        });
        let result = fx.run(obj, json!({"extra": 1}));
        assert_eq!(
            kinds(&result),
            vec![ErrorKind::MissingProperty, ErrorKind::UnexpectedProperty]
        );
        assert_eq!(result.errors()[1].path.to_string(), "/extra");
    }

    #[test]
    fn test_additional_properties_schema() {
        let mut fx = Fixture::new();
        let int = fx.push(SchemaSpec::of_type(SchemaType::Integer));
        let obj = fx.push(SchemaSpec {
            schema_type: Some(SchemaType::Object),
            additional_properties: Some(AdditionalProperties::Schema(int)),
            ..SchemaSpec::default()
        });
        assert!(fx.run(obj, json!({"a": 1, "b": 2})).is_valid());
        assert_eq!(fx.run(obj, json!({"a": "x"})).errors()[0].path.to_string(), "/a");
    }

    #[test]
    fn test_format_cast_in_object() {
        let mut fx = Fixture::new();
        let date = fx.push(SchemaSpec {
            format: Some("date".into()),
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let obj = fx.object(&[("born", date)], &[]);
        let out = fx.run(obj, json!({"born": "2020-01-02"}));
        assert!(matches!(out.value().and_then(|v| v.get("born")), Some(Value::Date(_))));

        let bad = fx.run(obj, json!({"born": "yesterday"}));
        assert_eq!(
            kinds(&bad),
            vec![ErrorKind::Format {
                format: "date".into()
            }]
        );
    }

    #[test]
    fn test_one_of_ambiguity() {
        let mut fx = Fixture::new();
        let number = fx.push(SchemaSpec::of_type(SchemaType::Number));
        let integer = fx.push(SchemaSpec::of_type(SchemaType::Integer));
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        let one_of = fx.push(SchemaSpec {
            one_of: vec![number, integer, string],
            ..SchemaSpec::default()
        });
        assert_eq!(kinds(&fx.run(one_of, json!(3))), vec![ErrorKind::MultipleOneOfMatch]);
        assert!(fx.run(one_of, json!("x")).is_valid());
        assert_eq!(kinds(&fx.run(one_of, json!(true))), vec![ErrorKind::NoOneOfMatch]);
    }

    #[test]
    fn test_discriminator_selects_single_variant() {
        let mut fx = Fixture::new();
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        let boolean = fx.push(SchemaSpec::of_type(SchemaType::Boolean));
        let cat = fx.object(&[("type", string), ("meow", boolean)], &["type"]);
        let dog = fx.object(&[("type", string)], &["type"]);
        let pet = fx.push(SchemaSpec {
            one_of: vec![cat, dog],
            discriminator: Some(Discriminator {
                property_name: "type".into(),
                mapping: [("cat".to_string(), cat), ("dog".to_string(), dog)]
                    .into_iter()
                    .collect(),
            }),
            ..SchemaSpec::default()
        });
        // Both variants accept the value structurally; only the mapped one runs.
        assert!(fx.run(pet, json!({"type": "cat", "meow": true})).is_valid());
        assert_eq!(
            kinds(&fx.run(pet, json!({"type": "bird"}))),
            vec![ErrorKind::UndefinedDiscriminatorValue]
        );
        assert_eq!(
            kinds(&fx.run(pet, json!({}))),
            vec![ErrorKind::UndefinedDiscriminatorValue]
        );
    }

    #[test]
    fn test_all_of_merges_typed_results() {
        let mut fx = Fixture::new();
        let loose = fx.push(SchemaSpec::default());
        let date = fx.push(SchemaSpec {
            format: Some("date".into()),
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        let first = fx.object(&[("when", loose), ("name", string)], &["name"]);
        let second = fx.object(&[("when", date)], &["when"]);
        let both = fx.push(SchemaSpec {
            all_of: vec![first, second],
            ..SchemaSpec::default()
        });

        let out = fx.run(both, json!({"name": "a", "when": "2021-03-04"}));
        let value = out.value().unwrap();
        assert!(matches!(value.get("when"), Some(Value::Date(_))));
        assert_eq!(value.get("name"), Some(&Value::from("a")));

        let missing = fx.run(both, json!({}));
        assert_eq!(
            kinds(&missing),
            vec![ErrorKind::MissingProperty, ErrorKind::MissingProperty]
        );
    }

    #[test]
    fn test_any_of_first_match_wins() {
        let mut fx = Fixture::new();
        let uuid = fx.push(SchemaSpec {
            format: Some("uuid".into()),
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        let any = fx.push(SchemaSpec {
            any_of: vec![uuid, string],
            ..SchemaSpec::default()
        });
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert!(matches!(fx.run(any, json!(id)).value(), Some(Value::Uuid(_))));
        assert_eq!(fx.run(any, json!("plain")).value(), Some(&Value::from("plain")));
        assert_eq!(kinds(&fx.run(any, json!(1))), vec![ErrorKind::NoAnyOfMatch]);
    }

    #[test]
    fn test_enum_and_constraints() {
        let mut fx = Fixture::new();
        let color = fx.push(SchemaSpec {
            enum_values: Some(vec![json!("red"), json!("green")]),
            ..SchemaSpec::of_type(SchemaType::String)
        });
        assert!(fx.run(color, json!("red")).is_valid());
        assert_eq!(kinds(&fx.run(color, json!("blue"))), vec![ErrorKind::EnumMismatch]);

        let bounded = fx.push(SchemaSpec {
            constraints: Constraints {
                minimum: Some(1.0),
                maximum: Some(10.0),
                exclusive_maximum: true,
                multiple_of: Some(0.5),
                ..Constraints::default()
            },
            ..SchemaSpec::of_type(SchemaType::Number)
        });
        assert!(fx.run(bounded, json!(9.5)).is_valid());
        let result = fx.run(bounded, json!(10));
        assert_eq!(
            kinds(&result),
            vec![ErrorKind::ConstraintViolation {
                keyword: "exclusiveMaximum".into()
            }]
        );
    }

    #[test]
    fn test_default_applied_for_absent_property() {
        let mut fx = Fixture::new();
        let limit = fx.push(SchemaSpec {
            default: Some(json!(20)),
            ..SchemaSpec::of_type(SchemaType::Integer)
        });
        let obj = fx.object(&[("limit", limit)], &[]);
        let out = fx.run(obj, json!({}));
        assert_eq!(out.value().and_then(|v| v.get("limit")), Some(&Value::Integer(20)));
    }

    #[test]
    fn test_invalid_default_is_reported() {
        let mut fx = Fixture::new();
        let limit = fx.push(SchemaSpec {
            default: Some(json!("many")),
            ..SchemaSpec::of_type(SchemaType::Integer)
        });
        let obj = fx.object(&[("limit", limit)], &[]);
        let out = fx.run(obj, json!({}));
        assert!(out.value().is_none());
        assert_eq!(
            kinds(&out),
            vec![ErrorKind::invalid_type(SchemaType::Integer, crate::value::ValueKind::String)]
        );
        assert_eq!(out.errors()[0].path.to_string(), "/limit");
    }

    #[test]
    fn test_one_of_by_format_and_length_is_stable() {
        let mut fx = Fixture::new();
        let date = fx.push(SchemaSpec {
            format: Some("date".into()),
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let short = fx.push(SchemaSpec {
            constraints: Constraints {
                max_length: Some(3),
                ..Constraints::default()
            },
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let either = fx.push(SchemaSpec {
            one_of: vec![date, short],
            ..SchemaSpec::default()
        });

        let unmarshaller = SchemaUnmarshaller::new(&fx.table, &fx.formats);
        let first = unmarshaller.unmarshal(either, &Value::from("2020-01-02"));
        let typed = first.value().unwrap();
        assert!(matches!(typed, Value::Date(_)));
        let second = unmarshaller.unmarshal(either, typed);
        assert_eq!(second.value(), Some(typed));

        let abc = unmarshaller.unmarshal(either, &Value::from("abc"));
        assert_eq!(abc.value(), Some(&Value::from("abc")));
    }

    #[test]
    fn test_recursive_schema() {
        let mut fx = Fixture::new();
        let node = fx.table.reserve();
        let children = fx.push(SchemaSpec {
            items: Some(node),
            ..SchemaSpec::of_type(SchemaType::Array)
        });
        let int = fx.push(SchemaSpec::of_type(SchemaType::Integer));
        fx.table.set(
            node,
            SchemaSpec {
                schema_type: Some(SchemaType::Object),
                properties: [("value".to_string(), int), ("children".to_string(), children)]
                    .into_iter()
                    .collect(),
                ..SchemaSpec::default()
            },
        );
        let ok = fx.run(node, json!({"value": 1, "children": [{"value": 2, "children": []}]}));
        assert!(ok.is_valid());
        let bad = fx.run(node, json!({"value": 1, "children": [{"value": "x"}]}));
        assert_eq!(bad.errors()[0].path.to_string(), "/children/0/value");
    }

    #[test]
    fn test_self_referencing_composition_terminates() {
        let mut fx = Fixture::new();
        let id = fx.table.reserve();
        let string = fx.push(SchemaSpec::of_type(SchemaType::String));
        fx.table.set(
            id,
            SchemaSpec {
                all_of: vec![id, string],
                ..SchemaSpec::default()
            },
        );
        assert!(fx.run(id, json!("x")).is_valid());
    }

    #[test]
    fn test_untyped_schema_accepts_anything() {
        let mut fx = Fixture::new();
        let any = fx.push(SchemaSpec::default());
        assert!(fx.run(any, json!({"a": [1, null]})).is_valid());
        assert!(fx.run(any, json!(null)).is_valid());
    }
}
