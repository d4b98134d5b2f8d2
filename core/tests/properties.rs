use conform_core::oas::Constraints;
use conform_core::validation::ErrorKind;
use conform_core::{FormatRegistry, SchemaId, SchemaSpec, SchemaTable, SchemaType, SchemaUnmarshaller, Value};
use indexmap::IndexMap;
use proptest::prelude::*;
use serde_json::json;

struct Record {
    table: SchemaTable,
    root: SchemaId,
}

fn record_schema() -> Record {
    let mut table = SchemaTable::new();
    let id = table.push(SchemaSpec {
        format: Some("int64".into()),
        ..SchemaSpec::of_type(SchemaType::Integer)
    });
    let born = table.push(SchemaSpec {
        format: Some("date".into()),
        ..SchemaSpec::of_type(SchemaType::String)
    });
    let tag = table.push(SchemaSpec::of_type(SchemaType::String));
    let tags = table.push(SchemaSpec {
        items: Some(tag),
        constraints: Constraints {
            max_items: Some(5),
            ..Constraints::default()
        },
        ..SchemaSpec::of_type(SchemaType::Array)
    });
    let score = table.push(SchemaSpec::of_type(SchemaType::Number));
    let note = table.push(SchemaSpec {
        nullable: true,
        ..SchemaSpec::of_type(SchemaType::String)
    });
    let kind = table.push(SchemaSpec {
        enum_values: Some(vec![json!("a"), json!("b")]),
        ..SchemaSpec::of_type(SchemaType::String)
    });
    let root = table.push(SchemaSpec {
        schema_type: Some(SchemaType::Object),
        required: vec!["id".into()],
        properties: [
            ("id", id),
            ("born", born),
            ("tags", tags),
            ("score", score),
            ("note", note),
            ("kind", kind),
        ]
        .into_iter()
        .map(|(name, id)| (name.to_string(), id))
        .collect(),
        ..SchemaSpec::default()
    });
    Record { table, root }
}

/// `oneOf` whose members differ only by format or string keywords.
fn text_variants() -> Record {
    let mut table = SchemaTable::new();
    let date = table.push(SchemaSpec {
        format: Some("date".into()),
        ..SchemaSpec::of_type(SchemaType::String)
    });
    let short = table.push(SchemaSpec {
        constraints: Constraints {
            max_length: Some(3),
            ..Constraints::default()
        },
        ..SchemaSpec::of_type(SchemaType::String)
    });
    let uuid = table.push(SchemaSpec {
        format: Some("uuid".into()),
        ..SchemaSpec::of_type(SchemaType::String)
    });
    let root = table.push(SchemaSpec {
        one_of: vec![date, short, uuid],
        ..SchemaSpec::default()
    });
    Record { table, root }
}

fn text_variant_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        (1900i32..2100, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| Value::from(format!("{:04}-{:02}-{:02}", y, m, d))),
        "[a-z]{0,3}".prop_map(Value::String),
        any::<u128>().prop_map(|n| Value::from(uuid::Uuid::from_u128(n).to_string())),
    ]
}

fn record_value() -> impl Strategy<Value = Value> {
    (
        proptest::option::of(any::<i64>()),
        proptest::option::of((1900i32..2100, 1u32..=12, 1u32..=28)),
        proptest::option::of(proptest::collection::vec("[a-z]{0,5}", 0..7)),
        proptest::option::of(-1.0e6f64..1.0e6),
        proptest::option::of(proptest::option::of("[a-z ]{0,8}")),
        proptest::option::of(prop_oneof![Just("a"), Just("b"), Just("c")]),
    )
        .prop_map(|(id, born, tags, score, note, kind)| {
            let mut map = IndexMap::new();
            if let Some(id) = id {
                map.insert("id".to_string(), Value::Integer(id));
            }
            if let Some((y, m, d)) = born {
                map.insert("born".to_string(), Value::from(format!("{:04}-{:02}-{:02}", y, m, d)));
            }
            if let Some(tags) = tags {
                map.insert(
                    "tags".to_string(),
                    Value::Array(tags.into_iter().map(Value::String).collect()),
                );
            }
            if let Some(score) = score {
                map.insert("score".to_string(), Value::Number(score));
            }
            if let Some(note) = note {
                map.insert("note".to_string(), note.map(Value::String).unwrap_or(Value::Null));
            }
            if let Some(kind) = kind {
                map.insert("kind".to_string(), Value::from(kind));
            }
            Value::Object(map)
        })
}

proptest! {
    #[test]
    fn test_unmarshal_is_idempotent(value in record_value()) {
        let record = record_schema();
        let formats = FormatRegistry::with_defaults();
        let unmarshaller = SchemaUnmarshaller::new(&record.table, &formats);

        let first = unmarshaller.unmarshal(record.root, &value);
        if let Some(typed) = first.value() {
            let second = unmarshaller.unmarshal(record.root, typed);
            prop_assert!(second.is_valid(), "{:?}", second.errors());
            prop_assert_eq!(second.value(), Some(typed));
        }
    }

    #[test]
    fn test_composed_one_of_is_idempotent(value in text_variant_value()) {
        let record = text_variants();
        let formats = FormatRegistry::with_defaults();
        let unmarshaller = SchemaUnmarshaller::new(&record.table, &formats);

        let first = unmarshaller.unmarshal(record.root, &value);
        prop_assert!(first.is_valid(), "{:?}", first.errors());
        let typed = first.value().unwrap();
        let second = unmarshaller.unmarshal(record.root, typed);
        prop_assert!(second.is_valid(), "{:?}", second.errors());
        prop_assert_eq!(second.value(), Some(typed));
    }

    #[test]
    fn test_one_of_ambiguity_is_reported(text in "[a-z]{0,8}") {
        let mut table = SchemaTable::new();
        let short = table.push(SchemaSpec {
            constraints: Constraints { max_length: Some(5), ..Constraints::default() },
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let long = table.push(SchemaSpec {
            constraints: Constraints { min_length: Some(3), ..Constraints::default() },
            ..SchemaSpec::of_type(SchemaType::String)
        });
        let root = table.push(SchemaSpec {
            one_of: vec![short, long],
            ..SchemaSpec::default()
        });
        let formats = FormatRegistry::with_defaults();
        let result = SchemaUnmarshaller::new(&table, &formats).unmarshal(root, &Value::from(text.as_str()));

        let len = text.chars().count();
        if (3..=5).contains(&len) {
            prop_assert_eq!(result.errors().len(), 1);
            prop_assert_eq!(&result.errors()[0].kind, &ErrorKind::MultipleOneOfMatch);
        } else {
            prop_assert!(result.is_valid());
            prop_assert_eq!(result.value(), Some(&Value::from(text.as_str())));
        }
    }

    #[test]
    fn test_numeric_one_of_never_picks_first(n in any::<i64>()) {
        let mut table = SchemaTable::new();
        let integer = table.push(SchemaSpec::of_type(SchemaType::Integer));
        let number = table.push(SchemaSpec::of_type(SchemaType::Number));
        let root = table.push(SchemaSpec {
            one_of: vec![integer, number],
            ..SchemaSpec::default()
        });
        let formats = FormatRegistry::new();
        let result = SchemaUnmarshaller::new(&table, &formats).unmarshal(root, &Value::Integer(n));
        prop_assert!(result.value().is_none());
        prop_assert_eq!(&result.errors()[0].kind, &ErrorKind::MultipleOneOfMatch);
    }
}
