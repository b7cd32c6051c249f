//! Reader behaviour over whole documents.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use portmux::json::{JsonNumber, JsonReader, TokenKind};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("JSON numbers are finite", |v| v.is_finite())
            .prop_map(Value::from),
        "\\PC{0,12}".prop_map(Value::String),
        "[\\x00-\\x1f\"\\\\]{0,4}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{0,6}", inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Walk a value with the typed calls only.
fn read_manually(reader: &mut JsonReader<'_>) -> Value {
    match reader.peek().unwrap() {
        TokenKind::BeginArray => {
            reader.begin_array().unwrap();
            let mut items = Vec::new();
            while reader.has_next().unwrap() {
                items.push(read_manually(reader));
            }
            reader.end_array().unwrap();
            Value::Array(items)
        }
        TokenKind::BeginObject => {
            reader.begin_object().unwrap();
            let mut map = Map::new();
            while reader.has_next().unwrap() {
                let name = reader.next_name().unwrap().into_owned();
                map.insert(name, read_manually(reader));
            }
            reader.end_object().unwrap();
            Value::Object(map)
        }
        TokenKind::String => Value::from(reader.next_string().unwrap().into_owned()),
        TokenKind::Number => match reader.next_number().unwrap() {
            JsonNumber::Long(v) => Value::from(v),
            JsonNumber::Double(v) => Value::from(v),
        },
        TokenKind::Boolean => Value::from(reader.next_boolean().unwrap()),
        TokenKind::Null => {
            reader.next_null().unwrap();
            Value::Null
        }
        other => panic!("unexpected token {other}"),
    }
}

proptest! {
    #[test]
    fn reads_whatever_serde_json_writes(value in json_value()) {
        let text = serde_json::to_string(&value).unwrap();

        let mut reader = JsonReader::new(&text);
        prop_assert_eq!(read_manually(&mut reader), value.clone());
        prop_assert_eq!(reader.peek().unwrap(), TokenKind::EndDocument);

        let mut reader = JsonReader::new(&text);
        prop_assert_eq!(reader.read_value().unwrap(), value);
        prop_assert_eq!(reader.peek().unwrap(), TokenKind::EndDocument);
    }

    #[test]
    fn skipping_consumes_exactly_one_value(value in json_value()) {
        let text = serde_json::to_string(&json!([value, "sentinel"])).unwrap();
        let mut reader = JsonReader::new(&text);
        reader.begin_array().unwrap();
        reader.skip_value().unwrap();
        prop_assert_eq!(reader.next_string().unwrap(), "sentinel");
        reader.end_array().unwrap();
        prop_assert_eq!(reader.peek().unwrap(), TokenKind::EndDocument);
    }
}

#[test]
fn strict_and_lenient_agree_on_valid_input() {
    let text = r#"{"a":1,"b":[1,2,3]}"#;
    let strict = JsonReader::new(text).read_value().unwrap();
    let lenient = JsonReader::new(text).lenient(true).read_value().unwrap();
    assert_eq!(strict, lenient);
    assert_eq!(strict, json!({"a": 1, "b": [1, 2, 3]}));
}

#[test]
fn trailing_comma_needs_lenient_mode() {
    let err = JsonReader::new("{a:1,}").read_value().unwrap_err();
    assert_eq!((err.line(), err.column()), (Some(1), Some(2)));

    let value = JsonReader::new("{a:1,}").lenient(true).read_value().unwrap();
    assert_eq!(value, json!({"a": 1}));
}

#[test]
fn long_range_edges() {
    let mut reader = JsonReader::new(
        "[9223372036854775807,-9223372036854775808,9223372036854775808,-9223372036854775809,9007199254740993.0]",
    );
    reader.begin_array().unwrap();
    assert_eq!(reader.next_long().unwrap(), i64::MAX);
    assert_eq!(reader.next_long().unwrap(), i64::MIN);
    assert!(reader.next_long().unwrap_err().is_precision_loss());
    reader.skip_value().unwrap();
    assert!(reader.next_long().unwrap_err().is_precision_loss());
    reader.skip_value().unwrap();
    assert_eq!(reader.next_long().unwrap(), 9_007_199_254_740_993);
}

#[test]
fn lenient_stream_of_documents() {
    let mut reader = JsonReader::new("1 'two' [3] {four:4}").lenient(true);
    let mut values = Vec::new();
    while reader.peek().unwrap() != TokenKind::EndDocument {
        values.push(reader.read_value().unwrap());
    }
    assert_eq!(values, vec![json!(1), json!("two"), json!([3]), json!({"four": 4})]);
}
