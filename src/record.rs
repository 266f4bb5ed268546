use aws_sdk_dynamodb::types::{AttributeValue, KeySchemaElement, KeyType};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_dynamo::to_item;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A single table item: attribute name to typed value
pub type Record = HashMap<String, AttributeValue>;

/// Role an attribute plays in a table's primary key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    /// Partition (hash) key
    Partition,
    /// Sort (range) key
    Sort,
}

/// Primary key layout of a table
///
/// Holds exactly one partition key and at most one sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySchema {
    partition: String,
    sort: Option<String>,
}

impl KeySchema {
    /// Schema with only a partition key
    pub fn partition(name: impl Into<String>) -> Self {
        Self {
            partition: name.into(),
            sort: None,
        }
    }

    /// Schema with a partition key and a sort key
    pub fn composite(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }

    /// Build a schema from the elements returned by `DescribeTable`
    pub fn from_elements(elements: &[KeySchemaElement]) -> Result<Self, Error> {
        let mut partition = None;
        let mut sort = None;

        for element in elements {
            let slot = match element.key_type() {
                KeyType::Hash => &mut partition,
                KeyType::Range => &mut sort,
                other => {
                    return Err(Error::SchemaMismatch(format!(
                        "unsupported key type {other:?} for attribute '{}'",
                        element.attribute_name()
                    )));
                }
            };
            if slot.is_some() {
                return Err(Error::SchemaMismatch(format!(
                    "key schema declares more than one {:?} key",
                    element.key_type()
                )));
            }
            *slot = Some(element.attribute_name().to_string());
        }

        let partition = partition.ok_or_else(|| {
            Error::SchemaMismatch("key schema has no partition key".to_string())
        })?;

        Ok(Self { partition, sort })
    }

    /// Name of the partition key attribute
    pub fn partition_key(&self) -> &str {
        &self.partition
    }

    /// Name of the sort key attribute, if any
    pub fn sort_key(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    /// Key attributes in schema order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, KeyRole)> {
        std::iter::once((self.partition.as_str(), KeyRole::Partition))
            .chain(self.sort.as_deref().map(|name| (name, KeyRole::Sort)))
    }

    /// Whether `attribute` is part of the primary key
    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes().any(|(name, _)| name == attribute)
    }

    /// Fail unless the caller's partition key name matches this schema
    pub fn ensure_partition(&self, expected: &str) -> Result<(), Error> {
        if self.partition != expected {
            return Err(Error::SchemaMismatch(format!(
                "primary key '{}' does not match schema key '{}'",
                expected, self.partition
            )));
        }
        Ok(())
    }

    /// Fail if `attribute` is a key attribute; key attributes cannot be rewritten in place
    pub fn ensure_not_key(&self, attribute: &str) -> Result<(), Error> {
        if self.contains(attribute) {
            return Err(Error::SchemaMismatch(format!(
                "'{}' is a primary key attribute and cannot be modified",
                attribute
            )));
        }
        Ok(())
    }

    /// Names of key attributes missing from `record`
    pub fn missing_in<'a>(&'a self, record: &Record) -> Vec<&'a str> {
        self.attributes()
            .map(|(name, _)| name)
            .filter(|name| !record.contains_key(*name))
            .collect()
    }

    /// Project `record` onto its key attributes
    pub fn key_of(&self, record: &Record) -> Result<Record, Error> {
        let mut key = Record::with_capacity(2);
        for (name, _) in self.attributes() {
            let value = record.get(name).ok_or_else(|| {
                Error::MalformedInput(format!("record is missing key attribute '{name}'"))
            })?;
            let _ = key.insert(name.to_string(), value.clone());
        }
        Ok(key)
    }

    /// Text identity of the item `record` addresses, `None` when a key attribute is missing
    ///
    /// Two records share an identity exactly when they write the same item.
    pub fn key_identity(&self, record: &Record) -> Option<String> {
        self.attributes()
            .map(|(name, _)| record.get(name).map(render_scalar))
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join("\u{1f}"))
    }
}

impl fmt::Display for KeySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{} (partition), {} (sort)", self.partition, sort),
            None => write!(f, "{} (partition)", self.partition),
        }
    }
}

/// Render a key as `name=value` pairs for log and error messages
pub fn describe_key(key: &Record) -> String {
    let mut parts: Vec<String> = key
        .iter()
        .map(|(name, value)| format!("{name}={}", render_scalar(value)))
        .collect();
    parts.sort();
    parts.join(",")
}

/// Convert a JSON object into a record
///
/// Numbers keep the text they were written with, so values beyond `f64` precision are stored
/// exactly.
pub fn record_from_json(value: Value) -> Result<Record, Error> {
    match value {
        Value::Object(object) => object_to_record(object),
        other => Err(Error::MalformedInput(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn object_to_record(object: Map<String, Value>) -> Result<Record, Error> {
    object
        .into_iter()
        .map(|(name, value)| Ok((name, json_to_attribute(value)?)))
        .collect()
}

/// Convert a JSON value to an attribute value
pub fn json_to_attribute(value: Value) -> Result<AttributeValue, Error> {
    Ok(match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(validate_number(&n.to_string())?),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => AttributeValue::L(
            values
                .into_iter()
                .map(json_to_attribute)
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(object) => AttributeValue::M(object_to_record(object)?),
    })
}

/// Most significant digits a stored number may carry
const MAX_SIGNIFICANT_DIGITS: usize = 38;

/// Decimal exponent range of non-zero stored numbers
const EXPONENT_RANGE: std::ops::RangeInclusive<i64> = -130..=125;

/// Check `text` is a number the table can store and return it trimmed
///
/// Accepts an optional sign, digits with an optional fraction and an optional exponent.
/// `NaN`, infinities, more than 38 significant digits and magnitudes outside
/// `1e-130..1e126` are refused.
pub fn validate_number(text: &str) -> Result<String, Error> {
    let trimmed = text.trim();
    let invalid = |why: &str| Error::InvalidValue(format!("'{text}' is not a number: {why}"));

    let unsigned = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
        None => (unsigned, None),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid("expected decimal digits"));
    }
    let exponent = match exponent {
        Some(e) => {
            let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
            if digits.is_empty() || !all_digits(digits) {
                return Err(invalid("malformed exponent"));
            }
            e.parse::<i64>().map_err(|_| invalid("exponent out of range"))?
        }
        None => 0,
    };

    let digits = format!("{whole}{fraction}");
    let Some(lead) = digits.find(|c: char| c != '0') else {
        // zero in any spelling
        return Ok(trimmed.to_string());
    };
    if digits[lead..].trim_end_matches('0').len() > MAX_SIGNIFICANT_DIGITS {
        return Err(invalid("more than 38 significant digits"));
    }
    let magnitude = (whole.len() as i64 - 1 - lead as i64).saturating_add(exponent);
    if !EXPONENT_RANGE.contains(&magnitude) {
        return Err(invalid("magnitude out of range"));
    }
    Ok(trimmed.to_string())
}

/// Serialize any `Serialize` value into a record
pub fn to_record<T: Serialize + ?Sized>(value: &T) -> Result<Record, Error> {
    Ok(to_item(value)?)
}

/// Parse a JSON object given as text, e.g. a `--key` argument
pub fn record_from_json_str(text: &str) -> Result<Record, Error> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::InvalidValue(format!("'{text}' is not valid JSON: {e}")))?;
    record_from_json(value)
}

/// Convert a record to a JSON object
///
/// Numbers become JSON numbers when they parse as one, binary values are base64 encoded
/// and sets become arrays.
pub fn record_to_json(record: &Record) -> Value {
    let mut object = Map::with_capacity(record.len());
    for (name, value) in record {
        let _ = object.insert(name.clone(), attribute_to_json(value));
    }
    Value::Object(object)
}

/// Convert a single attribute value to JSON
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::B(blob) => Value::String(BASE64.encode(blob.as_ref())),
        AttributeValue::Ss(values) => values.iter().cloned().map(Value::String).collect(),
        AttributeValue::Ns(values) => values.iter().map(|n| number_to_json(n)).collect(),
        AttributeValue::Bs(values) => values
            .iter()
            .map(|blob| Value::String(BASE64.encode(blob.as_ref())))
            .collect(),
        AttributeValue::L(values) => values.iter().map(attribute_to_json).collect(),
        AttributeValue::M(map) => record_to_json(map),
        _ => Value::Null,
    }
}

fn number_to_json(n: &str) -> Value {
    Number::from_str(n)
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(n.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render a value as plain text
///
/// Strings and numbers render as-is, booleans as `true`/`false`, null as an empty string and
/// everything else as compact JSON.
pub fn render_scalar(value: &AttributeValue) -> String {
    match value {
        AttributeValue::S(s) => s.clone(),
        AttributeValue::N(n) => n.clone(),
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Null(_) => String::new(),
        other => attribute_to_json(other).to_string(),
    }
}

/// Attribute type used to interpret text from the command line or a CSV column
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ValueType {
    /// String
    #[value(name = "S", alias = "s")]
    String,
    /// Number
    #[value(name = "N", alias = "n")]
    Number,
    /// Boolean (`true`, `t`, `yes`, `y`, `1` are true)
    #[value(name = "BOOL", alias = "bool")]
    Bool,
    /// Null; the text is ignored
    #[value(name = "NULL", alias = "null")]
    Null,
    /// Map, given as a JSON object
    #[value(name = "M", alias = "m")]
    Map,
    /// List, given as a JSON array
    #[value(name = "L", alias = "l")]
    List,
    /// String set, given as a JSON array of strings
    #[value(name = "SS", alias = "ss")]
    StringSet,
    /// Number set, given as a JSON array of numbers
    #[value(name = "NS", alias = "ns")]
    NumberSet,
}

impl ValueType {
    /// Parse `raw` as a value of this type
    pub fn parse(self, raw: &str) -> Result<AttributeValue, Error> {
        match self {
            ValueType::String => Ok(AttributeValue::S(raw.to_string())),
            ValueType::Number => Ok(AttributeValue::N(validate_number(raw)?)),
            ValueType::Bool => {
                let truthy = matches!(
                    raw.trim().to_ascii_lowercase().as_str(),
                    "true" | "t" | "yes" | "y" | "1"
                );
                Ok(AttributeValue::Bool(truthy))
            }
            ValueType::Null => Ok(AttributeValue::Null(true)),
            ValueType::Map => {
                let value = parse_json(raw)?;
                Ok(AttributeValue::M(record_from_json(value)?))
            }
            ValueType::List => match parse_json(raw)? {
                array @ Value::Array(_) => json_to_attribute(array),
                other => Err(Error::InvalidValue(format!(
                    "expected a JSON array, got {}",
                    json_kind(&other)
                ))),
            },
            ValueType::StringSet => {
                let values = json_array(raw)?
                    .into_iter()
                    .map(|v| match v {
                        Value::String(s) => Ok(s),
                        other => Err(Error::InvalidValue(format!(
                            "string set members must be strings, got {}",
                            json_kind(&other)
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AttributeValue::Ss(values))
            }
            ValueType::NumberSet => {
                let values = json_array(raw)?
                    .into_iter()
                    .map(|v| match v {
                        Value::Number(n) => validate_number(&n.to_string()),
                        other => Err(Error::InvalidValue(format!(
                            "number set members must be numbers, got {}",
                            json_kind(&other)
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AttributeValue::Ns(values))
            }
        }
    }
}

fn parse_json(raw: &str) -> Result<Value, Error> {
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidValue(format!("'{raw}' is not valid JSON: {e}")))
}

fn json_array(raw: &str) -> Result<Vec<Value>, Error> {
    match parse_json(raw)? {
        Value::Array(values) => Ok(values),
        other => Err(Error::InvalidValue(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(name: &str, key_type: KeyType) -> KeySchemaElement {
        KeySchemaElement::builder()
            .attribute_name(name)
            .key_type(key_type)
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_from_elements() {
        let schema = KeySchema::from_elements(&[
            element("game", KeyType::Hash),
            element("age", KeyType::Range),
        ])
        .unwrap();
        assert_eq!(schema, KeySchema::composite("game", "age"));
        assert_eq!(schema.partition_key(), "game");
        assert_eq!(schema.sort_key(), Some("age"));
    }

    #[test]
    fn test_schema_without_partition_key_is_rejected() {
        let err = KeySchema::from_elements(&[element("age", KeyType::Range)]).unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_schema_with_two_partition_keys_is_rejected() {
        let err = KeySchema::from_elements(&[
            element("a", KeyType::Hash),
            element("b", KeyType::Hash),
        ])
        .unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_key_of_projects_key_attributes() {
        let schema = KeySchema::composite("game", "age");
        let record = record_from_json(json!({"game": "chess", "age": "7", "ux": "x"})).unwrap();
        let key = schema.key_of(&record).unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key["game"], AttributeValue::S("chess".into()));
        assert!(!key.contains_key("ux"));
    }

    #[test]
    fn test_key_of_missing_attribute() {
        let schema = KeySchema::partition("id");
        let record = record_from_json(json!({"name": "no id"})).unwrap();
        let err = schema.key_of(&record).unwrap_err();
        assert!(err.is_malformed_input());
        assert_eq!(schema.missing_in(&record), vec!["id"]);
    }

    #[test]
    fn test_ensure_partition() {
        let schema = KeySchema::partition("id");
        assert!(schema.ensure_partition("id").is_ok());
        assert!(schema.ensure_partition("user_id").unwrap_err().is_schema_mismatch());
    }

    #[test]
    fn test_json_conversion_keeps_types() {
        let record =
            record_from_json(json!({"id": "1", "count": 3, "ok": true, "tags": ["a"]})).unwrap();
        assert_eq!(record["count"], AttributeValue::N("3".into()));
        assert_eq!(record["ok"], AttributeValue::Bool(true));

        let back = record_to_json(&record);
        assert_eq!(back["count"], json!(3));
        assert_eq!(back["tags"], json!(["a"]));
    }

    #[test]
    fn test_record_from_json_requires_object() {
        let err = record_from_json(json!([1, 2])).unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_render_scalar() {
        assert_eq!(render_scalar(&AttributeValue::S("abc".into())), "abc");
        assert_eq!(render_scalar(&AttributeValue::N("1.5".into())), "1.5");
        assert_eq!(render_scalar(&AttributeValue::Bool(false)), "false");
        assert_eq!(render_scalar(&AttributeValue::Null(true)), "");
        assert_eq!(
            render_scalar(&AttributeValue::L(vec![AttributeValue::N("1".into())])),
            "[1]"
        );
    }

    #[test]
    fn test_value_type_parse() {
        assert_eq!(
            ValueType::Number.parse(" 42 ").unwrap(),
            AttributeValue::N("42".into())
        );
        assert!(ValueType::Number.parse("forty").is_err());
        assert_eq!(
            ValueType::Bool.parse("Yes").unwrap(),
            AttributeValue::Bool(true)
        );
        assert_eq!(
            ValueType::Bool.parse("no").unwrap(),
            AttributeValue::Bool(false)
        );
        assert_eq!(
            ValueType::StringSet.parse(r#"["a","b"]"#).unwrap(),
            AttributeValue::Ss(vec!["a".into(), "b".into()])
        );
        assert!(ValueType::NumberSet.parse(r#"["a"]"#).is_err());
    }

    #[test]
    fn test_number_grammar() {
        for good in ["0", "-1.5e3", "+7", "0.10", ".5", "1E-130", "9.9e125", "000123"] {
            assert!(ValueType::Number.parse(good).is_ok(), "{good} should parse");
        }
        let forty = "1".repeat(38) + "000.000";
        assert!(ValueType::Number.parse(&forty).is_ok());

        let too_precise = "1".repeat(39);
        for bad in [
            "NaN", "nan", "inf", "-infinity", "", "-", ".", "1e", "1e+", "1.2.3", "0x10", "1_000",
            "1e126", "1e-131", too_precise.as_str(),
        ] {
            let err = ValueType::Number.parse(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidValue(_)), "{bad} should be refused");
        }
        assert!(ValueType::NumberSet.parse(r#"[1, 1e200]"#).is_err());
    }

    #[test]
    fn test_number_to_json_is_lossless() {
        let big = AttributeValue::N("12345678901234567890123.45".into());
        assert_eq!(attribute_to_json(&big).to_string(), "12345678901234567890123.45");
        let trailing = AttributeValue::N("0.10".into());
        assert_eq!(attribute_to_json(&trailing).to_string(), "0.10");
        let wide = AttributeValue::N("18446744073709551616".into());
        assert_eq!(attribute_to_json(&wide).to_string(), "18446744073709551616");

        let record = record_from_json(
            serde_json::from_str(r#"{"id": "1", "n": 12345678901234567890123.45}"#).unwrap(),
        )
        .unwrap();
        assert_eq!(record["n"], AttributeValue::N("12345678901234567890123.45".into()));
        assert_eq!(
            record_to_json(&record).to_string(),
            r#"{"id":"1","n":12345678901234567890123.45}"#
        );
    }

    #[test]
    fn test_describe_key_is_sorted() {
        let key = record_from_json(json!({"b": "2", "a": 1})).unwrap();
        assert_eq!(describe_key(&key), "a=1,b=2");
    }
}
