//! Decoding of `journalctl -o json` lines into records

use crate::errors::{GelfError, Result};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Value of a single journal field after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain string, including strings the exporter emitted as byte arrays
    Text(String),

    /// Nested JSON object
    Mapping(Map<String, Value>),

    /// Any other JSON value, kept verbatim (journalctl emits `null` for oversized fields)
    Other(Value),
}

impl FieldValue {
    /// Render the value as a string, the way filters and the mapper see it
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(text) => Cow::Borrowed(text),
            FieldValue::Mapping(map) => Cow::Owned(Value::Object(map.clone()).to_string()),
            FieldValue::Other(Value::String(text)) => Cow::Borrowed(text),
            FieldValue::Other(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Convert back into a JSON value for inclusion in a GELF message
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Mapping(map) => Value::Object(map.clone()),
            FieldValue::Other(value) => value.clone(),
        }
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => FieldValue::Text(text),
            Value::Object(map) => FieldValue::Mapping(map),
            Value::Array(items) => match reconstitute_string(&items) {
                Some(text) => FieldValue::Text(text),
                None => FieldValue::Other(Value::Array(items)),
            },
            other => FieldValue::Other(other),
        }
    }
}

/// One journal entry keyed by journal field name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Parse a single exporter line
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;

        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(GelfError::Decode(format!(
                    "expected a JSON object, found {}",
                    json_type_name(&other)
                )));
            }
        };

        let fields = object
            .into_iter()
            .map(|(key, value)| (key, FieldValue::from_json(value)))
            .collect();

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Turns exporter lines into records, reporting failures instead of raising them
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDecoder;

impl RecordDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one line. Invalid lines are logged and yield `None`.
    pub fn decode(&self, line: &str) -> Option<Record> {
        match Record::parse(line) {
            Ok(record) => {
                debug!("Decoded record with {} fields", record.len());
                Some(record)
            }
            Err(GelfError::Json(e)) => {
                error!("{}", GelfError::Decode(e.to_string()));
                None
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}

/// journalctl exports strings that are not printable UTF-8 as arrays of byte values.
///
/// An array of byte-sized integers is decoded as UTF-8 with lossy replacement. Arrays
/// holding larger integers are treated as Unicode code points. Anything else is not a
/// reconstituted string.
fn reconstitute_string(items: &[Value]) -> Option<String> {
    let codes = items
        .iter()
        .map(Value::as_u64)
        .collect::<Option<Vec<u64>>>()?;

    if codes.iter().all(|&code| code <= u8::MAX as u64) {
        let bytes: Vec<u8> = codes.into_iter().map(|code| code as u8).collect();
        return Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        });
    }

    Some(
        codes
            .into_iter()
            .map(|code| {
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect(),
    )
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
