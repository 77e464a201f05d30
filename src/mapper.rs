//! Mapping of journal records onto GELF messages

use crate::errors::GelfError;
use crate::gelf::{fields, GelfMessage};
use crate::record::{FieldValue, Record};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Journal fields forwarded as additional GELF fields and eligible for filtering
pub const FORWARDED_KEYS: [&str; 3] = ["SYSLOG_IDENTIFIER", "SYSTEMD_UNIT", "UNIT"];

pub const REALTIME_TIMESTAMP: &str = "__REALTIME_TIMESTAMP";
pub const PRIORITY: &str = "PRIORITY";
pub const HOSTNAME: &str = "_HOSTNAME";
pub const MESSAGE: &str = "MESSAGE";

/// Key of an unnested MESSAGE payload that becomes `short_message`
const INNER_MESSAGE_KEY: &str = "message";

const DEFAULT_LOGLEVEL: &str = "notice";

/// Result of mapping one record
#[derive(Debug, Clone, PartialEq)]
pub struct MappedMessage {
    pub message: GelfMessage,

    /// Set when json-only mode rejected a MESSAGE that is not a JSON object
    pub droppable: bool,
}

impl MappedMessage {
    /// The message, unless it must be dropped
    pub fn into_message(self) -> Option<GelfMessage> {
        if self.droppable {
            None
        } else {
            Some(self.message)
        }
    }
}

/// Maps journal fields onto GELF semantics
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMapper {
    json_only: bool,
}

impl FieldMapper {
    pub fn new(json_only: bool) -> Self {
        Self { json_only }
    }

    pub fn map(&self, record: &Record) -> MappedMessage {
        let mut message = GelfMessage::new();
        let mut droppable = false;

        for (key, value) in record.iter() {
            match key {
                REALTIME_TIMESTAMP => match parse_timestamp(value) {
                    Ok(seconds) => message.timestamp = Some(seconds),
                    Err(e) => warn!("{}", e),
                },
                PRIORITY => match parse_priority(value) {
                    Ok(level) => message.level = Some(level),
                    Err(e) => warn!("{}", e),
                },
                HOSTNAME => message.host = Some(value.as_text().into_owned()),
                MESSAGE => {
                    if !self.map_message(value, &mut message) {
                        droppable = true;
                    }
                }
                _ if FORWARDED_KEYS.contains(&key) => {
                    message.set_additional(key, value.to_json());
                }
                _ => {}
            }
        }

        if message.level.is_none() && message.additional(fields::LOGLEVEL).is_none() {
            message
                .additional
                .insert(fields::LOGLEVEL.to_string(), Value::from(DEFAULT_LOGLEVEL));
        }

        MappedMessage { message, droppable }
    }

    /// Fill `short_message` from MESSAGE, unnesting an embedded JSON object.
    /// Returns false when json-only mode rejects the payload.
    fn map_message(&self, value: &FieldValue, message: &mut GelfMessage) -> bool {
        let raw = value.as_text();

        let inner = match value {
            FieldValue::Mapping(map) => Some(map.clone()),
            _ => try_parse_inner_json(&raw),
        };

        let Some(inner) = inner else {
            if self.json_only {
                debug!("Dropping record, MESSAGE is not a JSON object");
                return false;
            }
            message.short_message = Some(raw.into_owned());
            return true;
        };

        if !inner.contains_key(INNER_MESSAGE_KEY) {
            message.short_message = Some(Value::Object(inner).to_string());
            return true;
        }

        for (inner_key, inner_value) in inner {
            if inner_key == INNER_MESSAGE_KEY {
                message.short_message = Some(match inner_value {
                    Value::String(text) => text,
                    other => other.to_string(),
                });
            } else {
                message.set_additional(&inner_key, inner_value);
            }
        }

        true
    }
}

/// Parse a MESSAGE payload as a JSON object. Anything else yields `None`.
pub fn try_parse_inner_json(value: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// journald timestamps are microseconds since the epoch
fn parse_timestamp(value: &FieldValue) -> Result<f64, GelfError> {
    let text = value.as_text();
    let trimmed = text.trim();

    let micros = trimmed
        .parse::<u64>()
        .map(|micros| micros as f64)
        .or_else(|_| trimmed.parse::<f64>())
        .ok()
        .filter(|micros| micros.is_finite())
        .ok_or_else(|| GelfError::FieldConversion {
            field: REALTIME_TIMESTAMP,
            value: text.to_string(),
        })?;

    Ok(micros / 1_000_000.0)
}

fn parse_priority(value: &FieldValue) -> Result<i64, GelfError> {
    let text = value.as_text();
    text.trim()
        .parse::<i64>()
        .map_err(|_| GelfError::FieldConversion {
            field: PRIORITY,
            value: text.to_string(),
        })
}
