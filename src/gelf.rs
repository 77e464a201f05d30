//! GELF message structure

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// GELF message field names, see <https://go2docs.graylog.org/current/getting_in_log_data/gelf.html>
pub mod fields {
    /// The only GELF version this crate emits
    pub const GELF_VERSION: &str = "1.1";

    pub const VERSION: &str = "version";
    pub const HOST: &str = "host";
    pub const SHORT_MESSAGE: &str = "short_message";
    pub const TIMESTAMP: &str = "timestamp";
    pub const LEVEL: &str = "level";

    /// Severity marker used when the journal entry carried no PRIORITY
    pub const LOGLEVEL: &str = "_loglevel";
    pub const ENVIRONMENT: &str = "_environment";
}

/// Outgoing GELF 1.1 document
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GelfMessage {
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,

    /// Additional fields, every key starts with `_`
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl Default for GelfMessage {
    fn default() -> Self {
        Self {
            version: fields::GELF_VERSION.to_string(),
            host: None,
            short_message: None,
            timestamp: None,
            level: None,
            additional: Map::new(),
        }
    }
}

impl GelfMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an additional field. `key` is turned into `_<key lowercased>`.
    pub fn set_additional(&mut self, key: &str, value: Value) {
        self.additional.insert(additional_field_name(key), value);
    }

    pub fn additional(&self, name: &str) -> Option<&Value> {
        self.additional.get(name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `_` followed by the lowercased key
pub fn additional_field_name(key: &str) -> String {
    format!("_{}", key.to_lowercase())
}
