//! Deployment tagging of outgoing messages

use crate::gelf::{fields, GelfMessage};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct EnvironmentTagger {
    environment: Option<String>,
}

impl EnvironmentTagger {
    pub fn new(environment: Option<String>) -> Self {
        Self { environment }
    }

    /// Set `_environment`, replacing whatever the message already carried
    pub fn tag(&self, message: &mut GelfMessage) {
        if let Some(environment) = &self.environment {
            message
                .additional
                .insert(fields::ENVIRONMENT.to_string(), Value::from(environment.as_str()));
        }
    }
}
