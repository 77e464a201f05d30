//! Error types for the journal-to-GELF forwarder

use std::fmt;

pub type Result<T> = std::result::Result<T, GelfError>;

#[derive(Debug)]
pub enum GelfError {
    /// IO operation failed
    Io(std::io::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// A filter pattern did not compile
    Regex(regex::Error),

    /// Configuration error
    Config(String),

    /// Input line was not a journal JSON object
    Decode(String),

    /// A typed journal field held a non-numeric value
    FieldConversion { field: &'static str, value: String },

    /// Transport failed to deliver a payload
    Delivery(String),

    /// TLS setup or handshake failed
    Tls(String),

    /// Flushing or closing the transport failed
    Shutdown(String),
}

impl fmt::Display for GelfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GelfError::Io(err) => write!(f, "IO error: {}", err),
            GelfError::Json(err) => write!(f, "JSON error: {}", err),
            GelfError::Regex(err) => write!(f, "Invalid filter pattern: {}", err),
            GelfError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GelfError::Decode(msg) => write!(f, "cannot load json: {}", msg),
            GelfError::FieldConversion { field, value } => {
                write!(f, "Field {} has non-numeric value {:?}", field, value)
            }
            GelfError::Delivery(msg) => write!(f, "Delivery error: {}", msg),
            GelfError::Tls(msg) => write!(f, "TLS error: {}", msg),
            GelfError::Shutdown(msg) => write!(f, "Shutdown error: {}", msg),
        }
    }
}

impl std::error::Error for GelfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GelfError::Io(err) => Some(err),
            GelfError::Json(err) => Some(err),
            GelfError::Regex(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GelfError {
    fn from(err: std::io::Error) -> Self {
        GelfError::Io(err)
    }
}

impl From<serde_json::Error> for GelfError {
    fn from(err: serde_json::Error) -> Self {
        GelfError::Json(err)
    }
}

impl From<regex::Error> for GelfError {
    fn from(err: regex::Error) -> Self {
        GelfError::Regex(err)
    }
}
