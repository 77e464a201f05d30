//! Journal to GELF forwarder library
//!
//! Turns `journalctl -o json` output into GELF 1.1 messages and ships them to a
//! Graylog input over UDP, TCP or TLS.

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod filter;
pub mod gelf;
pub mod mapper;
pub mod pipeline;
pub mod record;
pub mod shutdown;
pub mod tagger;
pub mod transport;

pub use config::{Config, Protocol};
pub use errors::{GelfError, Result};
pub use gelf::GelfMessage;
pub use pipeline::{LineOutcome, PipelineRunner, PipelineState, PipelineStats};
pub use record::{FieldValue, Record};
pub use transport::GelfTransport;
