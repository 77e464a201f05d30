//! Configuration management for the forwarder

use crate::filter::FilterSpec;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Smallest UDP chunk that still carries payload after the 12-byte GELF chunk header
pub const MIN_UDP_CHUNK_SIZE: usize = 13;

/// Transport protocol of the Graylog input
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Tls => write!(f, "tls"),
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Forward journalctl JSON output to Graylog as GELF", long_about = None)]
pub struct Config {
    /// Graylog host or IP
    #[arg(short = 's', long, env = "GELF_HOST", default_value = "localhost")]
    pub host: String,

    /// Graylog input port
    #[arg(short = 'p', long, env = "GELF_PORT", default_value_t = 12201)]
    pub port: u16,

    /// Graylog input protocol
    #[arg(
        short = 't',
        long = "transport-protocol",
        env = "GELF_PROTOCOL",
        value_enum,
        default_value_t = Protocol::Udp
    )]
    pub protocol: Protocol,

    /// Comma separated regex filters matched against SYSLOG_IDENTIFIER, SYSTEMD_UNIT and UNIT
    #[arg(short = 'f', long, env = "GELF_FILTERS")]
    pub filters: Option<String>,

    /// Value of the `_environment` field added to every message
    #[arg(short = 'e', long, env = "GELF_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Drop records whose MESSAGE is not a JSON object
    #[arg(short = 'j', long, env = "GELF_JSON_ONLY")]
    pub json_only: bool,

    /// Maximum UDP datagram size before GELF chunking kicks in
    #[arg(long, env = "GELF_UDP_CHUNK_SIZE", default_value_t = 1300)]
    pub udp_chunk_size: usize,

    /// Send UDP datagrams uncompressed
    #[arg(long, env = "GELF_NO_UDP_COMPRESSION")]
    pub no_udp_compression: bool,

    /// PEM bundle of CA certificates trusted for TLS, instead of the platform roots
    #[arg(long, env = "GELF_TLS_CA_FILE")]
    pub tls_ca_file: Option<PathBuf>,

    /// Emit diagnostics as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 12201,
            protocol: Protocol::Udp,
            filters: None,
            environment: None,
            json_only: false,
            udp_chunk_size: 1300,
            no_udp_compression: false,
            tls_ca_file: None,
            log_json: false,
        }
    }
}

impl Config {
    /// Compile the configured filters, if any
    pub fn filter_spec(&self) -> crate::Result<Option<FilterSpec>> {
        self.filters.as_deref().map(FilterSpec::parse).transpose()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host cannot be empty".to_string());
        }

        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }

        if self.udp_chunk_size < MIN_UDP_CHUNK_SIZE {
            return Err(format!(
                "udp_chunk_size must be at least {}",
                MIN_UDP_CHUNK_SIZE
            ));
        }

        if let Err(e) = self.filter_spec() {
            return Err(e.to_string());
        }

        if let Some(path) = &self.tls_ca_file {
            if self.protocol == Protocol::Tls && !path.exists() {
                return Err(format!("tls_ca_file {} does not exist", path.display()));
            }
        }

        Ok(())
    }
}
