//! Wire encoding and hand-off of finished messages to the transport

use crate::config::Protocol;
use crate::errors::{GelfError, Result};
use crate::gelf::GelfMessage;
use crate::transport::GelfTransport;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use tracing::{debug, error, info, warn};

/// How a serialized message is put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEncoding {
    /// JSON text as is; the UDP transport applies its own compression and chunking
    Raw,
    /// zlib-compressed JSON
    Zlib,
}

impl From<Protocol> for WireEncoding {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Udp => WireEncoding::Raw,
            Protocol::Tcp | Protocol::Tls => WireEncoding::Zlib,
        }
    }
}

pub fn zlib_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Owns the transport handle for the lifetime of the process
pub struct TransportDispatcher {
    encoding: WireEncoding,
    transport: Box<dyn GelfTransport>,
    closed: bool,
}

impl TransportDispatcher {
    pub fn new(protocol: Protocol, transport: Box<dyn GelfTransport>) -> Self {
        Self {
            encoding: WireEncoding::from(protocol),
            transport,
            closed: false,
        }
    }

    pub fn encoding(&self) -> WireEncoding {
        self.encoding
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Serialize a message into the bytes handed to the transport
    pub fn encode(&self, message: &GelfMessage) -> Result<Vec<u8>> {
        let json = message.to_json()?;
        match self.encoding {
            WireEncoding::Raw => Ok(json.into_bytes()),
            WireEncoding::Zlib => zlib_compress(json.as_bytes()),
        }
    }

    /// Encode and send one message. Failures are logged, never propagated.
    pub async fn dispatch(&mut self, message: &GelfMessage) -> bool {
        match self.try_dispatch(message).await {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    async fn try_dispatch(&mut self, message: &GelfMessage) -> Result<()> {
        if self.closed {
            return Err(GelfError::Delivery("transport already closed".to_string()));
        }

        let payload = self.encode(message)?;
        debug!("Sending {} byte {:?} payload", payload.len(), self.encoding);
        self.transport.send(&payload).await
    }

    /// Flush and close the transport. Only the first call does anything.
    pub async fn shutdown(&mut self) {
        if self.closed {
            debug!("Transport already closed");
            return;
        }
        self.closed = true;

        if let Err(e) = self.transport.flush().await {
            warn!("{}", GelfError::Shutdown(format!("flush failed: {}", e)));
        }

        if let Err(e) = self.transport.close().await {
            warn!("{}", GelfError::Shutdown(format!("close failed: {}", e)));
        }

        info!("Transport closed");
    }
}
