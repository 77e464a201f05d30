//! GELF transports: UDP with chunking, TCP and TLS with null-byte framing

use crate::config::{Config, Protocol};
use crate::dispatcher::zlib_compress;
use crate::errors::{GelfError, Result};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::io::BufReader;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// Magic bytes opening every GELF UDP chunk
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];

/// Magic bytes, 8-byte message id, sequence number, sequence count
pub const CHUNK_HEADER_LEN: usize = 12;

/// Graylog discards messages split into more chunks than this
pub const MAX_CHUNKS: usize = 128;

/// Delivery seam between the pipeline and the network
#[async_trait]
pub trait GelfTransport: Send {
    /// Deliver one already-encoded GELF payload
    async fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Push out anything buffered
    async fn flush(&mut self) -> Result<()>;

    /// Release the underlying socket
    async fn close(&mut self) -> Result<()>;
}

/// Build the transport for the configured protocol
pub async fn connect(config: &Config) -> Result<Box<dyn GelfTransport>> {
    let transport: Box<dyn GelfTransport> = match config.protocol {
        Protocol::Udp => Box::new(
            UdpTransport::connect(
                &config.host,
                config.port,
                config.udp_chunk_size,
                !config.no_udp_compression,
            )
            .await?,
        ),
        Protocol::Tcp => Box::new(StreamTransport::tcp(config.host.clone(), config.port)),
        Protocol::Tls => Box::new(StreamTransport::tls(
            config.host.clone(),
            config.port,
            config.tls_ca_file.as_deref(),
        )?),
    };

    info!(
        "Using {} transport to {}:{}",
        config.protocol, config.host, config.port
    );

    Ok(transport)
}

/// GELF over UDP
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    chunk_size: usize,
    compress: bool,
}

impl UdpTransport {
    pub async fn connect(host: &str, port: u16, chunk_size: usize, compress: bool) -> Result<Self> {
        let target = resolve(host, port).await?;
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        debug!("UDP socket {} connected to {}", socket.local_addr()?, target);

        Ok(Self {
            socket,
            chunk_size,
            compress,
        })
    }
}

#[async_trait]
impl GelfTransport for UdpTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let data = if self.compress {
            zlib_compress(payload)?
        } else {
            payload.to_vec()
        };

        if data.len() <= self.chunk_size {
            self.socket.send(&data).await?;
            return Ok(());
        }

        let chunks = gelf_chunks(&data, self.chunk_size, rand::random())?;
        debug!("Sending {} byte message in {} chunks", data.len(), chunks.len());
        for chunk in chunks {
            self.socket.send(&chunk).await?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Split `data` into GELF chunks no larger than `chunk_size` bytes each
pub fn gelf_chunks(data: &[u8], chunk_size: usize, message_id: [u8; 8]) -> Result<Vec<Vec<u8>>> {
    if chunk_size <= CHUNK_HEADER_LEN {
        return Err(GelfError::Config(format!(
            "chunk size {} leaves no room for data",
            chunk_size
        )));
    }

    let body_len = chunk_size - CHUNK_HEADER_LEN;
    let count = data.len().div_ceil(body_len);
    if count > MAX_CHUNKS {
        return Err(GelfError::Delivery(format!(
            "message of {} bytes needs {} chunks, at most {} allowed",
            data.len(),
            count,
            MAX_CHUNKS
        )));
    }

    Ok(data
        .chunks(body_len)
        .enumerate()
        .map(|(seq, body)| {
            let mut chunk = Vec::with_capacity(CHUNK_HEADER_LEN + body.len());
            chunk.extend_from_slice(&CHUNK_MAGIC);
            chunk.extend_from_slice(&message_id);
            chunk.push(seq as u8);
            chunk.push(count as u8);
            chunk.extend_from_slice(body);
            chunk
        })
        .collect())
}

type BoxedStream = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// GELF over a TCP stream, optionally wrapped in TLS. Frames end with a null byte.
pub struct StreamTransport {
    host: String,
    port: u16,
    tls: Option<(TlsConnector, ServerName<'static>)>,
    stream: Option<BoxedStream>,
}

impl StreamTransport {
    pub fn tcp(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            tls: None,
            stream: None,
        }
    }

    pub fn tls(host: String, port: u16, ca_file: Option<&Path>) -> Result<Self> {
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| GelfError::Tls(format!("invalid server name {}: {}", host, e)))?;
        let connector = tls_connector(ca_file)?;

        Ok(Self {
            host,
            port,
            tls: Some((connector, server_name)),
            stream: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&self) -> Result<BoxedStream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                GelfError::Delivery(format!("cannot connect to {}:{}: {}", self.host, self.port, e))
            })?;
        tcp.set_nodelay(true)?;

        match &self.tls {
            Some((connector, server_name)) => {
                let stream = connector
                    .connect(server_name.clone(), tcp)
                    .await
                    .map_err(|e| GelfError::Tls(format!("handshake with {} failed: {}", self.host, e)))?;
                debug!("TLS connection established to {}:{}", self.host, self.port);
                Ok(Box::new(stream))
            }
            None => {
                debug!("TCP connection established to {}:{}", self.host, self.port);
                Ok(Box::new(tcp))
            }
        }
    }
}

#[async_trait]
impl GelfTransport for StreamTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.stream.is_none() {
            self.stream = Some(self.open().await?);
        }

        let result = match self.stream.as_mut() {
            Some(stream) => write_frame(stream, payload).await,
            None => Err(GelfError::Delivery("connection unavailable".to_string())),
        };

        if let Err(e) = result {
            // reconnect on the next send
            self.stream = None;
            return Err(GelfError::Delivery(e.to_string()));
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

async fn write_frame(stream: &mut BoxedStream, payload: &[u8]) -> Result<()> {
    stream.write_all(payload).await?;
    stream.write_all(&[0]).await?;
    stream.flush().await?;
    Ok(())
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| GelfError::Config(format!("{}:{} did not resolve to an address", host, port)))
}

/// Trust the PEM bundle at `ca_file`, or the platform roots when none is given
fn tls_connector(ca_file: Option<&Path>) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();

    match ca_file {
        Some(path) => {
            let mut reader = BufReader::new(std::fs::File::open(path)?);
            for cert in rustls_pemfile::certs(&mut reader) {
                roots
                    .add(cert?)
                    .map_err(|e| GelfError::Tls(format!("{}: {}", path.display(), e)))?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for e in native.errors {
                warn!("Failed to load a platform certificate: {}", e);
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            debug!("Loaded {} platform root certificates ({} ignored)", added, ignored);
        }
    }

    if roots.is_empty() {
        return Err(GelfError::Tls("no trusted root certificates".to_string()));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
