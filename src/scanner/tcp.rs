use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::ProbeError;
use crate::scanner::dialog;
use crate::scanner::prober::{MailClient, MailSession};
use crate::settings::{Protocol, SocketType};

const MAX_LINE: usize = 16 * 1024;

/// `MailClient` over TCP with implicit TLS or STARTTLS through rustls.
#[derive(Clone)]
pub struct TcpMailClient {
    connector: Result<TlsConnector, String>,
}

impl TcpMailClient {
    pub fn new() -> Self {
        Self {
            connector: tls_connector(),
        }
    }
}

impl Default for TcpMailClient {
    fn default() -> Self {
        Self::new()
    }
}

fn tls_connector() -> Result<TlsConnector, String> {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| e.to_string())?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[async_trait]
impl MailClient for TcpMailClient {
    async fn connect(
        &self,
        protocol: Protocol,
        server: &str,
        port: u16,
        socket_type: SocketType,
    ) -> Result<Box<dyn MailSession>, ProbeError> {
        let connector = self.connector.clone().map_err(ProbeError::Tls)?;

        let mut connection = Connection::open(server, port, connector).await?;
        match socket_type {
            SocketType::SslTls => connection.start_tls().await?,
            SocketType::StartTls | SocketType::Plain => {}
            SocketType::Unknown => {
                return Err(ProbeError::Protocol("socket type unknown".to_string()));
            }
        }

        let session = dialog::open(protocol, connection, socket_type == SocketType::StartTls).await?;
        Ok(Box::new(session))
    }
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Closed,
}

/// A line-oriented connection that records what was said.
pub struct Connection {
    transport: Transport,
    server: String,
    connector: TlsConnector,
    buffer: Vec<u8>,
    transcript: Vec<String>,
}

impl Connection {
    async fn open(server: &str, port: u16, connector: TlsConnector) -> Result<Self, ProbeError> {
        let stream = match TcpStream::connect((server, port)).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => return Err(ProbeError::Refused),
            Err(e) => return Err(e.into()),
        };
        debug!("connected to {}:{}", server, port);

        Ok(Self {
            transport: Transport::Plain(stream),
            server: server.to_string(),
            connector,
            buffer: Vec::new(),
            transcript: Vec::new(),
        })
    }

    /// Upgrades the plain stream to TLS. Used for implicit TLS right after connecting
    /// and for STARTTLS once the server agreed.
    pub async fn start_tls(&mut self) -> Result<(), ProbeError> {
        let stream = match std::mem::replace(&mut self.transport, Transport::Closed) {
            Transport::Plain(stream) => stream,
            other => {
                self.transport = other;
                return Err(ProbeError::Tls("connection is not plain".to_string()));
            }
        };

        let server_name = ServerName::try_from(self.server.clone()).map_err(|e| ProbeError::Tls(e.to_string()))?;
        let tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ProbeError::Tls(e.to_string()))?;

        self.buffer.clear();
        self.transport = Transport::Tls(Box::new(tls));
        self.transcript.push("-- TLS established".to_string());
        Ok(())
    }

    pub async fn read_line(&mut self) -> Result<String, ProbeError> {
        loop {
            if let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=end).collect();
                let line = String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string();
                self.transcript.push(format!("S: {}", line));
                return Ok(line);
            }

            if self.buffer.len() > MAX_LINE {
                return Err(ProbeError::Protocol("response line too long".to_string()));
            }

            let mut chunk = [0u8; 1024];
            let n = match &mut self.transport {
                Transport::Plain(stream) => stream.read(&mut chunk).await?,
                Transport::Tls(stream) => stream.read(&mut chunk).await?,
                Transport::Closed => 0,
            };
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server").into());
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), ProbeError> {
        self.transcript.push(format!("C: {}", line));
        self.send(line).await
    }

    /// Writes `line` but records `shown` in the transcript.
    pub async fn write_secret_line(&mut self, line: &str, shown: &str) -> Result<(), ProbeError> {
        self.transcript.push(format!("C: {}", shown));
        self.send(line).await
    }

    async fn send(&mut self, line: &str) -> Result<(), ProbeError> {
        let data = format!("{}\r\n", line);
        match &mut self.transport {
            Transport::Plain(stream) => {
                stream.write_all(data.as_bytes()).await?;
                stream.flush().await?;
            }
            Transport::Tls(stream) => {
                stream.write_all(data.as_bytes()).await?;
                stream.flush().await?;
            }
            Transport::Closed => {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed").into());
            }
        }
        Ok(())
    }

    pub fn transcript(&self) -> String {
        self.transcript.join("\n")
    }
}
