//! Error types for settings resolution and port probing.

use std::io;
use thiserror::Error;

/// Errors that escape the resolution engine.
///
/// Absence of data and failed probes are not errors; they are carried as empty
/// settings and `PortCheckResult` flags. What ends up here is either a broken
/// collaborator contract or a failure of the surrounding plumbing.
#[derive(Error, Debug)]
pub enum Error {
    /// A socket type string that is none of PLAIN, STARTTLS or SSL.
    #[error("Unknown socket type: {0}")]
    UnknownSocketType(String),

    /// A protocol tag that is none of POP3, IMAP or SMTP.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Invalid mail address: {0}")]
    InvalidMailAddress(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    /// Building a client (HTTP, TLS) failed.
    #[error("Initialization Error: {0}")]
    Initialization(String),

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML Error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task Execution Error: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single connect or authenticate step while probing a port.
///
/// Never leaves the prober: it is folded into a `PortCheckResult`.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("operation timed out")]
    Timeout,

    #[error("connection refused")]
    Refused,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    /// The server answered something the dialog did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the credentials.
    #[error("authentication rejected: {0}")]
    Rejected(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ProbeError::Timeout => true,
            ProbeError::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}
