use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::error::ProbeError;
use crate::scanner::results::PortCheckResult;
use crate::settings::{Credentials, Protocol, ProtocolSettings, SocketType, UserName};

/// Probes one port of one protocol under a fixed set of socket types.
pub trait PortChecker: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn port(&self) -> u16;

    fn socket_types(&self) -> &[SocketType];

    /// One independent probe per socket type. Nothing runs until the futures are polled.
    fn check_port(
        &self,
        server: &str,
        user_name: &str,
        password: Option<&str>,
        timeout_ms: u64,
    ) -> Vec<BoxFuture<'static, PortCheckResult>>;
}

/// Opens mail protocol sessions. The transport seam of the prober.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Connects and completes greeting and TLS negotiation for `socket_type`.
    async fn connect(
        &self,
        protocol: Protocol,
        server: &str,
        port: u16,
        socket_type: SocketType,
    ) -> Result<Box<dyn MailSession>, ProbeError>;
}

#[async_trait]
pub trait MailSession: Send {
    async fn authenticate(&mut self, user_name: &str, password: &str) -> Result<(), ProbeError>;

    async fn logout(&mut self) -> Result<(), ProbeError>;

    /// The protocol exchange so far, passwords masked.
    fn transcript(&self) -> String;
}

/// `PortChecker` speaking the real protocol through a `MailClient`.
pub struct MailPortChecker {
    protocol: Protocol,
    port: u16,
    socket_types: Vec<SocketType>,
    client: Arc<dyn MailClient>,
}

impl MailPortChecker {
    pub fn new(protocol: Protocol, port: u16, socket_types: &[SocketType], client: Arc<dyn MailClient>) -> Self {
        Self {
            protocol,
            port,
            socket_types: socket_types.to_vec(),
            client,
        }
    }
}

impl PortChecker for MailPortChecker {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn socket_types(&self) -> &[SocketType] {
        &self.socket_types
    }

    fn check_port(
        &self,
        server: &str,
        user_name: &str,
        password: Option<&str>,
        timeout_ms: u64,
    ) -> Vec<BoxFuture<'static, PortCheckResult>> {
        self.socket_types
            .iter()
            .map(|&socket_type| {
                let attempt = Attempt {
                    client: self.client.clone(),
                    protocol: self.protocol,
                    server: server.to_string(),
                    port: self.port,
                    socket_type,
                    user_name: user_name.to_string(),
                    password: password.map(str::to_string),
                    timeout: Duration::from_millis(timeout_ms),
                };
                attempt.run().boxed()
            })
            .collect()
    }
}

struct Attempt {
    client: Arc<dyn MailClient>,
    protocol: Protocol,
    server: String,
    port: u16,
    socket_type: SocketType,
    user_name: String,
    password: Option<String>,
    timeout: Duration,
}

impl Attempt {
    async fn run(self) -> PortCheckResult {
        let settings = ProtocolSettings {
            credentials: Credentials {
                user_name: UserName::literal(self.user_name.as_str()),
                password: self.password.clone(),
            },
            ..ProtocolSettings::new(self.server.as_str(), self.port, self.socket_type)
        };
        let mut result = PortCheckResult::new(self.protocol, settings);

        let connecting = self
            .client
            .connect(self.protocol, &self.server, self.port, self.socket_type);
        let mut session = match limit(self.timeout, connecting).await {
            Ok(session) => session,
            Err(e) => {
                debug!("{} {}:{} {} connect failed: {}", self.protocol, self.server, self.port, self.socket_type, e);
                result.timed_out = e.is_timeout();
                result.detail = Some(self.detail(Some(&e), None));
                return result;
            }
        };
        result.connect_successful = true;

        let authenticated = match self.password.as_deref() {
            Some(password) => limit(self.timeout, session.authenticate(&self.user_name, password)).await,
            None => Err(ProbeError::Rejected("no password given".to_string())),
        };
        if let Err(e) = authenticated {
            debug!("{} {}:{} {} authentication failed: {}", self.protocol, self.server, self.port, self.socket_type, e);
            result.timed_out = e.is_timeout();
            result.detail = Some(self.detail(Some(&e), Some(session.transcript())));
            return result;
        }

        result.authenticate_successful = true;
        result.protocol_settings.credentials.user_name.authentication_successful = true;

        if let Err(e) = limit(self.timeout, session.logout()).await {
            debug!("{} {}:{} logout failed: {}", self.protocol, self.server, self.port, e);
        }
        result.detail = Some(self.detail(None, Some(session.transcript())));

        result
    }

    fn detail(&self, error: Option<&ProbeError>, transcript: Option<String>) -> String {
        let password = if self.password.is_some() { "********" } else { "" };
        let lines = [
            error.map(|e| e.to_string()),
            Some(format!("UserName = {}, Password = {}", self.user_name, password)),
            transcript,
        ];

        lines
            .into_iter()
            .flatten()
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

async fn limit<T, F>(duration: Duration, step: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    match timeout(duration, step).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProbeError::Timeout),
    }
}
