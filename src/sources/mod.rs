//! Settings sources: anything that, given the best settings known so far, may
//! contribute a candidate `ServerSettings`.

pub mod autoconfig;
pub mod autodiscover;
pub mod document;

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::error::Result;
use crate::scanner::{best_server_settings, PortCheckResult, PortsChecker, ProtocolSettingsFilter};
use crate::settings::ServerSettings;
pub use document::{DocumentFetcher, DocumentKind, DocumentSource, HttpFetcher};

#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// `Ok(None)` means the source has nothing to say. `Err` is reserved for
    /// contract violations such as an unknown socket type in a document.
    async fn server_settings(&self, start: Option<&ServerSettings>) -> Result<Option<ServerSettings>>;
}

/// Returns fixed settings, typically what the user supplied.
pub struct StaticSource {
    settings: Option<ServerSettings>,
}

impl StaticSource {
    pub fn new(settings: Option<ServerSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsSource for StaticSource {
    async fn server_settings(&self, _start: Option<&ServerSettings>) -> Result<Option<ServerSettings>> {
        Ok(self.settings.clone())
    }
}

pub struct NoSource;

#[async_trait]
impl SettingsSource for NoSource {
    async fn server_settings(&self, _start: Option<&ServerSettings>) -> Result<Option<ServerSettings>> {
        Ok(None)
    }
}

/// Probes the ports of the start settings' servers and reports the best outcome
/// per protocol. Every individual result is kept until [`take_results`](Self::take_results).
pub struct PortCheckSource {
    checker: PortsChecker,
    results: Mutex<Vec<PortCheckResult>>,
}

impl PortCheckSource {
    pub fn new(checker: PortsChecker) -> Self {
        Self {
            checker,
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(checker: PortsChecker) -> Arc<Self> {
        Arc::new(Self::new(checker))
    }

    /// The results of every run since the last call, in run order.
    pub fn take_results(&self) -> Vec<PortCheckResult> {
        std::mem::take(&mut *self.results.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl SettingsSource for PortCheckSource {
    async fn server_settings(&self, start: Option<&ServerSettings>) -> Result<Option<ServerSettings>> {
        let Some(start) = start else {
            debug!("port check skipped, no start settings");
            return Ok(None);
        };

        // probing works on a copy, the start settings belong to the caller
        let mut probed = start.clone();
        let results = self
            .checker
            .check_ports(&mut probed, &ProtocolSettingsFilter::none(), false)
            .await?;

        let best = best_server_settings(&results);
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
        Ok(Some(best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::prober::fakes::FakeMailClient;
    use crate::settings::{Protocol, ProtocolSettings, SocketType};

    #[tokio::test]
    async fn test_static_source_ignores_start() {
        let fixed = ServerSettings::named("Options");
        let source = StaticSource::new(Some(fixed.clone()));
        let start = ServerSettings::named("Other");

        assert_eq!(source.server_settings(Some(&start)).await.unwrap(), Some(fixed));
        assert_eq!(StaticSource::new(None).server_settings(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_source() {
        assert_eq!(NoSource.server_settings(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_port_check_source_reports_best_probe() {
        let client = Arc::new(FakeMailClient {
            refused: [143].into_iter().collect(),
            ..FakeMailClient::default()
        });
        let checker = PortsChecker::new(1000).add_ports(PortsChecker::default_ports_with(client));
        let source = PortCheckSource::new(checker);

        let start = ServerSettings {
            imap: ProtocolSettings {
                server: Some("imap.company.com".to_string()),
                ..ProtocolSettings::default()
            },
            ..ServerSettings::default()
        };

        let settings = source.server_settings(Some(&start)).await.unwrap().unwrap();
        assert_eq!(settings.source_name.as_deref(), Some("PortCheck"));
        assert_eq!(settings.imap.server.as_deref(), Some("imap.company.com"));
        assert_eq!(settings.imap.port, Some(993));
        assert_eq!(settings.imap.socket_type, SocketType::SslTls);
        assert!(!settings.smtp.server_and_port_set());
        assert_eq!(start.imap.port, None);

        let results = source.take_results();
        assert_eq!(results.len(), 6);
        assert_eq!(results.iter().filter(|r| r.connect_successful).count(), 3);
        assert!(source.take_results().is_empty());
    }

    #[tokio::test]
    async fn test_port_check_source_keeps_results_of_every_run() {
        let client = Arc::new(FakeMailClient::default());
        let checker = PortsChecker::new(1000).add_ports(PortsChecker::default_ports_with(client));
        let source = PortCheckSource::new(checker);

        let imap = ServerSettings {
            imap: ProtocolSettings {
                server: Some("imap.company.com".to_string()),
                ..ProtocolSettings::default()
            },
            ..ServerSettings::default()
        };
        let pop3 = ServerSettings {
            pop3: ProtocolSettings {
                server: Some("pop.company.com".to_string()),
                ..ProtocolSettings::default()
            },
            ..ServerSettings::default()
        };
        source.server_settings(Some(&imap)).await.unwrap();
        source.server_settings(Some(&pop3)).await.unwrap();

        let results = source.take_results();
        assert_eq!(results.len(), 12);
        assert!(results[..6].iter().all(|r| r.protocol == Protocol::Imap));
        assert!(results[6..].iter().all(|r| r.protocol == Protocol::Pop3));
    }

    #[tokio::test]
    async fn test_port_check_source_without_start() {
        let checker = PortsChecker::new(1000)
            .add_ports(PortsChecker::default_ports_with(Arc::new(FakeMailClient::default())));
        let source = PortCheckSource::new(checker);
        assert_eq!(source.server_settings(None).await.unwrap(), None);
        assert!(source.take_results().is_empty());
    }
}
