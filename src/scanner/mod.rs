pub mod dialog;
pub mod filter;
pub mod prober;
pub mod results;
pub mod tcp;

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::settings::{Protocol, ServerSettings, SocketType, Verification};
pub use filter::ProtocolSettingsFilter;
pub use prober::{MailClient, MailPortChecker, MailSession, PortChecker};
pub use results::{best_server_settings, PortCheckResult};
pub use tcp::TcpMailClient;

/// Socket types tried on the default ports.
const ALL_SOCKET_TYPES: [SocketType; 3] = [SocketType::Plain, SocketType::StartTls, SocketType::SslTls];

/// Conventional ports per protocol.
pub const DEFAULT_PORTS: [(Protocol, u16); 8] = [
    (Protocol::Pop3, 110),
    (Protocol::Pop3, 995),
    (Protocol::Imap, 143),
    (Protocol::Imap, 993),
    (Protocol::Smtp, 25),
    (Protocol::Smtp, 465),
    (Protocol::Smtp, 587),
    (Protocol::Smtp, 2525),
];

/// Runs registered port checkers against settings, concurrently.
#[derive(Clone)]
pub struct PortsChecker {
    timeout_ms: u64,
    checkers: Vec<Arc<dyn PortChecker>>,
}

impl PortsChecker {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            checkers: Vec::new(),
        }
    }

    pub fn add_port(mut self, checker: Arc<dyn PortChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    pub fn add_ports<I>(mut self, checkers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PortChecker>>,
    {
        self.checkers.extend(checkers);
        self
    }

    pub fn checkers(&self) -> &[Arc<dyn PortChecker>] {
        &self.checkers
    }

    /// POP3 110/995, IMAP 143/993, SMTP 25/465/587/2525, each with every socket type.
    pub fn default_ports() -> Vec<Arc<dyn PortChecker>> {
        Self::default_ports_with(Arc::new(TcpMailClient::new()))
    }

    pub fn default_ports_with(client: Arc<dyn MailClient>) -> Vec<Arc<dyn PortChecker>> {
        Self::table_ports_with(&DEFAULT_PORTS, client)
    }

    /// One checker per `(protocol, port)` entry, each trying every socket type.
    pub fn table_ports_with(table: &[(Protocol, u16)], client: Arc<dyn MailClient>) -> Vec<Arc<dyn PortChecker>> {
        table
            .iter()
            .map(|&(protocol, port)| -> Arc<dyn PortChecker> {
                Arc::new(MailPortChecker::new(protocol, port, &ALL_SOCKET_TYPES, client.clone()))
            })
            .collect()
    }

    /// One checker per slot that has a port: its socket type if known, else all three.
    pub fn ports_from(settings: &ServerSettings) -> Vec<Arc<dyn PortChecker>> {
        Self::ports_from_with(settings, Arc::new(TcpMailClient::new()))
    }

    pub fn ports_from_with(settings: &ServerSettings, client: Arc<dyn MailClient>) -> Vec<Arc<dyn PortChecker>> {
        settings
            .protocols()
            .into_iter()
            .filter_map(|slot| {
                let port = slot.settings.port?;
                let socket_types: &[SocketType] = match slot.settings.socket_type {
                    SocketType::Unknown => &SocketType::CONCRETE,
                    ref known => std::slice::from_ref(known),
                };
                let checker: Arc<dyn PortChecker> =
                    Arc::new(MailPortChecker::new(slot.protocol, port, socket_types, client.clone()));
                Some(checker)
            })
            .collect()
    }

    /// Probes every slot accepted by `filter` that names a server, with every registered
    /// checker of its protocol, and waits for all probes.
    ///
    /// With `verify`, each accepted slot's verification is set from the first result of
    /// its protocol in launch order: `Passed` if verified, `Failed` if not, `Unverified`
    /// if there was none. Nothing else in `settings` is written.
    pub async fn check_ports(
        &self,
        settings: &mut ServerSettings,
        filter: &ProtocolSettingsFilter,
        verify: bool,
    ) -> Result<Vec<PortCheckResult>> {
        let accepted: Vec<Protocol> = settings
            .protocols()
            .into_iter()
            .filter(|slot| filter.accepts(slot))
            .map(|slot| slot.protocol)
            .collect();

        let mut tasks = Vec::new();
        for &protocol in &accepted {
            let slot = settings.protocol(protocol);
            let Some(server) = slot.server.as_deref() else {
                continue;
            };

            for checker in self.checkers.iter().filter(|checker| checker.protocol() == protocol) {
                debug!("probing {} {}:{} {:?}", protocol, server, checker.port(), checker.socket_types());
                let probes = checker.check_port(
                    server,
                    &slot.credentials.user_name.name,
                    slot.credentials.password.as_deref(),
                    self.timeout_ms,
                );
                tasks.extend(probes.into_iter().map(tokio::spawn));
            }
        }

        let results: Vec<PortCheckResult> = join_all(tasks)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Task(e.to_string()))?;

        let verified = results.iter().filter(|result| result.verified()).count();
        info!("{} probes finished, {} verified", results.len(), verified);

        if verify {
            for protocol in accepted {
                let first = results.iter().find(|result| result.protocol == protocol);
                settings.protocol_mut(protocol).verification = match first {
                    None => Verification::Unverified,
                    Some(result) if result.verified() => Verification::Passed,
                    Some(_) => Verification::Failed,
                };
            }
        }

        Ok(results)
    }
}

/// Probes the ports already named in `settings` and records the verification outcome.
/// Without `force` only unverified slots are probed.
pub async fn verify(settings: &mut ServerSettings, force: bool, timeout_ms: u64) -> Result<Vec<PortCheckResult>> {
    verify_with(settings, force, timeout_ms, Arc::new(TcpMailClient::new())).await
}

pub async fn verify_with(
    settings: &mut ServerSettings,
    force: bool,
    timeout_ms: u64,
    client: Arc<dyn MailClient>,
) -> Result<Vec<PortCheckResult>> {
    let checker = PortsChecker::new(timeout_ms).add_ports(PortsChecker::ports_from_with(settings, client));

    let filter = if force {
        ProtocolSettingsFilter::none()
    } else {
        ProtocolSettingsFilter::unverified_only()
    };

    checker.check_ports(settings, &filter, true).await
}

#[cfg(test)]
mod tests {
    use super::prober::fakes::FakeMailClient;
    use super::*;
    use crate::settings::{Credentials, ProtocolSettings, UserName};
    use futures::future::BoxFuture;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn imap_only() -> ServerSettings {
        ServerSettings {
            imap: ProtocolSettings {
                server: Some("test.server.com".to_string()),
                ..ProtocolSettings::default()
            },
            ..ServerSettings::default()
        }
    }

    /// Reports a fixed outcome for every probe and counts calls.
    struct ScriptedChecker {
        protocol: Protocol,
        port: u16,
        verified: bool,
        calls: Mutex<usize>,
    }

    impl ScriptedChecker {
        fn new(protocol: Protocol, port: u16, verified: bool) -> Arc<Self> {
            Arc::new(Self {
                protocol,
                port,
                verified,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl PortChecker for ScriptedChecker {
        fn protocol(&self) -> Protocol {
            self.protocol
        }

        fn port(&self) -> u16 {
            self.port
        }

        fn socket_types(&self) -> &[SocketType] {
            &[SocketType::Plain]
        }

        fn check_port(
            &self,
            server: &str,
            _user_name: &str,
            _password: Option<&str>,
            _timeout_ms: u64,
        ) -> Vec<BoxFuture<'static, PortCheckResult>> {
            *self.calls.lock().unwrap() += 1;
            let mut result = PortCheckResult::new(
                self.protocol,
                ProtocolSettings::new(server, self.port, SocketType::Plain),
            );
            result.connect_successful = self.verified;
            result.authenticate_successful = self.verified;
            vec![Box::pin(async move { result })]
        }
    }

    #[tokio::test]
    async fn test_empty_settings_probe_nothing() {
        let client = Arc::new(FakeMailClient::default());
        let checker = PortsChecker::new(1000).add_ports(PortsChecker::default_ports_with(client.clone()));

        let mut settings = ServerSettings::default();
        let results = checker
            .check_ports(&mut settings, &ProtocolSettingsFilter::none(), false)
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(client.connects().is_empty());
    }

    #[tokio::test]
    async fn test_imap_only_probes_default_imap_ports() {
        let client = Arc::new(FakeMailClient::default());
        let checker = PortsChecker::new(1000).add_ports(PortsChecker::default_ports_with(client.clone()));

        let mut settings = imap_only();
        let results = checker
            .check_ports(&mut settings, &ProtocolSettingsFilter::none(), false)
            .await
            .unwrap();

        let connects = client.connects();
        assert_eq!(connects.len(), 6);
        assert!(connects.iter().all(|(protocol, server, _, _)| *protocol == Protocol::Imap && server == "test.server.com"));

        let ports: Vec<u16> = results.iter().map(|r| r.protocol_settings.port.unwrap()).collect();
        assert_eq!(ports, vec![143, 143, 143, 993, 993, 993]);
        let modes: Vec<SocketType> = results[..3].iter().map(|r| r.protocol_settings.socket_type).collect();
        assert_eq!(modes, ALL_SOCKET_TYPES.to_vec());

        // no write-back without verify
        assert_eq!(settings.imap.verification, Verification::Unverified);
    }

    #[tokio::test]
    async fn test_ports_from_settings() {
        let settings = ServerSettings {
            imap: ProtocolSettings {
                server: Some("test.server.com".to_string()),
                port: Some(100),
                ..ProtocolSettings::default()
            },
            smtp: ProtocolSettings::new("test.server.com", 200, SocketType::StartTls),
            ..ServerSettings::default()
        };

        let checkers = PortsChecker::ports_from(&settings);
        assert_eq!(checkers.len(), 2);
        assert_eq!((checkers[0].protocol(), checkers[0].port()), (Protocol::Imap, 100));
        assert_eq!(checkers[0].socket_types(), &SocketType::CONCRETE);
        assert_eq!((checkers[1].protocol(), checkers[1].port()), (Protocol::Smtp, 200));
        assert_eq!(checkers[1].socket_types(), &[SocketType::StartTls]);
    }

    #[tokio::test]
    async fn test_settings_ports_only_probed() {
        let mut settings = ServerSettings {
            imap: ProtocolSettings {
                server: Some("test.server.com".to_string()),
                port: Some(100),
                socket_type: SocketType::SslTls,
                ..ProtocolSettings::default()
            },
            smtp: ProtocolSettings::new("test.server.com", 200, SocketType::Plain),
            ..ServerSettings::default()
        };

        let client = Arc::new(FakeMailClient::default());
        let checker = PortsChecker::new(1000).add_ports(PortsChecker::ports_from_with(&settings, client.clone()));
        checker
            .check_ports(&mut settings, &ProtocolSettingsFilter::none(), false)
            .await
            .unwrap();

        let connects = client.connects();
        assert_eq!(connects.len(), 2);
        assert_eq!((connects[0].0, connects[0].2), (Protocol::Imap, 100));
        assert_eq!((connects[1].0, connects[1].2), (Protocol::Smtp, 200));
    }

    #[tokio::test]
    async fn test_verify_imap_only() {
        let mut settings = ServerSettings {
            imap: ProtocolSettings {
                server: Some("test.server.com".to_string()),
                port: Some(100),
                socket_type: SocketType::Plain,
                credentials: Credentials::new(UserName::literal("john"), "pw"),
                ..ProtocolSettings::default()
            },
            ..ServerSettings::default()
        };

        let client = Arc::new(FakeMailClient::default());
        let results = verify_with(&mut settings, false, 1000, client.clone()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(client.connects().len(), 1);
        assert_eq!(settings.pop3.verification, Verification::Unverified);
        assert_eq!(settings.imap.verification, Verification::Passed);
        assert_eq!(settings.smtp.verification, Verification::Unverified);
    }

    #[tokio::test]
    async fn test_unverified_only_skips_passed_slots() {
        let mut settings = ServerSettings {
            imap: ProtocolSettings {
                verification: Verification::Passed,
                ..ProtocolSettings::new("imap.company.com", 993, SocketType::SslTls)
            },
            smtp: ProtocolSettings::new("smtp.company.com", 587, SocketType::StartTls),
            ..ServerSettings::default()
        };

        let imap = ScriptedChecker::new(Protocol::Imap, 993, true);
        let smtp = ScriptedChecker::new(Protocol::Smtp, 587, false);
        let checker = PortsChecker::new(1000).add_port(imap.clone()).add_port(smtp.clone());

        let results = checker
            .check_ports(&mut settings, &ProtocolSettingsFilter::unverified_only(), true)
            .await
            .unwrap();

        assert_eq!(imap.calls(), 0);
        assert_eq!(smtp.calls(), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(settings.imap.verification, Verification::Passed);
        assert_eq!(settings.smtp.verification, Verification::Failed);
    }

    #[tokio::test]
    async fn test_verify_uses_first_result_not_best() {
        // A later verified result does not rescue a failed first one.
        let mut settings = imap_only();
        let checker = PortsChecker::new(1000)
            .add_port(ScriptedChecker::new(Protocol::Imap, 143, false))
            .add_port(ScriptedChecker::new(Protocol::Imap, 993, true));

        let results = checker
            .check_ports(&mut settings, &ProtocolSettingsFilter::none(), true)
            .await
            .unwrap();

        assert!(results[1].verified());
        assert_eq!(settings.imap.verification, Verification::Failed);
    }

    #[tokio::test]
    async fn test_verify_without_results_stays_unverified() {
        let mut settings = ServerSettings {
            smtp: ProtocolSettings {
                port: Some(587),
                ..ProtocolSettings::default()
            },
            ..ServerSettings::default()
        };
        settings.smtp.verification = Verification::Failed;

        let results = verify_with(&mut settings, true, 1000, Arc::new(FakeMailClient::default()))
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(settings.smtp.verification, Verification::Unverified);
    }

    #[tokio::test]
    async fn test_port_checks_run_concurrently() {
        let client = Arc::new(FakeMailClient {
            silent: [143, 993].into_iter().collect(),
            ..FakeMailClient::default()
        });
        let timeout_ms = 300;
        let checker = PortsChecker::new(timeout_ms).add_ports(PortsChecker::default_ports_with(client.clone()));

        let mut settings = imap_only();
        let started = Instant::now();
        let results = checker
            .check_ports(&mut settings, &ProtocolSettingsFilter::none(), false)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.timed_out && !r.connect_successful));
        assert!(elapsed >= Duration::from_millis(timeout_ms));
        // six port checks one after another would take 1800ms
        assert!(elapsed < Duration::from_millis(timeout_ms * 3), "port checks took {:?}", elapsed);
    }
}
