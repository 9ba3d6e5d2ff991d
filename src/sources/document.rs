use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::address::MailAddress;
use crate::error::{Error, Result};
use crate::settings::ServerSettings;
use crate::sources::{autoconfig, autodiscover, SettingsSource};

/// Retrieves remote documents. Failures of any kind are reported as `None`.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Option<String>;
}

/// `DocumentFetcher` over HTTP(S). Certificate errors are ignored: many providers
/// serve autoconfig documents from hosts with mismatching certificates.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Option<String> {
        let response = match self.client.get(uri).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("fetching {} failed: {}", uri, e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("{} returned status {}", uri, response.status());
            return None;
        }

        match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("reading body of {} failed: {}", uri, e);
                None
            }
        }
    }
}

/// The kinds of remote configuration documents a `DocumentSource` can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Mozilla autoconfig, served by the mail domain.
    Autoconfig,
    /// Exchange autodiscover (POX).
    Autodiscover,
    /// The central ISP database, autoconfig format.
    IspDb,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Autoconfig, DocumentKind::Autodiscover, DocumentKind::IspDb];

    /// Name reported as `source_name`.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentKind::Autoconfig => "AutoconfigXml",
            DocumentKind::Autodiscover => "AutodiscoverXml",
            DocumentKind::IspDb => "IspDb",
        }
    }

    pub fn uris(&self, address: &MailAddress) -> Vec<String> {
        let domain = address.domain();
        match self {
            DocumentKind::Autoconfig => vec![
                format!("https://autoconfig.{}/mail/config-v1.1.xml?emailaddress={}", domain, address),
                format!("https://{}/.well-known/autoconfig/mail/config-v1.1.xml", domain),
                format!("http://autoconfig.{}/mail/config-v1.1.xml", domain),
            ],
            DocumentKind::Autodiscover => vec![
                format!("https://{}/autodiscover/autodiscover.xml", domain),
                format!("https://autodiscover.{}/autodiscover/autodiscover.xml", domain),
                format!("http://autodiscover.{}/autodiscover/autodiscover.xml", domain),
            ],
            DocumentKind::IspDb => vec![format!("https://v1.ispdb.net/{}", domain)],
        }
    }

    pub fn parse(&self, document: &str, address: &MailAddress) -> Result<Option<ServerSettings>> {
        match self {
            DocumentKind::Autoconfig | DocumentKind::IspDb => autoconfig::parse(document, address),
            DocumentKind::Autodiscover => autodiscover::parse(document, address),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fetches all `uris` concurrently and returns the settings of the first document,
/// in `uris` order, that `parse` accepts.
pub async fn fetch_settings<F>(fetcher: &dyn DocumentFetcher, uris: &[String], parse: F) -> Result<Option<ServerSettings>>
where
    F: Fn(&str) -> Result<Option<ServerSettings>>,
{
    let documents = join_all(uris.iter().map(|uri| fetcher.fetch(uri))).await;

    for (uri, document) in uris.iter().zip(documents) {
        let Some(document) = document else {
            continue;
        };

        match parse(&document)? {
            Some(settings) => {
                debug!("using document from {}", uri);
                return Ok(Some(settings));
            }
            None => debug!("document from {} holds no settings", uri),
        }
    }

    Ok(None)
}

/// A settings source backed by a remote configuration document.
///
/// Always answers with settings carrying its name and the mail address, empty if
/// no document was found.
pub struct DocumentSource {
    kind: DocumentKind,
    address: MailAddress,
    fetcher: Arc<dyn DocumentFetcher>,
}

impl DocumentSource {
    pub fn new(kind: DocumentKind, address: MailAddress, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self { kind, address, fetcher }
    }

    /// Autoconfig, autodiscover and ISP database sources sharing one HTTP client.
    pub fn default_sources(address: &MailAddress, timeout_ms: u64) -> Result<Vec<Arc<dyn SettingsSource>>> {
        let fetcher: Arc<dyn DocumentFetcher> = Arc::new(HttpFetcher::new(timeout_ms)?);
        Ok(Self::all_with(address, fetcher))
    }

    pub fn all_with(address: &MailAddress, fetcher: Arc<dyn DocumentFetcher>) -> Vec<Arc<dyn SettingsSource>> {
        DocumentKind::ALL
            .iter()
            .map(|&kind| -> Arc<dyn SettingsSource> { Arc::new(Self::new(kind, address.clone(), fetcher.clone())) })
            .collect()
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
}

#[async_trait]
impl SettingsSource for DocumentSource {
    async fn server_settings(&self, _start: Option<&ServerSettings>) -> Result<Option<ServerSettings>> {
        let uris = self.kind.uris(&self.address);
        let found = fetch_settings(self.fetcher.as_ref(), &uris, |document| {
            self.kind.parse(document, &self.address)
        })
        .await?;

        match &found {
            Some(settings) => info!("{} found: {}", self.kind, settings),
            None => info!("{} found nothing for {}", self.kind, self.address),
        }

        let mut settings = found.unwrap_or_default();
        settings.source_name = Some(self.kind.name().to_string());
        if settings.mail_address.is_none() {
            settings.mail_address = Some(self.address.to_string());
        }

        Ok(Some(settings))
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves documents from memory and records requested URIs.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub documents: HashMap<String, String>,
        /// Served for any URI not in `documents`.
        pub fallback: Option<String>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn serving(document: &str) -> Self {
            Self {
                fallback: Some(document.to_string()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DocumentFetcher for FakeFetcher {
        async fn fetch(&self, uri: &str) -> Option<String> {
            self.requested.lock().unwrap().push(uri.to_string());
            self.documents.get(uri).cloned().or_else(|| self.fallback.clone())
        }
    }
}
