//! The discovery waterfall: groups of sources evaluated in order until the merged
//! result is enough to configure a mail client.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::address::MailAddress;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scanner::{MailClient, PortCheckResult, PortsChecker, TcpMailClient};
use crate::settings::{SelectBest, ServerSettings};
use crate::sources::{DocumentFetcher, DocumentSource, HttpFetcher, PortCheckSource, SettingsSource, StaticSource};

/// Sources queried together, concurrently.
#[derive(Clone, Default)]
pub struct SourceGroup {
    sources: Vec<Arc<dyn SettingsSource>>,
}

impl SourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: Arc<dyn SettingsSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Queries every source with the same `start` and waits for all of them.
    /// The order of the returned entries is not meaningful.
    pub async fn get_settings(&self, start: Option<&ServerSettings>) -> Result<Vec<Option<ServerSettings>>> {
        let tasks: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = source.clone();
                let start = start.cloned();
                tokio::spawn(async move { source.server_settings(start.as_ref()).await })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            let settings = joined.map_err(|e| Error::Task(e.to_string()))??;
            results.push(settings);
        }

        Ok(results)
    }
}

/// An ordered sequence of source groups, starting with one empty group.
#[derive(Clone)]
pub struct SettingsBuilder {
    groups: Vec<SourceGroup>,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            groups: vec![SourceGroup::new()],
        }
    }

    /// Adds `source` to the current group.
    pub fn add_source(mut self, source: Arc<dyn SettingsSource>) -> Self {
        if let Some(group) = self.groups.last_mut() {
            group.add_source(source);
        }
        self
    }

    pub fn add_sources<I>(self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn SettingsSource>>,
    {
        sources.into_iter().fold(self, |builder, source| builder.add_source(source))
    }

    /// Adds the autoconfig, autodiscover and ISP database sources to the current group.
    pub fn add_default_sources(self, address: &MailAddress, http_timeout_ms: u64) -> Result<Self> {
        Ok(self.add_sources(DocumentSource::default_sources(address, http_timeout_ms)?))
    }

    /// Closes the current group. Sources added afterwards are only queried if the
    /// groups before them were not enough.
    pub fn evaluate(mut self) -> Self {
        self.groups.push(SourceGroup::new());
        self
    }

    pub fn groups(&self) -> &[SourceGroup] {
        &self.groups
    }

    /// Runs the groups in order, each seeded with the merge of everything found so
    /// far, and stops after the first group whose merge is enough for configuration.
    ///
    /// Returns every candidate collected, unmerged.
    pub async fn get_settings(&self) -> Result<Vec<Option<ServerSettings>>> {
        let mut collected: Vec<Option<ServerSettings>> = Vec::new();
        let mut seed: Option<ServerSettings> = None;

        for (index, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                continue;
            }

            debug!("evaluating group {} with {} sources", index, group.len());
            collected.extend(group.get_settings(seed.as_ref()).await?);

            let best = collected.select_best();
            if best.enough_for_configuration() {
                info!("group {} completed the settings: {}", index, best);
                return Ok(collected);
            }

            debug!("after group {}: {}", index, best);
            seed = Some(best);
        }

        info!("all {} groups evaluated, settings incomplete", self.groups.len());
        Ok(collected)
    }
}

/// What [`SettingsFinder::find`] found out.
#[derive(Debug, Clone)]
pub struct FoundSettings {
    /// Every answer the sources gave, in waterfall order.
    pub candidates: Vec<ServerSettings>,
    /// The merged recommendation.
    pub best: ServerSettings,
    /// Every port probe the waterfall ran.
    pub port_checks: Vec<PortCheckResult>,
}

/// The default discovery for a mail address: the given settings, then the default
/// ports of their servers, then remote configuration documents, then the default
/// ports of whatever servers those named.
pub struct SettingsFinder {
    mail_address: MailAddress,
    builder: SettingsBuilder,
    port_check: Arc<PortCheckSource>,
}

impl SettingsFinder {
    pub fn new(mail_address: MailAddress, start: Option<ServerSettings>, config: &Config) -> Result<Self> {
        let client: Arc<dyn MailClient> = Arc::new(TcpMailClient::new());
        let fetcher: Arc<dyn DocumentFetcher> = Arc::new(HttpFetcher::new(config.http_timeout_ms)?);
        Ok(Self::with_collaborators(mail_address, start, config, client, fetcher))
    }

    pub fn with_collaborators(
        mail_address: MailAddress,
        start: Option<ServerSettings>,
        config: &Config,
        client: Arc<dyn MailClient>,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Self {
        let checker = PortsChecker::new(config.timeout_ms)
            .add_ports(PortsChecker::table_ports_with(&config.default_ports, client));
        let port_check = PortCheckSource::shared(checker);

        let builder = SettingsBuilder::new()
            .add_source(Arc::new(StaticSource::new(start)))
            .evaluate()
            .add_source(port_check.clone())
            .evaluate()
            .add_sources(DocumentSource::all_with(&mail_address, fetcher))
            .evaluate()
            .add_source(port_check.clone());

        Self {
            mail_address,
            builder,
            port_check,
        }
    }

    pub fn mail_address(&self) -> &MailAddress {
        &self.mail_address
    }

    /// Every candidate the waterfall collected.
    pub async fn get_settings(&self) -> Result<Vec<Option<ServerSettings>>> {
        info!("looking up settings for {}", self.mail_address);
        self.builder.get_settings().await
    }

    /// Runs the waterfall once. The merged recommendation carries the finder's mail
    /// address if no source supplied one.
    pub async fn find(&self) -> Result<FoundSettings> {
        // drop leftovers of earlier get_settings calls
        self.port_check.take_results();

        let candidates: Vec<ServerSettings> = self.get_settings().await?.into_iter().flatten().collect();
        let mut best = candidates.select_best();
        if best.mail_address.is_none() {
            best.mail_address = Some(self.mail_address.to_string());
        }

        Ok(FoundSettings {
            candidates,
            best,
            port_checks: self.port_check.take_results(),
        })
    }
}
