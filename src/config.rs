//! Runtime configuration: defaults, optionally overridden by a TOML file.
//!
//! Command line flags are applied on top by the binary, so the precedence is
//! flags > file > defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scanner::DEFAULT_PORTS;
use crate::settings::Protocol;

const CONFIG_DIR_NAME: &str = "mailscope";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Per probe step (connect, authenticate), in milliseconds.
    pub timeout_ms: u64,
    /// Per document request, in milliseconds.
    pub http_timeout_ms: u64,
    /// Verify the resolved settings after discovery.
    pub verify: bool,
    /// Also re-probe slots that are already verified.
    pub force_verification: bool,
    /// Ports probed when a server is known but its port is not.
    pub default_ports: Vec<(Protocol, u16)>,

    pub loaded_config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            http_timeout_ms: 2000,
            verify: false,
            force_verification: false,
            default_ports: DEFAULT_PORTS.to_vec(),
            loaded_config_path: None,
        }
    }
}

/// Mirror of the TOML file. Every key is optional.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) network: NetworkConfig,
    #[serde(default)]
    pub(crate) verification: VerificationConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct NetworkConfig {
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) http_timeout_ms: Option<u64>,
    pub(crate) pop3_ports: Option<Vec<u16>>,
    pub(crate) imap_ports: Option<Vec<u16>>,
    pub(crate) smtp_ports: Option<Vec<u16>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct VerificationConfig {
    pub(crate) verify: Option<bool>,
    pub(crate) force: Option<bool>,
}

impl Config {
    /// Loads `path`, or the per-user config file if it exists, or the defaults.
    /// An explicitly given path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|path| path.is_file()),
        };

        let Some(path) = path else {
            debug!("no config file, using defaults");
            return Ok(Self::default());
        };

        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let file: ConfigFile = toml::from_str(&content)?;

        let mut config = Self::default().with_file(file)?;
        info!("loaded configuration from {}", path.display());
        config.loaded_config_path = Some(path);
        Ok(config)
    }

    /// Applies the values present in `file` over `self`.
    pub fn with_file(mut self, file: ConfigFile) -> Result<Self> {
        let network = file.network;
        if let Some(timeout_ms) = network.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(http_timeout_ms) = network.http_timeout_ms {
            self.http_timeout_ms = http_timeout_ms;
        }

        let overrides = [
            (Protocol::Pop3, network.pop3_ports),
            (Protocol::Imap, network.imap_ports),
            (Protocol::Smtp, network.smtp_ports),
        ];
        for (protocol, ports) in overrides {
            let Some(ports) = ports else {
                continue;
            };
            self.default_ports.retain(|(p, _)| *p != protocol);
            self.default_ports.extend(ports.into_iter().map(|port| (protocol, port)));
        }
        self.default_ports.sort_by_key(|(protocol, _)| Protocol::ALL.iter().position(|p| p == protocol));

        if let Some(verify) = file.verification.verify {
            self.verify = verify;
        }
        if let Some(force) = file.verification.force {
            self.force_verification = force;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be greater than zero".to_string()));
        }
        if self.http_timeout_ms == 0 {
            return Err(Error::Config("http_timeout_ms must be greater than zero".to_string()));
        }
        if let Some((protocol, _)) = self.default_ports.iter().find(|(_, port)| *port == 0) {
            return Err(Error::Config(format!("port 0 is not a valid {} port", protocol)));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
