//! Mail server settings discovery.
//!
//! Settings for POP3, IMAP and SMTP are collected from several sources (given
//! settings, live port probes, autoconfig, autodiscover and the ISP database),
//! merged by score, and optionally verified by logging in.

pub mod address;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scanner;
pub mod settings;
pub mod sources;

pub use address::MailAddress;
pub use config::Config;
pub use error::{Error, Result};
pub use scanner::{PortCheckResult, PortsChecker, ProtocolSettingsFilter};
pub use settings::{
    select_best, FoundSettings, Protocol, ProtocolSettings, SelectBest, ServerSettings, SettingsBuilder, SettingsFinder,
    SocketType, SourceGroup, Verification,
};
pub use sources::SettingsSource;
