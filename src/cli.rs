use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::address::MailAddress;
use crate::config::Config;
use crate::settings::{Credentials, Protocol, ProtocolSettings, ServerSettings, UserName, UserNameType};

/// Source name of the settings given on the command line.
pub const OPTIONS_SOURCE_NAME: &str = "Options";

#[derive(Parser, Debug)]
#[command(name = "mailscope")]
#[command(author = "MailScope")]
#[command(version = "0.1.0")]
#[command(about = "Finds POP3, IMAP and SMTP settings for a mail address and verifies them", long_about = None)]
pub struct Cli {
    #[arg(help = "Mail address to find settings for, e.g. john.doe@company.com")]
    pub mail_address: String,

    #[arg(long, help = "Known POP3 server")]
    pub pop3_server: Option<String>,

    #[arg(long, help = "Known IMAP server")]
    pub imap_server: Option<String>,

    #[arg(long, help = "Known SMTP server")]
    pub smtp_server: Option<String>,

    #[arg(short, long, help = "User name for authentication (default: the mail address)")]
    pub user: Option<String>,

    #[arg(short, long, help = "Password for authentication. Without it probes only test the connection")]
    pub password: Option<String>,

    #[arg(long, help = "Timeout per probe step in milliseconds (default: 2000)")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Timeout per document request in milliseconds (default: 2000)")]
    pub http_timeout: Option<u64>,

    #[arg(long, help = "Verify the found settings by logging in")]
    pub verify: bool,

    #[arg(long, help = "With --verify, also re-check settings that are already verified")]
    pub force: bool,

    #[arg(long, help = "Only probe the default ports of the given servers, skip discovery")]
    pub probe: bool,

    #[arg(short, long, help = "Config file (default: <config dir>/mailscope/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(short = 'o', long, value_enum, default_value = "human", help = "Output format")]
    pub output_format: OutputFormat,

    #[arg(short = 'f', long, help = "Output file path")]
    pub output_file: Option<PathBuf>,

    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable output")]
    Human,
    #[value(name = "json", help = "JSON output")]
    Json,
}

impl Cli {
    /// Flags given on the command line win over `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout;
        }
        if let Some(http_timeout) = self.http_timeout {
            config.http_timeout_ms = http_timeout;
        }
        if self.verify {
            config.verify = true;
        }
        if self.force {
            config.force_verification = true;
        }
        config
    }

    /// The settings known up front: the mail address, the given servers and the
    /// credentials for each of them.
    pub fn start_settings(&self, address: &MailAddress) -> ServerSettings {
        let mut settings = ServerSettings {
            mail_address: Some(address.to_string()),
            ..ServerSettings::named(OPTIONS_SOURCE_NAME)
        };

        let servers = [
            (Protocol::Pop3, &self.pop3_server),
            (Protocol::Imap, &self.imap_server),
            (Protocol::Smtp, &self.smtp_server),
        ];
        for (protocol, server) in servers {
            let Some(server) = server.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };

            *settings.protocol_mut(protocol) = ProtocolSettings {
                server: Some(server.to_string()),
                credentials: self.credentials(address),
                ..ProtocolSettings::default()
            };
        }

        settings
    }

    fn credentials(&self, address: &MailAddress) -> Credentials {
        let user_name = match &self.user {
            Some(user) => UserName::literal(user.as_str()),
            None => UserName {
                name: address.to_string(),
                name_type: UserNameType::MailAddress,
                authentication_successful: false,
            },
        };

        Credentials {
            user_name,
            password: self.password.clone(),
        }
    }
}
