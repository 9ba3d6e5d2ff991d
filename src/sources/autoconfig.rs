//! Mozilla autoconfig documents (`config-v1.1.xml`), also served by the ISP database.

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::address::MailAddress;
use crate::error::Result;
use crate::settings::{Credentials, ProtocolSettings, ServerSettings, SocketType, UserName};

#[derive(Debug, Deserialize)]
#[serde(rename = "clientConfig")]
struct ClientConfig {
    #[serde(rename = "emailProvider")]
    email_provider: Option<EmailProvider>,
}

#[derive(Debug, Deserialize)]
struct EmailProvider {
    #[serde(rename = "incomingServer", default)]
    incoming_servers: Vec<Server>,
    #[serde(rename = "outgoingServer", default)]
    outgoing_servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Server {
    #[serde(rename = "@type")]
    server_type: Option<String>,
    hostname: Option<String>,
    port: Option<u16>,
    socket_type: Option<String>,
    username: Option<String>,
    #[serde(default)]
    authentication: Vec<String>,
}

impl Server {
    fn is(&self, server_type: &str) -> bool {
        self.server_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(server_type))
    }

    fn to_protocol_settings(&self, address: &MailAddress) -> Result<ProtocolSettings> {
        let socket_type = match non_empty(&self.socket_type) {
            Some(socket_type) => socket_type.parse()?,
            None => SocketType::Unknown,
        };

        let mut user_name = UserName::from_placeholder(non_empty(&self.username));
        user_name.update_with_mail_address(address);

        let mut mechanisms: Vec<&str> = Vec::new();
        for mechanism in self.authentication.iter().map(|m| m.trim()) {
            if !mechanism.is_empty() && !mechanisms.contains(&mechanism) {
                mechanisms.push(mechanism);
            }
        }

        Ok(ProtocolSettings {
            server: non_empty(&self.hostname).map(str::to_string),
            port: self.port,
            socket_type,
            credentials: Credentials {
                user_name,
                password: None,
            },
            authentication: if mechanisms.is_empty() {
                None
            } else {
                Some(mechanisms.join(", "))
            },
            ..ProtocolSettings::default()
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn first_of(servers: &[Server], server_type: &str, address: &MailAddress) -> Result<ProtocolSettings> {
    match servers.iter().find(|server| server.is(server_type)) {
        Some(server) => server.to_protocol_settings(address),
        None => Ok(ProtocolSettings::default()),
    }
}

/// Reads an autoconfig document. Documents that are not well-formed autoconfig XML
/// yield `None`; an unknown socket type is an error.
pub fn parse(document: &str, address: &MailAddress) -> Result<Option<ServerSettings>> {
    let config: ClientConfig = match from_str(document) {
        Ok(config) => config,
        Err(e) => {
            debug!("not an autoconfig document: {}", e);
            return Ok(None);
        }
    };

    let Some(provider) = config.email_provider else {
        return Ok(None);
    };

    Ok(Some(ServerSettings {
        pop3: first_of(&provider.incoming_servers, "pop3", address)?,
        imap: first_of(&provider.incoming_servers, "imap", address)?,
        smtp: first_of(&provider.outgoing_servers, "smtp", address)?,
        ..ServerSettings::default()
    }))
}
