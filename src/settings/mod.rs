pub mod builder;
pub mod merge;
pub mod score;

pub use builder::{FoundSettings, SettingsBuilder, SettingsFinder, SourceGroup};
pub use merge::{select_best, SelectBest};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::address::MailAddress;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Pop3,
    Imap,
    Smtp,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Pop3, Protocol::Imap, Protocol::Smtp];
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Pop3 => write!(f, "POP3"),
            Protocol::Imap => write!(f, "IMAP"),
            Protocol::Smtp => write!(f, "SMTP"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POP3" => Ok(Protocol::Pop3),
            "IMAP" => Ok(Protocol::Imap),
            "SMTP" => Ok(Protocol::Smtp),
            _ => Err(Error::UnknownProtocol(s.to_string())),
        }
    }
}

/// Security mode of the mail connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketType {
    /// Not yet known.
    #[default]
    Unknown,
    /// Implicit TLS from the first byte.
    SslTls,
    /// Plaintext greeting, then upgrade to TLS.
    StartTls,
    Plain,
}

impl SocketType {
    /// Every concrete mode, in the order probes are launched.
    pub const CONCRETE: [SocketType; 3] = [SocketType::SslTls, SocketType::StartTls, SocketType::Plain];
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketType::Unknown => write!(f, "Unknown"),
            SocketType::SslTls => write!(f, "SslTls"),
            SocketType::StartTls => write!(f, "StartTls"),
            SocketType::Plain => write!(f, "Plain"),
        }
    }
}

impl FromStr for SocketType {
    type Err = Error;

    /// Parses the socket type names used by configuration documents.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(SocketType::Plain),
            "STARTTLS" => Ok(SocketType::StartTls),
            "SSL" => Ok(SocketType::SslTls),
            _ => Err(Error::UnknownSocketType(s.to_string())),
        }
    }
}

/// Outcome of probing a protocol slot. Only the ports checker writes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verification {
    #[default]
    Unverified,
    Passed,
    Failed,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Unverified => write!(f, "Unverified"),
            Verification::Passed => write!(f, "Passed"),
            Verification::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserNameType {
    #[default]
    Unknown,
    /// john.doe@company.com
    MailAddress,
    /// john.doe
    MailLocalPart,
    /// company.com
    MailDomain,
    /// John Doe
    RealName,
    /// A literal, already resolved name.
    UserName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserName {
    /// Either a literal name or a placeholder such as `%EMAILADDRESS%`.
    pub name: String,
    #[serde(rename = "type")]
    pub name_type: UserNameType,
    /// Set once a probe authenticated with this name.
    #[serde(default)]
    pub authentication_successful: bool,
}

impl UserName {
    /// A literal user name that needs no resolution.
    pub fn literal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_type: UserNameType::UserName,
            authentication_successful: false,
        }
    }

    /// Builds a user name from a configuration document entry, deriving the type from
    /// the placeholder token.
    pub fn from_placeholder(placeholder: Option<&str>) -> Self {
        let Some(placeholder) = placeholder else {
            return Self::default();
        };

        let name_type = match placeholder.trim().to_ascii_uppercase().as_str() {
            "%EMAILADDRESS%" => UserNameType::MailAddress,
            "%EMAILLOCALPART%" => UserNameType::MailLocalPart,
            "%EMAILDOMAIN%" => UserNameType::MailDomain,
            "%REALNAME%" => UserNameType::RealName,
            _ => UserNameType::Unknown,
        };

        Self {
            name: placeholder.to_string(),
            name_type,
            authentication_successful: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        let name = self.name.trim();
        name.len() >= 2 && name.starts_with('%') && name.ends_with('%')
    }

    /// Replaces a placeholder name with the matching part of the mail address.
    /// Literal names and placeholders without a mail-derived type stay unchanged.
    pub fn update_with_mail_address(&mut self, address: &MailAddress) {
        if !self.is_placeholder() {
            return;
        }

        match self.name_type {
            UserNameType::MailAddress => self.name = address.to_string(),
            UserNameType::MailLocalPart => self.name = address.local_part().to_string(),
            UserNameType::MailDomain => self.name = address.domain().to_string(),
            UserNameType::RealName | UserNameType::UserName | UserNameType::Unknown => {}
        }
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {:?}", self.name, self.name_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user_name: UserName,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user_name: UserName, password: impl Into<String>) -> Self {
        Self {
            user_name,
            password: Some(password.into()),
        }
    }
}

/// Connection settings for one protocol slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    pub server: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub socket_type: SocketType,
    #[serde(default)]
    pub credentials: Credentials,
    /// Free-text authentication hint from a source, e.g. `password-cleartext, OAuth2`.
    pub authentication: Option<String>,
    #[serde(default)]
    pub verification: Verification,
}

impl ProtocolSettings {
    pub fn new(server: impl Into<String>, port: u16, socket_type: SocketType) -> Self {
        Self {
            server: Some(server.into()),
            port: Some(port),
            socket_type,
            ..Self::default()
        }
    }

    pub fn server_and_port_set(&self) -> bool {
        self.server.is_some() && self.port.is_some()
    }

    pub fn enough_for_configuration(&self) -> bool {
        self.server_and_port_set() && self.socket_type != SocketType::Unknown
    }
}

impl fmt::Display for ProtocolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = if self.credentials.user_name.name.is_empty() {
            "Unknown"
        } else {
            self.credentials.user_name.name.as_str()
        };

        let parts = [
            self.server.clone(),
            self.port.map(|port| port.to_string()),
            Some(self.socket_type.to_string()),
            Some(format!("User: {}", user)),
            self.authentication.clone(),
            Some(format!("Verification: {}", self.verification)),
        ];

        let text: Vec<String> = parts.into_iter().flatten().filter(|s| !s.is_empty()).collect();
        write!(f, "{}", text.join(", "))
    }
}

/// The result of one resolution attempt for a mail address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Provenance label, comma-joined when merged from several sources.
    pub source_name: Option<String>,
    pub mail_address: Option<String>,
    #[serde(default)]
    pub pop3: ProtocolSettings,
    #[serde(default)]
    pub imap: ProtocolSettings,
    #[serde(default)]
    pub smtp: ProtocolSettings,
}

impl ServerSettings {
    pub fn named(source_name: impl Into<String>) -> Self {
        Self {
            source_name: Some(source_name.into()),
            ..Self::default()
        }
    }

    /// IMAP and SMTP are required; POP3 is optional.
    pub fn enough_for_configuration(&self) -> bool {
        self.imap.enough_for_configuration() && self.smtp.enough_for_configuration()
    }

    pub fn protocol(&self, protocol: Protocol) -> &ProtocolSettings {
        match protocol {
            Protocol::Pop3 => &self.pop3,
            Protocol::Imap => &self.imap,
            Protocol::Smtp => &self.smtp,
        }
    }

    pub fn protocol_mut(&mut self, protocol: Protocol) -> &mut ProtocolSettings {
        match protocol {
            Protocol::Pop3 => &mut self.pop3,
            Protocol::Imap => &mut self.imap,
            Protocol::Smtp => &mut self.smtp,
        }
    }

    /// The three protocol slots, tagged, in POP3, IMAP, SMTP order.
    pub fn protocols(&self) -> [ProtocolAndSettings<'_>; 3] {
        Protocol::ALL.map(|protocol| ProtocolAndSettings {
            protocol,
            settings: self.protocol(protocol),
        })
    }
}

impl fmt::Display for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(source_name) = &self.source_name {
            parts.push(source_name.clone());
        }
        for slot in self.protocols() {
            parts.push(
                slot.settings
                    .server
                    .clone()
                    .unwrap_or_else(|| format!("{} unknown", slot.protocol)),
            );
        }
        if self.enough_for_configuration() {
            parts.push("(enough for mail configuration)".to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// A protocol slot of a `ServerSettings` together with its protocol tag.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolAndSettings<'a> {
    pub protocol: Protocol,
    pub settings: &'a ProtocolSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> MailAddress {
        MailAddress::parse("john.doe@company.com").unwrap()
    }

    #[test]
    fn test_socket_type_parse() {
        assert_eq!("SSL".parse::<SocketType>().unwrap(), SocketType::SslTls);
        assert_eq!("starttls".parse::<SocketType>().unwrap(), SocketType::StartTls);
        assert_eq!("Plain".parse::<SocketType>().unwrap(), SocketType::Plain);
        assert!(matches!("TLS".parse::<SocketType>(), Err(Error::UnknownSocketType(_))));
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("imap".parse::<Protocol>().unwrap(), Protocol::Imap);
        assert!(matches!("NNTP".parse::<Protocol>(), Err(Error::UnknownProtocol(_))));
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(UserName::from_placeholder(Some("%EMAILADDRESS%")).is_placeholder());
        assert!(UserName::from_placeholder(Some(" %custom% ")).is_placeholder());
        assert!(!UserName::literal("john").is_placeholder());
        assert!(!UserName::literal("%").is_placeholder());
        assert!(!UserName::default().is_placeholder());
    }

    #[test]
    fn test_placeholder_types() {
        let cases = [
            ("%EMAILADDRESS%", UserNameType::MailAddress),
            ("%emaillocalpart%", UserNameType::MailLocalPart),
            ("%EMAILDOMAIN%", UserNameType::MailDomain),
            ("%REALNAME%", UserNameType::RealName),
            ("%SOMETHING%", UserNameType::Unknown),
        ];
        for (placeholder, expected) in cases {
            assert_eq!(UserName::from_placeholder(Some(placeholder)).name_type, expected);
        }
        assert_eq!(UserName::from_placeholder(None), UserName::default());
    }

    #[test]
    fn test_update_with_mail_address() {
        let mut full = UserName::from_placeholder(Some("%EMAILADDRESS%"));
        full.update_with_mail_address(&address());
        assert_eq!(full.name, "john.doe@company.com");
        assert_eq!(full.name_type, UserNameType::MailAddress);

        let mut local = UserName::from_placeholder(Some("%EMAILLOCALPART%"));
        local.update_with_mail_address(&address());
        assert_eq!(local.name, "john.doe");

        let mut domain = UserName::from_placeholder(Some("%EMAILDOMAIN%"));
        domain.update_with_mail_address(&address());
        assert_eq!(domain.name, "company.com");
    }

    #[test]
    fn test_update_leaves_literal_names() {
        let mut literal = UserName::literal("JohnDoe");
        literal.update_with_mail_address(&address());
        assert_eq!(literal.name, "JohnDoe");

        let mut real_name = UserName::from_placeholder(Some("%REALNAME%"));
        real_name.update_with_mail_address(&address());
        assert_eq!(real_name.name, "%REALNAME%");
    }

    #[test]
    fn test_enough_for_configuration() {
        let mut settings = ServerSettings::default();
        assert!(!settings.enough_for_configuration());

        settings.imap = ProtocolSettings::new("imap.company.com", 993, SocketType::SslTls);
        settings.smtp = ProtocolSettings::new("smtp.company.com", 587, SocketType::Unknown);
        assert!(settings.imap.enough_for_configuration());
        assert!(settings.smtp.server_and_port_set());
        assert!(!settings.enough_for_configuration());

        settings.smtp.socket_type = SocketType::StartTls;
        assert!(settings.enough_for_configuration());
        assert!(!settings.pop3.server_and_port_set());
    }

    #[test]
    fn test_protocols_order() {
        let settings = ServerSettings::default();
        let tags: Vec<Protocol> = settings.protocols().iter().map(|p| p.protocol).collect();
        assert_eq!(tags, vec![Protocol::Pop3, Protocol::Imap, Protocol::Smtp]);
    }

    #[test]
    fn test_display() {
        let mut settings = ServerSettings::named("AutoconfigXml");
        settings.imap = ProtocolSettings::new("imap.company.com", 993, SocketType::SslTls);
        assert_eq!(
            settings.to_string(),
            "AutoconfigXml, POP3 unknown, imap.company.com, SMTP unknown"
        );
        assert_eq!(
            settings.imap.to_string(),
            "imap.company.com, 993, SslTls, User: Unknown, Verification: Unverified"
        );
    }

    #[test]
    fn test_password_not_serialized() {
        let credentials = Credentials::new(UserName::literal("john"), "secret");
        let json = serde_json::to_string(&credentials).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("john"));
    }
}
