//! Exchange autodiscover documents (`autodiscover.xml`, POX schema).

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::address::MailAddress;
use crate::error::Result;
use crate::settings::{Credentials, ProtocolSettings, ServerSettings, SocketType, UserName};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Autodiscover {
    response: Option<Response>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Response {
    account: Option<Account>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Account {
    #[serde(default)]
    protocol: Vec<Protocol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Protocol {
    #[serde(rename = "Type")]
    protocol_type: Option<String>,
    server: Option<String>,
    port: Option<u16>,
    login_name: Option<String>,
    #[serde(rename = "SSL")]
    ssl: Option<String>,
    auth_required: Option<String>,
}

impl Protocol {
    fn is(&self, protocol_type: &str) -> bool {
        self.protocol_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(protocol_type))
    }

    fn to_protocol_settings(&self, address: &MailAddress) -> ProtocolSettings {
        let socket_type = match self.ssl.as_deref().map(str::trim) {
            None => SocketType::Unknown,
            Some(ssl) if ssl.eq_ignore_ascii_case("on") => SocketType::SslTls,
            Some(_) => SocketType::Plain,
        };

        let login_name = self.login_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let mut user_name = UserName::from_placeholder(login_name);
        user_name.update_with_mail_address(address);

        let authentication = self.auth_required.as_deref().map(|required| {
            if required.trim().eq_ignore_ascii_case("on") {
                "authentication required".to_string()
            } else {
                "authentication not required".to_string()
            }
        });

        ProtocolSettings {
            server: self.server.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            port: self.port,
            socket_type,
            credentials: Credentials {
                user_name,
                password: None,
            },
            authentication,
            ..ProtocolSettings::default()
        }
    }
}

/// Reads an autodiscover response. Anything that is not a well-formed response
/// with an account yields `None`.
pub fn parse(document: &str, address: &MailAddress) -> Result<Option<ServerSettings>> {
    let autodiscover: Autodiscover = match from_str(document) {
        Ok(autodiscover) => autodiscover,
        Err(e) => {
            debug!("not an autodiscover document: {}", e);
            return Ok(None);
        }
    };

    let Some(account) = autodiscover.response.and_then(|response| response.account) else {
        return Ok(None);
    };

    let slot = |protocol_type: &str| {
        account
            .protocol
            .iter()
            .find(|protocol| protocol.is(protocol_type))
            .map(|protocol| protocol.to_protocol_settings(address))
            .unwrap_or_default()
    };

    Ok(Some(ServerSettings {
        pop3: slot("POP3"),
        imap: slot("IMAP"),
        smtp: slot("SMTP"),
        ..ServerSettings::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::UserNameType;

    const FULL: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006">
  <Response xmlns="http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a">
    <Account>
      <AccountType>email</AccountType>
      <Action>settings</Action>
      <Protocol>
        <Type>IMAP</Type>
        <Server>imap.company.com</Server>
        <Port>993</Port>
        <DomainRequired>off</DomainRequired>
        <LoginName></LoginName>
        <SPA>off</SPA>
        <SSL>on</SSL>
        <AuthRequired>on</AuthRequired>
      </Protocol>
      <Protocol>
        <Type>POP3</Type>
        <Server>pop3.company.com</Server>
        <Port>995</Port>
        <DomainRequired>off</DomainRequired>
        <LoginName></LoginName>
        <SPA>off</SPA>
        <SSL>on</SSL>
        <AuthRequired>on</AuthRequired>
      </Protocol>
      <Protocol>
        <Type>SMTP</Type>
        <Server>smtp.company.com</Server>
        <Port>465</Port>
        <DomainRequired>off</DomainRequired>
        <LoginName>%EMAILADDRESS%</LoginName>
        <SPA>off</SPA>
        <SSL>off</SSL>
        <AuthRequired>off</AuthRequired>
        <UsePOPAuth>off</UsePOPAuth>
        <SMTPLast>off</SMTPLast>
      </Protocol>
    </Account>
  </Response>
</Autodiscover>
"#;

    const WITHOUT_POP3: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006">
  <Response xmlns="http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a">
    <Account>
      <AccountType>email</AccountType>
      <Action>settings</Action>
      <Protocol>
        <Type>IMAP</Type>
        <Server>imap.company.com</Server>
        <Port>993</Port>
        <SSL>on</SSL>
        <AuthRequired>on</AuthRequired>
      </Protocol>
      <Protocol>
        <Type>SMTP</Type>
        <Server>smtp.company.com</Server>
        <Port>465</Port>
        <SSL>on</SSL>
        <AuthRequired>on</AuthRequired>
      </Protocol>
    </Account>
  </Response>
</Autodiscover>
"#;

    fn address() -> MailAddress {
        MailAddress::parse("john.doe@company.com").unwrap()
    }

    #[test]
    fn test_pop3_imap_smtp() {
        let settings = parse(FULL, &address()).unwrap().unwrap();

        assert_eq!(settings.pop3.server.as_deref(), Some("pop3.company.com"));
        assert_eq!(settings.pop3.port, Some(995));
        assert_eq!(settings.imap.server.as_deref(), Some("imap.company.com"));
        assert_eq!(settings.imap.port, Some(993));
        assert_eq!(settings.imap.socket_type, SocketType::SslTls);
        assert_eq!(settings.imap.authentication.as_deref(), Some("authentication required"));
        assert!(settings.imap.credentials.user_name.name.is_empty());

        assert_eq!(settings.smtp.server.as_deref(), Some("smtp.company.com"));
        assert_eq!(settings.smtp.port, Some(465));
        assert_eq!(settings.smtp.socket_type, SocketType::Plain);
        assert_eq!(settings.smtp.authentication.as_deref(), Some("authentication not required"));
        assert_eq!(settings.smtp.credentials.user_name.name, "john.doe@company.com");
        assert_eq!(settings.smtp.credentials.user_name.name_type, UserNameType::MailAddress);
    }

    #[test]
    fn test_missing_pop3_not_fabricated() {
        let settings = parse(WITHOUT_POP3, &address()).unwrap().unwrap();
        assert!(!settings.pop3.server_and_port_set());
        assert!(settings.imap.server_and_port_set());
        assert!(settings.smtp.server_and_port_set());
        assert!(settings.enough_for_configuration());
    }

    #[test]
    fn test_missing_ssl_is_unknown() {
        let document = WITHOUT_POP3.replacen("<SSL>on</SSL>", "", 1);
        let settings = parse(&document, &address()).unwrap().unwrap();
        assert_eq!(settings.imap.socket_type, SocketType::Unknown);
        assert_eq!(settings.smtp.socket_type, SocketType::SslTls);
    }

    #[test]
    fn test_html_is_absent() {
        let html = "<html><body><p>page not found</p></body></html>";
        assert_eq!(parse(html, &address()).unwrap(), None);
    }
}
