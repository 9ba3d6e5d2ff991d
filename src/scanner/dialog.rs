//! Minimal POP3, IMAP and SMTP client dialogs: greeting, optional STARTTLS,
//! password login and logout. Nothing beyond what a probe needs.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::ProbeError;
use crate::scanner::prober::MailSession;
use crate::scanner::tcp::Connection;
use crate::settings::Protocol;

const HELO_NAME: &str = "mailscope";

pub struct Session {
    protocol: Protocol,
    connection: Connection,
    next_tag: u32,
}

/// Reads the greeting and, if asked, negotiates STARTTLS.
pub async fn open(protocol: Protocol, connection: Connection, start_tls: bool) -> Result<Session, ProbeError> {
    let mut session = Session {
        protocol,
        connection,
        next_tag: 1,
    };

    match protocol {
        Protocol::Pop3 => session.pop3_open(start_tls).await?,
        Protocol::Imap => session.imap_open(start_tls).await?,
        Protocol::Smtp => session.smtp_open(start_tls).await?,
    }

    Ok(session)
}

impl Session {
    async fn pop3_open(&mut self, start_tls: bool) -> Result<(), ProbeError> {
        let greeting = self.connection.read_line().await?;
        if !greeting.starts_with("+OK") {
            return Err(ProbeError::Protocol(format!("unexpected POP3 greeting: {}", greeting)));
        }

        if start_tls {
            self.connection.write_line("STLS").await?;
            let reply = self.connection.read_line().await?;
            if !reply.starts_with("+OK") {
                return Err(ProbeError::Protocol(format!("STLS refused: {}", reply)));
            }
            self.connection.start_tls().await?;
        }
        Ok(())
    }

    async fn imap_open(&mut self, start_tls: bool) -> Result<(), ProbeError> {
        let greeting = self.connection.read_line().await?;
        if !greeting.starts_with("* OK") {
            return Err(ProbeError::Protocol(format!("unexpected IMAP greeting: {}", greeting)));
        }

        if start_tls {
            let reply = self.imap_command("STARTTLS", None).await?;
            if !imap_ok(&reply) {
                return Err(ProbeError::Protocol(format!("STARTTLS refused: {}", reply)));
            }
            self.connection.start_tls().await?;
        }
        Ok(())
    }

    async fn smtp_open(&mut self, start_tls: bool) -> Result<(), ProbeError> {
        let (code, greeting) = self.smtp_reply().await?;
        if code != 220 {
            return Err(ProbeError::Protocol(format!("unexpected SMTP greeting: {}", greeting)));
        }

        self.smtp_ehlo().await?;

        if start_tls {
            self.connection.write_line("STARTTLS").await?;
            let (code, reply) = self.smtp_reply().await?;
            if code != 220 {
                return Err(ProbeError::Protocol(format!("STARTTLS refused: {}", reply)));
            }
            self.connection.start_tls().await?;
            self.smtp_ehlo().await?;
        }
        Ok(())
    }

    async fn smtp_ehlo(&mut self) -> Result<(), ProbeError> {
        self.connection.write_line(&format!("EHLO {}", HELO_NAME)).await?;
        let (code, reply) = self.smtp_reply().await?;
        if code != 250 {
            return Err(ProbeError::Protocol(format!("EHLO refused: {}", reply)));
        }
        Ok(())
    }

    /// Reads a possibly multi-line SMTP reply and returns its code and last line.
    async fn smtp_reply(&mut self) -> Result<(u16, String), ProbeError> {
        loop {
            let line = self.connection.read_line().await?;
            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| ProbeError::Protocol(format!("malformed SMTP reply: {}", line)))?;

            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok((code, line));
            }
        }
    }

    /// Sends a tagged IMAP command and returns the tagged completion line.
    async fn imap_command(&mut self, command: &str, shown: Option<&str>) -> Result<String, ProbeError> {
        let tag = format!("a{}", self.next_tag);
        self.next_tag += 1;

        let line = format!("{} {}", tag, command);
        match shown {
            Some(shown) => {
                self.connection
                    .write_secret_line(&line, &format!("{} {}", tag, shown))
                    .await?
            }
            None => self.connection.write_line(&line).await?,
        }

        let prefix = format!("{} ", tag);
        loop {
            let reply = self.connection.read_line().await?;
            if let Some(status) = reply.strip_prefix(&prefix) {
                return Ok(status.to_string());
            }
        }
    }
}

fn imap_ok(status: &str) -> bool {
    status.starts_with("OK")
}

fn imap_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

#[async_trait]
impl MailSession for Session {
    async fn authenticate(&mut self, user_name: &str, password: &str) -> Result<(), ProbeError> {
        match self.protocol {
            Protocol::Pop3 => {
                self.connection.write_line(&format!("USER {}", user_name)).await?;
                let reply = self.connection.read_line().await?;
                if !reply.starts_with("+OK") {
                    return Err(ProbeError::Rejected(reply));
                }

                self.connection
                    .write_secret_line(&format!("PASS {}", password), "PASS ********")
                    .await?;
                let reply = self.connection.read_line().await?;
                if !reply.starts_with("+OK") {
                    return Err(ProbeError::Rejected(reply));
                }
            }
            Protocol::Imap => {
                let command = format!("LOGIN {} {}", imap_quote(user_name), imap_quote(password));
                let shown = format!("LOGIN {} ********", imap_quote(user_name));
                let status = self.imap_command(&command, Some(&shown)).await?;
                if !imap_ok(&status) {
                    return Err(ProbeError::Rejected(status));
                }
            }
            Protocol::Smtp => {
                let token = STANDARD.encode(format!("\0{}\0{}", user_name, password));
                self.connection
                    .write_secret_line(&format!("AUTH PLAIN {}", token), "AUTH PLAIN ********")
                    .await?;
                let (code, reply) = self.smtp_reply().await?;
                if code != 235 {
                    return Err(ProbeError::Rejected(reply));
                }
            }
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), ProbeError> {
        match self.protocol {
            Protocol::Pop3 => {
                self.connection.write_line("QUIT").await?;
                self.connection.read_line().await?;
            }
            Protocol::Imap => {
                self.imap_command("LOGOUT", None).await?;
            }
            Protocol::Smtp => {
                self.connection.write_line("QUIT").await?;
                self.smtp_reply().await?;
            }
        }
        Ok(())
    }

    fn transcript(&self) -> String {
        self.connection.transcript()
    }
}
