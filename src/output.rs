use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::scanner::PortCheckResult;
use crate::settings::{ProtocolSettings, ServerSettings, SocketType, Verification};

/// Everything one run found out about a mail address.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mail_address: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// The merged recommendation.
    pub best: ServerSettings,
    /// What each source answered.
    pub candidates: Vec<ServerSettings>,
    /// Port probes run during discovery, or in probe mode.
    pub probes: Vec<PortCheckResult>,
    /// Probes run to verify `best`.
    pub verification: Vec<PortCheckResult>,
}

impl Report {
    pub fn new(mail_address: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            mail_address: mail_address.into(),
            start_time,
            end_time: start_time,
            best: ServerSettings::default(),
            candidates: Vec::new(),
            probes: Vec::new(),
            verification: Vec::new(),
        }
    }
}

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Result<Self> {
        Ok(Self { format, file })
    }

    pub fn write(&self, report: &Report) -> Result<()> {
        let output = self.format(report)?;

        match &self.file {
            Some(path) => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }

    pub fn format(&self, report: &Report) -> Result<String> {
        match self.format {
            OutputFormat::Human => self.format_human(report),
            OutputFormat::Json => self.format_json(report),
        }
    }

    fn format_human(&self, report: &Report) -> Result<String> {
        let mut output = String::new();

        output.push_str(&format!("\n{}\n\n", "MAIL SETTINGS".truecolor(0, 255, 65).bold()));

        output.push_str(&format!(
            "{} {} {} {} {}\n",
            "⟦".truecolor(64, 64, 64),
            report.mail_address.truecolor(255, 255, 255).bold(),
            "•".truecolor(0, 255, 65),
            format!("{}ms", (report.end_time - report.start_time).num_milliseconds())
                .truecolor(0, 212, 255)
                .bold(),
            "⟧".truecolor(64, 64, 64)
        ));
        if let Some(sources) = &report.best.source_name {
            output.push_str(&format!(
                "{} {} {}\n",
                "⟦".truecolor(64, 64, 64),
                sources.truecolor(191, 64, 191).bold(),
                "⟧".truecolor(64, 64, 64)
            ));
        }
        output.push('\n');

        for slot in report.best.protocols() {
            output.push_str(&format_slot(&slot.protocol.to_string(), slot.settings));
        }
        output.push('\n');

        if !report.probes.is_empty() {
            output.push_str(&format!("{}\n", "Probes".truecolor(0, 212, 255).bold()));
            for result in &report.probes {
                output.push_str(&format_probe(result));
            }
            output.push('\n');
        }

        if !report.verification.is_empty() {
            output.push_str(&format!("{}\n", "Verification".truecolor(0, 212, 255).bold()));
            for result in &report.verification {
                output.push_str(&format_probe(result));
            }
            output.push('\n');
        }

        if report.candidates.len() > 1 {
            output.push_str(&format!("{}\n", "Candidates".truecolor(0, 212, 255).bold()));
            for candidate in &report.candidates {
                output.push_str(&format!("  {} {}\n", "•".truecolor(64, 64, 64), candidate.to_string().truecolor(128, 128, 128)));
            }
            output.push('\n');
        }

        if report.best.enough_for_configuration() {
            output.push_str(&format!(
                "{} {}\n",
                "⚡".truecolor(0, 255, 65).bold(),
                "Enough for mail configuration".truecolor(0, 255, 65).bold()
            ));
        } else {
            output.push_str(&format!(
                "{} {}\n",
                "⚠".truecolor(255, 140, 0).bold(),
                "Settings incomplete - IMAP and SMTP need server, port and socket type".truecolor(128, 128, 128)
            ));
        }

        Ok(output)
    }

    fn format_json(&self, report: &Report) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

fn format_slot(protocol: &str, settings: &ProtocolSettings) -> String {
    let Some(server) = &settings.server else {
        return format!(
            "{} {:<5} {}\n",
            "▶".truecolor(64, 64, 64),
            protocol.truecolor(128, 128, 128),
            "unknown".truecolor(128, 128, 128)
        );
    };

    let port = settings.port.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
    let user = if settings.credentials.user_name.name.is_empty() {
        "Unknown"
    } else {
        settings.credentials.user_name.name.as_str()
    };
    let verification = match settings.verification {
        Verification::Passed => "● verified".truecolor(0, 255, 65),
        Verification::Failed => "● failed".truecolor(255, 64, 64),
        Verification::Unverified => "○ unverified".truecolor(128, 128, 128),
    };

    let mut line = format!(
        "{} {:<5} {} {} {} {}",
        "▶".truecolor(0, 255, 65).bold(),
        protocol.truecolor(255, 255, 255).bold(),
        format!("{}:{}", server, port).truecolor(255, 255, 255),
        socket_label(settings.socket_type),
        format!("user {}", user).truecolor(128, 128, 128),
        verification
    );
    if let Some(authentication) = &settings.authentication {
        line.push_str(&format!(" {}", format!("({})", authentication).truecolor(128, 128, 128)));
    }
    line.push('\n');
    line
}

fn format_probe(result: &PortCheckResult) -> String {
    let settings = &result.protocol_settings;
    let outcome = if result.verified() {
        "● verified".truecolor(0, 255, 65)
    } else if result.timed_out {
        "● timeout".truecolor(255, 140, 0)
    } else if result.connect_successful {
        "● login failed".truecolor(255, 140, 0)
    } else {
        "● no connection".truecolor(255, 64, 64)
    };

    format!(
        "  {:<5} {} {} {}\n",
        result.protocol.to_string().truecolor(255, 255, 255).bold(),
        format!(
            "{}:{}",
            settings.server.as_deref().unwrap_or("?"),
            settings.port.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
        )
        .truecolor(255, 255, 255),
        socket_label(settings.socket_type),
        outcome
    )
}

fn socket_label(socket_type: SocketType) -> ColoredString {
    match socket_type {
        SocketType::SslTls => "SSL".truecolor(0, 255, 65),
        SocketType::StartTls => "STARTTLS".truecolor(0, 212, 255),
        SocketType::Plain => "PLAIN".truecolor(255, 140, 0),
        SocketType::Unknown => "?".truecolor(128, 128, 128),
    }
}
