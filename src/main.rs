use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mailscope::cli::Cli;
use mailscope::output::{OutputWriter, Report};
use mailscope::scanner::{self, best_server_settings, PortsChecker, ProtocolSettingsFilter, TcpMailClient};
use mailscope::{Config, MailAddress, SettingsFinder};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = cli.apply(Config::load(cli.config.as_deref())?);
    config.validate()?;

    let address = MailAddress::parse(&cli.mail_address)?;
    let start = cli.start_settings(&address);
    let output_writer = OutputWriter::new(cli.output_format, cli.output_file.clone())?;

    let mut report = Report::new(address.to_string(), Utc::now());

    if cli.probe {
        let checker = PortsChecker::new(config.timeout_ms)
            .add_ports(PortsChecker::table_ports_with(&config.default_ports, Arc::new(TcpMailClient::new())));
        let mut probed = start.clone();
        report.probes = checker
            .check_ports(&mut probed, &ProtocolSettingsFilter::none(), false)
            .await?;
        report.best = best_server_settings(&report.probes);
        report.best.mail_address = start.mail_address.clone();
        report.candidates = vec![start];
    } else {
        let finder = SettingsFinder::new(address.clone(), Some(start), &config)?;
        let found = finder.find().await?;
        report.best = found.best;
        report.candidates = found.candidates;
        report.probes = found.port_checks;
    }

    if config.verify {
        info!("verifying {}", report.best);
        report.verification = scanner::verify(&mut report.best, config.force_verification, config.timeout_ms).await?;
    }

    report.end_time = Utc::now();
    output_writer.write(&report)?;

    Ok(())
}
