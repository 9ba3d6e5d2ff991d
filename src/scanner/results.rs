use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settings::score::{self, first_min_by_key};
use crate::settings::{Protocol, ProtocolSettings, ServerSettings};

pub const PORT_CHECK_SOURCE_NAME: &str = "PortCheck";

/// Outcome of one probe of a server, port and socket type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCheckResult {
    pub protocol: Protocol,
    /// The settings as attempted, including the credentials used.
    pub protocol_settings: ProtocolSettings,
    pub connect_successful: bool,
    pub authenticate_successful: bool,
    pub timed_out: bool,
    /// Error of the failed step and the protocol transcript, if any.
    pub detail: Option<String>,
}

impl PortCheckResult {
    pub fn new(protocol: Protocol, protocol_settings: ProtocolSettings) -> Self {
        Self {
            protocol,
            protocol_settings,
            connect_successful: false,
            authenticate_successful: false,
            timed_out: false,
            detail: None,
        }
    }

    pub fn verified(&self) -> bool {
        self.connect_successful && self.authenticate_successful && !self.timed_out
    }
}

impl fmt::Display for PortCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, verified: {}",
            self.protocol,
            self.protocol_settings,
            self.verified()
        )
    }
}

/// Picks the best probe outcome per protocol and assembles them into settings
/// labelled `PortCheck`. Protocols without any result stay default.
pub fn best_server_settings(results: &[PortCheckResult]) -> ServerSettings {
    let mut settings = ServerSettings::named(PORT_CHECK_SOURCE_NAME);

    for protocol in Protocol::ALL {
        let candidates = results.iter().filter(|result| result.protocol == protocol);
        if let Some(best) = first_min_by_key(candidates, |result| score::port_check_result(result)) {
            *settings.protocol_mut(protocol) = best.protocol_settings.clone();
        }
    }

    settings
}
