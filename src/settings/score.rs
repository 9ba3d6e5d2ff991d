//! Ranking keys for ports, socket types, protocol settings, probe results and
//! credentials. Lower is better everywhere.

use crate::scanner::results::PortCheckResult;
use crate::settings::{Credentials, ProtocolSettings, SocketType, UserNameType, Verification};

pub fn port(port: Option<u16>) -> u32 {
    match port {
        Some(993) => 10,
        Some(143) => 20,

        Some(587) => 10,
        Some(465) => 20,
        Some(25) => 30,
        Some(2525) => 40,

        _ => 90,
    }
}

pub fn socket_type(socket_type: SocketType) -> u32 {
    match socket_type {
        SocketType::SslTls => 1,
        SocketType::StartTls => 2,
        SocketType::Plain => 3,
        // outweighs any port score
        SocketType::Unknown => 900,
    }
}

/// Port and socket type only: how well-specified the connection parameters are.
pub fn connection(settings: &ProtocolSettings) -> u32 {
    port(settings.port) + socket_type(settings.socket_type)
}

/// Ranks candidates for the same protocol slot: verification outcome first, then
/// whether a server is known, then socket type and port.
pub fn protocol(settings: &ProtocolSettings) -> u32 {
    let verification = match settings.verification {
        Verification::Passed => 10_000,
        Verification::Unverified => 20_000,
        Verification::Failed => 30_000,
    };

    let server = if settings.server.is_some() { 1_000 } else { 2_000 };

    verification + server + connection(settings)
}

pub fn port_check_result(result: &PortCheckResult) -> u32 {
    let timeout = if result.timed_out { 200_000 } else { 100_000 };
    let connect = if result.connect_successful { 10_000 } else { 20_000 };
    let authenticate = if result.authenticate_successful { 1_000 } else { 2_000 };

    timeout + connect + authenticate + connection(&result.protocol_settings)
}

/// Ranks the quality of an identity.
pub fn user_name(credentials: &Credentials) -> u32 {
    let user_name = &credentials.user_name;

    if credentials.password.is_none() {
        6
    } else if user_name.authentication_successful {
        1
    } else if user_name.name.is_empty() {
        5
    } else if user_name.name_type == UserNameType::Unknown {
        4
    } else if user_name.is_placeholder() {
        // expected to resolve correctly later
        1
    } else {
        2
    }
}

/// The first item with the smallest key. `Iterator::min_by_key` returns the last of
/// several equal minima, which would make selection depend on input order reversed.
pub fn first_min_by_key<T, I, F>(items: I, mut key: F) -> Option<T>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> u32,
{
    let mut best: Option<(u32, T)> = None;
    for item in items {
        let score = key(&item);
        match &best {
            Some((best_score, _)) if *best_score <= score => {}
            _ => best = Some((score, item)),
        }
    }
    best.map(|(_, item)| item)
}
