//! Combines settings from several sources into one recommendation.

use tracing::debug;

use crate::settings::score::{self, first_min_by_key};
use crate::settings::{Protocol, ServerSettings};

/// Merges any number of candidates into a new `ServerSettings`.
///
/// Each concern is decided on its own:
/// * the mail address comes from the first candidate that has one;
/// * per protocol, the candidate with the best port and socket type among those with
///   server and port set is the structural winner;
/// * only the mail-address carrier and the structural winners are combined. Among
///   them, the returned protocol slot is the best by [`score::protocol`] and its
///   credentials are the best by [`score::user_name`]. Ties go to the earlier of
///   carrier, POP3, IMAP and SMTP winner.
///
/// Candidates that are none of these contribute nothing, not even their source name.
pub fn select_best<'a, I>(candidates: I) -> ServerSettings
where
    I: IntoIterator<Item = Option<&'a ServerSettings>>,
{
    let candidates: Vec<&ServerSettings> = candidates.into_iter().flatten().collect();

    let with_mail_address = candidates.iter().position(|s| s.mail_address.is_some());

    let structural_winners = Protocol::ALL.map(|protocol| {
        let eligible = candidates
            .iter()
            .enumerate()
            .filter(|(_, s)| s.protocol(protocol).server_and_port_set());
        first_min_by_key(eligible, |(_, s)| score::connection(s.protocol(protocol))).map(|(i, _)| i)
    });

    let mut order: Vec<usize> = Vec::with_capacity(4);
    for index in std::iter::once(with_mail_address).chain(structural_winners).flatten() {
        if !order.contains(&index) {
            order.push(index);
        }
    }
    let ranked: Vec<&ServerSettings> = order.into_iter().map(|i| candidates[i]).collect();

    let mut result = ServerSettings {
        source_name: join_source_names(&ranked),
        mail_address: with_mail_address.and_then(|i| candidates[i].mail_address.clone()),
        ..ServerSettings::default()
    };

    for protocol in Protocol::ALL {
        let slots = ranked.iter().map(|s| s.protocol(protocol));

        let Some(best) = first_min_by_key(slots.clone(), |slot| score::protocol(slot)) else {
            continue;
        };
        let credentials = first_min_by_key(slots, |slot| score::user_name(&slot.credentials))
            .map(|slot| slot.credentials.clone())
            .unwrap_or_default();

        let merged = result.protocol_mut(protocol);
        *merged = best.clone();
        merged.credentials = credentials;
    }

    debug!(candidates = candidates.len(), "merged settings: {}", result);

    result
}

fn join_source_names(candidates: &[&ServerSettings]) -> Option<String> {
    let mut names: Vec<&str> = Vec::new();
    for name in candidates.iter().filter_map(|s| s.source_name.as_deref()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

/// `select_best` as a method on collections of settings.
pub trait SelectBest {
    fn select_best(&self) -> ServerSettings;
}

impl SelectBest for [ServerSettings] {
    fn select_best(&self) -> ServerSettings {
        select_best(self.iter().map(Some))
    }
}

impl SelectBest for [Option<ServerSettings>] {
    fn select_best(&self) -> ServerSettings {
        select_best(self.iter().map(Option::as_ref))
    }
}
