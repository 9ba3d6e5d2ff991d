use std::fmt;
use std::sync::Arc;

use crate::settings::{ProtocolAndSettings, ProtocolSettings, Verification};

type Condition = Arc<dyn Fn(&ProtocolSettings) -> bool + Send + Sync>;

/// Conjunction of conditions deciding which protocol slots get probed.
///
/// The empty filter accepts everything.
#[derive(Clone, Default)]
pub struct ProtocolSettingsFilter {
    conditions: Vec<Condition>,
}

impl ProtocolSettingsFilter {
    /// Accepts every slot.
    pub fn none() -> Self {
        Self::default()
    }

    /// Accepts slots carrying both a user name and a password.
    pub fn with_user_only() -> Self {
        Self::none().and(|settings| {
            !settings.credentials.user_name.name.is_empty() && settings.credentials.password.is_some()
        })
    }

    /// Accepts slots that have not been probed yet.
    pub fn unverified_only() -> Self {
        Self::none().and(|settings| settings.verification == Verification::Unverified)
    }

    pub fn and<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ProtocolSettings) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn and_filter(mut self, other: &ProtocolSettingsFilter) -> Self {
        self.conditions.extend(other.conditions.iter().cloned());
        self
    }

    pub fn accepts(&self, slot: &ProtocolAndSettings<'_>) -> bool {
        self.conditions.iter().all(|condition| condition(slot.settings))
    }
}

impl fmt::Debug for ProtocolSettingsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSettingsFilter")
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Credentials, Protocol, SocketType, UserName};

    fn slot(settings: &ProtocolSettings) -> ProtocolAndSettings<'_> {
        ProtocolAndSettings {
            protocol: Protocol::Imap,
            settings,
        }
    }

    #[test]
    fn test_none_accepts_everything() {
        let settings = ProtocolSettings::default();
        assert!(ProtocolSettingsFilter::none().accepts(&slot(&settings)));
    }

    #[test]
    fn test_with_user_only() {
        let filter = ProtocolSettingsFilter::with_user_only();

        let mut settings = ProtocolSettings::new("imap.company.com", 993, SocketType::SslTls);
        assert!(!filter.accepts(&slot(&settings)));

        settings.credentials.user_name = UserName::literal("john");
        assert!(!filter.accepts(&slot(&settings)));

        settings.credentials = Credentials::new(UserName::literal("john"), "secret");
        assert!(filter.accepts(&slot(&settings)));
    }

    #[test]
    fn test_unverified_only() {
        let filter = ProtocolSettingsFilter::unverified_only();
        let mut settings = ProtocolSettings::default();
        assert!(filter.accepts(&slot(&settings)));

        settings.verification = Verification::Passed;
        assert!(!filter.accepts(&slot(&settings)));

        settings.verification = Verification::Failed;
        assert!(!filter.accepts(&slot(&settings)));
    }

    #[test]
    fn test_and_filter_combines_conditions() {
        let filter = ProtocolSettingsFilter::unverified_only()
            .and_filter(&ProtocolSettingsFilter::with_user_only())
            .and(|settings| settings.port == Some(993));

        let mut settings = ProtocolSettings {
            credentials: Credentials::new(UserName::literal("john"), "secret"),
            ..ProtocolSettings::new("imap.company.com", 993, SocketType::SslTls)
        };
        assert!(filter.accepts(&slot(&settings)));

        settings.port = Some(143);
        assert!(!filter.accepts(&slot(&settings)));
    }
}
