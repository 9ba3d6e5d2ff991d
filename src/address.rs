use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A mail address split into local part and domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAddress {
    local_part: String,
    domain: String,
}

impl MailAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let mut parts = address.split('@');

        let (local_part, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local.trim(), domain.trim()),
            _ => return Err(Error::InvalidMailAddress(address.to_string())),
        };

        if local_part.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
            return Err(Error::InvalidMailAddress(address.to_string()));
        }

        Ok(Self {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl FromStr for MailAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}
