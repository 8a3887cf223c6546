use std::fmt::Display;

use hmac::Mac;
use regex::Regex;
use thiserror::Error;

use crate::{
    model::db::voter::{EmailHash, HmacSha256},
    Config,
};

/// A voter's email address, normalised and known to match the [`EmailPolicy`].
///
/// This only ever lives in memory: it is hashed for lookup and handed to the
/// notification queue, but never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    /// Digest this address for storage and lookup.
    ///
    /// The digest is keyed with the server's HMAC secret, so the address
    /// cannot be recovered by hashing candidate emails without that secret.
    pub fn hash(&self, config: &Config) -> EmailHash {
        let mut hmac = HmacSha256::new_from_slice(config.hmac_secret())
            .expect("HMAC can take key of any size");
        hmac.update(self.0.as_bytes());
        EmailHash::from_digest(&hmac.finalize().into_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which addresses may register: `first.last@<domain>`, both name parts alphabetic.
#[derive(Debug, Clone)]
pub struct EmailPolicy {
    pattern: Regex,
}

impl EmailPolicy {
    pub fn for_domain(domain: &str) -> Result<Self, regex::Error> {
        let domain = regex::escape(&domain.trim().to_ascii_lowercase());
        let pattern = Regex::new(&format!(r"^[a-z]+\.[a-z]+@{domain}$"))?;
        Ok(Self { pattern })
    }

    /// Normalise (trim, lower-case) and validate a submitted address.
    pub fn parse(&self, raw: &str) -> Result<Email, EmailError> {
        let normalised = raw.trim().to_ascii_lowercase();
        if normalised.is_empty() {
            Err(EmailError::Missing)
        } else if self.pattern.is_match(&normalised) {
            Ok(Email(normalised))
        } else {
            Err(EmailError::Invalid)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Email is required")]
    Missing,
    #[error("Enter a valid student email address")]
    Invalid,
}
