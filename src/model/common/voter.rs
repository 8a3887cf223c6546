use std::fmt::Display;
use std::str::FromStr;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// States in the voter lifecycle.
///
/// Transitions only ever move forwards: `Unconfirmed -> Confirmed -> Locked`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoterStatus {
    /// Registered, but the confirmation link has not been visited.
    Unconfirmed,
    /// Email confirmed, free to vote.
    Confirmed,
    /// A complete ballot has been submitted; no further voting.
    Locked,
}

impl VoterStatus {
    pub fn votes_locked(self) -> bool {
        self == Self::Locked
    }
}

impl From<VoterStatus> for Bson {
    fn from(status: VoterStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// The opaque value standing in for a voter in URLs and confirmation links.
///
/// This is not a credential in its own right: it only grants a session while
/// the voter it names is confirmed and has not yet submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CorrelationToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl TryFrom<String> for CorrelationToken {
    type Error = uuid::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CorrelationToken> for String {
    fn from(token: CorrelationToken) -> Self {
        token.to_string()
    }
}

impl From<CorrelationToken> for Bson {
    fn from(token: CorrelationToken) -> Self {
        Bson::String(token.to_string())
    }
}
