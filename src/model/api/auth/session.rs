use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite},
    time::Duration,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::Error,
    model::{db::Voter, mongodb::Id},
};

pub const SESSION_COOKIE: &str = "session";

/// A voter's browser session.
///
/// Only the voter ID is carried: status and token are always re-read from
/// the database, so a session can never outlive a status change.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "vid")]
    pub voter_id: Id,
}

impl Session {
    pub fn new(voter: &Voter) -> Self {
        Self { voter_id: voter.id }
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this session into a signed cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            session: self,
            expire_at: Utc::now() + config.session_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .max_age(Duration::seconds(config.session_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize a session from a cookie, checking signature and expiry.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let session = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.session)?;
        Ok(session)
    }
}

/// Cookie claims: the session plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    session: Session,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::common::VoterStatus;

    #[test]
    fn cookie_round_trip() {
        let config = Config::example();
        let voter = Voter::example(VoterStatus::Confirmed);
        let cookie = Session::new(&voter).into_cookie(&config);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));

        let session = Session::from_cookie(&cookie, &config).unwrap();
        assert_eq!(session.voter_id, voter.id);
    }

    #[test]
    fn rejects_tampered_and_expired_cookies() {
        let config = Config::example();
        let voter = Voter::example(VoterStatus::Confirmed);

        let forged = Cookie::new(SESSION_COOKIE, "not.a.jwt");
        assert!(Session::from_cookie(&forged, &config).is_err());

        let claims = Claims {
            session: Session::new(&voter),
            expire_at: Utc::now() - chrono::Duration::hours(1),
        };
        let expired = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();
        let expired = Cookie::new(SESSION_COOKIE, expired);
        assert!(Session::from_cookie(&expired, &config).is_err());

        let other_key = jsonwebtoken::encode(
            &Header::default(),
            &Claims {
                session: Session::new(&voter),
                expire_at: Utc::now() + chrono::Duration::hours(1),
            },
            &EncodingKey::from_secret(b"some other secret"),
        )
        .unwrap();
        let other_key = Cookie::new(SESSION_COOKIE, other_key);
        assert!(Session::from_cookie(&other_key, &config).is_err());
    }
}
