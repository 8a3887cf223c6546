use std::ops::Deref;

use mongodb::Database;
use rocket::{
    http::{Cookie, Status},
    request::{FromRequest, Outcome},
    Request,
};

use super::session::{Session, SESSION_COOKIE};
use crate::{
    config::Config,
    error::Error,
    model::{db::Voter, mongodb::Coll},
};

/// The voter behind a valid session cookie, freshly read from the database.
///
/// Forwards if there is no cookie, the cookie is invalid or expired, or the
/// voter no longer exists.
#[derive(Debug)]
pub struct SessionVoter(pub Voter);

impl Deref for SessionVoter {
    type Target = Voter;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionVoter {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            return Outcome::Failure((
                Status::InternalServerError,
                Error::internal("Config is not managed"),
            ));
        };

        // Forward to any routes that do not require a session.
        let Some(cookie) = req.cookies().get(SESSION_COOKIE) else {
            return Outcome::Forward(());
        };
        let Ok(session) = Session::from_cookie(cookie, config) else {
            return Outcome::Forward(());
        };

        let Some(db) = req.rocket().state::<Database>() else {
            return Outcome::Failure((
                Status::InternalServerError,
                Error::internal("Database is not managed"),
            ));
        };
        match Voter::find_by_id(&Coll::from_db(db), session.voter_id).await {
            Ok(Some(voter)) => Outcome::Success(Self(voter)),
            Ok(None) => {
                req.cookies().remove(Cookie::named(SESSION_COOKIE));
                Outcome::Forward(())
            }
            Err(e) => Outcome::Failure((e.http_status(), e)),
        }
    }
}
