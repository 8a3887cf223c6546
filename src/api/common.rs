use log::debug;
use rocket::http::CookieJar;

use crate::{
    config::Config,
    error::Result,
    model::{
        api::{auth::Session, auth::SessionVoter, Page, View},
        common::{CorrelationToken, VoterStatus},
        db::Voter,
        mongodb::Coll,
    },
};

/// Whether a request may enter the voting flow.
pub enum Access {
    /// Proceed as this voter.
    Granted(Voter),
    /// Answer with this instead.
    Denied(View),
}

/// The page that stops a voter in `status` from voting, if any.
pub fn gate(status: VoterStatus) -> Option<Page> {
    match status {
        VoterStatus::Unconfirmed => Some(Page::EmailNotConfirmed),
        VoterStatus::Confirmed => None,
        VoterStatus::Locked => Some(Page::AlreadyVoted),
    }
}

/// Decide who a voting-flow request acts for.
///
/// An existing session wins over the path token: a mismatched token is
/// ignored and the session voter's own token is used from then on. Without a
/// session, the path token is looked up and, if it names a confirmed voter
/// who has not yet submitted, a session is established for them.
pub async fn resolve_voter(
    session: Option<SessionVoter>,
    token: &str,
    voters: &Coll<Voter>,
    cookies: &CookieJar<'_>,
    config: &Config,
) -> Result<Access> {
    if let Some(SessionVoter(voter)) = session {
        if let Some(page) = gate(voter.status) {
            return Ok(Access::Denied(page.into()));
        }
        if voter.token.to_string() != token {
            debug!("Path token does not match session, using voter {}", voter.id);
        }
        return Ok(Access::Granted(voter));
    }

    let voter = match token.parse::<CorrelationToken>() {
        Ok(token) => Voter::find_by_token(voters, token).await?,
        Err(_) => None,
    };
    let Some(voter) = voter else {
        return Ok(Access::Denied(View::register()));
    };
    if let Some(page) = gate(voter.status) {
        return Ok(Access::Denied(page.into()));
    }
    cookies.add(Session::new(&voter).into_cookie(config));
    Ok(Access::Granted(voter))
}

/// Registration-entry routes send anyone with a session straight to voting.
pub fn forward_authenticated(session: Option<SessionVoter>) -> Option<View> {
    session.map(|voter| View::voting_entry(voter.token))
}

/// Helpers for route tests.
#[cfg(test)]
pub mod testing {
    use std::time::Duration;

    use rocket::{local::asynchronous::Client, tokio::time::sleep};

    use crate::{
        model::{api::Email, db::Voter, mongodb::Coll},
        notification::{ConfirmationEmail, Mailbox},
        Config,
    };

    /// The voter registered with [`Email::example`].
    pub async fn example_voter(client: &Client, voters: &Coll<Voter>) -> Voter {
        let config = client.rocket().state::<Config>().unwrap();
        Voter::find_by_email_hash(voters, &Email::example().hash(config))
            .await
            .unwrap()
            .unwrap()
    }

    /// Wait for at least `count` emails to have been delivered, and return them all.
    pub async fn await_emails(client: &Client, count: usize) -> Vec<ConfirmationEmail> {
        let mailbox = client.rocket().state::<Mailbox>().unwrap();
        for _ in 0..100 {
            let sent = mailbox.sent();
            if sent.len() >= count {
                return sent;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("Expected {count} emails, got {}", mailbox.sent().len());
    }
}
