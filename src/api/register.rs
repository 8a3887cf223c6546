use log::{debug, error};
use rocket::{form::Form, http::CookieJar, Route, State};

use super::common::forward_authenticated;
use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{auth::Session, auth::SessionVoter, Email, EmailPolicy, Page, View},
        common::{CorrelationToken, VoterStatus},
        db::{NewVoter, Voter},
        mongodb::{is_duplicate_key_error, Coll},
    },
    notification::{ConfirmationEmail, NotificationQueue},
};

const ALREADY_CONFIRMED: &str =
    "You have already registered to vote and confirmed your email, click on the link in your inbox";
const ALREADY_REGISTERED: &str = "You have already registered to vote";
const UNKNOWN_TOKEN: &str = "No voter with that token, enter email to register or resend confirmation";

pub fn routes() -> Vec<Route> {
    routes![index, register_form, register, resend_email, confirm_email]
}

#[derive(FromForm)]
pub struct EmailForm {
    email: Option<String>,
}

impl EmailForm {
    fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }
}

#[get("/")]
pub fn index(session: Option<SessionVoter>) -> View {
    forward_authenticated(session).unwrap_or_else(View::register)
}

#[get("/register")]
pub fn register_form(session: Option<SessionVoter>) -> View {
    forward_authenticated(session).unwrap_or_else(|| Page::register().into())
}

#[allow(clippy::too_many_arguments)]
#[post("/register", data = "<form>")]
pub async fn register(
    form: Form<EmailForm>,
    session: Option<SessionVoter>,
    policy: &State<EmailPolicy>,
    config: &State<Config>,
    voters: Coll<Voter>,
    new_voters: Coll<NewVoter>,
    queue: &State<NotificationQueue>,
) -> Result<View> {
    if let Some(view) = forward_authenticated(session) {
        return Ok(view);
    }
    let email = match policy.parse(form.email()) {
        Ok(email) => email,
        Err(e) => return Ok(Page::register_error(e.to_string()).into()),
    };

    let hash = email.hash(config);
    if let Some(voter) = Voter::find_by_email_hash(&voters, &hash).await? {
        return Ok(registered_page(&voter, &email).into());
    }

    match NewVoter::new(hash.clone()).insert(&new_voters).await {
        Ok(voter) => {
            send_confirmation(queue, &email, voter.token, config);
            Ok(Page::CheckEmail {
                email: email.to_string(),
            }
            .into())
        }
        Err(Error::Db(e)) if is_duplicate_key_error(&e) => {
            // Lost a race with another registration for the same address.
            debug!("Concurrent registration detected, answering as existing voter");
            let voter = Voter::find_by_email_hash(&voters, &hash)
                .await?
                .ok_or_else(|| Error::internal("Voter missing after duplicate registration"))?;
            Ok(registered_page(&voter, &email).into())
        }
        Err(e) => Err(e),
    }
}

#[post("/resendEmail", data = "<form>")]
pub async fn resend_email(
    form: Form<EmailForm>,
    session: Option<SessionVoter>,
    policy: &State<EmailPolicy>,
    config: &State<Config>,
    voters: Coll<Voter>,
    queue: &State<NotificationQueue>,
) -> Result<View> {
    if let Some(view) = forward_authenticated(session) {
        return Ok(view);
    }
    let Ok(email) = policy.parse(form.email()) else {
        return Ok(View::register());
    };
    let Some(voter) = Voter::find_by_email_hash(&voters, &email.hash(config)).await? else {
        return Ok(View::register());
    };
    if voter.status != VoterStatus::Unconfirmed {
        return Ok(registered_page(&voter, &email).into());
    }

    match voter.reissue_token(&voters).await? {
        Some(voter) => {
            send_confirmation(queue, &email, voter.token, config);
            Ok(Page::CheckEmail {
                email: email.to_string(),
            }
            .into())
        }
        None => {
            // Confirmed (or locked) since we looked.
            let voter = Voter::find_by_id(&voters, voter.id)
                .await?
                .ok_or_else(|| Error::not_found(format!("Voter {}", voter.id)))?;
            Ok(registered_page(&voter, &email).into())
        }
    }
}

#[get("/confirmEmail/<token>")]
pub async fn confirm_email(
    token: &str,
    session: Option<SessionVoter>,
    voters: Coll<Voter>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<View> {
    if let Some(view) = forward_authenticated(session) {
        return Ok(view);
    }
    let voter = match token.parse::<CorrelationToken>() {
        Ok(token) => Voter::find_by_token(&voters, token).await?,
        Err(_) => None,
    };
    let Some(mut voter) = voter else {
        return Ok(Page::register_error(UNKNOWN_TOKEN).into());
    };

    voter.confirm_email(&voters).await?;
    if voter.status.votes_locked() {
        return Ok(Page::AlreadyVoted.into());
    }
    cookies.add(Session::new(&voter).into_cookie(config));
    Ok(View::voting_entry(voter.token))
}

/// What to tell someone registering (or resending) as an existing voter.
fn registered_page(voter: &Voter, email: &Email) -> Page {
    match voter.status {
        VoterStatus::Locked => Page::AlreadyVoted,
        VoterStatus::Confirmed => Page::register_error(ALREADY_CONFIRMED),
        VoterStatus::Unconfirmed => Page::Register {
            error: Some(ALREADY_REGISTERED.to_string()),
            resend_email: Some(email.to_string()),
        },
    }
}

/// Queue the confirmation email. Failure is logged; the registration stands.
fn send_confirmation(queue: &NotificationQueue, email: &Email, token: CorrelationToken, config: &Config) {
    if let Err(e) = queue.enqueue(ConfirmationEmail::new(email.clone(), token, config)) {
        error!("Failed to queue confirmation email: {e}");
    }
}
