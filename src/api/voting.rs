use log::{debug, info};
use mongodb::bson::oid;
use rocket::{http::CookieJar, Route, State};

use super::common::{resolve_voter, Access};
use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{auth::SessionVoter, CandidateSummary, Page, View},
        common::Positions,
        db::{Candidate, Vote, Voter},
        mongodb::{Coll, Id},
    },
};

const INCOMPLETE_BALLOT: &str = "Please submit a vote for every position.";

pub fn routes() -> Vec<Route> {
    routes![list_positions, list_candidates, cast_vote, submit]
}

/// Unwrap a granted voter, or return the denial from the route.
macro_rules! granted {
    ($access:expr) => {
        match $access {
            Access::Granted(voter) => voter,
            Access::Denied(view) => return Ok(view),
        }
    };
}

#[allow(clippy::too_many_arguments)]
#[get("/vote/<token>")]
pub async fn list_positions(
    token: &str,
    session: Option<SessionVoter>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
    positions: &State<Positions>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<View> {
    let voter = granted!(resolve_voter(session, token, &voters, cookies, config).await?);
    let voted = Vote::positions_voted(&votes, voter.id).await?;
    Ok(Page::positions(&voter, positions, &voted, None).into())
}

#[allow(clippy::too_many_arguments)]
#[get("/vote/<token>/<position>")]
pub async fn list_candidates(
    token: &str,
    position: &str,
    session: Option<SessionVoter>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
    candidates: Coll<Candidate>,
    positions: &State<Positions>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<View> {
    let voter = granted!(resolve_voter(session, token, &voters, cookies, config).await?);
    let position = positions
        .get(position)
        .ok_or_else(|| Error::not_found(format!("Position {position}")))?;

    let selected = Vote::for_position(&votes, voter.id, &position)
        .await?
        .map(|vote| vote.candidate_id.to_string());
    let standing = Candidate::for_position(&candidates, &position)
        .await?
        .into_iter()
        .map(CandidateSummary::from)
        .collect();

    Ok(Page::Candidates {
        token: voter.token,
        position: position.to_string(),
        candidates: standing,
        selected,
    }
    .into())
}

#[allow(clippy::too_many_arguments)]
#[get("/vote/<token>/<position>/<candidate_id>")]
pub async fn cast_vote(
    token: &str,
    position: &str,
    candidate_id: std::result::Result<Id, oid::Error>,
    session: Option<SessionVoter>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
    candidates: Coll<Candidate>,
    positions: &State<Positions>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<View> {
    let voter = granted!(resolve_voter(session, token, &voters, cookies, config).await?);
    let position = positions
        .get(position)
        .ok_or_else(|| Error::not_found(format!("Position {position}")))?;

    let id = candidate_id.map_err(|e| Error::not_found(format!("Candidate for {position} ({e})")))?;
    let candidate = Candidate::find_eligible(&candidates, id, &position)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {id} for {position}")))?;

    Vote::upsert(&votes, voter.id, &position, candidate.id).await?;
    debug!("Voter {} voted in {position}", voter.id);

    Ok(Page::Voted {
        token: voter.token,
        position: position.to_string(),
        candidate: candidate.into(),
    }
    .into())
}

#[allow(clippy::too_many_arguments)]
#[get("/submit/<token>")]
pub async fn submit(
    token: &str,
    session: Option<SessionVoter>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
    positions: &State<Positions>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<View> {
    let mut voter = granted!(resolve_voter(session, token, &voters, cookies, config).await?);
    let voted = Vote::positions_voted(&votes, voter.id).await?;

    if !positions.missing(&voted).is_empty() {
        return Ok(Page::positions(&voter, positions, &voted, Some(INCOMPLETE_BALLOT.to_string())).into());
    }

    voter.lock_votes(&voters).await?;
    info!("Voter {} submitted their ballot", voter.id);
    Ok(Page::SubmitSuccessful.into())
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{Header, Status},
        local::asynchronous::Client,
        serde::json::Value,
    };

    use super::*;
    use crate::{
        api::common::testing::example_voter,
        model::{
            api::auth::SESSION_COOKIE,
            common::{CorrelationToken, VoterStatus},
            db::candidate::{ABSTAIN, REOPEN_NOMINATIONS},
            db::{NewCandidate, NewVoter},
        },
    };

    /// Stand two candidates for Chair and one for Secretary.
    async fn stand_candidates(candidates: &Coll<NewCandidate>) {
        candidates
            .insert_many(
                [
                    NewCandidate::example("Bob", &["Chair"]),
                    NewCandidate::example("Alice", &["Chair", "Secretary"]),
                ],
                None,
            )
            .await
            .unwrap();
    }

    async fn candidate_id(candidates: &Coll<Candidate>, name: &str) -> Id {
        candidates
            .find_one(mongodb::bson::doc! { "name": name }, None)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn get_page(client: &Client, path: String) -> Page {
        let response = client.get(path).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test(voter)]
    async fn positions_show_progress(client: Client, voters: Coll<Voter>, candidates: Coll<Candidate>) {
        let voter = example_voter(&client, &voters).await;
        let page = get_page(&client, format!("/vote/{}", voter.token)).await;
        assert_eq!(page.missing_positions(), vec!["Chair", "Secretary", "Treasurer"]);

        let abstain = candidate_id(&candidates, ABSTAIN).await;
        get_page(&client, format!("/vote/{}/Secretary/{abstain}", voter.token)).await;

        let page = get_page(&client, format!("/vote/{}", voter.token)).await;
        assert_eq!(page.missing_positions(), vec!["Chair", "Treasurer"]);
    }

    #[backend_test(voter)]
    async fn candidates_for_position(
        client: Client,
        voters: Coll<Voter>,
        candidates: Coll<Candidate>,
        new_candidates: Coll<NewCandidate>,
    ) {
        stand_candidates(&new_candidates).await;
        let voter = example_voter(&client, &voters).await;

        let page = get_page(&client, format!("/vote/{}/Chair", voter.token)).await;
        let Page::Candidates { position, candidates: standing, selected, .. } = page else {
            panic!("Expected candidates page");
        };
        assert_eq!(position, "Chair");
        let names = standing.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Alice", "Bob", ABSTAIN, REOPEN_NOMINATIONS]);
        assert_eq!(selected, None);

        // Select Bob; the page now shows him as chosen.
        let bob = candidate_id(&candidates, "Bob").await;
        get_page(&client, format!("/vote/{}/Chair/{bob}", voter.token)).await;
        let page = get_page(&client, format!("/vote/{}/Chair", voter.token)).await;
        let Page::Candidates { selected, .. } = page else {
            panic!("Expected candidates page");
        };
        assert_eq!(selected, Some(bob.to_string()));
    }

    #[backend_test(voter)]
    async fn unknown_position_is_not_found(client: Client, voters: Coll<Voter>) {
        let voter = example_voter(&client, &voters).await;
        let response = client
            .get(format!("/vote/{}/President", voter.token))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        let page = response.into_json::<Page>().await.unwrap();
        assert!(matches!(page, Page::Error { status: 404, .. }));
    }

    #[backend_test(voter)]
    async fn last_vote_wins(
        client: Client,
        voters: Coll<Voter>,
        votes: Coll<Vote>,
        candidates: Coll<Candidate>,
        new_candidates: Coll<NewCandidate>,
    ) {
        stand_candidates(&new_candidates).await;
        let voter = example_voter(&client, &voters).await;
        let (alice, bob) = (
            candidate_id(&candidates, "Alice").await,
            candidate_id(&candidates, "Bob").await,
        );

        let page = get_page(&client, format!("/vote/{}/Chair/{alice}", voter.token)).await;
        let Page::Voted { position, candidate, .. } = page else {
            panic!("Expected voted page");
        };
        assert_eq!(position, "Chair");
        assert_eq!(candidate.name, "Alice");

        get_page(&client, format!("/vote/{}/Chair/{bob}", voter.token)).await;
        let cast = Vote::for_voter(&votes, voter.id).await.unwrap();
        assert_eq!(cast.len(), 1);
        assert_eq!(cast[0].candidate_id, bob);
    }

    #[backend_test(voter)]
    async fn ineligible_vote_is_rejected(
        client: Client,
        voters: Coll<Voter>,
        votes: Coll<Vote>,
        candidates: Coll<Candidate>,
        new_candidates: Coll<NewCandidate>,
    ) {
        stand_candidates(&new_candidates).await;
        let voter = example_voter(&client, &voters).await;
        let bob = candidate_id(&candidates, "Bob").await;

        for path in [
            // Bob is not standing for Secretary.
            format!("/vote/{}/Secretary/{bob}", voter.token),
            format!("/vote/{}/Chair/{}", voter.token, Id::new()),
            format!("/vote/{}/Chair/not-an-id", voter.token),
        ] {
            let response = client.get(path).dispatch().await;
            assert_eq!(Status::NotFound, response.status());
        }
        assert!(Vote::for_voter(&votes, voter.id).await.unwrap().is_empty());
    }

    #[backend_test(voter)]
    async fn full_ballot_then_locked(
        client: Client,
        voters: Coll<Voter>,
        candidates: Coll<Candidate>,
        new_candidates: Coll<NewCandidate>,
    ) {
        stand_candidates(&new_candidates).await;
        let voter = example_voter(&client, &voters).await;
        let token = voter.token;
        let alice = candidate_id(&candidates, "Alice").await;
        let abstain = candidate_id(&candidates, ABSTAIN).await;

        get_page(&client, format!("/vote/{token}/Chair/{alice}")).await;
        get_page(&client, format!("/vote/{token}/Secretary/{alice}")).await;

        // Two of three: rejected, listing the third.
        let page = get_page(&client, format!("/submit/{token}")).await;
        assert_eq!(page.missing_positions(), vec!["Treasurer"]);
        let Page::Positions { error, .. } = &page else {
            panic!("Expected positions page");
        };
        assert_eq!(error.as_deref(), Some(INCOMPLETE_BALLOT));
        assert_eq!(
            example_voter(&client, &voters).await.status,
            VoterStatus::Confirmed
        );

        get_page(&client, format!("/vote/{token}/Treasurer/{abstain}")).await;
        let page = get_page(&client, format!("/submit/{token}")).await;
        assert_eq!(page, Page::SubmitSuccessful);
        assert_eq!(example_voter(&client, &voters).await.status, VoterStatus::Locked);

        // Every voting route now answers "already voted", through the stale session.
        assert!(client.cookies().get(SESSION_COOKIE).is_some());
        for path in [
            format!("/vote/{token}"),
            format!("/vote/{token}/Chair"),
            format!("/vote/{token}/Chair/{alice}"),
            format!("/submit/{token}"),
        ] {
            assert_eq!(get_page(&client, path).await, Page::AlreadyVoted);
        }
    }

    #[backend_test]
    async fn token_without_session(client: Client, voters: Coll<Voter>, new_voters: Coll<NewVoter>) {
        let voter = NewVoter::example().insert(&new_voters).await.unwrap();

        // Unknown or malformed token: back to registration.
        for token in [CorrelationToken::generate().to_string(), "garbage".to_string()] {
            let response = client.get(format!("/vote/{token}")).dispatch().await;
            assert_eq!(Status::SeeOther, response.status());
            assert_eq!(response.headers().get_one("Location"), Some("/register"));
        }

        // Unconfirmed: no session.
        let page = get_page(&client, format!("/vote/{}", voter.token)).await;
        assert_eq!(page, Page::EmailNotConfirmed);
        assert!(client.cookies().get(SESSION_COOKIE).is_none());

        // Confirmed: the token establishes a session.
        let mut voter = Voter::find_by_id(&voters, voter.id).await.unwrap().unwrap();
        voter.confirm_email(&voters).await.unwrap();
        let page = get_page(&client, format!("/vote/{}", voter.token)).await;
        assert!(matches!(page, Page::Positions { token, .. } if token == voter.token));
        assert!(client.cookies().get(SESSION_COOKIE).is_some());
    }

    #[backend_test(voter)]
    async fn session_overrides_path_token(client: Client, voters: Coll<Voter>, new_voters: Coll<NewVoter>) {
        let voter = example_voter(&client, &voters).await;
        let mut other = NewVoter::example().insert(&new_voters).await.unwrap();
        other.confirm_email(&voters).await.unwrap();

        let page = get_page(&client, format!("/vote/{}", other.token)).await;
        assert!(matches!(page, Page::Positions { token, .. } if token == voter.token));
    }

    #[backend_test]
    async fn locked_token_without_session(
        client: Client,
        voters: Coll<Voter>,
        new_voters: Coll<NewVoter>,
        candidates: Coll<Candidate>,
    ) {
        let mut voter = NewVoter::example().insert(&new_voters).await.unwrap();
        voter.confirm_email(&voters).await.unwrap();
        voter.lock_votes(&voters).await.unwrap();
        let token = voter.token;
        let abstain = candidate_id(&candidates, ABSTAIN).await;

        for path in [
            format!("/vote/{token}"),
            format!("/vote/{token}/Chair"),
            format!("/vote/{token}/Chair/{abstain}"),
            format!("/submit/{token}"),
        ] {
            assert_eq!(get_page(&client, path).await, Page::AlreadyVoted);
            assert!(client.cookies().get(SESSION_COOKIE).is_none());
        }
    }

    #[backend_test(voter)]
    async fn session_overrides_path_token_when_voting(
        client: Client,
        voters: Coll<Voter>,
        new_voters: Coll<NewVoter>,
        votes: Coll<Vote>,
        candidates: Coll<Candidate>,
    ) {
        let voter = example_voter(&client, &voters).await;
        let mut other = NewVoter::example().insert(&new_voters).await.unwrap();
        other.confirm_email(&voters).await.unwrap();
        let abstain = candidate_id(&candidates, ABSTAIN).await;

        for position in ["Chair", "Secretary", "Treasurer"] {
            let page = get_page(&client, format!("/vote/{}/{position}/{abstain}", other.token)).await;
            assert!(matches!(page, Page::Voted { token, .. } if token == voter.token));
        }
        let page = get_page(&client, format!("/submit/{}", other.token)).await;
        assert_eq!(page, Page::SubmitSuccessful);

        // Everything landed on the session voter.
        assert_eq!(Vote::for_voter(&votes, voter.id).await.unwrap().len(), 3);
        assert_eq!(example_voter(&client, &voters).await.status, VoterStatus::Locked);
        assert!(Vote::for_voter(&votes, other.id).await.unwrap().is_empty());
        let other = Voter::find_by_id(&voters, other.id).await.unwrap().unwrap();
        assert_eq!(other.status, VoterStatus::Confirmed);
    }

    #[backend_test]
    async fn unknown_route_renders_error_page(client: Client) {
        let response = client
            .get("/nowhere/at/all/really")
            .header(Header::new("Accept", "application/json"))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        let page = response.into_json::<Value>().await.unwrap();
        assert_eq!(page["page"], "error");
        assert_eq!(page["status"], 404);
        assert_eq!(page["message"], "Could not find the resource you were looking for");
    }
}
