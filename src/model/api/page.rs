use std::collections::HashSet;

use rocket::{response::Redirect, serde::json::Json, Responder};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{CorrelationToken, Positions},
    db::{Candidate, Voter},
};

/// Everything a template layer needs to render one page.
///
/// Serialised with a `page` tag naming the template, e.g.
/// `{"page": "already_voted"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum Page {
    /// The registration form, optionally with an inline message.
    Register {
        error: Option<String>,
        /// Set when the message offers to resend the confirmation email.
        resend_email: Option<String>,
    },
    /// Acknowledgement that a confirmation email is on its way.
    CheckEmail { email: String },
    AlreadyVoted,
    EmailNotConfirmed,
    /// The voting entry point: every position, and which are done.
    Positions {
        token: CorrelationToken,
        positions: Vec<PositionProgress>,
        /// Positions still without a vote, in election order.
        missing: Vec<String>,
        error: Option<String>,
    },
    /// The candidates for one position. May be empty.
    Candidates {
        token: CorrelationToken,
        position: String,
        candidates: Vec<CandidateSummary>,
        /// The candidate currently chosen for this position, if any.
        selected: Option<String>,
    },
    /// Confirmation of a cast (or changed) vote.
    Voted {
        token: CorrelationToken,
        position: String,
        candidate: CandidateSummary,
    },
    SubmitSuccessful,
    Error {
        status: u16,
        message: String,
        /// Only present outside production.
        detail: Option<String>,
    },
}

impl Page {
    pub fn register() -> Self {
        Self::Register {
            error: None,
            resend_email: None,
        }
    }

    pub fn register_error(error: impl Into<String>) -> Self {
        Self::Register {
            error: Some(error.into()),
            resend_email: None,
        }
    }

    pub fn positions(voter: &Voter, registry: &Positions, voted: &HashSet<String>, error: Option<String>) -> Self {
        let positions = registry
            .iter()
            .map(|name| PositionProgress {
                name: name.to_string(),
                voted: voted.contains(name),
            })
            .collect();
        let missing = registry.missing(voted).into_iter().map(String::from).collect();
        Self::Positions {
            token: voter.token,
            positions,
            missing,
            error,
        }
    }

    /// The positions on a `positions` page that still need a vote.
    pub fn missing_positions(&self) -> Vec<&str> {
        match self {
            Self::Positions { missing, .. } => missing.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionProgress {
    pub name: String,
    pub voted: bool,
}

/// The public face of a candidate. The contact email is not shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    /// Hex candidate ID, as used in the cast-vote URL.
    pub id: String,
    pub name: String,
    pub manifesto: String,
}

impl From<Candidate> for CandidateSummary {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.to_string(),
            name: candidate.candidate.name,
            manifesto: candidate.candidate.manifesto,
        }
    }
}

/// A route's response: either a page to render or a redirect.
#[derive(Responder)]
pub enum View {
    Page(Json<Page>),
    Redirect(Redirect),
}

impl View {
    /// Redirect to the voting entry point for `token`.
    pub fn voting_entry(token: CorrelationToken) -> Self {
        Self::Redirect(Redirect::to(format!("/vote/{token}")))
    }

    /// Redirect to the registration form.
    pub fn register() -> Self {
        Self::Redirect(Redirect::to("/register"))
    }
}

impl From<Page> for View {
    fn from(page: Page) -> Self {
        Self::Page(Json(page))
    }
}
