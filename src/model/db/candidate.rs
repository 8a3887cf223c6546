use std::ops::Deref;

use mongodb::{
    bson::doc,
    options::{FindOptions, UpdateOptions},
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        common::{Position, Positions},
        mongodb::{Coll, Id},
    },
};

/// Name of the sentinel candidate for re-opening nominations.
pub const REOPEN_NOMINATIONS: &str = "Reopen Nominations";
/// Name of the sentinel candidate for a formal abstention.
pub const ABSTAIN: &str = "Abstain";

const SENTINELS: [(&str, &str); 2] = [
    (
        REOPEN_NOMINATIONS,
        "Vote to reopen nominations for this position.",
    ),
    (ABSTAIN, "Formally abstain from voting for this position."),
];

/// Core candidate data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub name: String,
    /// Contact address; absent for the sentinel candidates.
    pub email: Option<String>,
    /// Names of the positions this candidate is standing for.
    pub positions: Vec<String>,
    pub manifesto: String,
    /// Set only on the per-position sentinel options.
    #[serde(default)]
    pub sentinel: bool,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Candidate {
    /// All candidates standing for the given position: real candidates by
    /// name, then the sentinels.
    pub async fn for_position(candidates: &Coll<Candidate>, position: &Position) -> Result<Vec<Self>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let mut standing: Vec<Self> = candidates
            .find(doc! { "positions": &**position }, options)
            .await?
            .try_collect()
            .await?;
        // Stable, so names stay sorted within each group.
        standing.sort_by_key(|candidate| candidate.sentinel);
        Ok(standing)
    }

    /// Find a candidate by ID, but only if they are standing for `position`.
    pub async fn find_eligible(
        candidates: &Coll<Candidate>,
        id: Id,
        position: &Position,
    ) -> Result<Option<Self>> {
        let filter = doc! {
            "_id": id,
            "positions": &**position,
        };
        Ok(candidates.find_one(filter, None).await?)
    }
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

/// Ensure the sentinel candidates exist and stand for every position.
///
/// This operation is idempotent: sentinels are only created if absent, and
/// positions are added as a set. Sentinels are matched on name and the
/// `sentinel` flag, so a real candidate may share a sentinel's name.
pub async fn ensure_sentinels_exist(candidates: &Coll<Candidate>, positions: &Positions) -> Result<()> {
    let all_positions = positions.iter().collect::<Vec<_>>();
    let upsert = UpdateOptions::builder().upsert(true).build();
    for (name, manifesto) in SENTINELS {
        let update = doc! {
            "$setOnInsert": {
                "email": null,
                "manifesto": manifesto,
            },
            "$addToSet": {
                "positions": { "$each": all_positions.clone() },
            },
        };
        candidates
            .update_one(doc! { "name": name, "sentinel": true }, update, upsert.clone())
            .await?;
    }
    Ok(())
}
