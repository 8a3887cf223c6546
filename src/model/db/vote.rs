use std::collections::HashSet;

use log::debug;
use mongodb::{bson::doc, options::UpdateOptions};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        common::Position,
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

/// A single voter's choice for a single position.
///
/// Unique per `(voter_id, position)`; recasting replaces `candidate_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: Id,
    pub position: String,
    pub candidate_id: Id,
}

impl Vote {
    /// Record `candidate_id` as the voter's choice for `position`,
    /// replacing any earlier choice.
    ///
    /// This is a single upsert keyed on the unique `(voter_id, position)`
    /// index. If two upserts race to insert, the loser sees a duplicate key
    /// error; the document then exists, so a plain update completes the write.
    pub async fn upsert(votes: &Coll<Vote>, voter_id: Id, position: &Position, candidate_id: Id) -> Result<()> {
        let filter = doc! {
            "voter_id": voter_id,
            "position": &**position,
        };
        let update = doc! {
            "$set": { "candidate_id": candidate_id },
        };
        let upsert = UpdateOptions::builder().upsert(true).build();
        match votes.update_one(filter.clone(), update.clone(), upsert).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => {
                debug!("Concurrent vote insert for voter {voter_id}, position {position}; updating instead");
                votes.update_one(filter, update, None).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All of a voter's votes.
    pub async fn for_voter(votes: &Coll<Vote>, voter_id: Id) -> Result<Vec<Self>> {
        Ok(votes
            .find(doc! { "voter_id": voter_id }, None)
            .await?
            .try_collect()
            .await?)
    }

    /// The voter's vote for one position, if cast.
    pub async fn for_position(votes: &Coll<Vote>, voter_id: Id, position: &Position) -> Result<Option<Self>> {
        let filter = doc! {
            "voter_id": voter_id,
            "position": &**position,
        };
        Ok(votes.find_one(filter, None).await?)
    }

    /// The names of the positions the voter has voted for.
    pub async fn positions_voted(votes: &Coll<Vote>, voter_id: Id) -> Result<HashSet<String>> {
        Ok(Self::for_voter(votes, voter_id)
            .await?
            .into_iter()
            .map(|vote| vote.position)
            .collect())
    }
}
