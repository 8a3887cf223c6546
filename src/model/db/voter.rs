use std::ops::{Deref, DerefMut};

use data_encoding::HEXLOWER;
use hmac::Hmac;
use mongodb::{
    bson::{doc, Bson},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::{Error, Result},
    model::{
        common::{CorrelationToken, VoterStatus},
        mongodb::{Coll, Id},
    },
};

pub type HmacSha256 = Hmac<Sha256>;

/// Keyed one-way digest of a normalised email address, hex-encoded.
///
/// This lets a returning voter be found by email without the address ever
/// being stored. It is a lookup key, not proof of identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailHash(String);

impl EmailHash {
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(HEXLOWER.encode(digest))
    }
}

impl From<EmailHash> for Bson {
    fn from(hash: EmailHash) -> Self {
        Bson::String(hash.0)
    }
}

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// Current confirmation-link token; replaced on every resend.
    pub token: CorrelationToken,
    /// Voter unique key: the digest of their email address.
    pub email_hash: EmailHash,
    /// Where the voter is in the registration/voting lifecycle.
    pub status: VoterStatus,
}

impl VoterCore {
    /// Create a new, unconfirmed voter with a fresh token.
    pub fn new(email_hash: EmailHash) -> Self {
        Self {
            token: CorrelationToken::generate(),
            email_hash,
            status: VoterStatus::Unconfirmed,
        }
    }

    /// Insert this voter, returning it with its new ID.
    ///
    /// Fails with a duplicate key error if the email hash is already registered.
    pub async fn insert(self, new_voters: &Coll<NewVoter>) -> Result<Voter> {
        let id: Id = new_voters
            .insert_one(&self, None)
            .await?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::internal("Voter insert returned a non-ObjectId key"))?
            .into();
        Ok(Voter { id, voter: self })
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Voter {
    /// Find the voter currently holding the given token.
    pub async fn find_by_token(voters: &Coll<Voter>, token: CorrelationToken) -> Result<Option<Self>> {
        Ok(voters.find_one(doc! { "token": token }, None).await?)
    }

    /// Find the voter registered under the given email hash.
    pub async fn find_by_email_hash(voters: &Coll<Voter>, hash: &EmailHash) -> Result<Option<Self>> {
        Ok(voters
            .find_one(doc! { "email_hash": hash.clone() }, None)
            .await?)
    }

    /// Find the voter with the given ID.
    pub async fn find_by_id(voters: &Coll<Voter>, id: Id) -> Result<Option<Self>> {
        Ok(voters.find_one(id.as_doc(), None).await?)
    }

    /// Mark the email as confirmed. Only an unconfirmed voter is changed, so
    /// repeat visits to the confirmation link leave the record alone.
    pub async fn confirm_email(&mut self, voters: &Coll<Voter>) -> Result<()> {
        self.advance(voters, VoterStatus::Unconfirmed, VoterStatus::Confirmed)
            .await
    }

    /// Lock the voter's ballot. Locking an already-locked voter is a no-op.
    ///
    /// Callers must have checked that a vote exists for every position.
    pub async fn lock_votes(&mut self, voters: &Coll<Voter>) -> Result<()> {
        self.advance(voters, VoterStatus::Confirmed, VoterStatus::Locked)
            .await
    }

    /// Replace the token of an unconfirmed voter, invalidating the old link.
    ///
    /// Returns the refreshed voter, or `None` if they were confirmed (or
    /// locked) in the meantime and so keep their existing token.
    pub async fn reissue_token(&self, voters: &Coll<Voter>) -> Result<Option<Self>> {
        let filter = doc! {
            "_id": self.id,
            "status": VoterStatus::Unconfirmed,
        };
        let update = doc! {
            "$set": { "token": CorrelationToken::generate() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(voters.find_one_and_update(filter, update, options).await?)
    }

    /// Conditionally move from `from` to `to`, then re-read the stored status
    /// so that a concurrent transition is reflected in `self`.
    async fn advance(&mut self, voters: &Coll<Voter>, from: VoterStatus, to: VoterStatus) -> Result<()> {
        let filter = doc! {
            "_id": self.id,
            "status": from,
        };
        let update = doc! {
            "$set": { "status": to },
        };
        let result = voters.update_one(filter, update, None).await?;
        if result.modified_count == 1 {
            self.status = to;
        } else {
            let stored = Self::find_by_id(voters, self.id)
                .await?
                .ok_or_else(|| Error::not_found(format!("Voter {}", self.id)))?;
            self.voter = stored.voter;
        }
        Ok(())
    }
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl VoterCore {
        pub fn example() -> Self {
            Self::new(EmailHash::from_digest(b"example digest"))
        }
    }

    impl Voter {
        pub fn example(status: VoterStatus) -> Self {
            let mut voter = VoterCore::example();
            voter.status = status;
            Self {
                id: Id::new(),
                voter,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::Database;

    use super::*;

    #[backend_test]
    async fn status_transitions_are_one_way(db: Database) {
        let new_voters = Coll::<NewVoter>::from_db(&db);
        let voters = Coll::<Voter>::from_db(&db);
        let mut voter = NewVoter::example().insert(&new_voters).await.unwrap();
        assert_eq!(voter.status, VoterStatus::Unconfirmed);

        // Cannot lock before confirming.
        voter.lock_votes(&voters).await.unwrap();
        assert_eq!(voter.status, VoterStatus::Unconfirmed);

        voter.confirm_email(&voters).await.unwrap();
        assert_eq!(voter.status, VoterStatus::Confirmed);

        voter.lock_votes(&voters).await.unwrap();
        assert_eq!(voter.status, VoterStatus::Locked);

        // Repeating either transition changes nothing.
        voter.confirm_email(&voters).await.unwrap();
        voter.lock_votes(&voters).await.unwrap();
        let stored = Voter::find_by_id(&voters, voter.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VoterStatus::Locked);
        assert_eq!(stored, voter);
    }

    #[backend_test]
    async fn reissue_only_while_unconfirmed(db: Database) {
        let new_voters = Coll::<NewVoter>::from_db(&db);
        let voters = Coll::<Voter>::from_db(&db);
        let mut voter = NewVoter::example().insert(&new_voters).await.unwrap();
        let old_token = voter.token;

        let refreshed = voter.reissue_token(&voters).await.unwrap().unwrap();
        assert_ne!(refreshed.token, old_token);
        assert!(Voter::find_by_token(&voters, old_token).await.unwrap().is_none());
        assert_eq!(
            Voter::find_by_token(&voters, refreshed.token).await.unwrap(),
            Some(refreshed.clone())
        );

        voter = refreshed;
        voter.confirm_email(&voters).await.unwrap();
        assert!(voter.reissue_token(&voters).await.unwrap().is_none());
    }

    #[backend_test]
    async fn email_hash_is_unique(db: Database) {
        let new_voters = Coll::<NewVoter>::from_db(&db);
        NewVoter::example().insert(&new_voters).await.unwrap();
        let result = NewVoter::example().insert(&new_voters).await;
        assert!(matches!(result, Err(Error::Db(ref e)) if crate::model::mongodb::is_duplicate_key_error(e)));
    }
}
