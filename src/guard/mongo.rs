use mongodb::{
    bson::doc,
    options::{FindOptions, UpdateOptions},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    ballot::{Ballot, BallotCounts, BallotStatus},
    mongodb::{is_duplicate_key_error, Coll},
};

use super::VoteGuard;

/// A ballot guard backed by the `votes` collection, whose unique index on
/// `voterId` does the actual enforcement.
pub struct MongoGuard {
    ballots: Coll<Ballot>,
}

impl MongoGuard {
    pub fn new(db: &Database) -> Self {
        Self {
            ballots: Coll::from_db(db),
        }
    }

    async fn set_status(
        &self,
        voter_id: &str,
        status: BallotStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let update = match reason {
            Some(reason) => doc! { "$set": { "status": status, "orphanReason": reason } },
            None => doc! { "$set": { "status": status }, "$unset": { "orphanReason": "" } },
        };
        let result = self
            .ballots
            .update_one(doc! { "voterId": voter_id }, update, UpdateOptions::default())
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Ballot for voter {voter_id}")));
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl VoteGuard for MongoGuard {
    async fn has_voted(&self, voter_id: &str) -> Result<bool> {
        let count = self
            .ballots
            .count_documents(doc! { "voterId": voter_id }, None)
            .await?;
        Ok(count > 0)
    }

    async fn record_ballot(&self, ballot: Ballot) -> Result<Ballot> {
        let result = self.ballots.insert_one(&ballot, None).await;
        if is_duplicate_key_error(result.as_ref()) {
            return Err(Error::DuplicateVote(ballot.voter_id));
        }
        result?;
        Ok(ballot)
    }

    async fn mark_committed(&self, voter_id: &str) -> Result<()> {
        self.set_status(voter_id, BallotStatus::Committed, None).await
    }

    async fn mark_orphaned(&self, voter_id: &str, reason: &str) -> Result<()> {
        self.set_status(voter_id, BallotStatus::Orphaned, Some(reason))
            .await
    }

    async fn find(&self, voter_id: &str) -> Result<Option<Ballot>> {
        Ok(self
            .ballots
            .find_one(doc! { "voterId": voter_id }, None)
            .await?)
    }

    async fn count(&self) -> Result<BallotCounts> {
        let mut counts = BallotCounts::default();
        for status in [
            BallotStatus::Accepted,
            BallotStatus::Committed,
            BallotStatus::Orphaned,
        ] {
            let n = self
                .ballots
                .count_documents(doc! { "status": status }, None)
                .await?;
            match status {
                BallotStatus::Accepted => counts.accepted = n,
                BallotStatus::Committed => counts.committed = n,
                BallotStatus::Orphaned => counts.orphaned = n,
            }
        }
        Ok(counts)
    }

    async fn orphans(&self) -> Result<Vec<Ballot>> {
        let options = FindOptions::builder().sort(doc! { "castAt": 1 }).build();
        let orphans = self
            .ballots
            .find(doc! { "status": BallotStatus::Orphaned }, options)
            .await?
            .try_collect()
            .await?;
        Ok(orphans)
    }
}
