use std::collections::{hash_map::Entry, HashMap};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::ballot::{Ballot, BallotCounts, BallotStatus};

use super::VoteGuard;

/// A ballot guard held in process memory.
#[derive(Debug, Default)]
pub struct MemoryGuard {
    ballots: Mutex<HashMap<String, Ballot>>,
}

impl MemoryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, voter_id: &str, f: impl FnOnce(&mut Ballot)) -> Result<()> {
        let mut ballots = self.ballots.lock().map_err(poisoned)?;
        let ballot = ballots
            .get_mut(voter_id)
            .ok_or_else(|| Error::not_found(format!("Ballot for voter {voter_id}")))?;
        f(ballot);
        Ok(())
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::TransientStore("in-memory ballot guard lock poisoned".to_string())
}

#[rocket::async_trait]
impl VoteGuard for MemoryGuard {
    async fn has_voted(&self, voter_id: &str) -> Result<bool> {
        Ok(self.ballots.lock().map_err(poisoned)?.contains_key(voter_id))
    }

    async fn record_ballot(&self, ballot: Ballot) -> Result<Ballot> {
        let mut ballots = self.ballots.lock().map_err(poisoned)?;
        match ballots.entry(ballot.voter_id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateVote(ballot.voter_id)),
            Entry::Vacant(slot) => Ok(slot.insert(ballot).clone()),
        }
    }

    async fn mark_committed(&self, voter_id: &str) -> Result<()> {
        self.update(voter_id, |ballot| {
            ballot.status = BallotStatus::Committed;
            ballot.orphan_reason = None;
        })
    }

    async fn mark_orphaned(&self, voter_id: &str, reason: &str) -> Result<()> {
        self.update(voter_id, |ballot| {
            ballot.status = BallotStatus::Orphaned;
            ballot.orphan_reason = Some(reason.to_string());
        })
    }

    async fn find(&self, voter_id: &str) -> Result<Option<Ballot>> {
        Ok(self.ballots.lock().map_err(poisoned)?.get(voter_id).cloned())
    }

    async fn count(&self) -> Result<BallotCounts> {
        let ballots = self.ballots.lock().map_err(poisoned)?;
        let mut counts = BallotCounts::default();
        for ballot in ballots.values() {
            counts.add(ballot.status);
        }
        Ok(counts)
    }

    async fn orphans(&self) -> Result<Vec<Ballot>> {
        let ballots = self.ballots.lock().map_err(poisoned)?;
        let mut orphans: Vec<Ballot> = ballots
            .values()
            .filter(|ballot| ballot.status == BallotStatus::Orphaned)
            .cloned()
            .collect();
        orphans.sort_by_key(|ballot| ballot.cast_at);
        Ok(orphans)
    }
}
