use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use rocket::serde::json::serde_json;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::model::{
    candidate::{validate_id, Candidate},
    event::VoteCast,
};

use super::keys::{candidate_key, prefix_range, voter_key, CANDIDATE_PREFIX, TOTAL_VOTES_KEY};
use super::store::{ChangeSet, CommitOutcome, LedgerStore};

/// Default number of times a conflicted transaction is re-executed.
pub const DEFAULT_MAX_RETRIES: u32 = 32;

/// A candidate as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCandidate {
    pub candidate_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    pub votes: u64,
}

/// A voter as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVoter {
    pub voter_id: String,
    pub voted: bool,
}

/// Every candidate with its vote counter, plus the aggregate total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub candidates: Vec<LedgerCandidate>,
    pub aggregate_total: u64,
}

impl Tally {
    pub fn candidate_sum(&self) -> u64 {
        self.candidates.iter().map(|c| c.votes).sum()
    }
}

/// Counters after a committed vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub candidate_votes: u64,
    pub aggregate_total: u64,
}

// On-ledger encodings. Field names follow the chaincode record layout.
#[derive(Serialize, Deserialize)]
struct CandidateState {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Party", default, skip_serializing_if = "Option::is_none")]
    party: Option<String>,
    #[serde(rename = "Votes")]
    votes: u64,
}

#[derive(Serialize, Deserialize)]
struct VoterState {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Voted")]
    voted: bool,
}

impl From<CandidateState> for LedgerCandidate {
    fn from(state: CandidateState) -> Self {
        Self {
            candidate_id: state.id,
            name: state.name,
            party: state.party,
            votes: state.votes,
        }
    }
}

impl From<VoterState> for LedgerVoter {
    fn from(state: VoterState) -> Self {
        Self {
            voter_id: state.id,
            voted: state.voted,
        }
    }
}

/// The working state of one transaction attempt: reads go through to the
/// store (recording their version), writes are buffered.
struct TxContext<'s> {
    store: &'s dyn LedgerStore,
    changes: ChangeSet,
}

impl<'s> TxContext<'s> {
    fn new(store: &'s dyn LedgerStore) -> Self {
        Self {
            store,
            changes: ChangeSet::default(),
        }
    }

    async fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.changes.pending(key) {
            return Ok(Some(pending.to_vec()));
        }
        let current = self.store.get(key).await?;
        self.changes
            .read(key, current.as_ref().map(|v| v.version).unwrap_or(0));
        Ok(current.map(|v| v.value))
    }

    async fn get_json<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_state(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.changes.write(key, serde_json::to_vec(value)?);
        Ok(())
    }
}

/// A ledger transaction. `execute` may run several times if it loses a
/// conflict, so it must derive everything from what it reads.
#[rocket::async_trait]
trait Transaction: Sync {
    type Output: Send;

    const NAME: &'static str;

    async fn execute(&self, ctx: &mut TxContext<'_>) -> Result<Self::Output>;
}

struct RegisterCandidate<'a> {
    id: &'a str,
    name: &'a str,
    party: Option<&'a str>,
}

#[rocket::async_trait]
impl Transaction for RegisterCandidate<'_> {
    type Output = LedgerCandidate;

    const NAME: &'static str = "RegisterCandidate";

    async fn execute(&self, ctx: &mut TxContext<'_>) -> Result<LedgerCandidate> {
        let key = candidate_key(self.id);
        if ctx.get_state(&key).await?.is_some() {
            return Err(Error::AlreadyExists(format!("Candidate {}", self.id)));
        }
        let state = CandidateState {
            id: self.id.to_string(),
            name: self.name.to_string(),
            party: self.party.map(str::to_string),
            votes: 0,
        };
        ctx.put_json(&key, &state)?;
        Ok(state.into())
    }
}

struct RegisterVoter<'a> {
    id: &'a str,
}

#[rocket::async_trait]
impl Transaction for RegisterVoter<'_> {
    type Output = LedgerVoter;

    const NAME: &'static str = "RegisterVoter";

    async fn execute(&self, ctx: &mut TxContext<'_>) -> Result<LedgerVoter> {
        let key = voter_key(self.id);
        if ctx.get_state(&key).await?.is_some() {
            return Err(Error::AlreadyExists(format!("Voter {}", self.id)));
        }
        let state = VoterState {
            id: self.id.to_string(),
            voted: false,
        };
        ctx.put_json(&key, &state)?;
        Ok(state.into())
    }
}

struct CastVote<'a> {
    voter_id: Option<&'a str>,
    candidate_id: &'a str,
}

#[rocket::async_trait]
impl Transaction for CastVote<'_> {
    type Output = VoteReceipt;

    const NAME: &'static str = "CastVote";

    async fn execute(&self, ctx: &mut TxContext<'_>) -> Result<VoteReceipt> {
        let candidate_key = candidate_key(self.candidate_id);
        let mut candidate: CandidateState = ctx
            .get_json(&candidate_key)
            .await?
            .ok_or_else(|| Error::not_found(format!("Candidate {}", self.candidate_id)))?;

        if let Some(voter_id) = self.voter_id {
            let voter_key = voter_key(voter_id);
            let mut voter: VoterState = ctx
                .get_json(&voter_key)
                .await?
                .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
            if voter.voted {
                return Err(Error::AlreadyVoted(voter_id.to_string()));
            }
            voter.voted = true;
            ctx.put_json(&voter_key, &voter)?;
        }

        let total: u64 = ctx.get_json(TOTAL_VOTES_KEY).await?.unwrap_or(0);
        candidate.votes += 1;
        let receipt = VoteReceipt {
            candidate_votes: candidate.votes,
            aggregate_total: total + 1,
        };
        ctx.put_json(&candidate_key, &candidate)?;
        ctx.put_json(TOTAL_VOTES_KEY, &receipt.aggregate_total)?;
        Ok(receipt)
    }
}

/// The transaction set governing candidates, voters and vote counters.
///
/// Every mutation is validated against the current ledger state and
/// committed atomically. A transaction that loses a conflict against a
/// concurrent one is re-executed from scratch, so no increment is ever lost.
pub struct BallotContract {
    store: Arc<dyn LedgerStore>,
    events: Arc<EventBus>,
    max_retries: u32,
}

impl BallotContract {
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<EventBus>, max_retries: u32) -> Self {
        Self {
            store,
            events,
            max_retries,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Execute and commit a transaction, re-executing on conflict.
    async fn submit<T: Transaction>(&self, tx: &T) -> Result<T::Output> {
        for attempt in 0..=self.max_retries {
            let mut ctx = TxContext::new(self.store.as_ref());
            let output = tx.execute(&mut ctx).await?;
            match self.store.commit(ctx.changes).await? {
                CommitOutcome::Applied => return Ok(output),
                CommitOutcome::Conflict(key) => {
                    debug!(
                        "{} conflicted on {key} (attempt {}), re-executing",
                        T::NAME,
                        attempt + 1
                    );
                }
            }
        }
        warn!("{} gave up after {} conflicts", T::NAME, self.max_retries + 1);
        Err(Error::TransientStore(format!(
            "{} could not commit after {} attempts",
            T::NAME,
            self.max_retries + 1
        )))
    }

    /// Seed the given candidates, skipping any that already exist.
    /// Returns how many were created.
    pub async fn init_ledger(&self, candidates: &[Candidate]) -> Result<usize> {
        let mut created = 0;
        for candidate in candidates {
            match self
                .register_candidate(
                    &candidate.candidate_id,
                    &candidate.name,
                    candidate.party.as_deref(),
                )
                .await
            {
                Ok(_) => created += 1,
                Err(Error::AlreadyExists(_)) => {
                    debug!("Candidate {} already on ledger", candidate.candidate_id)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    pub async fn register_candidate(
        &self,
        id: &str,
        name: &str,
        party: Option<&str>,
    ) -> Result<LedgerCandidate> {
        let id = validate_id("candidateId", id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Candidate name must not be empty".to_string()));
        }
        let party = party.map(str::trim).filter(|p| !p.is_empty());

        let candidate = self.submit(&RegisterCandidate { id, name, party }).await?;
        info!("Registered candidate {id} on ledger");
        Ok(candidate)
    }

    pub async fn register_voter(&self, id: &str) -> Result<LedgerVoter> {
        let id = validate_id("voterId", id)?;
        let voter = self.submit(&RegisterVoter { id }).await?;
        info!("Registered voter {id} on ledger");
        Ok(voter)
    }

    /// Record one vote for `candidate_id`.
    ///
    /// With a `voter_id` the voter must be registered and must not have
    /// voted yet; without one only the counters are updated.
    pub async fn cast_vote(&self, voter_id: Option<&str>, candidate_id: &str) -> Result<VoteReceipt> {
        let candidate_id = validate_id("candidateId", candidate_id)?;
        let voter_id = voter_id.map(|id| validate_id("voterId", id)).transpose()?;

        let receipt = self
            .submit(&CastVote {
                voter_id,
                candidate_id,
            })
            .await?;

        self.events.publish(VoteCast {
            voter_id: voter_id.map(str::to_string),
            candidate_id: candidate_id.to_string(),
            candidate_votes: receipt.candidate_votes,
            aggregate_total: receipt.aggregate_total,
            timestamp: Utc::now(),
        });
        Ok(receipt)
    }

    /// All candidates in key order, with the aggregate total.
    ///
    /// Every vote writes the total, so a scan taken between two reads of the
    /// total at the same version saw no vote land halfway.
    pub async fn query_results(&self) -> Result<Tally> {
        let (start, end) = prefix_range(CANDIDATE_PREFIX);
        for attempt in 0..=self.max_retries {
            let before = self.store.get(TOTAL_VOTES_KEY).await?;
            let entries = self.store.scan(&start, &end).await?;
            let after = self.store.get(TOTAL_VOTES_KEY).await?;
            if before.as_ref().map(|v| v.version) != after.as_ref().map(|v| v.version) {
                debug!("QueryResults raced a vote (attempt {}), rescanning", attempt + 1);
                continue;
            }

            let candidates = entries
                .into_iter()
                .map(|(_, entry)| {
                    serde_json::from_slice::<CandidateState>(&entry.value).map(LedgerCandidate::from)
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let aggregate_total = match after {
                Some(entry) => serde_json::from_slice(&entry.value)?,
                None => 0,
            };
            return Ok(Tally {
                candidates,
                aggregate_total,
            });
        }
        warn!("QueryResults gave up after {} concurrent votes", self.max_retries + 1);
        Err(Error::TransientStore(format!(
            "QueryResults could not read a stable tally after {} attempts",
            self.max_retries + 1
        )))
    }

    pub async fn query_candidate(&self, id: &str) -> Result<LedgerCandidate> {
        let id = validate_id("candidateId", id)?;
        self.read_json::<CandidateState>(&candidate_key(id))
            .await?
            .map(LedgerCandidate::from)
            .ok_or_else(|| Error::not_found(format!("Candidate {id}")))
    }

    pub async fn query_voter(&self, id: &str) -> Result<LedgerVoter> {
        let id = validate_id("voterId", id)?;
        self.read_json::<VoterState>(&voter_key(id))
            .await?
            .map(LedgerVoter::from)
            .ok_or_else(|| Error::not_found(format!("Voter {id}")))
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(entry) => Ok(Some(serde_json::from_slice(&entry.value)?)),
            None => Ok(None),
        }
    }
}
