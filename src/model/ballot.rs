use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Where a ballot is in its life.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotStatus {
    /// Recorded by the guard; the ledger transaction has not finished.
    Accepted,
    /// The ledger transaction for this ballot committed.
    Committed,
    /// The ledger transaction failed after the ballot was accepted.
    Orphaned,
}

impl From<BallotStatus> for Bson {
    fn from(status: BallotStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// The guard's record of a voter's one and only ballot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub voter_id: String,
    pub candidate_id: String,
    /// Similarity score reported by the biometric gate, if one was consulted.
    pub face_similarity: Option<f32>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    pub status: BallotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_reason: Option<String>,
}

impl Ballot {
    /// A freshly accepted ballot.
    pub fn new(voter_id: &str, candidate_id: &str, face_similarity: Option<f32>) -> Self {
        Self {
            voter_id: voter_id.to_string(),
            candidate_id: candidate_id.to_string(),
            face_similarity,
            cast_at: Utc::now(),
            status: BallotStatus::Accepted,
            orphan_reason: None,
        }
    }
}

/// How many ballots the guard holds in each state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotCounts {
    pub accepted: u64,
    pub committed: u64,
    pub orphaned: u64,
}

impl BallotCounts {
    pub fn total(&self) -> u64 {
        self.accepted + self.committed + self.orphaned
    }

    pub fn add(&mut self, status: BallotStatus) {
        match status {
            BallotStatus::Accepted => self.accepted += 1,
            BallotStatus::Committed => self.committed += 1,
            BallotStatus::Orphaned => self.orphaned += 1,
        }
    }
}

/// An orphaned ballot as shown in a reconciliation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedBallot {
    pub voter_id: String,
    pub candidate_id: String,
    pub cast_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl From<Ballot> for OrphanedBallot {
    fn from(ballot: Ballot) -> Self {
        Self {
            voter_id: ballot.voter_id,
            candidate_id: ballot.candidate_id,
            cast_at: ballot.cast_at,
            reason: ballot.orphan_reason,
        }
    }
}
