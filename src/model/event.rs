use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted after a vote has been committed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    /// Absent when the ledger only keeps counters.
    pub voter_id: Option<String>,
    pub candidate_id: String,
    pub candidate_votes: u64,
    pub aggregate_total: u64,
    pub timestamp: DateTime<Utc>,
}
