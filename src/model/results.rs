use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message shown while results have not been published.
pub const PENDING_MESSAGE: &str = "Vote counting not started";

/// One row of a published result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub candidate_id: String,
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    pub votes: u64,
}

/// The published result. Frozen until the next finalize overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSnapshot {
    pub published_at: DateTime<Utc>,
    pub total_votes: u64,
    pub results: Vec<CandidateResult>,
}

/// What callers see when asking for the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultView {
    Pending {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Published {
        published_at: DateTime<Utc>,
        total_votes: u64,
        results: Vec<CandidateResult>,
    },
}

impl ResultView {
    pub fn pending() -> Self {
        Self::Pending {
            message: PENDING_MESSAGE.to_string(),
        }
    }
}

impl From<Option<ResultSnapshot>> for ResultView {
    fn from(snapshot: Option<ResultSnapshot>) -> Self {
        match snapshot {
            Some(snapshot) => Self::Published {
                published_at: snapshot.published_at,
                total_votes: snapshot.total_votes,
                results: snapshot.results,
            },
            None => Self::pending(),
        }
    }
}
