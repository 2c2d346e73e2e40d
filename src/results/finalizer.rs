use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::error::{Error, Result};
use crate::ledger::{BallotContract, Tally};
use crate::model::{
    auth::Rights,
    candidate::Candidate,
    results::{CandidateResult, ResultSnapshot, ResultView},
};
use crate::registry::Registry;

use super::ResultStore;

/// Drives the `pending` -> `published` transition.
pub struct Finalizer {
    contract: Arc<BallotContract>,
    registry: Arc<dyn Registry>,
    results: Arc<dyn ResultStore>,
}

impl Finalizer {
    pub fn new(
        contract: Arc<BallotContract>,
        registry: Arc<dyn Registry>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            contract,
            registry,
            results,
        }
    }

    /// Recompute the result from the ledger and publish it, replacing any
    /// earlier snapshot. Only administrators may finalize.
    pub async fn finalize(&self, caller: Option<Rights>) -> Result<ResultSnapshot> {
        if caller != Some(Rights::Admin) {
            return Err(Error::Forbidden("Admin privileges required".to_string()));
        }

        let tally = self.contract.query_results().await?;
        let roster = self.registry.candidates().await?;
        let snapshot = ResultSnapshot {
            published_at: Utc::now(),
            total_votes: tally.aggregate_total,
            results: merge(roster, tally),
        };
        self.results.publish(&snapshot).await?;

        info!(
            "Published results: {} vote(s) across {} candidate(s)",
            snapshot.total_votes,
            snapshot.results.len()
        );
        Ok(snapshot)
    }

    /// The published snapshot as stored, or the pending sentinel.
    pub async fn results(&self) -> Result<ResultView> {
        Ok(self.results.load().await?.into())
    }
}

/// Roster order first, then any ledger-only candidates in ledger order.
fn merge(roster: Vec<Candidate>, tally: Tally) -> Vec<CandidateResult> {
    let mut ledger: HashMap<String, _> = tally
        .candidates
        .iter()
        .map(|c| (c.candidate_id.clone(), c))
        .collect();

    let mut results: Vec<CandidateResult> = roster
        .into_iter()
        .map(|candidate| {
            let votes = ledger
                .remove(&candidate.candidate_id)
                .map(|c| c.votes)
                .unwrap_or(0);
            CandidateResult {
                candidate_id: candidate.candidate_id,
                name: candidate.name,
                party: candidate.party,
                votes,
            }
        })
        .collect();

    results.extend(
        tally
            .candidates
            .iter()
            .filter(|c| ledger.contains_key(&c.candidate_id))
            .map(|c| CandidateResult {
                candidate_id: c.candidate_id.clone(),
                name: c.name.clone(),
                party: c.party.clone(),
                votes: c.votes,
            }),
    );
    results
}
