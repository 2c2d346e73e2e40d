use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::Result;
use crate::model::ballot::OrphanedBallot;

/// Cross-check of the ballot guard against the ledger's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub ledger_total: u64,
    pub candidate_sum: u64,
    pub committed_ballots: u64,
    /// Ballots whose ledger transaction has not reported back yet.
    pub accepted_ballots: u64,
    pub orphaned: Vec<OrphanedBallot>,
    pub consistent: bool,
}

impl Backend {
    /// Compare the aggregate total, the sum of candidate counters and the
    /// guard's committed ballots, and list every orphaned ballot.
    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let tally = self.contract.query_results().await?;
        let counts = self.guard.count().await?;
        let orphaned: Vec<OrphanedBallot> = self
            .guard
            .orphans()
            .await?
            .into_iter()
            .map(OrphanedBallot::from)
            .collect();

        let candidate_sum = tally.candidate_sum();
        let consistent = tally.aggregate_total == candidate_sum
            && candidate_sum == counts.committed
            && counts.accepted == 0
            && orphaned.is_empty();
        let report = ReconciliationReport {
            ledger_total: tally.aggregate_total,
            candidate_sum,
            committed_ballots: counts.committed,
            accepted_ballots: counts.accepted,
            orphaned,
            consistent,
        };

        if report.consistent {
            info!("Reconciliation clean: {} vote(s)", report.ledger_total);
        } else {
            warn!(
                "Reconciliation found discrepancies: total {}, candidate sum {}, committed {}, accepted {}, orphaned {}",
                report.ledger_total,
                report.candidate_sum,
                report.committed_ballots,
                report.accepted_ballots,
                report.orphaned.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{
        ballot::Ballot,
        candidate::Candidate,
        voter::{decode_image, VoterRegistration},
    };

    #[rocket::async_test]
    async fn clean_after_successful_votes() {
        let backend = Backend::in_memory(&Config::example());
        let report = backend.reconcile().await.unwrap();
        assert!(report.consistent);
        assert_eq!(report.ledger_total, 0);

        backend.register_candidate(Candidate::example1()).await.unwrap();
        for registration in [VoterRegistration::example(), VoterRegistration::example2()] {
            let image = registration.image.clone();
            let voter = backend.register_voter(registration, "admin-001").await.unwrap();
            let probe = decode_image("image", &image).unwrap();
            backend.cast_vote(&voter.voter_id, "C1", &probe).await.unwrap();
        }

        let report = backend.reconcile().await.unwrap();
        assert!(report.consistent);
        assert_eq!(report.ledger_total, 2);
        assert_eq!(report.candidate_sum, 2);
        assert_eq!(report.committed_ballots, 2);
        assert!(report.orphaned.is_empty());
    }

    #[rocket::async_test]
    async fn orphans_and_counter_only_votes_are_reported() {
        let backend = Backend::in_memory(&Config::example());
        backend.register_candidate(Candidate::example1()).await.unwrap();

        backend
            .guard
            .record_ballot(Ballot::new("V1", "C1", Some(99.0)))
            .await
            .unwrap();
        backend.guard.mark_orphaned("V1", "ledger unavailable").await.unwrap();
        let report = backend.reconcile().await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.orphaned[0].reason.as_deref(), Some("ledger unavailable"));

        // A vote with no ballot behind it also shows up.
        let backend = Backend::in_memory(&Config::example());
        backend.register_candidate(Candidate::example1()).await.unwrap();
        backend.contract.cast_vote(None, "C1").await.unwrap();
        let report = backend.reconcile().await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.ledger_total, 1);
        assert_eq!(report.committed_ballots, 0);
    }
}
