//! The ballot path: guard, biometric gate and ledger, in that order.

use chrono::Utc;
use log::{error, info, warn};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::ledger::VoteReceipt;
use crate::model::{ballot::Ballot, candidate::validate_id};

impl Backend {
    /// Cast `voter_id`'s one ballot for `candidate_id`.
    ///
    /// Nothing is recorded unless the probe image matches the voter's
    /// enrollment. Once the guard has accepted the ballot the ledger
    /// transaction is attempted exactly once; if it fails the ballot is
    /// marked orphaned and the failure is reported as a reconciliation error.
    pub async fn cast_vote(
        &self,
        voter_id: &str,
        candidate_id: &str,
        probe: &[u8],
    ) -> Result<VoteReceipt> {
        let voter_id = validate_id("voterId", voter_id)?;
        let candidate_id = validate_id("candidateId", candidate_id)?;
        if probe.is_empty() {
            return Err(Error::Validation("image is required".to_string()));
        }

        if self.guard.has_voted(voter_id).await? {
            return Err(Error::DuplicateVote(voter_id.to_string()));
        }

        // Reject what the ledger would reject before touching the gate or
        // the guard.
        self.contract.query_candidate(candidate_id).await?;
        if self.contract.query_voter(voter_id).await?.voted {
            // A concurrent ballot may have committed since the guard check.
            if self.guard.has_voted(voter_id).await? {
                return Err(Error::DuplicateVote(voter_id.to_string()));
            }
            error!("Voter {voter_id} is marked as voted on the ledger but has no ballot");
            return Err(Error::AlreadyVoted(voter_id.to_string()));
        }

        let verification = self.gate.verify(voter_id, probe).await?;
        if !verification.is_match {
            info!(
                "Face verification failed for voter {voter_id} (similarity {:.1})",
                verification.similarity
            );
            return Err(Error::VerificationFailed {
                similarity: verification.similarity,
            });
        }

        self.guard
            .record_ballot(Ballot::new(
                voter_id,
                candidate_id,
                Some(verification.similarity),
            ))
            .await?;
        if let Err(e) = self.registry.mark_face_verified(voter_id, Utc::now()).await {
            warn!("Could not record face verification for voter {voter_id}: {e}");
        }

        match self.contract.cast_vote(Some(voter_id), candidate_id).await {
            Ok(receipt) => {
                if let Err(e) = self.guard.mark_committed(voter_id).await {
                    error!("Vote by {voter_id} committed but its ballot was not updated: {e}");
                }
                info!(
                    "Vote committed for candidate {candidate_id} ({} total)",
                    receipt.aggregate_total
                );
                Ok(receipt)
            }
            Err(e) => {
                error!("Ballot of voter {voter_id} accepted but not committed: {e}");
                if let Err(mark) = self.guard.mark_orphaned(voter_id, &e.to_string()).await {
                    error!("Could not mark ballot of voter {voter_id} orphaned: {mark}");
                }
                Err(Error::Reconciliation(format!(
                    "ballot of voter {voter_id} was accepted but the ledger rejected it: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use rocket::futures::future::join_all;

    use super::*;
    use crate::biometric::{enrollment_key, MemoryObjectStore};
    use crate::config::Config;
    use crate::guard::{MemoryGuard, VoteGuard};
    use crate::ledger::{
        keys::TOTAL_VOTES_KEY, ChangeSet, CommitOutcome, LedgerStore, MemoryLedger, Versioned,
    };
    use crate::model::{
        ballot::{BallotCounts, BallotStatus},
        candidate::Candidate,
        voter::{VoterRegistration, EXAMPLE_FACE},
    };
    use crate::registry::MemoryRegistry;
    use crate::results::MemoryResultStore;

    async fn seeded(backend: Backend) -> (Backend, String) {
        backend.register_candidate(Candidate::example1()).await.unwrap();
        backend.register_candidate(Candidate::example2()).await.unwrap();
        let voter = backend
            .register_voter(VoterRegistration::example(), "admin-001")
            .await
            .unwrap();
        (backend, voter.voter_id)
    }

    #[rocket::async_test]
    async fn verified_vote_is_counted_once() {
        let (backend, voter_id) = seeded(Backend::in_memory(&Config::example())).await;

        let receipt = backend.cast_vote(&voter_id, "C1", EXAMPLE_FACE).await.unwrap();
        assert_eq!((receipt.candidate_votes, receipt.aggregate_total), (1, 1));

        let ballot = backend.guard.find(&voter_id).await.unwrap().unwrap();
        assert_eq!(ballot.status, BallotStatus::Committed);
        assert_eq!(ballot.face_similarity, Some(100.0));
        let voter = backend.registry.find_voter(&voter_id).await.unwrap().unwrap();
        assert!(voter.face_verified);
        assert!(voter.last_verified_at.is_some());

        assert!(matches!(
            backend.cast_vote(&voter_id, "C2", EXAMPLE_FACE).await,
            Err(Error::DuplicateVote(_))
        ));
        assert_eq!(backend.contract.query_results().await.unwrap().aggregate_total, 1);
    }

    #[rocket::async_test]
    async fn mismatched_face_records_nothing() {
        let (backend, voter_id) = seeded(Backend::in_memory(&Config::example())).await;

        let result = backend.cast_vote(&voter_id, "C1", b"someone else").await;
        assert!(matches!(result, Err(Error::VerificationFailed { .. })));

        assert_eq!(backend.guard.find(&voter_id).await.unwrap(), None);
        assert_eq!(backend.contract.query_results().await.unwrap().aggregate_total, 0);
        assert!(!backend.contract.query_voter(&voter_id).await.unwrap().voted);
    }

    #[rocket::async_test]
    async fn unknown_candidate_or_voter_records_nothing() {
        let (backend, voter_id) = seeded(Backend::in_memory(&Config::example())).await;

        assert!(matches!(
            backend.cast_vote(&voter_id, "C9", EXAMPLE_FACE).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            backend.cast_vote("V404", "C1", EXAMPLE_FACE).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(backend.guard.count().await.unwrap().total(), 0);
    }

    /// A guard whose `has_voted` always answers no, as if a competing
    /// ballot landed right after the check.
    struct LateGuard(MemoryGuard);

    #[rocket::async_trait]
    impl VoteGuard for LateGuard {
        async fn has_voted(&self, _voter_id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn record_ballot(&self, ballot: Ballot) -> Result<Ballot> {
            self.0.record_ballot(ballot).await
        }

        async fn mark_committed(&self, voter_id: &str) -> Result<()> {
            self.0.mark_committed(voter_id).await
        }

        async fn mark_orphaned(&self, voter_id: &str, reason: &str) -> Result<()> {
            self.0.mark_orphaned(voter_id, reason).await
        }

        async fn find(&self, voter_id: &str) -> Result<Option<Ballot>> {
            self.0.find(voter_id).await
        }

        async fn count(&self) -> Result<BallotCounts> {
            self.0.count().await
        }

        async fn orphans(&self) -> Result<Vec<Ballot>> {
            self.0.orphans().await
        }
    }

    #[rocket::async_test]
    async fn losing_ballot_does_not_mark_face_verified() {
        let backend = Backend::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(LateGuard(MemoryGuard::new())),
            Arc::new(MemoryRegistry::new()),
            Arc::new(MemoryResultStore::new()),
            Arc::new(MemoryObjectStore::new()),
            &Config::example(),
        );
        let (backend, voter_id) = seeded(backend).await;
        backend
            .guard
            .record_ballot(Ballot::new(&voter_id, "C2", None))
            .await
            .unwrap();

        assert!(matches!(
            backend.cast_vote(&voter_id, "C1", EXAMPLE_FACE).await,
            Err(Error::DuplicateVote(_))
        ));
        let voter = backend.registry.find_voter(&voter_id).await.unwrap().unwrap();
        assert!(!voter.face_verified);
        assert!(voter.last_verified_at.is_none());
        assert_eq!(backend.contract.query_results().await.unwrap().aggregate_total, 0);
    }

    /// A ledger whose vote commits can be made to fail.
    struct Faulty {
        inner: MemoryLedger,
        fail_votes: AtomicBool,
    }

    #[rocket::async_trait]
    impl LedgerStore for Faulty {
        async fn get(&self, key: &str) -> Result<Option<Versioned>> {
            self.inner.get(key).await
        }

        async fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Versioned)>> {
            self.inner.scan(start, end).await
        }

        async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome> {
            if self.fail_votes.load(Ordering::SeqCst)
                && changes.writes().contains_key(TOTAL_VOTES_KEY)
            {
                return Err(Error::TransientStore("peer unreachable".to_string()));
            }
            self.inner.commit(changes).await
        }
    }

    #[rocket::async_test]
    async fn ledger_failure_after_acceptance_orphans_the_ballot() {
        let ledger = Arc::new(Faulty {
            inner: MemoryLedger::new(),
            fail_votes: AtomicBool::new(false),
        });
        let backend = Backend::new(
            ledger.clone(),
            Arc::new(MemoryGuard::new()),
            Arc::new(MemoryRegistry::new()),
            Arc::new(MemoryResultStore::new()),
            Arc::new(MemoryObjectStore::new()),
            &Config::example(),
        );
        let (backend, voter_id) = seeded(backend).await;
        ledger.fail_votes.store(true, Ordering::SeqCst);

        assert!(matches!(
            backend.cast_vote(&voter_id, "C1", EXAMPLE_FACE).await,
            Err(Error::Reconciliation(_))
        ));
        let orphans = backend.guard.orphans().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].voter_id, voter_id);
        assert!(orphans[0]
            .orphan_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("peer unreachable")));

        // The voter stays blocked even once the ledger recovers.
        ledger.fail_votes.store(false, Ordering::SeqCst);
        assert!(matches!(
            backend.cast_vote(&voter_id, "C1", EXAMPLE_FACE).await,
            Err(Error::DuplicateVote(_))
        ));
    }

    #[test]
    fn concurrent_voters_are_all_counted() {
        let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let backend = Backend::in_memory(&Config::example());
            backend.register_candidate(Candidate::example1()).await.unwrap();
            let mut voter_ids = Vec::new();
            for i in 0..50 {
                // Enrolled directly: password hashing would dominate the test.
                let voter_id = format!("V{i:03}");
                backend.contract.register_voter(&voter_id).await.unwrap();
                backend
                    .images
                    .store(&enrollment_key(&voter_id), EXAMPLE_FACE.to_vec(), "image/jpeg")
                    .await
                    .unwrap();
                voter_ids.push(voter_id);
            }

            let tasks = voter_ids.into_iter().map(|voter_id| {
                let backend = backend.clone();
                rocket::tokio::spawn(async move {
                    backend.cast_vote(&voter_id, "C1", EXAMPLE_FACE).await
                })
            });
            for outcome in join_all(tasks).await {
                outcome.unwrap().unwrap();
            }

            let tally = backend.contract.query_results().await.unwrap();
            assert_eq!(tally.aggregate_total, 50);
            assert_eq!(tally.candidate_sum(), 50);
            assert_eq!(backend.guard.count().await.unwrap().committed, 50);
        });
    }

    #[test]
    fn concurrent_ballots_from_one_voter_count_once() {
        let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (backend, voter_id) = seeded(Backend::in_memory(&Config::example())).await;

            let tasks = (0..20).map(|i| {
                let backend = backend.clone();
                let voter_id = voter_id.clone();
                let candidate_id = if i % 2 == 0 { "C1" } else { "C2" };
                rocket::tokio::spawn(async move {
                    backend.cast_vote(&voter_id, candidate_id, EXAMPLE_FACE).await
                })
            });
            let outcomes: Vec<_> = join_all(tasks)
                .await
                .into_iter()
                .map(|outcome| outcome.unwrap())
                .collect();

            assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
            assert!(outcomes
                .iter()
                .filter_map(|o| o.as_ref().err())
                .all(|e| matches!(e, Error::DuplicateVote(_))));
            let tally = backend.contract.query_results().await.unwrap();
            assert_eq!(tally.aggregate_total, 1);
            assert_eq!(tally.candidate_sum(), 1);
        });
    }
}
