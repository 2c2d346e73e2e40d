use log::{debug, trace};
use mongodb::{
    bson::{doc, spec::BinarySubtype, Binary},
    options::{FindOptions, UpdateOptions},
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{transaction_failure, Coll};

use super::store::{ChangeSet, CommitOutcome, LedgerStore, Version, Versioned};

/// One ledger key as stored in the `ledger_state` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(rename = "_id")]
    pub key: String,
    pub value: Binary,
    pub version: i64,
}

impl From<StateEntry> for Versioned {
    fn from(entry: StateEntry) -> Self {
        Self {
            value: entry.value.bytes,
            version: entry.version.max(0) as Version,
        }
    }
}

/// A ledger backed by MongoDB. Each commit runs in a multi-document
/// transaction: the read set is re-validated inside the transaction and
/// every written key has its version incremented, so concurrent commits on
/// the same key either serialize or abort with a write conflict.
pub struct MongoLedger {
    client: Client,
    states: Coll<StateEntry>,
}

impl MongoLedger {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            states: Coll::from_db(db),
        }
    }

    /// Run the body of a commit inside an open transaction.
    async fn apply(
        &self,
        changes: &ChangeSet,
        session: &mut ClientSession,
    ) -> std::result::Result<CommitOutcome, mongodb::error::Error> {
        for (key, expected) in changes.reads() {
            let current = self
                .states
                .find_one_with_session(doc! { "_id": key }, None, session)
                .await?
                .map(|entry| entry.version.max(0) as Version)
                .unwrap_or(0);
            if current != *expected {
                trace!("Ledger key {key} moved from version {expected} to {current}");
                return Ok(CommitOutcome::Conflict(key.clone()));
            }
        }

        let upsert = UpdateOptions::builder().upsert(true).build();
        for (key, value) in changes.writes() {
            let update = doc! {
                "$set": { "value": Binary { subtype: BinarySubtype::Generic, bytes: value.clone() } },
                "$inc": { "version": 1_i64 },
            };
            self.states
                .update_one_with_session(doc! { "_id": key }, update, upsert.clone(), session)
                .await?;
        }
        Ok(CommitOutcome::Applied)
    }
}

#[rocket::async_trait]
impl LedgerStore for MongoLedger {
    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        let entry = self.states.find_one(doc! { "_id": key }, None).await?;
        Ok(entry.map(Versioned::from))
    }

    async fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Versioned)>> {
        let filter = doc! { "_id": { "$gte": start, "$lt": end } };
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let entries: Vec<StateEntry> = self.states.find(filter, options).await?.try_collect().await?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.key.clone(), Versioned::from(entry)))
            .collect())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let outcome = match self.apply(&changes, &mut session).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // Best effort; the server also aborts on its own timeout.
                let _ = session.abort_transaction().await;
                return match transaction_failure(err) {
                    Some(err) => Err(err),
                    None => Ok(CommitOutcome::Conflict("<write conflict>".to_string())),
                };
            }
        };

        if let CommitOutcome::Conflict(_) = outcome {
            session.abort_transaction().await?;
            return Ok(outcome);
        }

        match session.commit_transaction().await {
            Ok(()) => {
                debug!("Committed {} ledger write(s)", changes.writes().len());
                Ok(CommitOutcome::Applied)
            }
            Err(err) => match transaction_failure(err) {
                Some(err) => Err(err),
                None => Ok(CommitOutcome::Conflict("<write conflict>".to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::{Client, Database};
    use rocket::futures::future::join_all;

    use super::*;
    use crate::events::EventBus;
    use crate::ledger::BallotContract;

    #[db_test]
    async fn stale_reads_conflict(client: Client, db: Database) {
        let ledger = MongoLedger::new(client, &db);
        ledger.put("k", b"one".to_vec()).await.unwrap();
        let seen = ledger.get("k").await.unwrap().unwrap();
        assert_eq!(seen.version, 1);

        let mut first = ChangeSet::default();
        first.read("k", seen.version);
        first.write("k", b"two".to_vec());
        assert_eq!(ledger.commit(first.clone()).await.unwrap(), CommitOutcome::Applied);

        // Same read set, now stale: nothing is applied.
        let mut stale = first;
        stale.write("other", b"x".to_vec());
        assert_eq!(
            ledger.commit(stale).await.unwrap(),
            CommitOutcome::Conflict("k".to_string())
        );
        let current = ledger.get("k").await.unwrap().unwrap();
        assert_eq!((current.value, current.version), (b"two".to_vec(), 2));
        assert_eq!(ledger.get("other").await.unwrap(), None);
    }

    #[db_test]
    async fn scans_are_ordered_and_bounded(client: Client, db: Database) {
        let ledger = MongoLedger::new(client, &db);
        for key in ["CAND_C2", "VOTER_V1", "CAND_C1", "TOTAL_VOTES"] {
            ledger.put(key, key.as_bytes().to_vec()).await.unwrap();
        }
        let keys: Vec<String> = ledger
            .scan("CAND_", "CAND_\u{10FFFF}")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["CAND_C1", "CAND_C2"]);
    }

    #[db_test]
    async fn contended_votes_are_retried_not_lost(client: Client, db: Database) {
        let contract = Arc::new(BallotContract::new(
            Arc::new(MongoLedger::new(client, &db)),
            Arc::new(EventBus::default()),
            256,
        ));
        contract.register_candidate("C1", "Alice", None).await.unwrap();
        for i in 0..16 {
            contract.register_voter(&format!("V{i:02}")).await.unwrap();
        }

        let votes = (0..16).map(|i| {
            let contract = contract.clone();
            rocket::tokio::spawn(async move {
                let voter_id = format!("V{i:02}");
                contract.cast_vote(Some(voter_id.as_str()), "C1").await
            })
        });
        for outcome in join_all(votes).await {
            outcome.unwrap().unwrap();
        }

        let tally = contract.query_results().await.unwrap();
        assert_eq!(tally.aggregate_total, 16);
        assert_eq!(tally.candidate_sum(), 16);
        assert!(matches!(
            contract.cast_vote(Some("V00"), "C1").await,
            Err(crate::error::Error::AlreadyVoted(_))
        ));
    }
}
