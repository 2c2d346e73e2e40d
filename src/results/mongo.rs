use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::ReplaceOptions,
    Database,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    mongodb::Coll,
    results::{CandidateResult, ResultSnapshot},
};

use super::ResultStore;

/// Id of the one and only result document.
pub const GLOBAL_RESULT_ID: &str = "global";

/// Stored lifecycle state. Only published snapshots are ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Published,
}

/// The `result_status` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    #[serde(rename = "_id")]
    id: String,
    status: ResultStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    published_at: DateTime<Utc>,
    total_votes: u64,
    results: Vec<CandidateResult>,
}

impl From<&ResultSnapshot> for StoredSnapshot {
    fn from(snapshot: &ResultSnapshot) -> Self {
        Self {
            id: GLOBAL_RESULT_ID.to_string(),
            status: ResultStatus::Published,
            published_at: snapshot.published_at,
            total_votes: snapshot.total_votes,
            results: snapshot.results.clone(),
        }
    }
}

pub struct MongoResultStore {
    snapshots: Coll<StoredSnapshot>,
}

impl MongoResultStore {
    pub fn new(db: &Database) -> Self {
        Self {
            snapshots: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl ResultStore for MongoResultStore {
    async fn load(&self) -> Result<Option<ResultSnapshot>> {
        let stored = self
            .snapshots
            .find_one(doc! { "_id": GLOBAL_RESULT_ID }, None)
            .await?;
        Ok(stored
            .filter(|stored| stored.status == ResultStatus::Published)
            .map(|stored| ResultSnapshot {
                published_at: stored.published_at,
                total_votes: stored.total_votes,
                results: stored.results,
            }))
    }

    async fn publish(&self, snapshot: &ResultSnapshot) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.snapshots
            .replace_one(
                doc! { "_id": GLOBAL_RESULT_ID },
                StoredSnapshot::from(snapshot),
                options,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::Database;

    use super::*;

    fn snapshot(votes: u64) -> ResultSnapshot {
        ResultSnapshot {
            published_at: Utc::now(),
            total_votes: votes,
            results: vec![CandidateResult {
                candidate_id: "C1".to_string(),
                name: "Alice Johnson".to_string(),
                party: None,
                votes,
            }],
        }
    }

    #[db_test]
    async fn republishing_replaces_the_global_snapshot(db: Database) {
        let store = MongoResultStore::new(&db);
        assert_eq!(store.load().await.unwrap(), None);

        store.publish(&snapshot(1)).await.unwrap();
        store.publish(&snapshot(3)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.total_votes, 3);
        assert_eq!(loaded.results, snapshot(3).results);
        let documents = Coll::<StoredSnapshot>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(documents, 1);
    }
}
