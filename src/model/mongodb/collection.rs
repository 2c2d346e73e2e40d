use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::ledger::mongo::StateEntry;
use crate::model::{admin::Admin, ballot::Ballot, candidate::Candidate, voter::Voter};
use crate::results::mongo::StoredSnapshot;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Admin {
    const NAME: &'static str = "admins";
}

impl MongoCollection for Voter {
    const NAME: &'static str = "voters";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for Ballot {
    const NAME: &'static str = "votes";
}

impl MongoCollection for StateEntry {
    const NAME: &'static str = "ledger_state";
}

impl MongoCollection for StoredSnapshot {
    const NAME: &'static str = "result_status";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();
    let unique_on = |field: &str| {
        IndexModel::builder()
            .keys(doc! { field: 1 })
            .options(unique.clone())
            .build()
    };

    // Admin collection.
    let admins = Coll::<Admin>::from_db(db);
    admins.create_index(unique_on("adminId"), None).await?;
    admins.create_index(unique_on("email"), None).await?;

    // Voter collection.
    let voters = Coll::<Voter>::from_db(db);
    voters.create_index(unique_on("voterId"), None).await?;
    voters.create_index(unique_on("nationalIdHmac"), None).await?;

    // Candidate roster.
    Coll::<Candidate>::from_db(db)
        .create_index(unique_on("candidateId"), None)
        .await?;

    // Ballot guard: at most one ballot per voter, ever.
    Coll::<Ballot>::from_db(db)
        .create_index(unique_on("voterId"), None)
        .await?;

    Ok(())
}
