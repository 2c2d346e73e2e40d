use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::FindOptions,
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    admin::Admin,
    candidate::Candidate,
    mongodb::{is_duplicate_key_error, Coll},
    voter::Voter,
};

use super::Registry;

/// A registry backed by the `admins`, `voters` and `candidates` collections.
/// Uniqueness is enforced by the indexes created in `ensure_indexes_exist`.
pub struct MongoRegistry {
    admins: Coll<Admin>,
    voters: Coll<Voter>,
    candidates: Coll<Candidate>,
}

impl MongoRegistry {
    pub fn new(db: &Database) -> Self {
        Self {
            admins: Coll::from_db(db),
            voters: Coll::from_db(db),
            candidates: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl Registry for MongoRegistry {
    async fn insert_admin(&self, admin: Admin) -> Result<()> {
        let result = self.admins.insert_one(&admin, None).await;
        if is_duplicate_key_error(result.as_ref()) {
            return Err(Error::AlreadyExists(format!("Admin {}", admin.admin_id)));
        }
        result?;
        Ok(())
    }

    async fn find_admin(&self, admin_id: &str) -> Result<Option<Admin>> {
        Ok(self
            .admins
            .find_one(doc! { "adminId": admin_id }, None)
            .await?)
    }

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>> {
        Ok(self.admins.find_one(doc! { "email": email }, None).await?)
    }

    async fn touch_admin_login(&self, admin_id: &str, at: DateTime<Utc>) -> Result<()> {
        let update = doc! { "$set": { "lastLoginAt": BsonDateTime::from_chrono(at) } };
        let result = self
            .admins
            .update_one(doc! { "adminId": admin_id }, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Admin {admin_id}")));
        }
        Ok(())
    }

    async fn insert_voter(&self, voter: Voter) -> Result<()> {
        let result = self.voters.insert_one(&voter, None).await;
        if is_duplicate_key_error(result.as_ref()) {
            return Err(Error::AlreadyExists(format!("Voter {}", voter.voter_id)));
        }
        result?;
        Ok(())
    }

    async fn find_voter(&self, voter_id: &str) -> Result<Option<Voter>> {
        Ok(self
            .voters
            .find_one(doc! { "voterId": voter_id }, None)
            .await?)
    }

    async fn find_voter_by_national_id(&self, national_id_hmac: &str) -> Result<Option<Voter>> {
        Ok(self
            .voters
            .find_one(doc! { "nationalIdHmac": national_id_hmac }, None)
            .await?)
    }

    async fn mark_face_verified(&self, voter_id: &str, at: DateTime<Utc>) -> Result<()> {
        let update = doc! {
            "$set": { "faceVerified": true, "lastVerifiedAt": BsonDateTime::from_chrono(at) }
        };
        let result = self
            .voters
            .update_one(doc! { "voterId": voter_id }, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Voter {voter_id}")));
        }
        Ok(())
    }

    async fn insert_candidate(&self, candidate: Candidate) -> Result<()> {
        let result = self.candidates.insert_one(&candidate, None).await;
        if is_duplicate_key_error(result.as_ref()) {
            return Err(Error::AlreadyExists(format!(
                "Candidate {}",
                candidate.candidate_id
            )));
        }
        result?;
        Ok(())
    }

    async fn find_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>> {
        Ok(self
            .candidates
            .find_one(doc! { "candidateId": candidate_id }, None)
            .await?)
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder()
            .sort(doc! { "candidateId": 1 })
            .build();
        Ok(self
            .candidates
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }
}
