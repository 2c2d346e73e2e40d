use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

use crate::error::{Error, Result};
use crate::model::{admin::Admin, candidate::Candidate, voter::Voter};

use super::Registry;

#[derive(Debug, Default)]
struct Records {
    admins: BTreeMap<String, Admin>,
    voters: BTreeMap<String, Voter>,
    candidates: BTreeMap<String, Candidate>,
}

/// A registry held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<Records>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Records) -> Result<T>) -> Result<T> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::TransientStore("in-memory registry lock poisoned".to_string()))?;
        f(&mut records)
    }
}

#[rocket::async_trait]
impl Registry for MemoryRegistry {
    async fn insert_admin(&self, admin: Admin) -> Result<()> {
        self.with(|records| {
            let taken = records.admins.contains_key(&admin.admin_id)
                || records.admins.values().any(|a| a.email == admin.email);
            if taken {
                return Err(Error::AlreadyExists(format!("Admin {}", admin.admin_id)));
            }
            records.admins.insert(admin.admin_id.clone(), admin);
            Ok(())
        })
    }

    async fn find_admin(&self, admin_id: &str) -> Result<Option<Admin>> {
        self.with(|records| Ok(records.admins.get(admin_id).cloned()))
    }

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>> {
        self.with(|records| {
            Ok(records
                .admins
                .values()
                .find(|admin| admin.email == email)
                .cloned())
        })
    }

    async fn touch_admin_login(&self, admin_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with(|records| {
            let admin = records
                .admins
                .get_mut(admin_id)
                .ok_or_else(|| Error::not_found(format!("Admin {admin_id}")))?;
            admin.last_login_at = Some(BsonDateTime::from_chrono(at));
            Ok(())
        })
    }

    async fn insert_voter(&self, voter: Voter) -> Result<()> {
        self.with(|records| {
            if records.voters.contains_key(&voter.voter_id) {
                return Err(Error::AlreadyExists(format!("Voter {}", voter.voter_id)));
            }
            if records
                .voters
                .values()
                .any(|v| v.national_id_hmac == voter.national_id_hmac)
            {
                return Err(Error::AlreadyExists("National id".to_string()));
            }
            records.voters.insert(voter.voter_id.clone(), voter);
            Ok(())
        })
    }

    async fn find_voter(&self, voter_id: &str) -> Result<Option<Voter>> {
        self.with(|records| Ok(records.voters.get(voter_id).cloned()))
    }

    async fn find_voter_by_national_id(&self, national_id_hmac: &str) -> Result<Option<Voter>> {
        self.with(|records| {
            Ok(records
                .voters
                .values()
                .find(|voter| voter.national_id_hmac == national_id_hmac)
                .cloned())
        })
    }

    async fn mark_face_verified(&self, voter_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with(|records| {
            let voter = records
                .voters
                .get_mut(voter_id)
                .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
            voter.face_verified = true;
            voter.last_verified_at = Some(BsonDateTime::from_chrono(at));
            Ok(())
        })
    }

    async fn insert_candidate(&self, candidate: Candidate) -> Result<()> {
        self.with(|records| {
            if records.candidates.contains_key(&candidate.candidate_id) {
                return Err(Error::AlreadyExists(format!(
                    "Candidate {}",
                    candidate.candidate_id
                )));
            }
            records
                .candidates
                .insert(candidate.candidate_id.clone(), candidate);
            Ok(())
        })
    }

    async fn find_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>> {
        self.with(|records| Ok(records.candidates.get(candidate_id).cloned()))
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        self.with(|records| Ok(records.candidates.values().cloned().collect()))
    }
}
