//! Off-ledger records: administrator accounts, voter profiles and the
//! candidate roster.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{admin::Admin, candidate::Candidate, voter::Voter};

mod memory;
mod mongo;

pub use memory::MemoryRegistry;
pub use mongo::MongoRegistry;

#[rocket::async_trait]
pub trait Registry: Send + Sync {
    /// Fails with `AlreadyExists` if the id or email is taken.
    async fn insert_admin(&self, admin: Admin) -> Result<()>;

    async fn find_admin(&self, admin_id: &str) -> Result<Option<Admin>>;

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>>;

    async fn touch_admin_login(&self, admin_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Fails with `AlreadyExists` if the voter id or national id is taken.
    async fn insert_voter(&self, voter: Voter) -> Result<()>;

    async fn find_voter(&self, voter_id: &str) -> Result<Option<Voter>>;

    async fn find_voter_by_national_id(&self, national_id_hmac: &str) -> Result<Option<Voter>>;

    /// Record a successful face match.
    async fn mark_face_verified(&self, voter_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Fails with `AlreadyExists` if the candidate id is taken.
    async fn insert_candidate(&self, candidate: Candidate) -> Result<()>;

    async fn find_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>>;

    /// The whole roster, ordered by candidate id.
    async fn candidates(&self) -> Result<Vec<Candidate>>;
}
