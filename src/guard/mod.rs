//! The ballot guard: an off-ledger uniqueness barrier allowing at most one
//! ballot per voter identity, ever.

use crate::error::Result;
use crate::model::ballot::{Ballot, BallotCounts};

mod memory;
mod mongo;

pub use memory::MemoryGuard;
pub use mongo::MongoGuard;

/// Storage for ballot records, unique on voter id.
#[rocket::async_trait]
pub trait VoteGuard: Send + Sync {
    /// Whether a ballot has ever been accepted for this voter, whatever its state.
    async fn has_voted(&self, voter_id: &str) -> Result<bool>;

    /// Accept a ballot. Fails with `DuplicateVote` if the voter already has
    /// one; of any number of concurrent calls for one voter, exactly one
    /// succeeds.
    async fn record_ballot(&self, ballot: Ballot) -> Result<Ballot>;

    /// The ledger committed this voter's ballot.
    async fn mark_committed(&self, voter_id: &str) -> Result<()>;

    /// The ledger rejected or lost this voter's ballot after it was accepted.
    /// The ballot is kept so the voter stays blocked.
    async fn mark_orphaned(&self, voter_id: &str, reason: &str) -> Result<()>;

    async fn find(&self, voter_id: &str) -> Result<Option<Ballot>>;

    /// Number of ballots in each state.
    async fn count(&self) -> Result<BallotCounts>;

    /// All orphaned ballots, oldest first.
    async fn orphans(&self) -> Result<Vec<Ballot>>;
}
