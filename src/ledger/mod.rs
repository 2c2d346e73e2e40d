//! The ledger: a versioned key-value store and the ballot transactions
//! executed against it.

pub mod contract;
pub mod keys;
pub mod memory;
pub mod mongo;
pub mod store;

pub use contract::{BallotContract, LedgerCandidate, LedgerVoter, Tally, VoteReceipt};
pub use memory::MemoryLedger;
pub use mongo::MongoLedger;
pub use store::{ChangeSet, CommitOutcome, LedgerStore, Version, Versioned};
