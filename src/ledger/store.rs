use std::collections::BTreeMap;

use crate::error::Result;

/// Version of a ledger value. Absent keys are at version zero; every
/// committed write bumps the version by one.
pub type Version = u64;

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub version: Version,
}

/// The reads and buffered writes of one transaction.
///
/// On commit, every key in the read set must still be at the version it was
/// read at, otherwise nothing in the write set is applied.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    reads: BTreeMap<String, Version>,
    writes: BTreeMap<String, Vec<u8>>,
}

impl ChangeSet {
    /// A change set with a single unconditional write.
    pub fn blind_write(key: impl Into<String>, value: Vec<u8>) -> Self {
        let mut changes = Self::default();
        changes.write(key, value);
        changes
    }

    /// Record that `key` was observed at `version`. The first observation wins.
    pub fn read(&mut self, key: impl Into<String>, version: Version) {
        self.reads.entry(key.into()).or_insert(version);
    }

    pub fn write(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), value);
    }

    /// The value this transaction has already written to `key`, if any.
    pub fn pending(&self, key: &str) -> Option<&[u8]> {
        self.writes.get(key).map(Vec::as_slice)
    }

    pub fn reads(&self) -> &BTreeMap<String, Version> {
        &self.reads
    }

    pub fn writes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.writes
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Result of submitting a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every write was applied.
    Applied,
    /// The named key changed since it was read; nothing was applied.
    Conflict(String),
}

/// A versioned key-value store that is the system of record for candidates,
/// voters and the aggregate total.
///
/// Commits are all-or-nothing. Two commits touching the same key are
/// serialized by the store.
#[rocket::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the current value of `key`.
    async fn get(&self, key: &str) -> Result<Option<Versioned>>;

    /// All entries with `start <= key < end`, in key order.
    async fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Versioned)>>;

    /// Validate the read set and apply the write set as one atomic unit.
    async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome>;

    /// Atomically overwrite a single key.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        match self.commit(ChangeSet::blind_write(key, value)).await? {
            CommitOutcome::Applied => Ok(()),
            // A blind write has no read set to conflict with.
            CommitOutcome::Conflict(key) => Err(crate::error::Error::TransientStore(format!(
                "unexpected conflict on blind write to {key}"
            ))),
        }
    }
}
