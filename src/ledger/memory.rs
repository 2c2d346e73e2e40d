use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

use super::store::{ChangeSet, CommitOutcome, LedgerStore, Versioned};

/// An in-process ledger. Each operation holds the lock only for its own
/// critical section, so commits are serialized but never block across an
/// `await`.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<BTreeMap<String, Versioned>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::TransientStore("in-memory ledger lock poisoned".to_string())
}

#[rocket::async_trait]
impl LedgerStore for MemoryLedger {
    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.get(key).cloned())
    }

    async fn scan(&self, start: &str, end: &str) -> Result<Vec<(String, Versioned)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .range(start.to_string()..end.to_string())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome> {
        let mut state = self.state.write().map_err(poisoned)?;

        for (key, expected) in changes.reads() {
            let current = state.get(key).map(|v| v.version).unwrap_or(0);
            if current != *expected {
                return Ok(CommitOutcome::Conflict(key.clone()));
            }
        }

        for (key, value) in changes.writes() {
            let version = state.get(key).map(|v| v.version).unwrap_or(0) + 1;
            state.insert(
                key.clone(),
                Versioned {
                    value: value.clone(),
                    version,
                },
            );
        }
        Ok(CommitOutcome::Applied)
    }
}
