use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::results::ResultSnapshot;

use super::ResultStore;

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    snapshot: RwLock<Option<ResultSnapshot>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::TransientStore("in-memory result store lock poisoned".to_string())
}

#[rocket::async_trait]
impl ResultStore for MemoryResultStore {
    async fn load(&self) -> Result<Option<ResultSnapshot>> {
        Ok(self.snapshot.read().map_err(poisoned)?.clone())
    }

    async fn publish(&self, snapshot: &ResultSnapshot) -> Result<()> {
        *self.snapshot.write().map_err(poisoned)? = Some(snapshot.clone());
        Ok(())
    }
}
