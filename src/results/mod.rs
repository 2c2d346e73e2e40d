//! Publication of the final tally: a one-way `pending` -> `published`
//! transition whose snapshot is frozen until explicitly refreshed.

use crate::error::Result;
use crate::model::results::ResultSnapshot;

mod finalizer;
mod memory;
pub(crate) mod mongo;

pub use finalizer::Finalizer;
pub use memory::MemoryResultStore;
pub use mongo::MongoResultStore;

/// Holder of the singleton published snapshot.
#[rocket::async_trait]
pub trait ResultStore: Send + Sync {
    /// The published snapshot, or `None` while results are pending.
    async fn load(&self) -> Result<Option<ResultSnapshot>>;

    /// Atomically replace the published snapshot.
    async fn publish(&self, snapshot: &ResultSnapshot) -> Result<()>;
}
