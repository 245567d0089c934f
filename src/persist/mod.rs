//! Durable queue storage abstraction and implementations.

/// In-memory store for tests and ephemeral queues.
pub mod memory;
/// SQLite-backed store.
pub mod sqlite;

use thiserror::Error;

use crate::{op::QueuedOp, types::LocalId};

/// Failure while persisting, removing, or loading queue rows.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sqlite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload could not be encoded for storage.
    #[error("payload encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other storage failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Single source of truth for queued operations across process restarts.
///
/// Implementations must keep rows in insertion order under ascending
/// [`LocalId`] and tolerate a freshly created (empty) store.
pub trait QueueStore: Send {
    /// Returns all persisted operations in FIFO order. Malformed rows are
    /// skipped with a logged warning rather than failing the whole load.
    fn load_all(&self) -> StoreResult<Vec<QueuedOp>>;

    /// Persists one operation and returns its assigned id. On error the
    /// operation is not considered queued.
    fn append(&mut self, op: &QueuedOp) -> StoreResult<LocalId>;

    /// Deletes at most one row; an absent id is a no-op, not an error.
    fn remove(&mut self, id: LocalId) -> StoreResult<()>;

    /// Persists rejected-replay bookkeeping for one row.
    fn update_replay_state(&mut self, id: LocalId, attempts: u32, dead: bool) -> StoreResult<()>;

    /// Deletes all rows.
    fn wipe(&mut self) -> StoreResult<()>;
}
