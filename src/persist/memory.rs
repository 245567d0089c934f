//! In-memory [`QueueStore`] with the same id-assignment semantics as the
//! SQLite store. Rows do not survive the process; useful for tests and
//! queues that are intentionally ephemeral.

use crate::{op::QueuedOp, types::LocalId};

use super::{QueueStore, StoreResult};

/// Vec-backed store with auto-incrementing ids.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    rows: Vec<QueuedOp>,
    next_id: LocalId,
}

impl MemoryQueueStore {
    /// Empty store; the first appended row gets id 1.
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl QueueStore for MemoryQueueStore {
    fn load_all(&self) -> StoreResult<Vec<QueuedOp>> {
        Ok(self.rows.clone())
    }

    fn append(&mut self, op: &QueuedOp) -> StoreResult<LocalId> {
        let id = self.next_id;
        self.next_id += 1;
        let mut row = op.clone();
        row.local_id = Some(id);
        row.result_meta = None;
        self.rows.push(row);
        Ok(id)
    }

    fn remove(&mut self, id: LocalId) -> StoreResult<()> {
        self.rows.retain(|row| row.local_id != Some(id));
        Ok(())
    }

    fn update_replay_state(&mut self, id: LocalId, attempts: u32, dead: bool) -> StoreResult<()> {
        for row in &mut self.rows {
            if row.local_id == Some(id) {
                row.attempts = attempts;
                row.dead = dead;
            }
        }
        Ok(())
    }

    fn wipe(&mut self) -> StoreResult<()> {
        self.rows.clear();
        Ok(())
    }
}
