//! FIFO sequence of resident operations with dead-letter bookkeeping.
//!
//! Pure data structure: persistence and dispatch live elsewhere. The runtime
//! loop is the only owner, so nothing here is synchronized.

use hashbrown::HashMap;

use crate::{op::QueuedOp, types::LocalId};

/// Ordered in-memory view of the durable queue.
///
/// Order is enqueue order (ascending local id for hydrated rows). Dead
/// operations stay resident but are skipped by [`PendingQueue::front_live`]
/// and [`PendingQueue::pending`].
#[derive(Debug, Default)]
pub struct PendingQueue {
    ops: Vec<QueuedOp>,
    pos: HashMap<LocalId, usize>,
}

impl PendingQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a queue from rows loaded out of the durable store.
    ///
    /// Rows without a local id are not resident in storage and are skipped.
    pub fn hydrate(ops: Vec<QueuedOp>) -> Self {
        let mut queue = Self::new();
        for op in ops {
            if op.local_id.is_some() {
                queue.push(op);
            }
        }
        queue
    }

    /// Replaces the contents with freshly loaded rows.
    pub fn rehydrate(&mut self, ops: Vec<QueuedOp>) {
        *self = Self::hydrate(ops);
    }

    /// Total resident operations, dead included.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Count of live (drainable) operations.
    pub fn live_len(&self) -> usize {
        self.ops.iter().filter(|op| !op.dead).count()
    }

    /// Appends a persisted operation at the tail. Operations without a
    /// local id have no durable row and are ignored.
    pub fn push(&mut self, op: QueuedOp) {
        let Some(id) = op.local_id else {
            return;
        };
        self.pos.insert(id, self.ops.len());
        self.ops.push(op);
    }

    /// Removes and returns the operation with `id`; `None` when absent.
    pub fn take(&mut self, id: LocalId) -> Option<QueuedOp> {
        let idx = self.pos.remove(&id)?;
        let op = self.ops.remove(idx);
        for shifted in &self.ops[idx..] {
            if let Some(sid) = shifted.local_id {
                if let Some(p) = self.pos.get_mut(&sid) {
                    *p -= 1;
                }
            }
        }
        Some(op)
    }

    /// Oldest live operation, if any.
    pub fn front_live(&self) -> Option<&QueuedOp> {
        self.ops.iter().find(|op| !op.dead)
    }

    /// Applies `f` to the operation with `id`; returns false when absent.
    pub fn update(&mut self, id: LocalId, f: impl FnOnce(&mut QueuedOp)) -> bool {
        let Some(idx) = self.pos.get(&id).copied() else {
            return false;
        };
        f(&mut self.ops[idx]);
        true
    }

    /// FIFO snapshot of live operations.
    pub fn pending(&self) -> Vec<QueuedOp> {
        self.ops.iter().filter(|op| !op.dead).cloned().collect()
    }

    /// FIFO snapshot of dead-lettered operations.
    pub fn dead_letter(&self) -> Vec<QueuedOp> {
        self.ops.iter().filter(|op| op.dead).cloned().collect()
    }

    /// Whether an operation with `id` is resident.
    pub fn contains(&self, id: LocalId) -> bool {
        self.pos.contains_key(&id)
    }
}
