//! Runtime event stream payloads.

use crate::{op::QueuedOp, types::LocalId};

/// Events emitted from the single-writer queue loop.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// An operation was persisted and admitted to the tail of the queue.
    Enqueued {
        /// Assigned row id.
        local_id: LocalId,
    },
    /// A queued operation replayed successfully and was removed.
    ///
    /// This is the completion-delegate contract: emitted exactly once per
    /// operation, after removal, with the result metadata attached.
    Completed {
        /// The finished operation.
        op: QueuedOp,
    },
    /// An operation was removed without being replayed.
    Dequeued {
        /// Removed row id.
        local_id: LocalId,
    },
    /// A drain pass stopped at this operation.
    Halted {
        /// Row id the pass stopped at.
        local_id: LocalId,
        /// Why the pass stopped.
        kind: HaltKind,
    },
    /// An operation exhausted its rejected-replay budget and left the live
    /// queue.
    DeadLettered {
        /// Dead-lettered row id.
        local_id: LocalId,
    },
    /// In-memory state was rehydrated from the durable store.
    Restarted {
        /// Resident operations after the reload.
        pending: usize,
    },
}

/// Why a drain pass stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltKind {
    /// The backend was unreachable; everything stays queued.
    Connectivity,
    /// The backend refused the payload; it stays queued (or dead-letters)
    /// for visibility rather than being dropped.
    Rejected,
}
