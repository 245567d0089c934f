//! Offline operation queue for backend-as-a-service client SDKs.
//!
//! Create, update, delete, and blob-upload calls that cannot reach the
//! backend are captured as [`op::QueuedOp`] values, persisted to local
//! storage, and replayed strictly in FIFO order through a single-writer
//! runtime once connectivity returns. Replay stops at the first failure so
//! operations that depend on earlier ones are never sent out of order.
//!
//! # Examples
//!
//! In-memory usage with [`persist::memory::MemoryQueueStore`]:
//! ```
//! use replayq::{
//!     op::{Provenance, QueuedOp},
//!     persist::{QueueStore, memory::MemoryQueueStore},
//!     queue::pending::PendingQueue,
//!     types::Method,
//! };
//! use serde_json::json;
//!
//! let mut store = MemoryQueueStore::new();
//! let op = QueuedOp::object(
//!     Method::Create,
//!     json!({"title": "grocery run"}),
//!     "/errands",
//!     Provenance {
//!         user_guid: "user-1".to_string(),
//!         session_id: "sess-1".to_string(),
//!     },
//! );
//! let id = store.append(&op).expect("append");
//! assert_eq!(id, 1);
//!
//! let mut queue = PendingQueue::hydrate(store.load_all().expect("load"));
//! assert_eq!(queue.len(), 1);
//! assert!(queue.take(id).is_some());
//! ```
//!
//! Durable usage with the SQLite store:
//! ```no_run
//! use replayq::{
//!     op::{Provenance, QueuedOp},
//!     persist::{QueueStore, sqlite::SqliteQueueStore},
//!     queue::pending::PendingQueue,
//!     types::Method,
//! };
//! use serde_json::json;
//!
//! let mut store = SqliteQueueStore::open("queued_ops.db").expect("open sqlite");
//! let provenance = Provenance {
//!     user_guid: "user-1".to_string(),
//!     session_id: "sess-1".to_string(),
//! };
//! store
//!     .append(&QueuedOp::object(
//!         Method::Create,
//!         json!({"name": "kettle"}),
//!         "/products",
//!         provenance.clone(),
//!     ))
//!     .expect("append create");
//! store
//!     .append(&QueuedOp::blob(
//!         "/products/1",
//!         vec![0x89, 0x50, 0x4e, 0x47],
//!         "image/png",
//!         "photo",
//!         provenance,
//!     ))
//!     .expect("append blob");
//!
//! // Survives restart: rows come back in enqueue order.
//! let pending = PendingQueue::hydrate(store.load_all().expect("load"));
//! assert_eq!(pending.len(), 2);
//! ```
//!
//! For live replay, hydrate a [`queue::pending::PendingQueue`] from the
//! store and hand both to [`runtime::handle::spawn_queue`] along with a
//! [`dispatch::traits::Dispatcher`]; the returned handle exposes the
//! enqueue/list/dequeue/drain API and a broadcast event stream.
#![deny(missing_docs)]

/// Replay dispatch traits and default backend-client glue.
pub mod dispatch;
/// Queued operation model and backend metadata types.
pub mod op;
/// Durable storage abstraction, SQLite and in-memory stores.
pub mod persist;
/// In-memory pending-operation sequence.
pub mod queue;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
