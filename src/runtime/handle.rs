use std::sync::Arc;

use hashbrown::HashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use crate::{
    dispatch::traits::{ConnectivityProbe, DispatchError, Dispatcher, IdentitySource},
    op::{BlobPart, QueuedOp, RemoteObject},
    persist::{QueueStore, StoreError},
    queue::pending::PendingQueue,
    types::{LocalId, Method, Reachability},
};

use super::events::{HaltKind, QueueEvent};

/// Failure surfaced by the queue handle.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The durable store failed; for enqueue this means the operation was
    /// NOT admitted.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    /// Update/delete/blob admission needs a backend url the object does not
    /// have yet.
    #[error("object has no backend url to target")]
    MissingTargetUri,
    /// The runtime task is gone.
    #[error("queue runtime stopped")]
    ChannelClosed,
}

/// Tunables for the queue runtime.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Rejected-dispatch budget per operation; `None` retries forever,
    /// `Some(n)` dead-letters an operation after its n-th rejection.
    pub max_replay_attempts: Option<u32>,
    /// Command channel capacity.
    pub command_capacity: usize,
    /// Event broadcast capacity.
    pub events_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_replay_attempts: None,
            command_capacity: 256,
            events_capacity: 1024,
        }
    }
}

/// How a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every live operation replayed.
    Drained,
    /// The connectivity probe reported unreachable; nothing was attempted.
    Offline,
    /// The pass stopped at an operation that failed to dispatch.
    Halted {
        /// Row id the pass stopped at.
        local_id: LocalId,
        /// Why it stopped.
        kind: HaltKind,
    },
}

/// Result of one [`QueueHandle::process_pending`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations that replayed successfully this pass.
    pub completed: usize,
    /// How the pass ended.
    pub outcome: DrainOutcome,
}

type SharedStore = Arc<Mutex<Box<dyn QueueStore>>>;

enum Command {
    Enqueue {
        method: Method,
        body: Value,
        attached: HashMap<String, BlobPart>,
        uri: String,
        resp: oneshot::Sender<Result<QueuedOp, QueueError>>,
    },
    EnqueueBlob {
        uri: String,
        bytes: Vec<u8>,
        mime_type: String,
        member_name: String,
        resp: oneshot::Sender<Result<QueuedOp, QueueError>>,
    },
    ListPending {
        resp: oneshot::Sender<Vec<QueuedOp>>,
    },
    ListDead {
        resp: oneshot::Sender<Vec<QueuedOp>>,
    },
    Dequeue {
        local_id: Option<LocalId>,
        resp: oneshot::Sender<Result<(), QueueError>>,
    },
    ProcessPending {
        resp: oneshot::Sender<Result<DrainReport, QueueError>>,
    },
    SimulateRestart {
        resp: oneshot::Sender<Result<usize, QueueError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Handle to a spawned queue runtime; cheap to clone.
pub struct QueueHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<QueueEvent>,
}

impl Clone for QueueHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

/// Spawns the single-writer queue loop.
///
/// `pending` is the hydrated in-memory state, normally
/// `PendingQueue::hydrate(store.load_all()?)`. The loop owns both the
/// sequence and the store; all mutation goes through the returned handle,
/// one command at a time, which is what guarantees in-order delivery.
pub fn spawn_queue(
    pending: PendingQueue,
    store: Box<dyn QueueStore>,
    dispatcher: Arc<dyn Dispatcher>,
    identity: Arc<dyn IdentitySource>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    config: QueueConfig,
) -> QueueHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_capacity);
    let (events_tx, _) = broadcast::channel::<QueueEvent>(config.events_capacity);

    let events_tx_loop = events_tx.clone();
    let store = Arc::new(Mutex::new(store));

    tokio::spawn(async move {
        let mut pending = pending;
        while let Some(cmd) = cmd_rx.recv().await {
            let done = handle_command(
                cmd,
                &mut pending,
                &store,
                &dispatcher,
                &identity,
                probe.as_deref(),
                &config,
                &events_tx_loop,
            )
            .await;
            if done {
                break;
            }
        }
    });

    QueueHandle { cmd_tx, events_tx }
}

impl QueueHandle {
    /// Subscribes to the queue event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events_tx.subscribe()
    }

    /// Queues a create of `body` at a collection uri.
    pub async fn enqueue_create(
        &self,
        body: Value,
        uri: impl Into<String>,
    ) -> Result<QueuedOp, QueueError> {
        self.enqueue_object(Method::Create, body, HashMap::new(), uri.into())
            .await
    }

    /// Queues a create whose object carries companion blobs, keyed by
    /// member name; the blobs upload to the created resource on replay.
    pub async fn enqueue_create_with_blobs(
        &self,
        body: Value,
        attached: HashMap<String, BlobPart>,
        uri: impl Into<String>,
    ) -> Result<QueuedOp, QueueError> {
        self.enqueue_object(Method::Create, body, attached, uri.into())
            .await
    }

    /// Queues an update of an object that already has a backend url.
    pub async fn enqueue_update(&self, obj: &RemoteObject) -> Result<QueuedOp, QueueError> {
        let uri = obj
            .target_uri()
            .ok_or(QueueError::MissingTargetUri)?
            .to_string();
        self.enqueue_object(Method::Update, obj.body.clone(), HashMap::new(), uri)
            .await
    }

    /// Queues a delete of an object that already has a backend url.
    pub async fn enqueue_delete(&self, obj: &RemoteObject) -> Result<QueuedOp, QueueError> {
        let uri = obj
            .target_uri()
            .ok_or(QueueError::MissingTargetUri)?
            .to_string();
        self.enqueue_object(Method::Delete, obj.body.clone(), HashMap::new(), uri)
            .await
    }

    /// Queues a blob replacement for one member of an existing object.
    pub async fn enqueue_blob_update(
        &self,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        obj: &RemoteObject,
        member_name: impl Into<String>,
    ) -> Result<QueuedOp, QueueError> {
        let uri = obj
            .target_uri()
            .ok_or(QueueError::MissingTargetUri)?
            .to_string();
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::EnqueueBlob {
                uri,
                bytes,
                mime_type: mime_type.into(),
                member_name: member_name.into(),
                resp: tx,
            })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)?
    }

    /// Queues a POST of `body` to a server extension uri.
    pub async fn enqueue_post(
        &self,
        body: Value,
        uri: impl Into<String>,
    ) -> Result<QueuedOp, QueueError> {
        self.enqueue_object(Method::PostToExtension, body, HashMap::new(), uri.into())
            .await
    }

    async fn enqueue_object(
        &self,
        method: Method,
        body: Value,
        attached: HashMap<String, BlobPart>,
        uri: String,
    ) -> Result<QueuedOp, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Enqueue {
                method,
                body,
                attached,
                uri,
                resp: tx,
            })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)?
    }

    /// FIFO snapshot of live queued operations.
    pub async fn list_pending(&self) -> Result<Vec<QueuedOp>, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ListPending { resp: tx })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)
    }

    /// FIFO snapshot of dead-lettered operations.
    pub async fn list_dead_letter(&self) -> Result<Vec<QueuedOp>, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ListDead { resp: tx })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)
    }

    /// Removes `op` from memory and storage without replaying it.
    ///
    /// Idempotent: an operation that was never persisted, was already
    /// drained, or was already dequeued is a no-op.
    pub async fn dequeue(&self, op: &QueuedOp) -> Result<(), QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Dequeue {
                local_id: op.local_id,
                resp: tx,
            })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)?
    }

    /// Runs one drain pass: dispatches live operations oldest-first until
    /// the queue is empty or a dispatch fails. Safe to call speculatively.
    pub async fn process_pending(&self) -> Result<DrainReport, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ProcessPending { resp: tx })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)?
    }

    /// Discards in-memory state and rehydrates from the durable store, as a
    /// process restart would; returns the resident count afterwards.
    pub async fn simulate_restart(&self) -> Result<usize, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SimulateRestart { resp: tx })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)?
    }

    /// Stops the runtime loop.
    pub async fn shutdown(&self) -> Result<(), QueueError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        rx.await.map_err(|_| QueueError::ChannelClosed)
    }
}

/// Drives speculative drains from a reachability feed: every transition to
/// [`Reachability::Reachable`] triggers one `process_pending` pass.
pub fn watch_reachability(
    handle: QueueHandle,
    mut rx: watch::Receiver<Reachability>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let reachable = *rx.borrow_and_update() == Reachability::Reachable;
            if reachable {
                if let Err(err) = handle.process_pending().await {
                    warn!(error = %err, "reachability-triggered drain failed");
                }
            }
        }
    })
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    cmd: Command,
    pending: &mut PendingQueue,
    store: &SharedStore,
    dispatcher: &Arc<dyn Dispatcher>,
    identity: &Arc<dyn IdentitySource>,
    probe: Option<&dyn ConnectivityProbe>,
    config: &QueueConfig,
    events_tx: &broadcast::Sender<QueueEvent>,
) -> bool {
    match cmd {
        Command::Enqueue {
            method,
            body,
            attached,
            uri,
            resp,
        } => {
            let provenance = identity.current();
            let op = QueuedOp::object_with_blobs(method, body, attached, uri, provenance);
            let _ = resp.send(persist_and_admit(op, pending, store, events_tx).await);
        }
        Command::EnqueueBlob {
            uri,
            bytes,
            mime_type,
            member_name,
            resp,
        } => {
            let provenance = identity.current();
            let op = QueuedOp::blob(uri, bytes, mime_type, member_name, provenance);
            let _ = resp.send(persist_and_admit(op, pending, store, events_tx).await);
        }
        Command::ListPending { resp } => {
            let _ = resp.send(pending.pending());
        }
        Command::ListDead { resp } => {
            let _ = resp.send(pending.dead_letter());
        }
        Command::Dequeue { local_id, resp } => {
            let res = match local_id {
                Some(id) if pending.take(id).is_some() => {
                    match with_store(store, move |s| s.remove(id)).await {
                        Ok(()) => {
                            let _ = events_tx.send(QueueEvent::Dequeued { local_id: id });
                            Ok(())
                        }
                        Err(err) => Err(QueueError::Store(err)),
                    }
                }
                _ => Ok(()),
            };
            let _ = resp.send(res);
        }
        Command::ProcessPending { resp } => {
            let _ = resp.send(drain(pending, store, dispatcher, probe, config, events_tx).await);
        }
        Command::SimulateRestart { resp } => {
            let res = match with_store(store, |s| s.load_all()).await {
                Ok(rows) => {
                    pending.rehydrate(rows);
                    let resident = pending.len();
                    let _ = events_tx.send(QueueEvent::Restarted { pending: resident });
                    Ok(resident)
                }
                Err(err) => Err(QueueError::Store(err)),
            };
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

async fn persist_and_admit(
    mut op: QueuedOp,
    pending: &mut PendingQueue,
    store: &SharedStore,
    events_tx: &broadcast::Sender<QueueEvent>,
) -> Result<QueuedOp, QueueError> {
    let row = op.clone();
    let id = with_store(store, move |s| s.append(&row)).await?;
    op.local_id = Some(id);
    pending.push(op.clone());
    let _ = events_tx.send(QueueEvent::Enqueued { local_id: id });
    Ok(op)
}

async fn drain(
    pending: &mut PendingQueue,
    store: &SharedStore,
    dispatcher: &Arc<dyn Dispatcher>,
    probe: Option<&dyn ConnectivityProbe>,
    config: &QueueConfig,
    events_tx: &broadcast::Sender<QueueEvent>,
) -> Result<DrainReport, QueueError> {
    if let Some(probe) = probe {
        if probe.reachability() == Reachability::Unreachable {
            debug!("drain skipped: backend unreachable");
            return Ok(DrainReport {
                completed: 0,
                outcome: DrainOutcome::Offline,
            });
        }
    }

    let mut completed = 0;
    loop {
        let Some(op) = pending.front_live().cloned() else {
            return Ok(DrainReport {
                completed,
                outcome: DrainOutcome::Drained,
            });
        };
        let Some(id) = op.local_id else {
            // push() refuses id-less operations, so this row cannot exist.
            error!("resident operation without local id; halting drain");
            return Err(QueueError::Store(StoreError::Message(
                "resident operation without local id".to_string(),
            )));
        };

        match dispatcher.dispatch(&op).await {
            Ok(meta) => {
                let remove_res = with_store(store, move |s| s.remove(id)).await;
                let mut finished = pending.take(id).unwrap_or(op);
                finished.result_meta = Some(meta);
                completed += 1;
                let _ = events_tx.send(QueueEvent::Completed { op: finished });
                if let Err(err) = remove_res {
                    // The backend acknowledged the call, so the completion
                    // above stands; the pass halts and the caller sees the
                    // storage failure.
                    error!(local_id = id, error = %err, "failed to remove replayed operation from store");
                    return Err(QueueError::Store(err));
                }
            }
            Err(DispatchError::Connectivity(detail)) => {
                debug!(local_id = id, %detail, "drain halted: backend unreachable");
                let _ = events_tx.send(QueueEvent::Halted {
                    local_id: id,
                    kind: HaltKind::Connectivity,
                });
                return Ok(DrainReport {
                    completed,
                    outcome: DrainOutcome::Halted {
                        local_id: id,
                        kind: HaltKind::Connectivity,
                    },
                });
            }
            Err(DispatchError::Rejected { status, message }) => {
                warn!(local_id = id, status, %message, "backend rejected queued operation");
                let attempts = op.attempts + 1;
                let dead = config
                    .max_replay_attempts
                    .is_some_and(|max| attempts >= max);
                pending.update(id, |resident| {
                    resident.attempts = attempts;
                    resident.dead = dead;
                });
                if let Err(err) =
                    with_store(store, move |s| s.update_replay_state(id, attempts, dead)).await
                {
                    warn!(local_id = id, error = %err, "failed to persist replay state");
                }
                if dead {
                    let _ = events_tx.send(QueueEvent::DeadLettered { local_id: id });
                }
                let _ = events_tx.send(QueueEvent::Halted {
                    local_id: id,
                    kind: HaltKind::Rejected,
                });
                return Ok(DrainReport {
                    completed,
                    outcome: DrainOutcome::Halted {
                        local_id: id,
                        kind: HaltKind::Rejected,
                    },
                });
            }
        }
    }
}

async fn with_store<T, F>(store: &SharedStore, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn QueueStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let mut guard = store.blocking_lock();
        f(&mut **guard)
    })
    .await
    .map_err(|e| StoreError::Message(format!("join error: {e}")))?
}
