//! Default dispatcher over a [`BackendClient`], plus simulation helpers.

use std::sync::{RwLock, atomic::AtomicBool, atomic::Ordering};

use async_trait::async_trait;

use crate::{
    op::{OpPayload, Provenance, QueuedOp, ResourceMeta},
    types::{Method, Reachability},
};

use super::traits::{BackendClient, ConnectivityProbe, DispatchError, Dispatcher, IdentitySource};

/// Maps queued operations onto the network primitives of a
/// [`BackendClient`].
pub struct ClientDispatcher<C> {
    client: C,
}

impl<C: BackendClient> ClientDispatcher<C> {
    /// Wraps a backend client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// The wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: BackendClient> Dispatcher for ClientDispatcher<C> {
    async fn dispatch(&self, op: &QueuedOp) -> Result<ResourceMeta, DispatchError> {
        let auth = &op.provenance;
        match (op.method, &op.payload) {
            (Method::Create, OpPayload::Object { body, attached }) => {
                let meta = self
                    .client
                    .create_resource(&op.target_uri, body, auth)
                    .await?;
                // Companion blobs land on the freshly created resource.
                let blob_uri = meta.url.as_deref().unwrap_or(&op.target_uri);
                for (member_name, part) in attached {
                    self.client
                        .upload_blob(blob_uri, member_name, &part.bytes, &part.mime_type, auth)
                        .await?;
                }
                Ok(meta)
            }
            (Method::Update, OpPayload::Object { body, .. }) => Ok(self
                .client
                .update_resource(&op.target_uri, body, auth)
                .await?),
            (Method::Delete, OpPayload::Object { .. }) => {
                Ok(self.client.delete_resource(&op.target_uri, auth).await?)
            }
            (Method::PostToExtension, OpPayload::Object { body, .. }) => Ok(self
                .client
                .post_extension(&op.target_uri, body, auth)
                .await?),
            (Method::UpdateBlob, OpPayload::Blob(blob)) => Ok(self
                .client
                .upload_blob(
                    &op.target_uri,
                    &blob.member_name,
                    &blob.bytes,
                    &blob.mime_type,
                    auth,
                )
                .await?),
            (method, _) => Err(DispatchError::Rejected {
                status: 0,
                message: format!("payload shape does not match method {method:?}"),
            }),
        }
    }
}

/// Probe whose reachability is flipped by hand.
///
/// Lets applications and tests exercise offline behaviour without touching
/// the network: while offline, drains short-circuit and nothing is
/// dispatched.
#[derive(Debug, Default)]
pub struct SimulatedProbe {
    offline: AtomicBool,
}

impl SimulatedProbe {
    /// Probe that starts out reachable.
    pub fn online() -> Self {
        Self::default()
    }

    /// Probe that starts out unreachable.
    pub fn offline() -> Self {
        let probe = Self::default();
        probe.offline.store(true, Ordering::Relaxed);
        probe
    }

    /// Flips simulated reachability.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

impl ConnectivityProbe for SimulatedProbe {
    fn reachability(&self) -> Reachability {
        if self.offline.load(Ordering::Relaxed) {
            Reachability::Unreachable
        } else {
            Reachability::Reachable
        }
    }
}

/// Identity source holding the current user and session, replaceable when
/// the active session changes.
#[derive(Debug)]
pub struct SessionIdentity {
    current: RwLock<Provenance>,
}

impl SessionIdentity {
    /// Source initially reporting `user_guid`/`session_id`.
    pub fn new(user_guid: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Provenance {
                user_guid: user_guid.into(),
                session_id: session_id.into(),
            }),
        }
    }

    /// Replaces the active identity. Operations already queued keep the
    /// provenance they were enqueued under.
    pub fn set(&self, user_guid: impl Into<String>, session_id: impl Into<String>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        current.user_guid = user_guid.into();
        current.session_id = session_id.into();
    }
}

impl IdentitySource for SessionIdentity {
    fn current(&self) -> Provenance {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
